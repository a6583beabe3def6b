//! Fake implementations for tests that want real behavior without mocks.

use parking_lot::Mutex;

use flowstate_core::{CoreError, PersistContext, PropertyDefinition, PropertyPersister};

/// One write seen by [`RecordingPersister`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedWrite {
    /// Flow type of the writer
    pub flow_type: String,
    /// Lookup key of the writer
    pub lookup_key: String,
    /// Property name
    pub property: String,
    /// Namespace the value was cached under
    pub namespace: Option<String>,
    /// Serialized value, `None` for removals
    pub value: Option<String>,
}

/// Persister that remembers every write
#[derive(Debug, Default)]
pub struct RecordingPersister {
    writes: Mutex<Vec<PersistedWrite>>,
}

impl RecordingPersister {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes so far
    pub fn writes(&self) -> Vec<PersistedWrite> {
        self.writes.lock().clone()
    }

    /// Writes of `property`
    pub fn writes_for(&self, property: &str) -> Vec<PersistedWrite> {
        self.writes
            .lock()
            .iter()
            .filter(|write| write.property == property)
            .cloned()
            .collect()
    }
}

impl PropertyPersister for RecordingPersister {
    fn persist(
        &self,
        context: &PersistContext<'_>,
        definition: &PropertyDefinition,
        value: Option<&str>,
    ) -> Result<(), CoreError> {
        self.writes.lock().push(PersistedWrite {
            flow_type: context.flow_type_name.to_string(),
            lookup_key: context.lookup_key.to_string(),
            property: definition.name().to_string(),
            namespace: context.namespace.map(str::to_string),
            value: value.map(str::to_string),
        });
        Ok(())
    }
}
