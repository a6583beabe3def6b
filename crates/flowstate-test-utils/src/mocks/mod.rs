//! Mock implementations of the persister interface.
//!
//! [`PropertyPersister`] borrows its arguments, so the mock sits one step
//! behind it: [`MockPersistenceBackend`] receives owned copies through
//! [`BackendPersister`].

use mockall::automock;
use std::sync::Arc;

use flowstate_core::{CoreError, PersistContext, PropertyDefinition, PropertyPersister};

/// Owned view of a persisted write
#[automock]
pub trait PersistenceBackend: Send + Sync {
    /// Store `value` for `property` of a `flow_type` flow state
    fn write(
        &self,
        flow_type: String,
        property: String,
        namespace: Option<String>,
        value: Option<String>,
    ) -> Result<(), CoreError>;
}

/// Adapts a [`PersistenceBackend`] to [`PropertyPersister`]
pub struct BackendPersister<B: PersistenceBackend> {
    backend: B,
}

impl<B: PersistenceBackend> BackendPersister<B> {
    /// Wrap `backend`
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: PersistenceBackend> PropertyPersister for BackendPersister<B> {
    fn persist(
        &self,
        context: &PersistContext<'_>,
        definition: &PropertyDefinition,
        value: Option<&str>,
    ) -> Result<(), CoreError> {
        self.backend.write(
            context.flow_type_name.to_string(),
            definition.name().to_string(),
            context.namespace.map(str::to_string),
            value.map(str::to_string),
        )
    }
}

/// Persister backed by a configured mock
pub fn mock_persister(backend: MockPersistenceBackend) -> Arc<dyn PropertyPersister> {
    Arc::new(BackendPersister::new(backend))
}

/// Mock that rejects every write with `reason`
pub fn create_failing_backend(reason: &str) -> MockPersistenceBackend {
    let reason = reason.to_string();
    let mut mock = MockPersistenceBackend::new();
    mock.expect_write()
        .returning(move |_, _, _, _| Err(CoreError::Other(reason.clone())));
    mock
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[test]
    fn test_backend_receives_owned_values() {
        let mut backend = MockPersistenceBackend::new();
        backend
            .expect_write()
            .with(
                eq("signup".to_string()),
                eq("email".to_string()),
                eq(Some("k1".to_string())),
                eq(Some("a@b.c".to_string())),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let persister = mock_persister(backend);
        let context = PersistContext {
            flow_type_name: "signup",
            lookup_key: "k1",
            activity_name: None,
            namespace: Some("k1"),
        };
        persister
            .persist(&context, &PropertyDefinition::new("email"), Some("a@b.c"))
            .unwrap();
    }

    #[test]
    fn test_failing_backend() {
        let persister = mock_persister(create_failing_backend("disk full"));
        let context = PersistContext {
            flow_type_name: "f",
            lookup_key: "k",
            activity_name: None,
            namespace: None,
        };
        let result = persister.persist(&context, &PropertyDefinition::new("p"), None);
        assert_eq!(result, Err(CoreError::Other("disk full".to_string())));
    }
}
