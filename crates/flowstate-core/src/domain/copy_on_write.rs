//! Copy-on-write wrapper for shared template values

use std::ops::Deref;
use std::sync::Arc;

use crate::CoreError;

/// A value plus an immutability flag.
///
/// Template values are shared between many owners and are never changed in
/// place: every mutator on a template returns a fresh non-template copy and
/// leaves the original intact. Non-template values are mutated in place and
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyOnWrite<T: Clone> {
    value: Arc<T>,
    template: bool,
}

impl<T: Clone> CopyOnWrite<T> {
    /// Wrap an immutable, shareable value
    pub fn template(value: T) -> Self {
        Self {
            value: Arc::new(value),
            template: true,
        }
    }

    /// Wrap a value that may be mutated in place
    pub fn mutable(value: T) -> Self {
        Self {
            value: Arc::new(value),
            template: false,
        }
    }

    /// Whether mutators clone
    pub fn is_template(&self) -> bool {
        self.template
    }

    /// Mark as template
    pub fn into_template(mut self) -> Self {
        self.template = true;
        self
    }

    /// Borrow the wrapped value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Shared handle to the wrapped value
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    /// Owned copy of the wrapped value
    pub fn to_inner(&self) -> T {
        (*self.value).clone()
    }

    /// Apply `mutate`, cloning first when this is a template
    pub fn update<F>(self, mutate: F) -> Self
    where
        F: FnOnce(&mut T),
    {
        let mut owned = if self.template {
            Self::mutable(self.to_inner())
        } else {
            self
        };
        mutate(Arc::make_mut(&mut owned.value));
        owned
    }

    /// Set a field through `write`, unless `read` shows it already holds `value`.
    ///
    /// A template whose field already equals `value` is returned as is.
    pub fn init_with<V, R, W>(self, read: R, value: V, write: W) -> Self
    where
        V: PartialEq,
        R: FnOnce(&T) -> &V,
        W: FnOnce(&mut T, V),
    {
        if *read(self.get()) == value {
            return self;
        }
        self.update(|inner| write(inner, value))
    }

    /// In-place access, refused for templates
    pub fn try_get_mut(&mut self) -> Result<&mut T, CoreError> {
        if self.template {
            return Err(CoreError::TemplateMutation(
                "template values must be cloned before modification".to_string(),
            ));
        }
        Ok(Arc::make_mut(&mut self.value))
    }
}

impl<T: Clone> Deref for CopyOnWrite<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Clone> From<T> for CopyOnWrite<T> {
    fn from(value: T) -> Self {
        Self::mutable(value)
    }
}
