use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Name-keyed factory lookup. Closed at startup: built once, then shared.
pub struct FactoryRegistry<F: ?Sized> {
    factories: HashMap<&'static str, Arc<F>>,
}

impl<F: ?Sized> FactoryRegistry<F> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: &'static str, factory: Arc<F>) {
        if self.factories.insert(name, factory).is_some() {
            warn!("registry: factory replaced, name={}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<F>> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<F: ?Sized> Default for FactoryRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}
