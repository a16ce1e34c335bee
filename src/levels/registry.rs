//! Static dispatch table from level identifiers to handlers.
//!
//! The registry replaces string-keyed conditional chains with an explicit
//! table over the closed [`Level`](super::Level) enumeration. It is built
//! once through [`RegistryBuilder`] and immutable afterwards; looking up a
//! level that has no handler is signalled with `None`, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use super::Level;
use crate::handler::LevelHandler;

/// Immutable table mapping each registered level to its handler.
pub struct LevelRegistry {
    handlers: HashMap<Level, Arc<dyn LevelHandler>>,
}

impl LevelRegistry {
    /// Starts building a new registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    /// Returns the handler registered for `level`, or `None` if the level
    /// has no handler in this registry.
    pub fn handler(&self, level: Level) -> Option<&Arc<dyn LevelHandler>> {
        self.handlers.get(&level)
    }

    /// Returns whether `level` has a registered handler.
    pub fn contains(&self, level: Level) -> bool {
        self.handlers.contains_key(&level)
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the registered levels in canonical pipeline order.
    pub fn levels(&self) -> Vec<Level> {
        Level::ALL
            .iter()
            .copied()
            .filter(|level| self.handlers.contains_key(level))
            .collect()
    }
}

/// Builder for [`LevelRegistry`].
///
/// Registering the same level twice replaces the earlier handler.
pub struct RegistryBuilder {
    handlers: HashMap<Level, Arc<dyn LevelHandler>>,
}

impl RegistryBuilder {
    /// Registers a handler for `level`.
    pub fn register(mut self, level: Level, handler: Arc<dyn LevelHandler>) -> Self {
        self.handlers.insert(level, handler);
        self
    }

    /// Finalizes the registry.
    pub fn build(self) -> LevelRegistry {
        LevelRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlFile;
    use crate::error::HandlerError;
    use crate::session::SessionContext;
    use async_trait::async_trait;

    struct NullHandler;

    #[async_trait]
    impl LevelHandler for NullHandler {
        async fn run(
            &self,
            _ctx: &SessionContext,
            _manifest: &ControlFile,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = LevelRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.handler(Level::L1).is_none());
        assert!(!registry.contains(Level::Mpt));
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = LevelRegistry::builder()
            .register(Level::L1, Arc::new(NullHandler))
            .register(Level::Concatenate, Arc::new(NullHandler))
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.handler(Level::L1).is_some());
        assert!(registry.handler(Level::Concatenate).is_some());
        assert!(registry.handler(Level::L2).is_none());
    }

    #[test]
    fn test_levels_in_canonical_order() {
        let registry = LevelRegistry::builder()
            .register(Level::L5, Arc::new(NullHandler))
            .register(Level::L1, Arc::new(NullHandler))
            .register(Level::Concatenate, Arc::new(NullHandler))
            .build();

        assert_eq!(
            registry.levels(),
            vec![Level::L1, Level::Concatenate, Level::L5]
        );
    }
}
