// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Stage registry
//!
//! Maps `(kind, type name)` pairs to stage factories. Registration happens
//! once through [`StageRegistryBuilder`]; the built [`StageRegistry`] is
//! immutable and can be shared freely across threads.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use super::builtin::{
    FailStageFactory, LogSinkFactory, NullSinkFactory, PassthroughFactory, StaticSourceFactory,
};
use super::StageFactory;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipeline::{StageDescriptor, StageKind};

type StageKey = (StageKind, String);

static GLOBAL_REGISTRY: OnceLock<Arc<StageRegistry>> = OnceLock::new();

/// Collects stage registrations before the registry is frozen
#[derive(Default)]
pub struct StageRegistryBuilder {
    factories: BTreeMap<StageKey, Arc<dyn StageFactory>>,
}

impl StageRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `(kind, name)`
    pub fn register<F>(&mut self, kind: StageKind, name: &str, factory: F) -> PipeflowResult<&mut Self>
    where
        F: StageFactory + 'static,
    {
        let key = (kind, name.to_string());
        if self.factories.contains_key(&key) {
            return Err(PipeflowError::DuplicateStage {
                kind,
                stage_type: name.to_string(),
            });
        }

        self.factories.insert(key, Arc::new(factory));
        Ok(self)
    }

    /// Register the generic stages shipped with pipeflow
    pub fn with_builtins(mut self) -> PipeflowResult<Self> {
        self.register(StageKind::Source, "static", StaticSourceFactory)?
            .register(StageKind::Processor, "passthrough", PassthroughFactory)?
            .register(StageKind::Processor, "fail", FailStageFactory)?
            .register(StageKind::Sink, "log", LogSinkFactory)?
            .register(StageKind::Sink, "null", NullSinkFactory)?;
        Ok(self)
    }

    /// Freeze the registrations
    pub fn build(self) -> StageRegistry {
        StageRegistry {
            factories: self.factories,
        }
    }
}

/// Immutable lookup table of stage factories
pub struct StageRegistry {
    factories: BTreeMap<StageKey, Arc<dyn StageFactory>>,
}

impl StageRegistry {
    /// Start collecting registrations
    pub fn builder() -> StageRegistryBuilder {
        StageRegistryBuilder::new()
    }

    /// A registry holding only the built-in stages
    pub fn with_builtins() -> PipeflowResult<Self> {
        Ok(Self::builder().with_builtins()?.build())
    }

    /// Resolve a factory by `(kind, name)`
    pub fn resolve(&self, kind: StageKind, name: &str) -> PipeflowResult<Arc<dyn StageFactory>> {
        self.factories
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| PipeflowError::UnknownStageType {
                kind,
                stage_type: name.to_string(),
            })
    }

    /// Resolve the factory for a declared stage
    pub fn resolve_for(&self, descriptor: &StageDescriptor) -> PipeflowResult<Arc<dyn StageFactory>> {
        self.resolve(descriptor.kind, &descriptor.stage_type)
            .map_err(|_| PipeflowError::UnknownStage {
                stage: descriptor.name.clone(),
                kind: descriptor.kind,
                stage_type: descriptor.stage_type.clone(),
            })
    }

    /// Whether `(kind, name)` is registered
    pub fn contains(&self, kind: StageKind, name: &str) -> bool {
        self.factories.contains_key(&(kind, name.to_string()))
    }

    /// Registered stage types, ordered by kind then name
    pub fn entries(&self) -> Vec<(StageKind, &str, &str)> {
        self.factories
            .iter()
            .map(|((kind, name), factory)| (*kind, name.as_str(), factory.description()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Make this registry the process-wide one
    ///
    /// May be called once per process; later calls fail and leave the
    /// installed registry untouched.
    pub fn install_global(self) -> PipeflowResult<Arc<StageRegistry>> {
        let registry = Arc::new(self);
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| PipeflowError::RegistryAlreadyInstalled)?;

        tracing::debug!(stages = registry.len(), "Installed global stage registry");
        Ok(registry)
    }

    /// The process-wide registry
    pub fn global() -> PipeflowResult<Arc<StageRegistry>> {
        GLOBAL_REGISTRY
            .get()
            .cloned()
            .ok_or(PipeflowError::RegistryNotInstalled)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageError;
    use crate::stages::Stage;

    fn reject(_: &StageDescriptor) -> Result<Box<dyn Stage>, StageError> {
        Err(StageError::failed("not runnable"))
    }

    #[test]
    fn test_resolve_by_kind_and_name() {
        let registry = StageRegistry::with_builtins().unwrap();

        assert!(registry.resolve(StageKind::Source, "static").is_ok());
        assert!(registry.contains(StageKind::Sink, "log"));
        // Same name, different kind
        match registry.resolve(StageKind::Sink, "static") {
            Err(err @ PipeflowError::UnknownStageType { .. }) => {
                assert_eq!(err.to_string(), "No sink stage type named 'static' is registered");
            }
            other => panic!("expected UnknownStageType, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolve_for_names_the_stage() {
        let registry = StageRegistry::with_builtins().unwrap();
        let descriptor = StageDescriptor::new(StageKind::Source, "redshift", "warehouse");

        match registry.resolve_for(&descriptor) {
            Err(PipeflowError::UnknownStage { stage, stage_type, .. }) => {
                assert_eq!(stage, "warehouse");
                assert_eq!(stage_type, "redshift");
            }
            other => panic!("expected UnknownStage, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut builder = StageRegistry::builder();
        builder.register(StageKind::Processor, "custom", reject).unwrap();

        let result = builder.register(StageKind::Processor, "custom", reject);
        assert!(matches!(result, Err(PipeflowError::DuplicateStage { .. })));

        // Same name under another kind is a separate entry
        assert!(builder.register(StageKind::Sink, "custom", reject).is_ok());
        assert_eq!(builder.build().len(), 2);
    }

    #[test]
    fn test_entries_sorted_by_kind() {
        let registry = StageRegistry::with_builtins().unwrap();
        let kinds: Vec<_> = registry.entries().iter().map(|(k, _, _)| *k).collect();

        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_global_install_once() {
        let first = StageRegistry::with_builtins().unwrap().install_global();
        assert!(first.is_ok());
        assert_eq!(StageRegistry::global().unwrap().len(), 5);

        let second = StageRegistry::builder().build().install_global();
        assert!(matches!(second, Err(PipeflowError::RegistryAlreadyInstalled)));
        assert_eq!(StageRegistry::global().unwrap().len(), 5);
    }
}
