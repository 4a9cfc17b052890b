//! Extension point registry
//!
//! A static map from context name to factory constructor, filled once at startup and
//! read-only afterwards.

use crate::contexts::{
    CompiledHandle, FieldContext, IngestContext, ScoreContext, ScriptContext, SearchContext,
    TemplateContext,
};
use std::any::Any;
use std::collections::BTreeMap;

/// A factory erased to `Any`; [`ContextRegistry::create`] callers downcast it back
pub type AnyFactory = Box<dyn Any + Send + Sync>;

type FactoryFn = fn(CompiledHandle) -> AnyFactory;

#[derive(Default)]
pub struct ContextRegistry {
    factories: BTreeMap<&'static str, FactoryFn>,
}

impl ContextRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extension point
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<FieldContext>();
        registry.register::<ScoreContext>();
        registry.register::<TemplateContext>();
        registry.register::<IngestContext>();
        registry.register::<SearchContext>();
        registry
    }

    pub fn register<C: ScriptContext>(&mut self) {
        self.factories
            .insert(C::NAME, |handle| -> AnyFactory { Box::new(C::new_factory(handle)) });
    }

    pub fn contains(&self, context: &str) -> bool {
        self.factories.contains_key(context)
    }

    /// Registered context names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// The static name a context is registered under
    pub fn resolve(&self, context: &str) -> Option<&'static str> {
        self.factories.get_key_value(context).map(|(name, _)| *name)
    }

    pub fn create(&self, context: &str, handle: CompiledHandle) -> Option<AnyFactory> {
        self.factories.get(context).map(|factory| factory(handle))
    }
}
