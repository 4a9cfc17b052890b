//! Per-invocation bindings
//!
//! A [`BindingSet`] is built fresh for every invocation from the host's live context
//! and moved into the worker that evaluates the script, so no two invocations ever
//! share one.

use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// The canonical names under which host values are exposed to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingName {
    Params,
    Doc,
    Ctx,
    Score,
}

impl BindingName {
    pub const ALL: [BindingName; 4] = [
        BindingName::Params,
        BindingName::Doc,
        BindingName::Ctx,
        BindingName::Score,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BindingName::Params => "params",
            BindingName::Doc => "doc",
            BindingName::Ctx => "ctx",
            BindingName::Score => "_score",
        }
    }
}

impl fmt::Display for BindingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered mapping from binding name to host value. Absent names are not bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingSet {
    entries: Vec<(BindingName, JsonValue)>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(self, params: Map<String, JsonValue>) -> Self {
        self.with(BindingName::Params, JsonValue::Object(params))
    }

    pub fn with_doc(self, doc: Map<String, JsonValue>) -> Self {
        self.with(BindingName::Doc, JsonValue::Object(doc))
    }

    pub fn with_ctx(self, ctx: Map<String, JsonValue>) -> Self {
        self.with(BindingName::Ctx, JsonValue::Object(ctx))
    }

    pub fn with_score(self, score: f64) -> Self {
        self.with(BindingName::Score, JsonValue::from(score))
    }

    /// Bind `name`, replacing any earlier value while keeping its position
    pub fn with(mut self, name: BindingName, value: JsonValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: BindingName, value: JsonValue) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: BindingName) -> Option<&JsonValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: BindingName) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingName, &JsonValue)> {
        self.entries.iter().map(|(name, value)| (*name, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insertion_order_and_replacement() {
        let mut params = Map::new();
        params.insert("a".into(), json!(1));
        let bindings = BindingSet::new()
            .with_score(1.0)
            .with_params(params)
            .with_score(2.5);

        let names: Vec<&str> = bindings.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["_score", "params"]);
        assert_eq!(bindings.get(BindingName::Score), Some(&json!(2.5)));
        assert!(!bindings.contains(BindingName::Doc));
        assert_eq!(bindings.len(), 2);
    }
}
