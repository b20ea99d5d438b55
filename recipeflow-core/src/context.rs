//! ABOUTME: Shared execution context for recipe runs
//! ABOUTME: Typed artifact/config container with deep-clone and shallow-merge semantics

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// The single shared state of a recipe run.
///
/// Two logically separate maps: `artifacts` is the namespace steps read and
/// write; `config` holds process-wide static inputs (credentials, paths)
/// that templates may fall back to. Steps mutate the context in place, in
/// declaration order, within one executor invocation.
///
/// Cloning a context yields an independent deep copy: `Value` owns its
/// tree, so the derived clone shares no interior state with the original.
/// Loop iterations and parallel substeps run against such clones; their
/// writes never leak back.
///
/// # Examples
///
/// ```
/// use recipeflow_core::Context;
/// use serde_json::json;
///
/// let mut ctx = Context::new();
/// ctx.set("items", json!([1, 2, 3]));
///
/// let mut clone = ctx.clone();
/// clone.set("items", json!([]));
///
/// // The original is unaffected by the clone's write.
/// assert_eq!(ctx.get("items").unwrap(), &json!([1, 2, 3]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    artifacts: HashMap<String, Value>,
    config: HashMap<String, Value>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from initial artifacts and config maps.
    #[must_use]
    pub fn from_parts(artifacts: HashMap<String, Value>, config: HashMap<String, Value>) -> Self {
        Self { artifacts, config }
    }

    #[must_use]
    pub fn with_artifact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.artifacts.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Look up an artifact by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.artifacts.get(key)
    }

    /// Look up an artifact, falling back to `default` when absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.artifacts.get(key).cloned().unwrap_or(default)
    }

    /// Overwrite-assign an artifact.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(key = %key, "context set");
        self.artifacts.insert(key, value);
    }

    /// Remove an artifact, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.artifacts.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.artifacts.contains_key(key)
    }

    /// Shallow-merge `value` into the artifact at `key`.
    ///
    /// The merge table (the only merge policy; deep merge is not
    /// supported):
    ///
    /// | existing | new | result |
    /// |---|---|---|
    /// | string | string | concatenation |
    /// | sequence | sequence | append all |
    /// | sequence | non-sequence | append one |
    /// | mapping | mapping | shallow key-overwrite, new wins |
    /// | mismatched / other | any | `[existing, new]` |
    ///
    /// An absent key behaves as plain assignment.
    pub fn merge(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(key = %key, "context merge");
        match self.artifacts.remove(&key) {
            None => {
                self.artifacts.insert(key, value);
            }
            Some(existing) => {
                let merged = merge_values(existing, value);
                self.artifacts.insert(key, merged);
            }
        }
    }

    /// Artifact keys currently present.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.artifacts.keys().cloned().collect()
    }

    /// The full artifact map, for iteration-result diffing.
    #[must_use]
    pub fn artifacts(&self) -> &HashMap<String, Value> {
        &self.artifacts
    }

    /// The static config map.
    #[must_use]
    pub fn config(&self) -> &HashMap<String, Value> {
        &self.config
    }

    /// Read-only merged view for template rendering: config entries first,
    /// artifacts layered on top (artifacts win on collisions).
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut view = Map::new();
        for (k, v) in &self.config {
            view.insert(k.clone(), v.clone());
        }
        for (k, v) in &self.artifacts {
            view.insert(k.clone(), v.clone());
        }
        view
    }

    /// Resolve a dotted path (`"plan.phases.0.name"`) against artifacts,
    /// falling back to config for the head segment. Array segments must be
    /// unsigned indices.
    #[must_use]
    pub fn dotted_get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = self.artifacts.get(head).or_else(|| self.config.get(head))?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Apply the shallow-merge table to a pair of values.
#[must_use]
pub fn merge_values(existing: Value, new: Value) -> Value {
    match (existing, new) {
        (Value::String(a), Value::String(b)) => Value::String(a + &b),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Value::Array(a)
        }
        (Value::Array(mut a), b) => {
            a.push(b);
            Value::Array(a)
        }
        (Value::Object(mut a), Value::Object(b)) => {
            for (k, v) in b {
                a.insert(k, v);
            }
            Value::Object(a)
        }
        (a, b) => Value::Array(vec![a, b]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clone_is_independent() {
        let mut ctx = Context::new().with_artifact("nested", json!({"inner": [1, 2]}));
        let mut clone = ctx.clone();

        clone.set("nested", json!({"inner": []}));
        clone.set("extra", json!(true));

        assert_eq!(ctx.get("nested").unwrap(), &json!({"inner": [1, 2]}));
        assert!(!ctx.contains("extra"));

        // And the other direction.
        ctx.set("nested", json!(null));
        assert_eq!(clone.get("nested").unwrap(), &json!({"inner": []}));
    }

    #[test]
    fn test_merge_strings_concatenate() {
        let mut ctx = Context::new().with_artifact("log", json!("abc"));
        ctx.merge("log", json!("def"));
        assert_eq!(ctx.get("log").unwrap(), &json!("abcdef"));
    }

    #[test]
    fn test_merge_lists_append_all() {
        let mut ctx = Context::new().with_artifact("items", json!([1, 2]));
        ctx.merge("items", json!([3, 4, 5]));

        let merged = ctx.get("items").unwrap().as_array().unwrap();
        // Result length is the sum of the input lengths.
        assert_eq!(merged.len(), 5);
        assert_eq!(merged, &vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    }

    #[test]
    fn test_merge_list_with_scalar_appends_one() {
        let mut ctx = Context::new().with_artifact("items", json!(["a"]));
        ctx.merge("items", json!("b"));
        assert_eq!(ctx.get("items").unwrap(), &json!(["a", "b"]));
    }

    #[test]
    fn test_merge_maps_shallow_new_wins() {
        let mut ctx = Context::new().with_artifact("conf", json!({"a": 1, "b": 1}));
        ctx.merge("conf", json!({"b": 2, "c": 3}));

        let merged = ctx.get("conf").unwrap().as_object().unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["a"], json!(1));
        assert_eq!(merged["b"], json!(2));
        assert_eq!(merged["c"], json!(3));
    }

    #[test]
    fn test_merge_mismatched_pairs_into_list() {
        let mut ctx = Context::new().with_artifact("x", json!(42));
        ctx.merge("x", json!("answer"));
        assert_eq!(ctx.get("x").unwrap(), &json!([42, "answer"]));
    }

    #[test]
    fn test_merge_absent_key_assigns() {
        let mut ctx = Context::new();
        ctx.merge("fresh", json!({"a": 1}));
        assert_eq!(ctx.get("fresh").unwrap(), &json!({"a": 1}));
    }

    #[test]
    fn test_snapshot_artifacts_shadow_config() {
        let ctx = Context::new()
            .with_config("root", json!("/etc"))
            .with_config("mode", json!("fast"))
            .with_artifact("mode", json!("thorough"));

        let view = ctx.snapshot();
        assert_eq!(view["root"], json!("/etc"));
        assert_eq!(view["mode"], json!("thorough"));
    }

    #[test]
    fn test_dotted_get_traverses_objects_and_arrays() {
        let ctx = Context::new().with_artifact(
            "plan",
            json!({"phases": [{"name": "gen"}, {"name": "review"}]}),
        );

        assert_eq!(ctx.dotted_get("plan.phases.1.name").unwrap(), &json!("review"));
        assert!(ctx.dotted_get("plan.phases.9.name").is_none());
        assert!(ctx.dotted_get("plan.missing").is_none());
    }

    #[test]
    fn test_dotted_get_falls_back_to_config() {
        let ctx = Context::new().with_config("paths", json!({"out": "gen"}));
        assert_eq!(ctx.dotted_get("paths.out").unwrap(), &json!("gen"));
    }
}
