use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    Global,
    Local,
}

impl VariableScope {
    /// Anything other than `local` means global.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("local") {
            VariableScope::Local
        } else {
            VariableScope::Global
        }
    }
}

/// Persisted variable shape shared with the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: String,
    pub scope: VariableScope,
}

/// Global bindings plus per-script locals keyed by script id.
#[derive(Debug, Default)]
pub struct VariableStore {
    globals: IndexMap<String, Value>,
    locals: HashMap<String, IndexMap<String, Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local binding of `script_id` first, then the global one.
    pub fn get(&self, script_id: &str, name: &str) -> Option<&Value> {
        self.locals
            .get(script_id)
            .and_then(|locals| locals.get(name))
            .or_else(|| self.globals.get(name))
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn set_local(&mut self, script_id: &str, name: impl Into<String>, value: Value) {
        self.locals
            .entry(script_id.to_string())
            .or_default()
            .insert(name.into(), value);
    }

    /// Writes where the name is already bound (local first), else globally.
    pub fn assign(&mut self, script_id: &str, name: &str, value: Value) {
        if let Some(slot) = self
            .locals
            .get_mut(script_id)
            .and_then(|locals| locals.get_mut(name))
        {
            *slot = value;
        } else {
            self.set_global(name, value);
        }
    }

    pub fn update_globals(&mut self, values: impl IntoIterator<Item = (String, Value)>) {
        self.globals.extend(values);
    }

    pub fn clear_locals(&mut self, script_id: &str) {
        self.locals.remove(script_id);
    }

    /// Globals in insertion order followed by every script's locals.
    pub fn snapshot(&self) -> Vec<Variable> {
        let globals = self
            .globals
            .iter()
            .map(|(name, value)| persisted(name, value, VariableScope::Global));
        let mut script_ids: Vec<&String> = self.locals.keys().collect();
        script_ids.sort();
        let locals = script_ids
            .into_iter()
            .flat_map(|id| self.locals[id].iter())
            .map(|(name, value)| persisted(name, value, VariableScope::Local));
        globals.chain(locals).collect()
    }
}

fn persisted(name: &str, value: &Value, scope: VariableScope) -> Variable {
    Variable {
        name: name.to_string(),
        value: value.clone(),
        value_type: value.type_name().to_string(),
        scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locals_shadow_globals_per_script() {
        let mut store = VariableStore::new();
        store.set_global("score", Value::Number(1.0));
        store.set_local("a", "score", Value::Number(5.0));
        assert_eq!(store.get("a", "score"), Some(&Value::Number(5.0)));
        assert_eq!(store.get("b", "score"), Some(&Value::Number(1.0)));
        store.clear_locals("a");
        assert_eq!(store.get("a", "score"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn assign_prefers_existing_local() {
        let mut store = VariableStore::new();
        store.set_local("a", "i", Value::Number(0.0));
        store.assign("a", "i", Value::Number(2.0));
        store.assign("a", "fresh", Value::Bool(true));
        assert_eq!(store.get("a", "i"), Some(&Value::Number(2.0)));
        assert!(store.global("i").is_none());
        assert_eq!(store.global("fresh"), Some(&Value::Bool(true)));
    }

    #[test]
    fn snapshot_uses_persisted_shape() {
        let mut store = VariableStore::new();
        store.update_globals([("name".to_string(), Value::from("Ada"))]);
        store.set_local("s", "flag", Value::Bool(true));
        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(
            json,
            json!([
                {"name": "name", "value": "Ada", "type": "string", "scope": "global"},
                {"name": "flag", "value": true, "type": "boolean", "scope": "local"}
            ])
        );
    }
}
