//! Script execution context
//!
//! An [`Event`] is the context a trigger runs in: the event name, the
//! values the host attached (keyed by value class), local variables and a
//! handle to the shared global variable store.

use crate::value::Value;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Global variable store shared by every event
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl Variables {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(&name.to_lowercase()).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.values.write().insert(name.to_lowercase(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.values.write().remove(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }

    /// Entries of the list variable `prefix::*`, in index order
    pub fn list(&self, prefix: &str) -> Vec<(String, Value)> {
        list_entries(&self.values.read(), prefix)
    }

    pub fn remove_list(&self, prefix: &str) {
        let prefix = list_prefix(prefix);
        self.values.write().retain(|key, _| !key.starts_with(&prefix));
    }
}

fn list_prefix(name: &str) -> String {
    format!("{}::", name.to_lowercase())
}

/// Indices sort numerically when both are numbers, textually otherwise
fn list_entries(values: &HashMap<String, Value>, name: &str) -> Vec<(String, Value)> {
    let prefix = list_prefix(name);
    let mut entries: Vec<(String, Value)> = values
        .iter()
        .filter_map(|(key, value)| {
            let index = key.strip_prefix(&prefix)?;
            (!index.contains("::")).then(|| (index.to_string(), value.clone()))
        })
        .collect();
    entries.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    });
    entries
}

/// Execution context of a single trigger run.
///
/// Not `Sync`: one event is evaluated on one thread at a time.
#[derive(Debug)]
pub struct Event {
    name: String,
    values: HashMap<TypeId, Value>,
    locals: RefCell<HashMap<String, Value>>,
    globals: Variables,
    output: RefCell<Vec<String>>,
}

impl Event {
    /// Create a new event with its own global store
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_globals(name, Variables::new())
    }

    /// Create a new event sharing an existing global store
    pub fn with_globals(name: impl Into<String>, globals: Variables) -> Self {
        Self {
            name: name.into().to_lowercase(),
            values: HashMap::new(),
            locals: RefCell::new(HashMap::new()),
            globals,
            output: RefCell::new(Vec::new()),
        }
    }

    /// Attach an event value (e.g. the player of a join event)
    pub fn with_value<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.insert(TypeId::of::<T>(), Value::new(value));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event value of the given value class
    pub fn value_of(&self, type_id: TypeId) -> Option<Value> {
        self.values.get(&type_id).cloned()
    }

    pub fn local(&self, name: &str) -> Option<Value> {
        self.locals.borrow().get(&name.to_lowercase()).cloned()
    }

    pub fn set_local(&self, name: &str, value: Value) {
        self.locals.borrow_mut().insert(name.to_lowercase(), value);
    }

    pub fn remove_local(&self, name: &str) -> Option<Value> {
        self.locals.borrow_mut().remove(&name.to_lowercase())
    }

    pub fn local_list(&self, prefix: &str) -> Vec<(String, Value)> {
        list_entries(&self.locals.borrow(), prefix)
    }

    pub fn remove_local_list(&self, prefix: &str) {
        let prefix = list_prefix(prefix);
        self.locals.borrow_mut().retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn globals(&self) -> &Variables {
        &self.globals
    }

    /// Record a message produced by the script (e.g. by `broadcast`)
    pub fn emit(&self, message: String) {
        tracing::info!(target: "skript::output", event = %self.name, "{}", message);
        self.output.borrow_mut().push(message);
    }

    /// Messages emitted so far, draining them
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_shared_between_events() {
        let globals = Variables::new();
        let first = Event::with_globals("join", globals.clone());
        first.globals().set("Total", Value::new(3i64));

        let second = Event::with_globals("quit", globals);
        let total = second.globals().get("total").unwrap();
        assert_eq!(total.downcast_ref::<i64>(), Some(&3));
    }

    #[test]
    fn test_locals_are_per_event() {
        let globals = Variables::new();
        let first = Event::with_globals("join", globals.clone());
        first.set_local("x", Value::new(true));

        let second = Event::with_globals("join", globals);
        assert!(first.local("x").is_some());
        assert!(second.local("x").is_none());
    }

    #[test]
    fn test_event_values() {
        let event = Event::new("Join").with_value(String::from("Notch"));
        assert_eq!(event.name(), "join");
        let player = event.value_of(TypeId::of::<String>()).unwrap();
        assert_eq!(player.downcast_ref::<String>().map(String::as_str), Some("Notch"));
        assert!(event.value_of(TypeId::of::<i64>()).is_none());
    }

    #[test]
    fn test_list_variables() {
        let vars = Variables::new();
        for (index, name) in [(10, "c"), (2, "b"), (1, "a")] {
            vars.set(&format!("Names::{}", index), Value::new(name.to_string()));
        }
        vars.set("names::sub::1", Value::new(0i64));
        vars.set("namesake", Value::new(0i64));

        let indices: Vec<_> = vars.list("names").into_iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec!["1", "2", "10"]);

        vars.remove_list("names");
        assert_eq!(vars.len(), 1);
        assert!(vars.get("namesake").is_some());

        let event = Event::new("load");
        event.set_local("x::1", Value::new(1i64));
        assert_eq!(event.local_list("x").len(), 1);
        event.remove_local_list("x");
        assert!(event.local_list("x").is_empty());
    }

    #[test]
    fn test_output_drains() {
        let event = Event::new("load");
        event.emit("hello".into());
        assert_eq!(event.take_output(), vec!["hello".to_string()]);
        assert!(event.take_output().is_empty());
    }
}
