use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

// --- Environment Definition ---

#[derive(Debug, Default)]
pub struct Environment {
    // Use Rc<RefCell<...>> to allow shared ownership and interior mutability.
    // Needed for closures capturing environments and for top-level `def`.
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Value>, // Maps variable names to values
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Binds `name` in the *current* frame, replacing any binding already
    /// in this frame. Outer frames are never touched.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Looks up a variable's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value.clone()),
            None => self
                .outer
                .as_ref()
                .and_then(|outer_env_ptr| outer_env_ptr.borrow().get(name)),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
            || self
                .outer
                .as_ref()
                .is_some_and(|outer_env_ptr| outer_env_ptr.borrow().has(name))
    }

    /// Gets every identifier visible from this environment
    pub fn get_identifiers(&self) -> HashSet<String> {
        let mut identifiers: HashSet<String> = self.bindings.keys().cloned().collect();
        if let Some(outer_env_ptr) = &self.outer {
            identifiers.extend(outer_env_ptr.borrow().get_identifiers());
        }
        identifiers
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_set_and_get_global() {
        let env = Environment::new();
        env.borrow_mut().set("x", num(10.0));

        assert_eq!(env.borrow().get("x"), Some(num(10.0)));
        assert!(env.borrow().has("x"));
    }

    #[test]
    fn test_get_unbound_global() {
        let env = Environment::new();
        assert_eq!(env.borrow().get("y"), None);
        assert!(!env.borrow().has("y"));
    }

    #[test]
    fn test_set_overwrites_in_same_frame() {
        let env = Environment::new();
        env.borrow_mut().set("x", num(1.0));
        env.borrow_mut().set("x", num(2.0));
        assert_eq!(env.borrow().get("x"), Some(num(2.0)));
    }

    #[test]
    fn test_set_and_get_enclosed() {
        let global_env = Environment::new();
        global_env.borrow_mut().set("x", num(10.0)); // Define x globally

        let local_env = Environment::new_enclosed(global_env.clone());
        local_env.borrow_mut().set("y", num(20.0)); // Define y locally

        assert_eq!(local_env.borrow().get("y"), Some(num(20.0)));
        // Get global var x from local scope
        assert_eq!(local_env.borrow().get("x"), Some(num(10.0)));
        // Local bindings are invisible from the parent
        assert_eq!(global_env.borrow().get("y"), None);
        assert!(local_env.borrow().has("x"));
    }

    #[test]
    fn test_shadowing() {
        let global_env = Environment::new();
        global_env.borrow_mut().set("x", num(10.0));

        let local_env = Environment::new_enclosed(global_env.clone()); // Clone Rc for local
        local_env.borrow_mut().set("x", num(50.0)); // Shadow global x

        let inner_local_env = Environment::new_enclosed(local_env.clone()); // Clone Rc for inner local
        inner_local_env
            .borrow_mut()
            .set("y", Value::Keyword("y-value".into()));

        // Get x from inner local (should be 50.0 from local_env)
        assert_eq!(inner_local_env.borrow().get("x"), Some(num(50.0)));
        assert_eq!(
            inner_local_env.borrow().get("y"),
            Some(Value::Keyword("y-value".into()))
        );

        // Get x from global (should still be 10.0)
        assert_eq!(global_env.borrow().get("x"), Some(num(10.0)));
    }

    #[test]
    fn test_get_identifiers_walks_chain() {
        let global_env = Environment::new();
        global_env.borrow_mut().set("note", Value::Nil);
        let local_env = Environment::new_enclosed(global_env);
        local_env.borrow_mut().set("root", Value::Nil);

        let identifiers = local_env.borrow().get_identifiers();
        assert!(identifiers.contains("note"));
        assert!(identifiers.contains("root"));
        assert_eq!(identifiers.len(), 2);
    }
}
