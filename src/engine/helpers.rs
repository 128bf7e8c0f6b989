//! Template helper registry.
//!
//! Helpers are named functions callable from templates. A unit's helpers
//! are produced by merging several sources left to right, later sources
//! overriding earlier ones by name:
//!
//! built-in URL helpers < engine globals < mailer globals < per-template

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use minijinja::value::{Rest, Value};
use minijinja::Error;

/// Signature of a helper function
pub type HelperFn = dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync;

/// Ordered name → helper mapping
#[derive(Clone, Default)]
pub struct Helpers {
    entries: BTreeMap<String, Arc<HelperFn>>,
}

impl Helpers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<F>(mut self, name: &str, helper: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.insert(name, helper);
        self
    }

    /// Add or replace a helper
    pub fn insert<F>(&mut self, name: &str, helper: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.entries.insert(name.to_string(), Arc::new(helper));
    }

    /// Copy every helper from `other`, replacing same-named entries
    pub fn extend(&mut self, other: &Helpers) {
        for (name, helper) in &other.entries {
            self.entries.insert(name.clone(), helper.clone());
        }
    }

    /// Merge helper sources from lowest to highest precedence
    pub fn merge(layers: &[&Helpers]) -> Helpers {
        let mut merged = Helpers::new();
        for layer in layers {
            merged.extend(layer);
        }
        merged
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Invoke a helper directly, outside of any template
    pub fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value, Error>> {
        self.entries.get(name).map(|helper| helper(args))
    }

    /// Helpers as template values, ready to be placed into a render context
    pub(crate) fn to_values(&self) -> impl Iterator<Item = (String, Value)> + '_ {
        self.entries.iter().map(|(name, helper)| {
            let helper = helper.clone();
            let value = Value::from_function(move |args: Rest<Value>| helper(&args.0));
            (name.clone(), value)
        })
    }
}

impl fmt::Debug for Helpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
