//! Parameter bindings for query and mutation templates.

use crate::ast::Operand;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use tarn_core::{Error, Result, Value};

/// Values for the named parameter slots of one invocation.
///
/// Names are stored without the `@` prefix; a leading `@` is accepted and
/// stripped, so `"@completed"` and `"completed"` name the same slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Binding {
    values: BTreeMap<String, Value>,
}

fn slot_name(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

impl Binding {
    /// Creates an empty binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(slot_name(name).into(), value.into());
    }

    /// Gets a parameter value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(slot_name(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Verifies the binding supplies exactly the declared slots.
    ///
    /// A bound name that is not declared, or a declared slot with no value,
    /// fails with `Binding`.
    pub fn check(&self, params: &BTreeSet<String>) -> Result<()> {
        if let Some(extra) = self.values.keys().find(|k| !params.contains(*k)) {
            return Err(Error::binding(extra.as_str(), "not a parameter of this statement"));
        }
        if let Some(missing) = params.iter().find(|p| !self.values.contains_key(*p)) {
            return Err(Error::binding(missing.as_str(), "no value bound"));
        }
        Ok(())
    }

    /// Resolves an operand to a value.
    pub fn resolve(&self, operand: &Operand) -> Result<Value> {
        match operand {
            Operand::Literal(v) => Ok(v.clone()),
            Operand::Param(name) => self
                .get(name)
                .cloned()
                .ok_or_else(|| Error::binding(name.as_str(), "no value bound")),
        }
    }
}

impl<'a, V: Into<Value>> FromIterator<(&'a str, V)> for Binding {
    fn from_iter<I: IntoIterator<Item = (&'a str, V)>>(iter: I) -> Self {
        let mut binding = Binding::new();
        for (name, value) in iter {
            binding.set(name, value);
        }
        binding
    }
}
