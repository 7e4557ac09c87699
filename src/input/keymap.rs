//! Key code to action lookup.

use std::collections::{BTreeMap, HashMap};

use crate::config::ButtonBinding;
use crate::error::ConfigError;

use super::Action;

/// Static key code table built from the button bindings.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    keys: HashMap<String, Action>,
}

impl KeyMap {
    /// Build the table. Bindings are expected to be validated already; an
    /// unknown action name is still reported rather than skipped.
    pub fn from_bindings(bindings: &BTreeMap<String, ButtonBinding>) -> Result<Self, ConfigError> {
        let mut keys = HashMap::new();
        for (name, binding) in bindings {
            let action = Action::parse(name)?;
            for key in &binding.keys {
                keys.insert(key.clone(), action.clone());
            }
        }
        Ok(Self { keys })
    }

    pub fn lookup(&self, code: &str) -> Option<&Action> {
        self.keys.get(code)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
