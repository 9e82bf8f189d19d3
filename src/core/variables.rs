//! Variable store and template substitution
//!
//! Two placeholder syntaxes coexist in workflow documents:
//!
//! - `{name}` refers to a variable captured earlier in the same execution
//!   (or seeded by the caller) and is resolved by [`VariableStore::substitute`].
//! - `{{param}}` refers to a dynamic parameter supplied once at execution
//!   start and is resolved by [`substitute_dynamic`].
//!
//! Both fail loudly on unknown names: a half-rendered command must never
//! reach a live device.

use crate::core::error::{EngineError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

fn variable_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // The first alternative swallows `{{...}}` so its inner `{...}` is never
    // treated as a variable reference.
    TOKEN.get_or_init(|| {
        Regex::new(r"\{\{[^{}]*\}\}|\{([A-Za-z_][A-Za-z0-9_.\-]*)\}")
            .expect("variable token regex is valid")
    })
}

fn template_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    // Group 1 is a `{{param}}` name, group 2 a `{name}` variable.
    // Other `{{...}}` tokens are matched only to be copied verbatim.
    TOKEN.get_or_init(|| {
        Regex::new(
            r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}|\{\{[^{}]*\}\}|\{([A-Za-z_][A-Za-z0-9_.\-]*)\}",
        )
        .expect("template token regex is valid")
    })
}

fn dynamic_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}")
            .expect("dynamic token regex is valid")
    })
}

/// Replace every placeholder matched by `token` using `lookup`.
///
/// Matches without a first capture group are copied verbatim.
fn render<F>(template: &str, token: &Regex, mut lookup: F) -> std::result::Result<String, String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in token.captures_iter(template) {
        let whole = caps.get_match();
        rendered.push_str(&template[last..whole.start()]);

        match name_of(&caps) {
            Some(name) => match lookup(name) {
                Some(value) => rendered.push_str(&value),
                None => return Err(name.to_string()),
            },
            None => rendered.push_str(whole.as_str()),
        }

        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn name_of<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.get(1).map(|m| m.as_str())
}

/// Resolve `{{param}}` tokens from the caller-supplied dynamic parameters
pub fn substitute_dynamic(template: &str, params: &HashMap<String, String>) -> Result<String> {
    render(template, dynamic_token(), |name| params.get(name).cloned()).map_err(|name| {
        EngineError::Configuration(format!(
            "dynamic parameter '{}' referenced by '{}' was not supplied",
            name, template
        ))
    })
}

/// Resolve `{{param}}` and `{name}` tokens of `template` in one pass.
///
/// Values are inserted verbatim and never rescanned, so a parameter whose
/// value contains braces cannot pull in a variable. With `params` set to
/// `None` dynamic tokens are left as they are.
pub fn render_template(
    template: &str,
    params: Option<&HashMap<String, String>>,
    variables: &VariableStore,
) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in template_token().captures_iter(template) {
        let whole = caps.get_match();
        rendered.push_str(&template[last..whole.start()]);
        last = whole.end();

        if let (Some(name), Some(params)) = (caps.get(1), params) {
            let value = params.get(name.as_str()).ok_or_else(|| {
                EngineError::Configuration(format!(
                    "dynamic parameter '{}' referenced by '{}' was not supplied",
                    name.as_str(),
                    template
                ))
            })?;
            rendered.push_str(value);
        } else if let Some(name) = caps.get(2) {
            let value = variables.values.get(name.as_str()).ok_or_else(|| {
                EngineError::UnresolvedVariable {
                    name: name.as_str().to_string(),
                    template: template.to_string(),
                }
            })?;
            rendered.push_str(value);
        } else {
            rendered.push_str(whole.as_str());
        }
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Whether a template still carries `{{param}}` tokens
pub fn has_dynamic_tokens(template: &str) -> bool {
    dynamic_token().is_match(template)
}

/// Whether a template carries `{name}` variable references
pub fn has_variable_references(template: &str) -> bool {
    variable_token()
        .captures_iter(template)
        .any(|caps| caps.get(1).is_some())
}

/// Named string values visible to every later step of one execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableStore {
    values: HashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a variable, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get a variable
    pub fn get(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| EngineError::VariableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every `{name}` reference with its current value
    pub fn substitute(&self, template: &str) -> Result<String> {
        render(template, variable_token(), |name| self.values.get(name).cloned()).map_err(
            |name| EngineError::UnresolvedVariable {
                name,
                template: template.to_string(),
            },
        )
    }

    /// Sorted copy of all values
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
