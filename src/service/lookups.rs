//! Lookup substitution
//!
//! Replaces `{name}` tokens inside raw service configuration strings with
//! values registered for the process. Unknown tokens are left as written.

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;

const ENV_PREFIX: &str = "LOOKUP_";

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").expect("valid lookup pattern"))
}

#[derive(Debug, Clone, Default)]
pub struct Lookups {
    values: HashMap<String, String>,
}

impl Lookups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `LOOKUP_<NAME>` environment variables; `<NAME>` is matched
    /// case-insensitively against tokens.
    pub fn from_env() -> Self {
        let mut lookups = Self::new();
        for (key, value) in env::vars() {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                if !name.is_empty() {
                    lookups.insert(name, value);
                }
            }
        }
        lookups
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_lowercase(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn replace_str(&self, input: &str) -> String {
        if self.values.is_empty() || !input.contains('{') {
            return input.to_string();
        }

        token_pattern()
            .replace_all(input, |caps: &Captures| {
                match self.values.get(&caps[1].to_lowercase()) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Walk a JSON tree and substitute lookups in every string, in place
    pub fn replace_in(&self, value: &mut Value) {
        match value {
            Value::String(s) => {
                let replaced = self.replace_str(s);
                if replaced != *s {
                    *s = replaced;
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.replace_in(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.replace_in(item)),
            _ => {}
        }
    }
}
