use crate::schema::inference::InferredSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Human-authored metadata for one field
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Overrides the inferred type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
}

/// Human-authored metadata for one table, stored outside the database
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TableExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldExtras>,
}

impl TableExtras {
    /// Extras for a field, by exact name first, then case-insensitively
    pub fn field(&self, name: &str) -> Option<&FieldExtras> {
        self.fields.get(name).or_else(|| {
            self.fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, extras)| extras)
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub db_type: String,
    pub observed_types: Vec<String>,
    pub occurrences: u64,
    pub required: bool,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchemaDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub label: String,
    pub plural: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub sampled_documents: u64,
}

impl SchemaDescriptor {
    /// Build a descriptor from live structure, layering stored extras on top.
    ///
    /// Extras win attribute by attribute. Extras for fields the live store
    /// does not have are dropped.
    pub fn build(name: &str, inferred: InferredSchema, extras: Option<&TableExtras>) -> Self {
        let fields = inferred
            .fields
            .into_iter()
            .map(|field| {
                let field_extras = extras.and_then(|e| e.field(&field.name));
                let db_type = field.db_type();
                let overrides = field_extras.cloned().unwrap_or_default();

                FieldDescriptor {
                    label: overrides.label.unwrap_or_else(|| labelize(&field.name)),
                    alias: overrides.alias,
                    description: overrides.description,
                    db_type: overrides.db_type.unwrap_or(db_type),
                    is_primary_key: field.name == "_id",
                    required: field.required || field.name == "_id",
                    observed_types: field.observed_types,
                    occurrences: field.occurrences,
                    name: field.name,
                }
            })
            .collect();

        let extras = extras.cloned().unwrap_or_default();
        let label = extras.label.unwrap_or_else(|| labelize(name));
        let plural = extras.plural.unwrap_or_else(|| pluralize(&label));

        SchemaDescriptor {
            name: name.to_string(),
            alias: extras.alias.filter(|a| !a.is_empty()),
            label,
            plural,
            description: extras.description,
            fields,
            sampled_documents: inferred.sampled_documents,
        }
    }

    /// Alias when asked for and set, otherwise the collection name
    pub fn name(&self, use_alias: bool) -> &str {
        match (&self.alias, use_alias) {
            (Some(alias), true) => alias,
            _ => &self.name,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

/// `order_items` -> `Order Items`
pub fn labelize(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collections are usually named in the plural already, so a label ending
/// in "s" is kept as is.
pub fn pluralize(label: &str) -> String {
    let lower = label.to_lowercase();
    if lower.ends_with('s') {
        label.to_string()
    } else if lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", label)
    } else if lower.ends_with('y')
        && !matches!(lower.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'))
    {
        format!("{}ies", &label[..label.len() - 1])
    } else {
        format!("{}s", label)
    }
}
