//! Field inference for schema-less collections
//!
//! Structure comes from two places: a `$jsonSchema` validator attached to the
//! collection (declared fields, types, `required`) and a sample of documents
//! (observed fields and their BSON types). Only top-level fields are reported.

use bson::{Bson, Document};
use std::collections::HashMap;

/// One field seen in a collection
#[derive(Debug, Clone, PartialEq)]
pub struct InferredField {
    pub name: String,
    /// Type declared by the validator, if any
    pub declared_type: Option<String>,
    /// Distinct BSON types observed in samples, in first-seen order
    pub observed_types: Vec<String>,
    /// Number of sampled documents containing the field
    pub occurrences: u64,
    pub required: bool,
}

impl InferredField {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declared_type: None,
            observed_types: Vec::new(),
            occurrences: 0,
            required: false,
        }
    }

    /// Declared type, else the single non-null observed type, else `mixed`
    pub fn db_type(&self) -> String {
        if let Some(declared) = &self.declared_type {
            return declared.clone();
        }

        let non_null: Vec<&String> = self.observed_types.iter().filter(|t| *t != "null").collect();
        match non_null.as_slice() {
            [] if self.observed_types.is_empty() => "mixed".to_string(),
            [] => "null".to_string(),
            [only] => (*only).clone(),
            _ => "mixed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferredSchema {
    pub fields: Vec<InferredField>,
    pub sampled_documents: u64,
}

impl InferredSchema {
    pub fn field(&self, name: &str) -> Option<&InferredField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Default)]
struct FieldCollector {
    order: Vec<String>,
    fields: HashMap<String, InferredField>,
}

impl FieldCollector {
    fn entry(&mut self, name: &str) -> &mut InferredField {
        if !self.fields.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.fields
            .entry(name.to_string())
            .or_insert_with(|| InferredField::new(name))
    }

    fn finish(mut self, sampled_documents: u64) -> InferredSchema {
        // `_id` leads, everything else keeps first-seen order
        if let Some(pos) = self.order.iter().position(|n| n == "_id") {
            let id = self.order.remove(pos);
            self.order.insert(0, id);
        }

        let fields = self
            .order
            .iter()
            .filter_map(|name| self.fields.remove(name))
            .collect();

        InferredSchema {
            fields,
            sampled_documents,
        }
    }
}

pub fn infer_fields(json_schema: Option<&Document>, samples: &[Document]) -> InferredSchema {
    let mut collector = FieldCollector::default();

    if let Some(schema) = json_schema {
        collect_declared_fields(schema, &mut collector);
    }

    for doc in samples {
        for (key, value) in doc {
            let field = collector.entry(key);
            field.occurrences += 1;
            let type_name = bson_type_name(value);
            if !field.observed_types.iter().any(|t| t == type_name) {
                field.observed_types.push(type_name.to_string());
            }
        }
    }

    collector.finish(samples.len() as u64)
}

fn collect_declared_fields(schema: &Document, collector: &mut FieldCollector) {
    if let Ok(properties) = schema.get_document("properties") {
        for (name, spec) in properties {
            let declared = spec.as_document().and_then(declared_type);
            collector.entry(name).declared_type = declared;
        }
    }

    if let Ok(required) = schema.get_array("required") {
        for name in required.iter().filter_map(Bson::as_str) {
            collector.entry(name).required = true;
        }
    }
}

/// `bsonType` (or JSON `type`) of a property; a list of types is joined with `|`
fn declared_type(spec: &Document) -> Option<String> {
    let value = spec.get("bsonType").or_else(|| spec.get("type"))?;
    match value {
        Bson::String(s) => Some(s.clone()),
        Bson::Array(types) => {
            let names: Vec<&str> = types.iter().filter_map(Bson::as_str).collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join("|"))
            }
        }
        _ => None,
    }
}

/// MongoDB `$type` alias for a value
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null | Bson::Undefined => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}
