mod cache;
mod descriptor;
mod inference;
mod resolver;

pub use cache::{MemoryTableCache, TableCache, TableSet};
pub use descriptor::{labelize, pluralize, FieldDescriptor, FieldExtras, SchemaDescriptor, TableExtras};
pub use inference::{bson_type_name, infer_fields, InferredField, InferredSchema};
pub use resolver::{SchemaFilter, SchemaResolver, TableNames};
