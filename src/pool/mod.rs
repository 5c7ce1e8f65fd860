mod registry;

pub use registry::{connection_key, ConnectionRegistry};
