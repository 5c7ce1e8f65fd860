//! Service Registry
//!
//! On-disk state owned by the gateway rather than by the databases it fronts.
//!
//! Directory structure:
//! ```text
//! {data_dir}/{service}/
//!   ├── service.json   # Raw service settings
//!   └── extras.json    # Schema extras keyed by table name
//! ```

mod extras;
mod services;

pub use extras::{ExtrasStore, FileExtrasStore, MemoryExtrasStore};
pub use services::{ServiceRecord, ServiceStore};

/// Service names double as directory names and registry keys
pub fn is_valid_service_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_service_name() {
        assert!(is_valid_service_name("mongo"));
        assert!(is_valid_service_name("mongo-reporting_2"));

        assert!(!is_valid_service_name(""));
        assert!(!is_valid_service_name("mongo db"));
        assert!(!is_valid_service_name("../mongo"));
        assert!(!is_valid_service_name("service.mongo"));
    }
}
