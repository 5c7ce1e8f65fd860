//! MongoDB Gateway Library
//!
//! Exposes schema-less MongoDB databases as named services with schema and
//! table resources. Field structure is inferred from sampled documents and
//! cached per service.

pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod pool;
pub mod registry;
pub mod schema;
pub mod service;
