//! apiplan-core: schema graph, object store and test plan model
//!
//! This crate holds everything that does not touch the network: the schema
//! graph built from an API document, the schema-typed object store, the test
//! plan DSL, configuration, and dry-run validation.

pub mod config;
pub mod document;
pub mod dryrun;
pub mod error;
pub mod plan;
pub mod schema;
pub mod store;
pub mod tag;

pub use config::{Config, ConfigError, ParameterFill};
pub use document::{ApiDocument, DocumentError, Operation, ParamLocation, Parameter};
pub use dryrun::DryRunPlan;
pub use error::ErrorKind;
pub use plan::{PlanError, Test, TestCase, TestPlan};
pub use schema::{SchemaError, SchemaGraph, SchemaId, SchemaKind};
pub use store::{Associations, JsonObject, ObjectStore, Query, StoreError};
pub use tag::SchemaTag;
