//! jobform - Dependent-field resolution for data-integration job forms
//!
//! A job form is a set of field descriptors bound to a JSON model. Fields
//! depend on each other: choosing a datasource type fills the instance list,
//! choosing an instance fills the table list, choosing a table fills the column
//! mapping. jobform keeps that derived state consistent while remote lookups
//! race each other.
//!
//! # Core Concepts
//!
//! - **Clear before resolve**: changing a trigger resets everything it produces
//!   before its lookup is issued
//! - **Later lookup wins**: a completion is applied only if its trigger has not
//!   changed since the lookup was issued
//! - **Table-driven layout**: spans are a pure function of the template mode and
//!   the source/target datasource types
//! - **Positional mapping**: source and target column lists are connected index
//!   by index
//!
//! # Modules
//!
//! - [`template`] - Field descriptors, layout table and template loading
//! - [`resolver`] - Dependency resolver and lookup sequencing
//! - [`mapping`] - Column mapping reconciler
//! - [`catalog`] - Datasource catalog trait and fixture-backed catalog
//! - [`session`] - Scripted form sessions
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod catalog;
pub mod cli;
pub mod config;
pub mod domain;
pub mod mapping;
pub mod resolver;
pub mod session;
pub mod template;

// Re-export commonly used types
pub use catalog::{CatalogError, DatasourceCatalog, StaticCatalog};
pub use config::Config;
pub use domain::{ColumnRecord, Model, SelectOption};
pub use mapping::{Direction, MappingError, MappingMode, MappingReconciler, Side};
pub use resolver::{FieldView, FormEvent, FormResolver, LookupOutcome, ResolverConfig, ResolverError};
pub use session::{MappingOp, Session, SessionReport, Step};
pub use template::{FieldDescriptor, FieldError, FieldKind, FormTemplate, LayoutTable, TemplateError};
