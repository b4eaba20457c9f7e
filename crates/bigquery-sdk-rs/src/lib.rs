//! Resource-oriented BigQuery client.
//!
//! Every handle ([`dataset::Dataset`], [`table::Table`], [`routine::Routine`],
//! [`model::Model`], [`job::Job`]) loads its body lazily: a handle built from
//! an id issues no request until an accessor needs data, a handle from a list
//! call holds a partial body, and anything past that triggers one get for the
//! full body. Setters patch immediately, guarded by the body's ETag. The
//! closures passed to `create_*` and `update` batch their changes into a
//! single request instead.
#[macro_use]
extern crate tracing;

mod client;
mod error;
mod list;

pub mod config;
pub mod dataset;
pub mod job;
pub mod model;
pub mod path;
pub mod project;
pub mod query;
pub mod resource;
pub mod routine;
pub mod service;
pub mod table;

pub use bigquery_model_rs as resources;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ApiError, Error};
pub use list::{ListItem, Page};
pub use project::Project;
pub use resource::ReadableResource;

/// Type alias to [`core::result::Result<T, Error>`].
pub type Result<T> = core::result::Result<T, Error>;
