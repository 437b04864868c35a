//! venuedesk-core - Core library for Venuedesk
//!
//! This crate contains the models, local store, CRM client and the two-way
//! sync engine (push dispatcher and reconciliation job) used by the
//! Venuedesk CLI and API trigger.

pub mod config;
pub mod db;
pub mod error;
pub mod mapper;
pub mod models;
pub mod push;
pub mod reconcile;
pub mod remote;
pub mod services;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntityKind, LocalId, RemoteId};
