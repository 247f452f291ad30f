//! Service contains the business logic of the application.
//!
//! List of available Cargo features:
#![doc = document_features::document_features!()]
#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod command;
pub mod domain;
pub mod inflight;
pub mod infra;
pub mod query;
pub mod read;

use std::sync::Arc;

use crate::domain::declaration::requirement::Policy;

#[cfg(doc)]
use crate::{
    domain::Declaration,
    infra::{Database, Gateway},
};

pub use self::{
    command::Command, inflight::Inflight, query::Query,
};

/// [`Service`] configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct Config {
    /// [`Policy`] of deriving required supporting documents.
    pub policy: Policy,
}

/// Domain service.
#[derive(Clone, Debug)]
pub struct Service<Db, Gw> {
    /// Configuration of this [`Service`].
    config: Config,

    /// [`Database`] of this [`Service`].
    database: Db,

    /// [`Gateway`] of this [`Service`] to the employment agency.
    gateway: Gw,

    /// [`Declaration`]s being finished at the moment.
    finishing: Arc<Inflight>,
}

impl<Db, Gw> Service<Db, Gw> {
    /// Creates a new [`Service`] with the provided parameters.
    pub fn new(config: Config, database: Db, gateway: Gw) -> Self {
        Self {
            config,
            database,
            gateway,
            finishing: Arc::new(Inflight::default()),
        }
    }

    /// Returns [`Config`] of this [`Service`].
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns [`Database`] of this [`Service`].
    #[must_use]
    pub fn database(&self) -> &Db {
        &self.database
    }

    /// Returns the agency [`Gateway`] of this [`Service`].
    #[must_use]
    pub fn gateway(&self) -> &Gw {
        &self.gateway
    }

    /// Returns the [`Inflight`] set of [`Declaration`]s being finished.
    #[must_use]
    pub fn finishing(&self) -> &Arc<Inflight> {
        &self.finishing
    }
}
