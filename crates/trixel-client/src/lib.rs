//! Trixel Client - Measurement Station Coordination
//!
//! This crate lets a measurement station take part in a privacy preserving
//! sensor network. Instead of its precise location, a station reports the
//! trixel (a cell of the Hierarchical Triangular Mesh) it lies in, chosen as
//! the finest cell that still contains at least `k` sensors of the same kind.
//!
//! # Overview
//!
//! A [`Client`] runs a three stage pipeline:
//!
//! - **Negotiation** ([`TrixelNegotiator`]): walks trixel levels against the
//!   discovery service and picks one trixel per measurement type
//! - **Resolution** ([`AuthorityResolver`]): finds the management authority
//!   responsible for those trixels and checks it is reachable
//! - **Synchronization** ([`StationSynchronizer`]): registers the station at
//!   that authority or brings its k requirement up to date
//!
//! Location and k changes rerun the relevant stages and roll back on failure.
//! Durable state is handed to a [`ConfigPersister`] after every change.
//!
//! # Example
//!
//! ```rust,ignore
//! use trixel_client::{Client, ClientConfig, Coordinate, JsonFilePersister, TransportOptions};
//!
//! let config = ClientConfig::load("station.json")?;
//! let client = Client::http(
//!     config,
//!     TransportOptions::default(),
//!     JsonFilePersister::new("station.json"),
//! )?;
//!
//! client.start().await?;
//! client.set_location(Coordinate::new(49.57, 11.03)?).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod geometry;
pub mod negotiator;
pub mod persist;
pub mod resolver;
pub mod synchronizer;
pub mod transport;

#[cfg(test)]
mod mock;

pub use client::{Client, ClientState, Services};
pub use config::{ClientConfig, MeasurementType, SensorDescriptor, StationCredentials};
pub use error::{Error, ErrorKind, Result};
pub use geometry::{Geometry, HtmGeometry};
pub use negotiator::{TrixelAssignment, TrixelNegotiator, MAX_NEGOTIATION_LEVELS};
pub use persist::{ConfigPersister, JsonFilePersister, PersistError};
pub use resolver::{AuthorityHandle, AuthorityResolver, AuthorityTable};
pub use synchronizer::{StationStatus, StationSynchronizer, SyncOutcome};
pub use transport::{
    AuthorityId, AuthorityInfo, DiscoveryService, ManagementConnector, ManagementService,
    SensorCounts, StationCreated, StationDetail, TransportError, TransportOptions,
};

// Re-export geometry primitives used throughout the API
pub use trixel_htm::{Coordinate, TrixelId};
