//! Collaborator contracts for the discovery and management services.
//!
//! The core only talks to these traits. [`http`] implements them over the
//! services' HTTP APIs; tests substitute in-memory doubles.

pub mod http;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trixel_htm::TrixelId;
use uuid::Uuid;

use crate::config::MeasurementType;

pub use http::{HttpDiscovery, HttpManagement, HttpManagementConnector};

/// Major version of the discovery service API.
pub const DISCOVERY_API_VERSION: u32 = 1;

/// Major version of the management service API.
pub const MANAGEMENT_API_VERSION: u32 = 1;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The service answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The request could not be sent or no response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The endpoint could not be used to build a client.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

/// Identifier of a management authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityId(pub u64);

impl std::fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authority responsible for a trixel, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityInfo {
    pub id: AuthorityId,
    pub host: String,
}

/// Per measurement type sensor population of one trixel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorCounts(pub BTreeMap<MeasurementType, u64>);

impl SensorCounts {
    /// Count for a type; types the service did not report count as zero.
    pub fn get(&self, measurement_type: MeasurementType) -> u64 {
        self.0.get(&measurement_type).copied().unwrap_or(0)
    }
}

impl FromIterator<(MeasurementType, u64)> for SensorCounts {
    fn from_iter<I: IntoIterator<Item = (MeasurementType, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Answer to a successful station creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationCreated {
    pub station_id: Uuid,
    pub token: String,
    pub k_requirement: u32,
}

/// Station state as held by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationDetail {
    pub station_id: Uuid,
    pub k_requirement: u32,
    pub active: bool,
}

/// Trixel lookup / discovery service.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Sensor counts of the given types within a trixel.
    async fn sensor_count(
        &self,
        trixel: TrixelId,
        types: &[MeasurementType],
    ) -> Result<SensorCounts, TransportError>;

    /// Authority managing a trixel.
    async fn responsible_authority(&self, trixel: TrixelId)
        -> Result<AuthorityInfo, TransportError>;
}

/// Management service of a single authority.
#[async_trait]
pub trait ManagementService: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Create a station with the given k requirement.
    async fn create_station(&self, k_requirement: u32) -> Result<StationCreated, TransportError>;

    /// Fetch the station identified by `token`.
    async fn station_detail(&self, token: &str) -> Result<StationDetail, TransportError>;

    /// Change the k requirement of the station identified by `token`.
    async fn update_station(
        &self,
        token: &str,
        k_requirement: u32,
    ) -> Result<StationDetail, TransportError>;

    /// Delete the station identified by `token`.
    async fn delete_station(&self, token: &str) -> Result<(), TransportError>;
}

/// Builds management handles for resolved authorities.
pub trait ManagementConnector: Send + Sync {
    /// Create a handle for `authority` reachable at `base_url`.
    fn connect(
        &self,
        authority: &AuthorityInfo,
        base_url: &str,
    ) -> Result<Arc<dyn ManagementService>, TransportError>;
}

/// Options shared by the HTTP transports.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Timeout applied to every request.
    pub request_timeout: Duration,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            user_agent: format!("trixel-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportOptions {
    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Base URL of a versioned service API.
pub fn base_url(host: &str, use_tls: bool, api_version: u32) -> String {
    let scheme = if use_tls { "https" } else { "http" };
    format!("{scheme}://{host}/v{api_version}")
}
