//! Station configuration.
//!
//! [`ClientConfig`] is the durable state of a station. It is handed to the
//! persistence callback after every change the controller commits.

use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::path::Path;

use serde::{Deserialize, Serialize};
use trixel_htm::Coordinate;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{base_url, DISCOVERY_API_VERSION, MANAGEMENT_API_VERSION};

/// Measurement types a station can contribute to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    AmbientTemperature,
    RelativeHumidity,
}

impl MeasurementType {
    /// Every known measurement type.
    pub const ALL: [Self; 2] = [Self::AmbientTemperature, Self::RelativeHumidity];

    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AmbientTemperature => "ambient_temperature",
            Self::RelativeHumidity => "relative_humidity",
        }
    }
}

impl std::fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MeasurementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown measurement type: {s}")))
    }
}

/// A sensor attached to the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub measurement_type: MeasurementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<u32>,
}

impl SensorDescriptor {
    /// Create a sensor of the given type.
    pub fn new(measurement_type: MeasurementType) -> Self {
        Self {
            measurement_type,
            accuracy: None,
            name: None,
            sensor_id: None,
        }
    }

    /// Set a human readable name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the accuracy.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

/// Identity issued by an authority when the station registers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCredentials {
    pub station_id: Uuid,
    pub token: String,
}

impl std::fmt::Debug for StationCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationCredentials")
            .field("station_id", &self.station_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn default_true() -> bool {
    true
}

/// Durable configuration of a measurement station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Precise location of the station
    pub location: Coordinate,

    /// Anonymity requirement used when hiding the location in trixels
    pub k: NonZeroU32,

    /// Host (and optional port) of the discovery service
    pub discovery_host: String,

    #[serde(default = "default_true")]
    pub discovery_use_tls: bool,

    #[serde(default = "default_true")]
    pub management_use_tls: bool,

    /// Used instead of the host announced by discovery when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_address_override: Option<String>,

    /// Present once the station is registered at its authority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<StationCredentials>,

    #[serde(default)]
    pub sensors: Vec<SensorDescriptor>,
}

impl ClientConfig {
    /// Create a configuration with TLS enabled and no sensors.
    pub fn new(location: Coordinate, k: NonZeroU32, discovery_host: impl Into<String>) -> Self {
        Self {
            location,
            k,
            discovery_host: discovery_host.into(),
            discovery_use_tls: true,
            management_use_tls: true,
            management_address_override: None,
            station: None,
            sensors: Vec::new(),
        }
    }

    /// Toggle TLS for both services.
    #[must_use]
    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.discovery_use_tls = enabled;
        self.management_use_tls = enabled;
        self
    }

    /// Reach every authority at this address.
    #[must_use]
    pub fn with_management_override(mut self, address: impl Into<String>) -> Self {
        self.management_address_override = Some(address.into());
        self
    }

    /// Declare a sensor.
    #[must_use]
    pub fn with_sensor(mut self, sensor: SensorDescriptor) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| Error::InvalidConfig(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        self.location.validate()?;
        if self.discovery_host.trim().is_empty() {
            return Err(Error::InvalidConfig("discovery_host is empty".into()));
        }
        if let Some(address) = &self.management_address_override {
            if address.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "management_address_override is empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Measurement types to negotiate trixels for.
    ///
    /// The distinct types of the declared sensors, or every known type when no
    /// sensor is declared.
    pub fn measurement_types(&self) -> Vec<MeasurementType> {
        if self.sensors.is_empty() {
            return MeasurementType::ALL.to_vec();
        }
        self.sensors
            .iter()
            .map(|s| s.measurement_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Base URL of the discovery API.
    pub fn discovery_url(&self) -> String {
        base_url(&self.discovery_host, self.discovery_use_tls, DISCOVERY_API_VERSION)
    }

    /// Base URL of the management API of an authority announced at `host`.
    pub fn management_url(&self, host: &str) -> String {
        let host = self.management_address_override.as_deref().unwrap_or(host);
        base_url(host, self.management_use_tls, MANAGEMENT_API_VERSION)
    }
}
