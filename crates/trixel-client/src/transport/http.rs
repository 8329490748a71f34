//! HTTP transports for the discovery and management services.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::trace;
use trixel_htm::TrixelId;
use uuid::Uuid;

use super::{
    AuthorityId, AuthorityInfo, DiscoveryService, ManagementConnector, ManagementService,
    SensorCounts, StationCreated, StationDetail, TransportError, TransportOptions,
};
use crate::config::MeasurementType;

/// Header carrying the station token.
const TOKEN_HEADER: &str = "token";

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if e.is_builder() {
            TransportError::Endpoint(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

fn build_client(options: &TransportOptions) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(options.request_timeout)
        .user_agent(options.user_agent.clone())
        .build()
        .map_err(|e| TransportError::Endpoint(e.to_string()))
}

/// Fail with the response body unless the status matches.
async fn expect_status(response: Response, expected: StatusCode) -> Result<Response, TransportError> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    expected: StatusCode,
) -> Result<T, TransportError> {
    let response = expect_status(response, expected).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct TrixelMap {
    sensor_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize)]
struct ManagementServer {
    id: u64,
    host: String,
}

#[derive(Debug, Deserialize)]
struct MeasurementStationCreate {
    uuid: Uuid,
    token: String,
    k_requirement: u32,
}

#[derive(Debug, Deserialize)]
struct MeasurementStation {
    uuid: Uuid,
    k_requirement: u32,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl From<MeasurementStation> for StationDetail {
    fn from(station: MeasurementStation) -> Self {
        Self {
            station_id: station.uuid,
            k_requirement: station.k_requirement,
            active: station.active,
        }
    }
}

/// Discovery service client.
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    client: Client,
    base_url: String,
}

impl HttpDiscovery {
    /// Create a client for the discovery API at `base_url`.
    pub fn new(base_url: impl Into<String>, options: &TransportOptions) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(options)?,
            base_url: base_url.into(),
        })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DiscoveryService for HttpDiscovery {
    async fn sensor_count(
        &self,
        trixel: TrixelId,
        types: &[MeasurementType],
    ) -> Result<SensorCounts, TransportError> {
        let url = format!("{}/trixel/{}/sensor_count", self.base_url, trixel);
        let query: Vec<(&str, &str)> = types.iter().map(|t| ("types", t.as_str())).collect();
        trace!(%url, ?types, "querying sensor count");

        let response = self.client.get(&url).query(&query).send().await?;
        let map: TrixelMap = decode(response, StatusCode::OK).await?;

        // Types this client does not know about are skipped
        Ok(map
            .sensor_counts
            .into_iter()
            .filter_map(|(name, count)| name.parse::<MeasurementType>().ok().map(|t| (t, count)))
            .collect())
    }

    async fn responsible_authority(
        &self,
        trixel: TrixelId,
    ) -> Result<AuthorityInfo, TransportError> {
        let url = format!("{}/trixel/{}/TMS", self.base_url, trixel);
        trace!(%url, "querying responsible authority");

        let response = self.client.get(&url).send().await?;
        let server: ManagementServer = decode(response, StatusCode::OK).await?;
        Ok(AuthorityInfo {
            id: AuthorityId(server.id),
            host: server.host,
        })
    }
}

/// Management service client for one authority.
#[derive(Debug, Clone)]
pub struct HttpManagement {
    client: Client,
    base_url: String,
}

impl HttpManagement {
    /// Create a client for the management API at `base_url`.
    pub fn new(base_url: impl Into<String>, options: &TransportOptions) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(options)?,
            base_url: base_url.into(),
        })
    }

    fn station_url(&self) -> String {
        format!("{}/measurement_station", self.base_url)
    }
}

#[async_trait]
impl ManagementService for HttpManagement {
    async fn ping(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await?;
        expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    async fn create_station(&self, k_requirement: u32) -> Result<StationCreated, TransportError> {
        let response = self
            .client
            .post(self.station_url())
            .query(&[("k_requirement", k_requirement)])
            .send()
            .await?;
        let created: MeasurementStationCreate = decode(response, StatusCode::CREATED).await?;
        Ok(StationCreated {
            station_id: created.uuid,
            token: created.token,
            k_requirement: created.k_requirement,
        })
    }

    async fn station_detail(&self, token: &str) -> Result<StationDetail, TransportError> {
        let response = self
            .client
            .get(self.station_url())
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        let station: MeasurementStation = decode(response, StatusCode::OK).await?;
        Ok(station.into())
    }

    async fn update_station(
        &self,
        token: &str,
        k_requirement: u32,
    ) -> Result<StationDetail, TransportError> {
        let response = self
            .client
            .put(self.station_url())
            .header(TOKEN_HEADER, token)
            .query(&[("k_requirement", k_requirement)])
            .send()
            .await?;
        let station: MeasurementStation = decode(response, StatusCode::OK).await?;
        Ok(station.into())
    }

    async fn delete_station(&self, token: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .delete(self.station_url())
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

/// Connector producing [`HttpManagement`] handles.
#[derive(Debug, Clone, Default)]
pub struct HttpManagementConnector {
    options: TransportOptions,
}

impl HttpManagementConnector {
    /// Create a connector using the given options for every handle.
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

impl ManagementConnector for HttpManagementConnector {
    fn connect(
        &self,
        _authority: &AuthorityInfo,
        base_url: &str,
    ) -> Result<Arc<dyn ManagementService>, TransportError> {
        let handle: Arc<dyn ManagementService> =
            Arc::new(HttpManagement::new(base_url, &self.options)?);
        Ok(handle)
    }
}
