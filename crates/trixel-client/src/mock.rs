//! In-memory service doubles shared by the unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use trixel_htm::{Coordinate, TrixelId};
use uuid::Uuid;

use crate::config::{ClientConfig, MeasurementType};
use crate::persist::{ConfigPersister, PersistError};
use crate::transport::{
    AuthorityId, AuthorityInfo, DiscoveryService, ManagementConnector, ManagementService,
    SensorCounts, StationCreated, StationDetail, TransportError,
};

pub(crate) fn server_error() -> TransportError {
    TransportError::Status {
        status: 500,
        body: "injected failure".into(),
    }
}

pub(crate) fn authority(id: u64) -> AuthorityInfo {
    AuthorityInfo {
        id: AuthorityId(id),
        host: format!("tms-{id}.test"),
    }
}

pub(crate) fn station_config(k: u32) -> ClientConfig {
    ClientConfig::new(
        Coordinate::new(49.5732, 11.0271).unwrap(),
        NonZeroU32::new(k).unwrap(),
        "tls.test",
    )
}

#[derive(Default)]
struct DiscoveryState {
    counts: BTreeMap<MeasurementType, Vec<u64>>,
    fail_at_level: Option<u8>,
    authority_by_level: BTreeMap<u8, AuthorityInfo>,
    fail_lookup: bool,
    count_queries: Vec<TrixelId>,
    authority_queries: Vec<TrixelId>,
}

/// Discovery double whose answers depend only on the queried level.
pub(crate) struct MockDiscovery {
    default_authority: AuthorityInfo,
    state: Mutex<DiscoveryState>,
}

impl MockDiscovery {
    pub(crate) fn new() -> Self {
        Self {
            default_authority: authority(1),
            state: Mutex::new(DiscoveryState::default()),
        }
    }

    /// Same per level counts for every type.
    pub(crate) fn with_levels(self, counts: &[u64]) -> Self {
        for t in MeasurementType::ALL {
            self.set_type_levels(t, counts);
        }
        self
    }

    pub(crate) fn set_type_levels(&self, measurement_type: MeasurementType, counts: &[u64]) {
        let mut state = self.state.lock().unwrap();
        state.counts.insert(measurement_type, counts.to_vec());
    }

    pub(crate) fn fail_at_level(&self, level: Option<u8>) {
        self.state.lock().unwrap().fail_at_level = level;
    }

    pub(crate) fn authority_at_level(&self, level: u8, info: AuthorityInfo) {
        let mut state = self.state.lock().unwrap();
        state.authority_by_level.insert(level, info);
    }

    pub(crate) fn fail_lookup(&self, fail: bool) {
        self.state.lock().unwrap().fail_lookup = fail;
    }

    pub(crate) fn count_queries(&self) -> Vec<TrixelId> {
        self.state.lock().unwrap().count_queries.clone()
    }

    pub(crate) fn authority_queries(&self) -> Vec<TrixelId> {
        self.state.lock().unwrap().authority_queries.clone()
    }

    pub(crate) fn clear_queries(&self) {
        let mut state = self.state.lock().unwrap();
        state.count_queries.clear();
        state.authority_queries.clear();
    }
}

#[async_trait]
impl DiscoveryService for MockDiscovery {
    async fn sensor_count(
        &self,
        trixel: TrixelId,
        types: &[MeasurementType],
    ) -> Result<SensorCounts, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.count_queries.push(trixel);
        let level = trixel.level();
        if state.fail_at_level == Some(level) {
            return Err(server_error());
        }
        Ok(types
            .iter()
            .map(|t| {
                let count = state
                    .counts
                    .get(t)
                    .and_then(|levels| levels.get(level as usize))
                    .copied()
                    .unwrap_or(0);
                (*t, count)
            })
            .collect())
    }

    async fn responsible_authority(
        &self,
        trixel: TrixelId,
    ) -> Result<AuthorityInfo, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.authority_queries.push(trixel);
        if state.fail_lookup {
            return Err(server_error());
        }
        Ok(state
            .authority_by_level
            .get(&trixel.level())
            .cloned()
            .unwrap_or_else(|| self.default_authority.clone()))
    }
}

/// Management operations, recorded in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Call {
    Ping,
    Create,
    Detail,
    Update,
    Delete,
}

struct Station {
    id: Uuid,
    token: String,
    k: u32,
}

#[derive(Default)]
struct AuthorityState {
    station: Option<Station>,
    calls: Vec<Call>,
    failing: BTreeSet<Call>,
    forced_k: Option<u32>,
    created: u128,
}

/// Management double holding at most one station.
#[derive(Default)]
pub(crate) struct MockAuthority {
    state: Mutex<AuthorityState>,
}

impl MockAuthority {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub(crate) fn fail(&self, call: Call) {
        self.state.lock().unwrap().failing.insert(call);
    }

    pub(crate) fn heal(&self, call: Call) {
        self.state.lock().unwrap().failing.remove(&call);
    }

    /// Store this k regardless of what the station asks for.
    pub(crate) fn force_k(&self, k: Option<u32>) {
        self.state.lock().unwrap().forced_k = k;
    }

    pub(crate) fn remote_k(&self) -> Option<u32> {
        self.state.lock().unwrap().station.as_ref().map(|s| s.k)
    }

    pub(crate) fn set_remote_k(&self, k: u32) {
        if let Some(station) = self.state.lock().unwrap().station.as_mut() {
            station.k = k;
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state.lock().unwrap().station.is_some()
    }

    /// Record the call and apply any injected failure.
    fn enter(&self, call: Call) -> Result<std::sync::MutexGuard<'_, AuthorityState>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing.contains(&call) {
            return Err(server_error());
        }
        Ok(state)
    }
}

fn unauthorized() -> TransportError {
    TransportError::Status {
        status: 401,
        body: "unknown token".into(),
    }
}

fn station_mut<'a>(state: &'a mut AuthorityState, token: &str) -> Result<&'a mut Station, TransportError> {
    state
        .station
        .as_mut()
        .filter(|s| s.token == token)
        .ok_or_else(unauthorized)
}

#[async_trait]
impl ManagementService for MockAuthority {
    async fn ping(&self) -> Result<(), TransportError> {
        self.enter(Call::Ping).map(|_| ())
    }

    async fn create_station(&self, k_requirement: u32) -> Result<StationCreated, TransportError> {
        let mut state = self.enter(Call::Create)?;
        state.created += 1;
        let station = Station {
            id: Uuid::from_u128(state.created),
            token: format!("token-{}", state.created),
            k: state.forced_k.unwrap_or(k_requirement),
        };
        let created = StationCreated {
            station_id: station.id,
            token: station.token.clone(),
            k_requirement: station.k,
        };
        state.station = Some(station);
        Ok(created)
    }

    async fn station_detail(&self, token: &str) -> Result<StationDetail, TransportError> {
        let mut state = self.enter(Call::Detail)?;
        let station = station_mut(&mut state, token)?;
        Ok(StationDetail {
            station_id: station.id,
            k_requirement: station.k,
            active: true,
        })
    }

    async fn update_station(
        &self,
        token: &str,
        k_requirement: u32,
    ) -> Result<StationDetail, TransportError> {
        let mut state = self.enter(Call::Update)?;
        let forced = state.forced_k;
        let station = station_mut(&mut state, token)?;
        station.k = forced.unwrap_or(k_requirement);
        Ok(StationDetail {
            station_id: station.id,
            k_requirement: station.k,
            active: true,
        })
    }

    async fn delete_station(&self, token: &str) -> Result<(), TransportError> {
        let mut state = self.enter(Call::Delete)?;
        station_mut(&mut state, token)?;
        state.station = None;
        Ok(())
    }
}

/// Connector handing out one [`MockAuthority`] per authority id.
#[derive(Default)]
pub(crate) struct MockConnector {
    authorities: Mutex<BTreeMap<AuthorityId, Arc<MockAuthority>>>,
    connected: Mutex<Vec<(AuthorityId, String)>>,
}

impl MockConnector {
    pub(crate) fn authority(&self, id: u64) -> Arc<MockAuthority> {
        let mut authorities = self.authorities.lock().unwrap();
        Arc::clone(authorities.entry(AuthorityId(id)).or_default())
    }

    pub(crate) fn connected(&self) -> Vec<(AuthorityId, String)> {
        self.connected.lock().unwrap().clone()
    }
}

impl ManagementConnector for MockConnector {
    fn connect(
        &self,
        authority: &AuthorityInfo,
        base_url: &str,
    ) -> Result<Arc<dyn ManagementService>, TransportError> {
        self.connected
            .lock()
            .unwrap()
            .push((authority.id, base_url.to_string()));
        let handle: Arc<dyn ManagementService> = self.authority(authority.id.0);
        Ok(handle)
    }
}

/// Persister remembering every persisted configuration.
#[derive(Clone, Default)]
pub(crate) struct RecordingPersister {
    saved: Arc<Mutex<Vec<ClientConfig>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingPersister {
    pub(crate) fn saved(&self) -> Vec<ClientConfig> {
        self.saved.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Option<ClientConfig> {
        self.saved.lock().unwrap().last().cloned()
    }

    pub(crate) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ConfigPersister for RecordingPersister {
    fn persist(&self, config: &ClientConfig) -> Result<(), PersistError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Rejected("injected failure".into()));
        }
        self.saved.lock().unwrap().push(config.clone());
        Ok(())
    }
}
