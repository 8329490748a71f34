//! Client controller.
//!
//! [`Client`] sequences negotiation, authority resolution and station sync,
//! owns the lookup tables they produce, and exposes readiness through
//! `watch` channels. Every mutating operation holds the controller lock for
//! its whole duration, so only one of them runs at a time.
//!
//! Ready is cleared before any transition and only set once the transition
//! has fully succeeded. Failed location or k changes leave the configuration,
//! the tables and the persisted state exactly as they were.

use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use trixel_htm::Coordinate;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::geometry::{Geometry, HtmGeometry};
use crate::negotiator::{TrixelAssignment, TrixelNegotiator};
use crate::persist::ConfigPersister;
use crate::resolver::{AuthorityResolver, AuthorityTable};
use crate::synchronizer::StationSynchronizer;
use crate::transport::{
    AuthorityInfo, DiscoveryService, HttpDiscovery, HttpManagementConnector, ManagementConnector,
    TransportOptions,
};

/// Phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing has run yet.
    Created,
    Negotiating,
    Resolving,
    Syncing,
    /// Negotiated, resolved and in sync with the authority.
    Ready,
    /// The station was deleted at its authority.
    Dead,
}

/// External collaborators of a [`Client`].
#[derive(Clone)]
pub struct Services {
    pub discovery: Arc<dyn DiscoveryService>,
    pub connector: Arc<dyn ManagementConnector>,
    pub geometry: Arc<dyn Geometry>,
}

impl Services {
    /// Use the given services with HTM geometry.
    pub fn new(
        discovery: Arc<dyn DiscoveryService>,
        connector: Arc<dyn ManagementConnector>,
    ) -> Self {
        Self {
            discovery,
            connector,
            geometry: Arc::new(HtmGeometry),
        }
    }

    /// HTTP services for the endpoints named in `config`.
    pub fn http(config: &ClientConfig, options: TransportOptions) -> Result<Self> {
        let discovery = HttpDiscovery::new(config.discovery_url(), &options)?;
        Ok(Self::new(
            Arc::new(discovery),
            Arc::new(HttpManagementConnector::new(options)),
        ))
    }

    /// Replace the geometry.
    #[must_use]
    pub fn with_geometry(mut self, geometry: Arc<dyn Geometry>) -> Self {
        self.geometry = geometry;
        self
    }
}

struct Inner {
    config: ClientConfig,
    trixels: TrixelAssignment,
    authorities: AuthorityTable,
}

/// Coordinates a measurement station with the discovery and management services.
pub struct Client {
    services: Services,
    persister: Box<dyn ConfigPersister>,
    inner: Mutex<Inner>,
    ready: watch::Sender<bool>,
    dead: watch::Sender<bool>,
    state: watch::Sender<ClientState>,
}

impl Client {
    /// Create a client. Nothing is contacted until [`Client::start`].
    pub fn new(
        config: ClientConfig,
        services: Services,
        persister: impl ConfigPersister + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            services,
            persister: Box::new(persister),
            inner: Mutex::new(Inner {
                config,
                trixels: TrixelAssignment::default(),
                authorities: AuthorityTable::default(),
            }),
            ready: watch::channel(false).0,
            dead: watch::channel(false).0,
            state: watch::channel(ClientState::Created).0,
        })
    }

    /// Create a client talking HTTP to the configured services.
    pub fn http(
        config: ClientConfig,
        options: TransportOptions,
        persister: impl ConfigPersister + 'static,
    ) -> Result<Self> {
        let services = Services::http(&config, options)?;
        Self::new(config, services, persister)
    }

    /// Negotiate trixels, resolve the authority and register or resync.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.dead.send_replace(false);
        self.ready.send_replace(false);

        let result = self.run_pipeline(&mut inner).await;
        if let Err(e) = &result {
            error!(error = %e, state = ?self.state(), "failed to start client");
            return result;
        }

        self.enter(ClientState::Ready);
        self.ready.send_replace(true);
        info!(
            trixels = inner.trixels.len(),
            authorities = inner.authorities.authorities().len(),
            "client ready"
        );
        Ok(())
    }

    async fn run_pipeline(&self, inner: &mut Inner) -> Result<()> {
        let trixels = self.negotiate(&inner.config).await?;
        let authorities = self.resolve(&inner.config, &trixels).await?;

        self.enter(ClientState::Syncing);
        let authority = authorities.primary().ok_or(Error::NoAuthority)?;
        StationSynchronizer::new(authority, self.persister.as_ref())
            .sync(&mut inner.config)
            .await?;

        inner.trixels = trixels;
        inner.authorities = authorities;
        Ok(())
    }

    /// Move the station.
    ///
    /// A ready client renegotiates its trixels and resolves their authority
    /// before the new location is persisted. Otherwise the location is only
    /// persisted.
    pub async fn set_location(&self, location: Coordinate) -> Result<()> {
        location.validate()?;
        let mut inner = self.inner.lock().await;
        debug!(%location, "changing location");

        let previous = inner.config.location;
        inner.config.location = location;

        if !self.is_ready() || self.is_dead() {
            if let Err(e) = self.persister.persist(&inner.config) {
                inner.config.location = previous;
                warn!(error = %e, "location change rolled back");
                return Err(e.into());
            }
            return Ok(());
        }

        self.ready.send_replace(false);
        match self.relocate(&inner.config).await {
            Ok((trixels, authorities)) => {
                inner.trixels = trixels;
                inner.authorities = authorities;
                self.enter(ClientState::Ready);
                self.ready.send_replace(true);
                info!(%location, "location changed");
                Ok(())
            }
            Err(e) => {
                inner.config.location = previous;
                warn!(error = %e, state = ?self.state(), "location change rolled back");
                Err(e)
            }
        }
    }

    async fn relocate(&self, config: &ClientConfig) -> Result<(TrixelAssignment, AuthorityTable)> {
        let trixels = self.negotiate(config).await?;
        let authorities = self.resolve(config, &trixels).await?;
        self.persister.persist(config)?;
        Ok((trixels, authorities))
    }

    /// Change the anonymity requirement.
    ///
    /// A ready client synchronizes the new value with its authority before it
    /// is persisted. Trixels are not renegotiated. Otherwise the value is only
    /// persisted.
    pub async fn set_k(&self, k: NonZeroU32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        debug!(k = k.get(), "changing k requirement");

        let previous = inner.config.k;
        inner.config.k = k;

        if !self.is_ready() || self.is_dead() {
            if let Err(e) = self.persister.persist(&inner.config) {
                inner.config.k = previous;
                warn!(error = %e, "k requirement change rolled back");
                return Err(e.into());
            }
            return Ok(());
        }

        self.ready.send_replace(false);
        match self.resync(&mut inner).await {
            Ok(()) => {
                self.enter(ClientState::Ready);
                self.ready.send_replace(true);
                info!(k = k.get(), "k requirement changed");
                Ok(())
            }
            Err(e) => {
                inner.config.k = previous;
                warn!(error = %e, state = ?self.state(), "k requirement change rolled back");
                Err(e)
            }
        }
    }

    async fn resync(&self, inner: &mut Inner) -> Result<()> {
        self.enter(ClientState::Syncing);
        let authority = inner.authorities.primary().cloned().ok_or(Error::NoAuthority)?;
        StationSynchronizer::new(&authority, self.persister.as_ref())
            .sync(&mut inner.config)
            .await?;
        self.persister.persist(&inner.config)?;
        Ok(())
    }

    /// Delete the station at its authority and mark the client dead.
    pub async fn delete(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let authority = inner.authorities.primary().cloned().ok_or(Error::NoAuthority)?;

        StationSynchronizer::new(&authority, self.persister.as_ref())
            .deregister(&mut inner.config)
            .await?;

        self.ready.send_replace(false);
        self.enter(ClientState::Dead);
        self.dead.send_replace(true);
        Ok(())
    }

    async fn negotiate(&self, config: &ClientConfig) -> Result<TrixelAssignment> {
        self.enter(ClientState::Negotiating);
        TrixelNegotiator::new(
            self.services.discovery.as_ref(),
            self.services.geometry.as_ref(),
        )
        .negotiate(&config.location, config.k, &config.measurement_types())
        .await
    }

    async fn resolve(
        &self,
        config: &ClientConfig,
        trixels: &TrixelAssignment,
    ) -> Result<AuthorityTable> {
        self.enter(ClientState::Resolving);
        AuthorityResolver::new(
            self.services.discovery.as_ref(),
            self.services.connector.as_ref(),
            config,
        )
        .resolve(trixels)
        .await
    }

    fn enter(&self, state: ClientState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "client state changed");
        }
    }

    // === Observers ===

    pub async fn location(&self) -> Coordinate {
        self.inner.lock().await.config.location
    }

    pub async fn k(&self) -> NonZeroU32 {
        self.inner.lock().await.config.k
    }

    /// Snapshot of the configuration.
    pub async fn config(&self) -> ClientConfig {
        self.inner.lock().await.config.clone()
    }

    /// Trixels negotiated by the last successful transition.
    pub async fn trixels(&self) -> TrixelAssignment {
        self.inner.lock().await.trixels.clone()
    }

    /// Distinct authorities resolved by the last successful transition.
    pub async fn authorities(&self) -> Vec<AuthorityInfo> {
        self.inner.lock().await.authorities.authorities()
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn is_dead(&self) -> bool {
        *self.dead.borrow()
    }

    /// Resolves once the client is ready.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        // Only fails if the sender is gone, which cannot outlive `self`
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Resolves once the station was deleted.
    pub async fn wait_dead(&self) {
        let mut dead = self.dead.subscribe();
        let _ = dead.wait_for(|dead| *dead).await;
    }

    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::config::MeasurementType;
    use crate::error::ErrorKind;
    use crate::mock::{
        authority, station_config, Call, MockAuthority, MockConnector, MockDiscovery,
        RecordingPersister,
    };
    use crate::persist::PersistError;

    struct Fixture {
        discovery: Arc<MockDiscovery>,
        connector: Arc<MockConnector>,
        persister: RecordingPersister,
        client: Client,
    }

    impl Fixture {
        fn new(k: u32) -> Self {
            let discovery = Arc::new(MockDiscovery::new().with_levels(&[100, 80, 40, 10, 2]));
            let connector = Arc::new(MockConnector::default());
            let persister = RecordingPersister::default();
            let services = Services::new(discovery.clone(), connector.clone());
            let client = Client::new(station_config(k), services, persister.clone()).unwrap();
            Self {
                discovery,
                connector,
                persister,
                client,
            }
        }

        fn authority(&self) -> Arc<MockAuthority> {
            self.connector.authority(1)
        }
    }

    fn elsewhere() -> Coordinate {
        Coordinate::new(-33.8688, 151.2093).unwrap()
    }

    #[tokio::test]
    async fn start_registers_and_becomes_ready() {
        let fx = Fixture::new(5);
        assert_eq!(fx.client.state(), ClientState::Created);

        fx.client.start().await.unwrap();

        assert!(fx.client.is_ready());
        assert!(!fx.client.is_dead());
        assert_eq!(fx.client.state(), ClientState::Ready);
        assert_eq!(fx.client.authorities().await, vec![authority(1)]);
        let trixels = fx.client.trixels().await;
        assert_eq!(
            trixels.get(MeasurementType::AmbientTemperature).map(|t| t.level()),
            Some(3)
        );
        assert_eq!(fx.authority().calls(), vec![Call::Ping, Call::Create, Call::Detail]);
        assert!(fx.persister.last().unwrap().station.is_some());
        fx.client.wait_ready().await;
    }

    #[tokio::test]
    async fn restart_reuses_stored_credentials() {
        let fx = Fixture::new(5);
        fx.client.start().await.unwrap();
        fx.client.start().await.unwrap();
        assert_eq!(fx.authority().count(Call::Create), 1);
        assert_eq!(fx.authority().count(Call::Update), 0);
    }

    #[tokio::test]
    async fn failed_start_stays_at_failing_phase() {
        let fx = Fixture::new(5);
        fx.discovery.fail_at_level(Some(1));

        let err = fx.client.start().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Negotiation);
        assert!(!fx.client.is_ready());
        assert_eq!(fx.client.state(), ClientState::Negotiating);
        assert!(fx.client.trixels().await.is_empty());
        assert!(fx.persister.saved().is_empty());
    }

    #[tokio::test]
    async fn start_rejects_split_authorities() {
        let fx = Fixture::new(5);
        fx.discovery
            .set_type_levels(MeasurementType::RelativeHumidity, &[100, 1]);
        fx.discovery.authority_at_level(0, authority(7));
        fx.discovery.authority_at_level(3, authority(9));

        let err = fx.client.start().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TopologyUnsupported);
        assert_eq!(fx.client.state(), ClientState::Resolving);
        assert!(fx.connector.connected().is_empty());
        assert!(fx.client.authorities().await.is_empty());
    }

    #[tokio::test]
    async fn set_location_renegotiates_when_ready() {
        let fx = Fixture::new(5);
        fx.client.start().await.unwrap();
        let before = fx.client.trixels().await;
        fx.authority().clear_calls();

        fx.client.set_location(elsewhere()).await.unwrap();

        assert!(fx.client.is_ready());
        assert_eq!(fx.client.location().await, elsewhere());
        let after = fx.client.trixels().await;
        assert_ne!(after, before);
        assert_eq!(
            after.get(MeasurementType::AmbientTemperature),
            Some(trixel_htm::trixel_at(&elsewhere(), 3).unwrap())
        );
        assert_eq!(fx.persister.last().unwrap().location, elsewhere());
        // Resolution pings again, no resync
        assert_eq!(fx.authority().calls(), vec![Call::Ping]);
    }

    #[tokio::test]
    async fn failed_negotiation_rolls_back_location() {
        let fx = Fixture::new(5);
        fx.client.start().await.unwrap();
        let location = fx.client.location().await;
        let trixels = fx.client.trixels().await;
        let saved = fx.persister.saved().len();

        fx.discovery.fail_at_level(Some(0));
        let err = fx.client.set_location(elsewhere()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Negotiation);
        assert_eq!(fx.client.location().await, location);
        assert_eq!(fx.client.trixels().await, trixels);
        assert_eq!(fx.client.authorities().await, vec![authority(1)]);
        assert_eq!(fx.persister.saved().len(), saved);
        assert!(!fx.client.is_ready());
        assert_eq!(fx.client.state(), ClientState::Negotiating);
    }

    #[tokio::test]
    async fn failed_resolution_rolls_back_location() {
        let fx = Fixture::new(5);
        fx.client.start().await.unwrap();
        let trixels = fx.client.trixels().await;
        let saved = fx.persister.saved().len();

        fx.discovery.fail_lookup(true);
        let err = fx.client.set_location(elsewhere()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthorityUnavailable);
        assert_eq!(fx.client.location().await, station_config(5).location);
        assert_eq!(fx.client.trixels().await, trixels);
        assert_eq!(fx.persister.saved().len(), saved);
        assert_eq!(fx.client.state(), ClientState::Resolving);
    }

    #[tokio::test]
    async fn set_location_before_start_only_persists() {
        let fx = Fixture::new(5);

        fx.client.set_location(elsewhere()).await.unwrap();

        assert!(fx.discovery.count_queries().is_empty());
        assert_eq!(fx.persister.saved().len(), 1);
        assert_eq!(fx.persister.last().unwrap().location, elsewhere());
        assert!(!fx.client.is_ready());
    }

    #[tokio::test]
    async fn rejected_persist_rolls_back_location() {
        let fx = Fixture::new(5);
        fx.persister.fail(true);

        let err = fx.client.set_location(elsewhere()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert_eq!(fx.client.location().await, station_config(5).location);
    }

    #[tokio::test]
    async fn set_k_syncs_without_negotiation() {
        let fx = Fixture::new(3);
        fx.client.start().await.unwrap();
        fx.discovery.clear_queries();
        fx.authority().clear_calls();

        fx.client.set_k(NonZeroU32::new(5).unwrap()).await.unwrap();

        assert!(fx.discovery.count_queries().is_empty());
        assert_eq!(fx.authority().remote_k(), Some(5));
        assert_eq!(fx.authority().calls(), vec![Call::Detail, Call::Update]);
        assert_eq!(fx.client.k().await.get(), 5);
        assert_eq!(fx.persister.last().unwrap().k.get(), 5);
        assert!(fx.client.is_ready());
        assert_eq!(fx.client.state(), ClientState::Ready);
    }

    #[tokio::test]
    async fn rejected_k_update_rolls_back() {
        let fx = Fixture::new(3);
        fx.client.start().await.unwrap();
        let saved = fx.persister.saved().len();
        fx.authority().fail(Call::Update);

        let err = fx.client.set_k(NonZeroU32::new(5).unwrap()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Sync);
        assert_eq!(fx.client.k().await.get(), 3);
        assert_eq!(fx.persister.saved().len(), saved);
        assert!(!fx.client.is_ready());
        assert_eq!(fx.client.state(), ClientState::Syncing);

        // The client recovers once the authority does
        fx.authority().heal(Call::Update);
        fx.client.start().await.unwrap();
        assert!(fx.client.is_ready());
    }

    #[tokio::test]
    async fn set_k_before_start_only_persists() {
        let fx = Fixture::new(3);
        fx.client.set_k(NonZeroU32::new(8).unwrap()).await.unwrap();
        assert_eq!(fx.persister.last().unwrap().k.get(), 8);
        assert!(fx.authority().calls().is_empty());
    }

    #[tokio::test]
    async fn delete_marks_client_dead() {
        let fx = Fixture::new(5);
        fx.client.start().await.unwrap();

        fx.client.delete().await.unwrap();

        assert!(fx.client.is_dead());
        assert!(!fx.client.is_ready());
        assert_eq!(fx.client.state(), ClientState::Dead);
        assert!(!fx.authority().is_registered());
        assert!(fx.client.config().await.station.is_none());
        assert!(fx.persister.last().unwrap().station.is_none());
        fx.client.wait_dead().await;

        // A dead client only persists changes
        fx.discovery.clear_queries();
        fx.client.set_location(elsewhere()).await.unwrap();
        assert!(fx.discovery.count_queries().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_client_alive() {
        let fx = Fixture::new(5);
        fx.client.start().await.unwrap();
        fx.authority().fail(Call::Delete);

        let err = fx.client.delete().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Deregistration);
        assert!(!fx.client.is_dead());
        assert!(fx.client.config().await.station.is_some());
    }

    #[tokio::test]
    async fn delete_before_start_has_no_authority() {
        let fx = Fixture::new(5);
        let err = fx.client.delete().await.unwrap_err();
        assert!(matches!(err, Error::NoAuthority));
    }

    #[tokio::test]
    async fn ready_is_cleared_while_location_changes() {
        let observed: Arc<StdMutex<Vec<bool>>> = Arc::default();
        let ready_rx: Arc<StdMutex<Option<watch::Receiver<bool>>>> = Arc::default();

        let persister = {
            let observed = observed.clone();
            let ready_rx = ready_rx.clone();
            move |_: &ClientConfig| {
                if let Some(rx) = ready_rx.lock().unwrap().as_ref() {
                    observed.lock().unwrap().push(*rx.borrow());
                }
                Ok::<(), PersistError>(())
            }
        };
        let discovery = Arc::new(MockDiscovery::new().with_levels(&[100, 80, 40]));
        let services = Services::new(discovery, Arc::new(MockConnector::default()));
        let client = Client::new(station_config(5), services, persister).unwrap();
        client.start().await.unwrap();
        *ready_rx.lock().unwrap() = Some(client.subscribe_ready());

        client.set_location(elsewhere()).await.unwrap();

        assert_eq!(*observed.lock().unwrap(), vec![false]);
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn state_subscribers_see_transitions() {
        let fx = Fixture::new(5);
        let mut states = fx.client.subscribe_state();
        assert_eq!(*states.borrow_and_update(), ClientState::Created);

        fx.client.start().await.unwrap();

        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ClientState::Ready);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = station_config(5);
        config.discovery_host = String::new();
        let services = Services::new(
            Arc::new(MockDiscovery::new()),
            Arc::new(MockConnector::default()),
        );
        let err = Client::new(config, services, RecordingPersister::default()).err();
        assert!(matches!(err, Some(Error::InvalidConfig(_))));
    }
}
