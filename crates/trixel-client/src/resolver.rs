//! Authority resolution.
//!
//! Maps negotiated trixels to the management authority responsible for them.
//! Only deployments where a single authority manages every trixel of a
//! station are supported; anything else fails resolution outright.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info};
use trixel_htm::TrixelId;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::negotiator::TrixelAssignment;
use crate::transport::{
    AuthorityId, AuthorityInfo, DiscoveryService, ManagementConnector, ManagementService,
};

/// A resolved authority and the handle used to talk to it.
#[derive(Clone)]
pub struct AuthorityHandle {
    pub info: AuthorityInfo,
    /// Base URL of the authority's management API
    pub endpoint: String,
    pub service: Arc<dyn ManagementService>,
}

impl AuthorityHandle {
    pub fn id(&self) -> AuthorityId {
        self.info.id
    }
}

impl std::fmt::Debug for AuthorityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityHandle")
            .field("info", &self.info)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Authority handles keyed by trixel.
///
/// Several trixels may share the same handle.
#[derive(Debug, Clone, Default)]
pub struct AuthorityTable(BTreeMap<TrixelId, AuthorityHandle>);

impl AuthorityTable {
    /// Handle responsible for a trixel.
    pub fn get(&self, trixel: TrixelId) -> Option<&AuthorityHandle> {
        self.0.get(&trixel)
    }

    /// The authority of this station (single authority deployments only).
    pub fn primary(&self) -> Option<&AuthorityHandle> {
        self.0.values().next()
    }

    /// Distinct authorities, ordered by id.
    pub fn authorities(&self) -> Vec<AuthorityInfo> {
        let mut seen: BTreeMap<AuthorityId, AuthorityInfo> = BTreeMap::new();
        for handle in self.0.values() {
            seen.entry(handle.id()).or_insert_with(|| handle.info.clone());
        }
        seen.into_values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Looks up, connects and probes the authority of negotiated trixels.
pub struct AuthorityResolver<'a> {
    discovery: &'a dyn DiscoveryService,
    connector: &'a dyn ManagementConnector,
    config: &'a ClientConfig,
}

impl<'a> AuthorityResolver<'a> {
    /// `config` supplies TLS and address override for management endpoints.
    pub fn new(
        discovery: &'a dyn DiscoveryService,
        connector: &'a dyn ManagementConnector,
        config: &'a ClientConfig,
    ) -> Self {
        Self {
            discovery,
            connector,
            config,
        }
    }

    /// Resolve the authority table for an assignment.
    ///
    /// Nothing is returned unless every trixel resolved to the same authority
    /// and that authority answered its ping.
    pub async fn resolve(&self, assignment: &TrixelAssignment) -> Result<AuthorityTable> {
        let mut authority: Option<AuthorityInfo> = None;
        let trixels = assignment.trixels();

        for trixel in &trixels {
            let info = self
                .discovery
                .responsible_authority(*trixel)
                .await
                .map_err(|source| {
                    error!(%trixel, error = %source, "failed to retrieve responsible authority");
                    Error::AuthorityLookup {
                        trixel: *trixel,
                        source,
                    }
                })?;

            match &authority {
                Some(known) if known.id != info.id => {
                    error!(
                        %trixel,
                        expected = %known.id,
                        found = %info.id,
                        "trixels are managed by more than one authority"
                    );
                    return Err(Error::TopologyUnsupported {
                        trixel: *trixel,
                        expected: known.id,
                        found: info.id,
                    });
                }
                Some(_) => {}
                None => authority = Some(info),
            }
        }

        let Some(info) = authority else {
            return Ok(AuthorityTable::default());
        };

        let endpoint = self.config.management_url(&info.host);
        let service = self.connector.connect(&info, &endpoint).map_err(|source| {
            Error::AuthorityUnavailable {
                authority: info.id,
                host: info.host.clone(),
                source,
            }
        })?;
        let handle = AuthorityHandle {
            info,
            endpoint,
            service,
        };

        // One probe per distinct authority
        handle.service.ping().await.map_err(|source| {
            error!(
                authority = %handle.id(),
                host = %handle.info.host,
                error = %source,
                "failed to ping authority"
            );
            Error::AuthorityUnavailable {
                authority: handle.id(),
                host: handle.info.host.clone(),
                source,
            }
        })?;
        info!(
            authority = %handle.id(),
            host = %handle.info.host,
            endpoint = %handle.endpoint,
            "retrieved valid authority"
        );

        let table = trixels
            .into_iter()
            .map(|trixel| (trixel, handle.clone()))
            .collect();
        Ok(AuthorityTable(table))
    }
}
