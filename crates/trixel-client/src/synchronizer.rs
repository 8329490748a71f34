//! Station registration and settings synchronization.
//!
//! Keeps the station's identity and k requirement at its authority in line
//! with the local configuration. Credentials returned by the authority are
//! persisted before anything else is sent to it.

use tracing::{error, info};

use crate::config::{ClientConfig, StationCredentials};
use crate::error::{Error, Result};
use crate::persist::ConfigPersister;
use crate::resolver::AuthorityHandle;

/// Registration state of a station at its authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    /// No credentials are stored.
    Unregistered,
    /// Registered, but the authority holds a different k requirement.
    OutOfSync,
    /// Registered with the local k requirement.
    InSync,
    /// The station was deleted at its authority.
    Deregistered,
}

/// What a [`StationSynchronizer::sync`] run had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// A new station was created.
    pub registered: bool,
    /// The remote k requirement was updated.
    pub updated: bool,
}

/// Synchronizes one station with one authority.
pub struct StationSynchronizer<'a> {
    authority: &'a AuthorityHandle,
    persister: &'a dyn ConfigPersister,
}

impl<'a> StationSynchronizer<'a> {
    pub fn new(authority: &'a AuthorityHandle, persister: &'a dyn ConfigPersister) -> Self {
        Self {
            authority,
            persister,
        }
    }

    /// Create the station at the authority and persist its credentials.
    ///
    /// Fails with [`Error::AlreadyRegistered`] when credentials are stored.
    /// Nothing is stored unless the authority echoes the requested k.
    pub async fn register(&self, config: &mut ClientConfig) -> Result<StationCredentials> {
        if config.station.is_some() {
            return Err(Error::AlreadyRegistered);
        }

        let authority = self.authority.id();
        let requested = config.k.get();
        let created = self
            .authority
            .service
            .create_station(requested)
            .await
            .map_err(|source| {
                error!(%authority, error = %source, "failed to register at authority");
                Error::RegistrationRejected { authority, source }
            })?;

        if created.k_requirement != requested {
            error!(
                %authority,
                requested,
                echoed = created.k_requirement,
                "authority is not using the desired k requirement"
            );
            return Err(Error::RegistrationMismatch {
                authority,
                requested,
                echoed: created.k_requirement,
            });
        }

        let credentials = StationCredentials {
            station_id: created.station_id,
            token: created.token,
        };
        config.station = Some(credentials.clone());
        self.persister.persist(config)?;

        info!(%authority, station_id = %credentials.station_id, "registered measurement station");
        Ok(credentials)
    }

    /// Current status of the station, fetched from the authority when registered.
    pub async fn status(&self, config: &ClientConfig) -> Result<StationStatus> {
        let Some(credentials) = &config.station else {
            return Ok(StationStatus::Unregistered);
        };
        let authority = self.authority.id();
        let detail = self
            .authority
            .service
            .station_detail(&credentials.token)
            .await
            .map_err(|source| Error::StationDetail { authority, source })?;

        Ok(if detail.k_requirement == config.k.get() {
            StationStatus::InSync
        } else {
            StationStatus::OutOfSync
        })
    }

    /// Register if needed, then bring the remote k requirement in line.
    ///
    /// No update is sent when the authority already holds the local k.
    pub async fn sync(&self, config: &mut ClientConfig) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        if config.station.is_none() {
            self.register(config).await?;
            outcome.registered = true;
        }
        let token = match &config.station {
            Some(credentials) => credentials.token.clone(),
            None => return Err(Error::NotRegistered),
        };

        let authority = self.authority.id();
        let requested = config.k.get();
        let detail = self
            .authority
            .service
            .station_detail(&token)
            .await
            .map_err(|source| {
                error!(%authority, error = %source, "failed to fetch station details");
                Error::StationDetail { authority, source }
            })?;

        if detail.k_requirement != requested {
            let updated = self
                .authority
                .service
                .update_station(&token, requested)
                .await
                .map_err(|source| {
                    error!(%authority, error = %source, "failed to synchronize settings");
                    Error::SyncRejected { authority, source }
                })?;
            if updated.k_requirement != requested {
                error!(
                    %authority,
                    requested,
                    echoed = updated.k_requirement,
                    "authority did not apply the k requirement"
                );
                return Err(Error::SyncMismatch {
                    authority,
                    requested,
                    echoed: updated.k_requirement,
                });
            }
            outcome.updated = true;
        }

        info!(
            %authority,
            k = requested,
            registered = outcome.registered,
            updated = outcome.updated,
            "synchronized with authority"
        );
        Ok(outcome)
    }

    /// Delete the station at the authority, then drop and persist its credentials.
    ///
    /// Credentials are kept when the authority refuses.
    pub async fn deregister(&self, config: &mut ClientConfig) -> Result<StationStatus> {
        let Some(credentials) = &config.station else {
            return Err(Error::NotRegistered);
        };
        let authority = self.authority.id();
        self.authority
            .service
            .delete_station(&credentials.token)
            .await
            .map_err(|source| {
                error!(%authority, error = %source, "failed to delete measurement station");
                Error::Deregistration { authority, source }
            })?;

        config.station = None;
        self.persister.persist(config)?;
        info!(%authority, "removed measurement station");
        Ok(StationStatus::Deregistered)
    }
}
