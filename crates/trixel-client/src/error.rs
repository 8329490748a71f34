//! Error types for trixel-client.

use thiserror::Error;
use trixel_htm::{HtmError, TrixelId};

use crate::persist::PersistError;
use crate::transport::{AuthorityId, TransportError};

/// Result type for trixel-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating, resolving or synchronizing.
#[derive(Debug, Error)]
pub enum Error {
    /// A sensor count query failed during trixel negotiation.
    #[error("failed to negotiate trixels at level {level} (trixel {trixel}): {source}")]
    Negotiation {
        level: u8,
        trixel: TrixelId,
        #[source]
        source: TransportError,
    },

    /// The location could not be mapped onto the mesh.
    #[error("geometry error: {0}")]
    Geometry(#[from] HtmError),

    /// The discovery service could not name the authority for a trixel.
    #[error("failed to retrieve the authority responsible for trixel {trixel}: {source}")]
    AuthorityLookup {
        trixel: TrixelId,
        #[source]
        source: TransportError,
    },

    /// Negotiated trixels are managed by more than one authority.
    #[error("only a single authority is supported: trixel {trixel} is managed by {found}, expected {expected}")]
    TopologyUnsupported {
        trixel: TrixelId,
        expected: AuthorityId,
        found: AuthorityId,
    },

    /// The authority could not be reached or did not answer its ping.
    #[error("authority {authority} at {host} is unavailable: {source}")]
    AuthorityUnavailable {
        authority: AuthorityId,
        host: String,
        #[source]
        source: TransportError,
    },

    /// The authority refused to create the station.
    #[error("failed to register at authority {authority}: {source}")]
    RegistrationRejected {
        authority: AuthorityId,
        #[source]
        source: TransportError,
    },

    /// The authority created the station with a different k requirement.
    #[error("authority {authority} registered k = {echoed}, requested k = {requested}")]
    RegistrationMismatch {
        authority: AuthorityId,
        requested: u32,
        echoed: u32,
    },

    /// Registration attempted while credentials are stored.
    #[error("station is already registered")]
    AlreadyRegistered,

    /// Station details could not be fetched.
    #[error("failed to fetch station details from authority {authority}: {source}")]
    StationDetail {
        authority: AuthorityId,
        #[source]
        source: TransportError,
    },

    /// The authority refused the k requirement update.
    #[error("failed to synchronize settings with authority {authority}: {source}")]
    SyncRejected {
        authority: AuthorityId,
        #[source]
        source: TransportError,
    },

    /// The authority did not apply the requested k requirement.
    #[error("authority {authority} reports k = {echoed} after update, expected {requested}")]
    SyncMismatch {
        authority: AuthorityId,
        requested: u32,
        echoed: u32,
    },

    /// The authority refused to delete the station.
    #[error("failed to delete measurement station at authority {authority}: {source}")]
    Deregistration {
        authority: AuthorityId,
        #[source]
        source: TransportError,
    },

    /// The operation needs stored station credentials.
    #[error("station is not registered")]
    NotRegistered,

    /// The operation needs a resolved authority.
    #[error("no authority has been resolved")]
    NoAuthority,

    /// The configuration could not be persisted.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A transport could not be set up.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Trixel negotiation failed.
    Negotiation,
    /// More than one authority is responsible.
    TopologyUnsupported,
    /// Authority lookup or liveness check failed.
    AuthorityUnavailable,
    /// Station creation failed.
    Registration,
    /// Station detail or k requirement sync failed.
    Sync,
    /// Station deletion failed.
    Deregistration,
    /// Operation is not valid in the current client state.
    State,
    /// Configuration could not be persisted.
    Persistence,
    /// Configuration or location is invalid.
    Configuration,
    /// Transport setup failed.
    Transport,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Negotiation { .. } => ErrorKind::Negotiation,
            Self::Geometry(_) | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::AuthorityLookup { .. } | Self::AuthorityUnavailable { .. } => {
                ErrorKind::AuthorityUnavailable
            }
            Self::TopologyUnsupported { .. } => ErrorKind::TopologyUnsupported,
            Self::RegistrationRejected { .. }
            | Self::RegistrationMismatch { .. }
            | Self::AlreadyRegistered => ErrorKind::Registration,
            Self::StationDetail { .. } | Self::SyncRejected { .. } | Self::SyncMismatch { .. } => {
                ErrorKind::Sync
            }
            Self::Deregistration { .. } => ErrorKind::Deregistration,
            Self::NotRegistered | Self::NoAuthority => ErrorKind::State,
            Self::Persist(_) => ErrorKind::Persistence,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}
