//! Trixel negotiation.
//!
//! Finds, per measurement type, the finest trixel around the station that
//! still holds at least `k` sensors of that type.
//!
//! # Walk
//!
//! Every type starts at the level 0 trixel, which covers an eighth of the
//! sphere and is always acceptable. Levels are then visited coarse to fine.
//! At each level the discovery service is asked once for the counts of all
//! types, and every type whose count is at least `k` moves down to that
//! trixel. Finer trixels are subsets of coarser ones, so counts never grow
//! with depth: once no type qualifies at a level, no deeper level can help and
//! the walk stops.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;

use tracing::{debug, info};
use trixel_htm::{Coordinate, TrixelId};

use crate::config::MeasurementType;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::transport::DiscoveryService;

/// Number of levels visited during negotiation (levels 0..20).
pub const MAX_NEGOTIATION_LEVELS: u8 = 20;

/// Trixel each measurement type contributes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrixelAssignment(BTreeMap<MeasurementType, TrixelId>);

impl TrixelAssignment {
    /// Trixel assigned to a type.
    pub fn get(&self, measurement_type: MeasurementType) -> Option<TrixelId> {
        self.0.get(&measurement_type).copied()
    }

    /// All (type, trixel) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (MeasurementType, TrixelId)> + '_ {
        self.0.iter().map(|(t, id)| (*t, *id))
    }

    /// Distinct trixels, ordered by id.
    pub fn trixels(&self) -> BTreeSet<TrixelId> {
        self.0.values().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Walks trixel levels against the discovery service.
pub struct TrixelNegotiator<'a> {
    discovery: &'a dyn DiscoveryService,
    geometry: &'a dyn Geometry,
    max_levels: u8,
}

impl<'a> TrixelNegotiator<'a> {
    /// Create a negotiator visiting [`MAX_NEGOTIATION_LEVELS`] levels.
    pub fn new(discovery: &'a dyn DiscoveryService, geometry: &'a dyn Geometry) -> Self {
        Self {
            discovery,
            geometry,
            max_levels: MAX_NEGOTIATION_LEVELS,
        }
    }

    /// Visit only levels `0..max_levels`.
    #[must_use]
    pub fn with_max_levels(mut self, max_levels: u8) -> Self {
        self.max_levels = max_levels.max(1);
        self
    }

    /// Negotiate trixels for `types` so each holds at least `k` sensors.
    ///
    /// Fails without a partial result if any discovery query fails.
    pub async fn negotiate(
        &self,
        location: &Coordinate,
        k: NonZeroU32,
        types: &[MeasurementType],
    ) -> Result<TrixelAssignment> {
        if types.is_empty() {
            return Ok(TrixelAssignment::default());
        }

        let root = self.geometry.trixel_at(location, 0)?;
        let mut trixels: BTreeMap<MeasurementType, TrixelId> =
            types.iter().map(|t| (*t, root)).collect();

        for level in 0..self.max_levels {
            let trixel = self.geometry.trixel_at(location, level)?;
            let counts = self
                .discovery
                .sensor_count(trixel, types)
                .await
                .map_err(|source| Error::Negotiation {
                    level,
                    trixel,
                    source,
                })?;

            let mut satisfied = false;
            for t in types {
                if counts.get(*t) >= u64::from(k.get()) {
                    satisfied = true;
                    trixels.insert(*t, trixel);
                }
            }

            if !satisfied {
                debug!(level, %trixel, k = k.get(), "no measurement type satisfies k, stopping");
                break;
            }
        }

        for (t, trixel) in &trixels {
            info!(
                measurement_type = %t,
                trixel = %trixel,
                level = trixel.level(),
                "negotiated trixel"
            );
        }

        Ok(TrixelAssignment(trixels))
    }
}
