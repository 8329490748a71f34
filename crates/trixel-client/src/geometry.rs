//! Location to trixel mapping used by negotiation.

use trixel_htm::{Coordinate, HtmError, TrixelId};

/// Maps a location to the trixel containing it at a level.
///
/// Implementations must be deterministic, and the trixel at level `n + 1`
/// must lie inside the trixel at level `n` for the same location.
pub trait Geometry: Send + Sync {
    fn trixel_at(&self, location: &Coordinate, level: u8) -> Result<TrixelId, HtmError>;
}

/// Hierarchical Triangular Mesh geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmGeometry;

impl Geometry for HtmGeometry {
    fn trixel_at(&self, location: &Coordinate, level: u8) -> Result<TrixelId, HtmError> {
        trixel_htm::trixel_at(location, level)
    }
}
