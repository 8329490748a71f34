//! Hierarchical Triangular Mesh
//!
//! Addressing of points on the unit sphere with nested spherical triangles
//! ("trixels").
//!
//! # Structure
//!
//! The sphere is first split into the 8 faces of an inscribed octahedron.
//! These are the level 0 trixels, 4 in the southern and 4 in the northern
//! hemisphere. Every trixel is then split recursively into 4 children by
//! connecting the midpoints of its edges:
//!
//! - Level 0: 8 trixels, ids 8..=15
//! - Level n: 8 * 4^n trixels, each id is `parent * 4 + child`
//!
//! A location is resolved by descending from its root trixel, so the trixel at
//! level n + 1 is always a child of the trixel at level n for the same location.

mod coordinate;
mod error;
mod mesh;
mod trixel;
mod vector;

pub use coordinate::Coordinate;
pub use error::{HtmError, Result};
pub use mesh::{lookup, trixel_at, Triangle};
pub use trixel::TrixelId;
pub use vector::Vector3;

/// Deepest supported subdivision level.
pub const MAX_LEVEL: u8 = 24;

/// Number of level 0 trixels (faces of the octahedron).
pub const ROOT_TRIXELS: u64 = 8;

/// Children per trixel.
pub const CHILDREN_PER_TRIXEL: u64 = 4;

// Level MAX_LEVEL ids need 4 + 2 * MAX_LEVEL bits
const _: () = assert!(4 + 2 * (MAX_LEVEL as u32) <= u64::BITS);

/// Number of trixels at the given level.
pub const fn trixels_at_level(level: u8) -> u64 {
    ROOT_TRIXELS << (2 * level as u32)
}
