//! Trixel identifiers.
//!
//! An id is a bit string: a leading `1`, one bit for the hemisphere, two bits
//! for the root triangle, then two bits per level for the child index. Level 0
//! ids therefore occupy 4 bits (8..=15) and each level adds 2 bits.

use crate::error::{HtmError, Result};
use crate::{CHILDREN_PER_TRIXEL, MAX_LEVEL};

/// Identifier of a trixel at some level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u64", into = "u64"))]
pub struct TrixelId(u64);

impl TrixelId {
    /// Validate a raw id.
    pub fn new(raw: u64) -> Result<Self> {
        let bits = u64::BITS - raw.leading_zeros();
        if bits < 4 || bits % 2 != 0 || (bits - 4) / 2 > MAX_LEVEL as u32 {
            return Err(HtmError::InvalidTrixelId(raw));
        }
        Ok(Self(raw))
    }

    /// Level 0 trixel by root index (0..8, southern first).
    pub(crate) const fn root(index: u64) -> Self {
        Self(8 + index)
    }

    /// Get the raw id value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Subdivision level of this trixel.
    pub const fn level(&self) -> u8 {
        let bits = u64::BITS - self.0.leading_zeros();
        ((bits - 4) / 2) as u8
    }

    /// Containing trixel one level up, `None` for roots.
    pub const fn parent(&self) -> Option<Self> {
        if self.level() == 0 {
            None
        } else {
            Some(Self(self.0 >> 2))
        }
    }

    /// Ancestor at the given level (or self at its own level).
    pub fn ancestor(&self, level: u8) -> Result<Self> {
        let own = self.level();
        if level > own {
            return Err(HtmError::LevelOutOfRange { level, max: own });
        }
        Ok(Self(self.0 >> (2 * (own - level) as u32)))
    }

    /// The four children, `None` at the deepest level.
    pub fn children(&self) -> Option<[Self; 4]> {
        if self.level() >= MAX_LEVEL {
            return None;
        }
        let base = self.0 * CHILDREN_PER_TRIXEL;
        Some([Self(base), Self(base + 1), Self(base + 2), Self(base + 3)])
    }

    /// Check whether `other` lies inside this trixel (a trixel contains itself).
    pub fn contains(&self, other: &Self) -> bool {
        let own = self.level();
        other.level() >= own && other.ancestor(own).map_or(false, |a| a == *self)
    }

    /// Conventional name, e.g. `N32` or `S0012`.
    pub fn name(&self) -> String {
        let level = self.level() as usize;
        let mut name = String::with_capacity(level + 2);
        let root = self.0 >> (2 * level);
        name.push(if root < 12 { 'S' } else { 'N' });
        name.push(char::from(b'0' + (root & 3) as u8));
        for shift in (0..level).rev() {
            let digit = (self.0 >> (2 * shift)) & 3;
            name.push(char::from(b'0' + digit as u8));
        }
        name
    }
}

impl TryFrom<u64> for TrixelId {
    type Error = HtmError;

    fn try_from(value: u64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TrixelId> for u64 {
    fn from(value: TrixelId) -> Self {
        value.0
    }
}

impl std::str::FromStr for TrixelId {
    type Err = HtmError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s
            .trim()
            .parse::<u64>()
            .map_err(|_| HtmError::InvalidTrixelId(0))?;
        Self::new(raw)
    }
}

impl std::fmt::Display for TrixelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
