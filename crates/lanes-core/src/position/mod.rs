//! Fixed-point positions and the rules that assign them.
//!
//! Positions are stored as `i64` raw units where [`Position::UNIT`] raw units
//! are the user-visible value `1`. Halving and averaging happen in integer
//! arithmetic, so running out of room is detected exactly instead of being
//! lost to floating-point rounding; the allocator renumbers the lane when a
//! new slot would sit closer than the configured minimum gap to a neighbour.

pub mod allocator;
pub mod archive;

pub use allocator::{Allocation, PositionAllocator, PositionPolicy};
pub use archive::ArchiveGate;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-point ordering value inside one partition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(i64);

impl Position {
    /// Raw units per whole position.
    pub const UNIT: i64 = 1 << 16;

    /// Sentinel held by every archived item.
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// The position of the `n`th slot in a freshly numbered lane (1-based).
    #[must_use]
    pub const fn nth(n: i64) -> Self {
        Self(n.saturating_mul(Self::UNIT))
    }

    /// Halve toward zero.
    #[must_use]
    pub const fn halved(self) -> Self {
        Self(self.0 / 2)
    }

    /// The next whole slot after `self`, or `None` on overflow.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(Self::UNIT) {
            Some(raw) => Some(Self(raw)),
            None => None,
        }
    }

    /// Integer midpoint of two positions, rounded toward `lower`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn midpoint(lower: Self, upper: Self) -> Self {
        let sum = lower.0 as i128 + upper.0 as i128;
        Self((sum / 2) as i64)
    }

    /// Distance in raw units from `self` up to `other`.
    #[must_use]
    pub const fn gap_to(self, other: Self) -> i64 {
        other.0.saturating_sub(self.0)
    }

    /// User-visible value (`raw / UNIT`).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::UNIT as f64
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

impl ToSql for Position {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Position {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::Position;

    #[test]
    fn display_uses_whole_units() {
        assert_eq!(Position::nth(3).to_string(), "3");
        assert_eq!(Position::nth(1).halved().to_string(), "0.5");
        assert_eq!(Position::ZERO.to_string(), "0");
    }

    #[test]
    fn midpoint_rounds_toward_lower() {
        let lower = Position::from_raw(10);
        let upper = Position::from_raw(13);
        assert_eq!(Position::midpoint(lower, upper), Position::from_raw(11));
        assert_eq!(
            Position::midpoint(Position::nth(1), Position::nth(2)).as_f64(),
            1.5
        );
    }

    #[test]
    fn checked_next_detects_overflow() {
        assert_eq!(Position::nth(1).checked_next(), Some(Position::nth(2)));
        assert_eq!(Position::from_raw(i64::MAX).checked_next(), None);
    }

    #[test]
    fn halving_reaches_zero() {
        let mut position = Position::nth(1);
        let mut steps = 0;
        while position.raw() > 0 {
            position = position.halved();
            steps += 1;
        }
        assert_eq!(steps, 17);
    }
}
