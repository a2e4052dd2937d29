// =============================================================================
// Shared primitive types
// =============================================================================
//
// Prices are always integer tick counts relative to an InstrumentContext; the
// core never touches a floating-point price directly.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the book an order or trade aggressor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BID"),
            Side::Ask => write!(f, "ASK"),
        }
    }
}

/// Trade direction implied by a detection or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    /// An iceberg/absorption on the bid implies long conviction; on the ask,
    /// short conviction.
    pub fn from_side(side: Side) -> Direction {
        match side {
            Side::Bid => Direction::Long,
            Side::Ask => Direction::Short,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Opaque order identity as handed to us by the market-data collaborator.
pub type OrderId = u64;

/// Integer tick-price. Always relative to the owning InstrumentContext's tick size.
pub type Ticks = i64;

/// Nanosecond timestamp. Not assumed to be wall-clock; the router treats large
/// backward jumps as a replay boundary (see `router::EventRouter::on_tick`).
pub type TimestampNs = i64;
