// =============================================================================
// Session & Phase State Machine
// =============================================================================
//
// Transitions are driven purely by wall-clock comparisons on each
// tick/trade/BBO event. A transition into PreMarket resets all
// session-scoped indicators; the six boundary times and reference timezone
// come from a pluggable `PhaseSchedule` rather than being hard-coded, since
// futures venues trade nearly 24 hours and an equities-style day does not
// generalize.
// =============================================================================

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PhaseSchedule;
use crate::types::TimestampNs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    PreMarket,
    OpeningRange,
    Morning,
    Lunch,
    Afternoon,
    Close,
    PostMarket,
}

/// Returned when `on_tick` observes a phase boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// True on any transition into PreMarket, including a wall-clock replay
    /// reset — session-scoped indicators must reset on this signal.
    pub session_reset: bool,
    /// True only when this transition was forced by an anomalous backward
    /// wall-clock jump, as opposed to the ordinary daily Close->PostMarket->
    /// PreMarket cycle. The router counts only this case as a wall-clock
    /// regression (§7); the daily cycle is expected behavior.
    pub replay: bool,
}

pub struct SessionMachine {
    schedule: PhaseSchedule,
    current: Phase,
    last_ts: TimestampNs,
}

fn minute_of_day(ts: TimestampNs, utc_offset_minutes: i32) -> u32 {
    let dt: DateTime<Utc> = Utc.timestamp_nanos(ts);
    let total_minutes = dt.format("%H").to_string().parse::<i64>().unwrap_or(0) * 60
        + dt.format("%M").to_string().parse::<i64>().unwrap_or(0);
    let shifted = (total_minutes + utc_offset_minutes as i64).rem_euclid(24 * 60);
    shifted as u32
}

fn classify_minute(minute: u32, schedule: &PhaseSchedule) -> Phase {
    if minute < schedule.pre_market_end_minute {
        Phase::PreMarket
    } else if minute < schedule.opening_range_end_minute {
        Phase::OpeningRange
    } else if minute < schedule.lunch_start_minute {
        Phase::Morning
    } else if minute < schedule.lunch_end_minute {
        Phase::Lunch
    } else if minute < schedule.close_start_minute {
        Phase::Afternoon
    } else if minute < schedule.post_market_start_minute {
        Phase::Close
    } else {
        Phase::PostMarket
    }
}

impl SessionMachine {
    pub fn new(schedule: PhaseSchedule) -> Self {
        Self {
            schedule,
            current: Phase::PreMarket,
            last_ts: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.current
    }

    /// Evaluate the current wall clock against the schedule. A backward jump
    /// of more than one second is treated as a replay event: the router
    /// resets session boundaries from wall clock and continues (see the
    /// router's time-regression handling).
    pub fn on_tick(&mut self, ts: TimestampNs) -> Option<PhaseTransition> {
        let replay = self.last_ts - ts > 1_000_000_000;
        self.last_ts = ts;

        let minute = minute_of_day(ts, self.schedule.utc_offset_minutes);
        let classified = classify_minute(minute, &self.schedule);

        let target = if replay { Phase::PreMarket } else { classified };

        if target == self.current && !replay {
            return None;
        }

        let transition = PhaseTransition {
            from: self.current,
            to: target,
            session_reset: target == Phase::PreMarket,
            replay,
        };
        info!(from = ?transition.from, to = ?transition.to, replay, "session phase transition");
        self.current = target;
        Some(transition)
    }
}
