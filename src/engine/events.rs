//! Canonical typed events and effects for deterministic replay.

use serde::{Deserialize, Serialize};

use super::state::TrialResult;
use super::view::{Frame, NavControls};
use crate::logging::{Domain, Level};

/// Monotonic clock reading in milliseconds, fractional
pub type Timestamp = f64;

/// Identifies one armed delay-gate timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerToken(pub u64);

/// Identifies one armed one-shot keyboard listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Clickable navigation controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavControl {
    Previous,
    Next,
}

/// All events that can affect controller state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Input(InputEvent),
    Sys(SysEvent),
}

impl Event {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Event::Input(e) => e.timestamp(),
            Event::Sys(e) => e.timestamp(),
        }
    }

    pub fn key(ts: Timestamp, key: impl Into<String>) -> Self {
        Event::Input(InputEvent::Key {
            ts,
            key: key.into(),
        })
    }

    pub fn click(ts: Timestamp, control: NavControl) -> Self {
        Event::Input(InputEvent::Click { ts, control })
    }

    pub fn gate_open(ts: Timestamp, token: TimerToken) -> Self {
        Event::Sys(SysEvent::GateOpen { ts, token })
    }
}

/// Participant input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Key { ts: Timestamp, key: String },
    Click { ts: Timestamp, control: NavControl },
}

impl InputEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            InputEvent::Key { ts, .. } => *ts,
            InputEvent::Click { ts, .. } => *ts,
        }
    }
}

/// Timer / host events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SysEvent {
    /// The delay gate armed with `token` has elapsed
    GateOpen { ts: Timestamp, token: TimerToken },
}

impl SysEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            SysEvent::GateOpen { ts, .. } => *ts,
        }
    }
}

/// Instructions from the reducer to its host
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Overwrite the render target with a new page
    Render(Frame),
    /// Redraw only the navigation controls of the current page
    RefreshControls(NavControls),
    /// Schedule a one-shot `GateOpen` after `delay_ms`
    ArmGate { token: TimerToken, delay_ms: u64 },
    /// Drop a scheduled `GateOpen` that has not fired yet
    CancelGate { token: TimerToken },
    /// Listen for exactly one of `valid_keys`
    ArmKeyListener {
        listener: ListenerId,
        valid_keys: Vec<String>,
    },
    CancelKeyListener { listener: ListenerId },
    PageChanged { page: usize },
    Finish(TrialResult),
    Log {
        level: Level,
        domain: Domain,
        event: &'static str,
        msg: String,
    },
}
