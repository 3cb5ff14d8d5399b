//! Controller state with deterministic hashing for replay validation.

use serde::{Deserialize, Serialize};

use super::events::{Effect, ListenerId, Timestamp, TimerToken};

/// One continuous viewing interval of one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewRecord {
    pub page_index: usize,
    pub viewing_time: u64,
}

impl ViewRecord {
    pub fn new(page_index: usize, viewing_time: u64) -> Self {
        Self {
            page_index,
            viewing_time,
        }
    }
}

/// Terminal output of one trial, delivered exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    pub view_history: Vec<ViewRecord>,
    /// Milliseconds from trial start to the final forward transition
    pub rt: u64,
}

impl TrialResult {
    pub fn total_viewing_time(&self) -> u64 {
        self.view_history.iter().map(|r| r.viewing_time).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Viewing { page: usize },
    Finished,
}

/// An armed navigation gate. Held only while its page is on screen.
///
/// Leaving the page must go through [`DelayGate::release`], which yields the
/// cancel effect for the host; a fired gate is consumed by the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayGate {
    pub token: TimerToken,
    pub page: usize,
    pub delay_ms: u64,
}

impl DelayGate {
    pub fn arm(token: TimerToken, page: usize, delay_ms: u64) -> (Self, Effect) {
        (
            Self {
                token,
                page,
                delay_ms,
            },
            Effect::ArmGate { token, delay_ms },
        )
    }

    pub fn release(self) -> Effect {
        Effect::CancelGate { token: self.token }
    }
}

/// Complete controller state for one trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavState {
    pub phase: Phase,
    pub navigation_enabled: bool,
    /// Append-only; one entry per page visit
    pub view_history: Vec<ViewRecord>,

    /// Latest clock reading seen (never moves backwards)
    pub now: Timestamp,
    pub start_time: Timestamp,
    pub last_transition_time: Timestamp,
    pub page_start_time: Timestamp,

    pub gate: Option<DelayGate>,
    pub key_listener: Option<ListenerId>,

    /// Source for timer tokens and listener ids
    pub next_id: u64,
    /// Sequence number for determinism
    pub seq: u64,
}

impl NavState {
    pub fn new(now: Timestamp) -> Self {
        Self {
            phase: Phase::Viewing { page: 0 },
            navigation_enabled: false,
            view_history: Vec::new(),
            now,
            start_time: now,
            last_transition_time: now,
            page_start_time: now,
            gate: None,
            key_listener: None,
            next_id: 0,
            seq: 0,
        }
    }

    pub fn current_page(&self) -> Option<usize> {
        match self.phase {
            Phase::Viewing { page } => Some(page),
            Phase::Finished => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn next_token(&mut self) -> TimerToken {
        self.next_id += 1;
        TimerToken(self.next_id)
    }

    pub fn next_listener(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    /// Elapsed time since `since`, rounded to whole milliseconds
    pub fn elapsed_ms(&self, since: Timestamp) -> u64 {
        (self.now - since).max(0.0).round() as u64
    }

    /// Deterministic hash of the replay-relevant state
    pub fn hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut h = DefaultHasher::new();

        self.phase.hash(&mut h);
        self.navigation_enabled.hash(&mut h);
        self.view_history.hash(&mut h);
        self.seq.hash(&mut h);

        // Timestamps quantized to microseconds to avoid float comparison issues
        for ts in [
            self.now,
            self.start_time,
            self.last_transition_time,
            self.page_start_time,
        ] {
            ((ts * 1e3).round() as i64).hash(&mut h);
        }

        self.gate.map(|g| g.token).hash(&mut h);
        self.key_listener.hash(&mut h);

        h.finish()
    }
}
