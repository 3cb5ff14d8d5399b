use std::collections::HashSet;
use std::fmt;

use crate::engine::config::NavConfig;
use crate::engine::state::{NavState, Phase, TrialResult, ViewRecord};

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub msg: String,
}

impl InvariantViolation {
    fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violated: {}", self.msg)
    }
}

impl std::error::Error for InvariantViolation {}

/// Controller state between events
pub fn assert_state_invariants(state: &NavState, cfg: &NavConfig) -> Result<(), InvariantViolation> {
    match state.phase {
        Phase::Finished => {
            if state.gate.is_some() {
                return Err(InvariantViolation::new("gate still armed after finish"));
            }
            if state.key_listener.is_some() {
                return Err(InvariantViolation::new("key listener live after finish"));
            }
        }
        Phase::Viewing { page } => {
            if page >= cfg.page_count() {
                return Err(InvariantViolation::new(format!(
                    "current page {} out of range",
                    page
                )));
            }
            if let Some(gate) = &state.gate {
                if gate.page != page {
                    return Err(InvariantViolation::new("gate armed for another page"));
                }
            }
            if state.navigation_enabled == state.gate.is_some() {
                return Err(InvariantViolation::new(
                    "navigation_enabled disagrees with gate",
                ));
            }
        }
    }
    Ok(())
}

/// Shape of a finished trial: a walk of adjacent pages from the first to
/// the last, covering every page, with `rt` matching the recorded times up
/// to rounding.
pub fn check_trial_result(cfg: &NavConfig, result: &TrialResult) -> Result<(), InvariantViolation> {
    let n = cfg.page_count();
    let history = &result.view_history;

    let first = history
        .first()
        .ok_or_else(|| InvariantViolation::new("empty view history"))?;
    if first.page_index != 0 {
        return Err(InvariantViolation::new("history does not start on page 0"));
    }
    if let Some(bad) = history.iter().find(|r| r.page_index >= n) {
        return Err(InvariantViolation::new(format!(
            "page_index {} out of range",
            bad.page_index
        )));
    }

    for pair in history.windows(2) {
        let (from, to) = (pair[0].page_index, pair[1].page_index);
        if to == from + 1 {
            continue;
        }
        if to + 1 == from {
            if !cfg.allow_backward {
                return Err(InvariantViolation::new("backward step with allow_backward off"));
            }
            continue;
        }
        return Err(InvariantViolation::new(format!(
            "non-adjacent step {} -> {}",
            from, to
        )));
    }

    if history.last().map(|r| r.page_index) != Some(n - 1) {
        return Err(InvariantViolation::new("history does not end on the last page"));
    }

    let seen: HashSet<usize> = history.iter().map(|r| r.page_index).collect();
    if seen.len() != n {
        return Err(InvariantViolation::new("not every page was viewed"));
    }

    let sum: u64 = history.iter().map(|r| r.viewing_time).sum();
    if sum.abs_diff(result.rt) > history.len() as u64 {
        return Err(InvariantViolation::new(format!(
            "rt {} differs from summed viewing time {}",
            result.rt, sum
        )));
    }
    Ok(())
}

/// No visit shorter than its page delay
pub fn check_gate_respected(cfg: &NavConfig, history: &[ViewRecord]) -> Result<(), InvariantViolation> {
    for record in history {
        let delay = cfg.delay_for(record.page_index);
        if record.viewing_time < delay {
            return Err(InvariantViolation::new(format!(
                "page {} left after {}ms, delay is {}ms",
                record.page_index, record.viewing_time, delay
            )));
        }
    }
    Ok(())
}
