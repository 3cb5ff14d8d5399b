//! Translate a view history into the input events that would produce it.

use crate::engine::config::NavConfig;
use crate::engine::events::{Event, NavControl, Timestamp};
use crate::engine::state::ViewRecord;
use crate::simulate::SimError;

/// How scripted navigation reaches the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputChannel {
    Keys,
    Clicks,
}

impl InputChannel {
    /// Keys win when both are available
    pub fn for_config(cfg: &NavConfig) -> Result<Self, SimError> {
        if cfg.allow_keys {
            Ok(InputChannel::Keys)
        } else if cfg.show_clickable_nav {
            Ok(InputChannel::Clicks)
        } else {
            Err(SimError::NoInputChannel)
        }
    }

    pub fn forward(&self, cfg: &NavConfig, ts: Timestamp) -> Event {
        match self {
            InputChannel::Keys => Event::key(ts, cfg.key_forward.clone()),
            InputChannel::Clicks => Event::click(ts, NavControl::Next),
        }
    }

    pub fn backward(&self, cfg: &NavConfig, ts: Timestamp) -> Event {
        match self {
            InputChannel::Keys => Event::key(ts, cfg.key_backward.clone()),
            InputChannel::Clicks => Event::click(ts, NavControl::Previous),
        }
    }
}

/// One forward/backward input per visit, stamped at the cumulative end of that
/// visit relative to `origin`. The last visit always advances.
pub fn script_from_history(
    cfg: &NavConfig,
    history: &[ViewRecord],
    origin: Timestamp,
) -> Result<Vec<Event>, SimError> {
    let channel = InputChannel::for_config(cfg)?;
    let mut events = Vec::with_capacity(history.len());
    let mut t = origin;
    let mut curr = 0usize;

    for (i, record) in history.iter().enumerate() {
        let at = t + record.viewing_time as f64;
        match history.get(i + 1) {
            None => events.push(channel.forward(cfg, at)),
            Some(next) => {
                if next.page_index > curr {
                    events.push(channel.forward(cfg, at));
                } else if next.page_index < curr {
                    events.push(channel.backward(cfg, at));
                }
                t = at;
                curr = next.page_index;
            }
        }
    }

    Ok(events)
}
