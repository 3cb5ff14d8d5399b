//! Pure reducer: (State, Event) -> (State, Vec<Effect>)
//!
//! This is the core of deterministic replay.
//! All navigation transitions happen here.
//!
//! | From       | Trigger       | Guard                                   | To                     |
//! |------------|---------------|-----------------------------------------|------------------------|
//! | Viewing(i) | forward       | `navigation_enabled`                    | Viewing(i+1) / Finished |
//! | Viewing(i) | backward      | `navigation_enabled && allow_backward && i > 0` | Viewing(i-1)   |
//! | Viewing(i) | gate fires    | token belongs to the live gate          | Viewing(i), enabled    |
//! | any        | gated input   | -                                       | unchanged, dropped     |

use super::config::{ConfigError, NavConfig};
use super::events::*;
use super::state::*;
use super::view::{Frame, NavControls};
use crate::logging::{Domain, Level};

/// Result of processing an event
#[derive(Debug)]
pub struct ReducerOutput {
    pub effects: Vec<Effect>,
    pub state_hash: u64,
}

impl ReducerOutput {
    pub fn finished(&self) -> Option<&TrialResult> {
        self.effects.iter().find_map(|e| match e {
            Effect::Finish(result) => Some(result),
            _ => None,
        })
    }
}

/// Validate the config and enter page 0.
pub fn start(cfg: &NavConfig, now: Timestamp) -> Result<(NavState, ReducerOutput), ConfigError> {
    cfg.validate()?;

    let mut state = NavState::new(now);
    let mut effects = Vec::new();

    effects.push(Effect::Log {
        level: Level::Info,
        domain: Domain::Nav,
        event: "trial_start",
        msg: format!(
            "pages={} allow_backward={} allow_keys={} clickable={}",
            cfg.page_count(),
            cfg.allow_backward,
            cfg.allow_keys,
            cfg.show_clickable_nav
        ),
    });
    if cfg.has_no_input_channel() {
        effects.push(Effect::Log {
            level: Level::Warn,
            domain: Domain::Input,
            event: "no_input_channel",
            msg: "neither keys nor clickable nav enabled; trial cannot advance".to_string(),
        });
    }

    enter_page(&mut state, cfg, 0, &mut effects);
    if cfg.allow_keys {
        arm_key_listener(&mut state, cfg, &mut effects);
    }

    let state_hash = state.hash();
    Ok((state, ReducerOutput { effects, state_hash }))
}

/// Pure reducer function
pub fn reduce(state: &mut NavState, event: Event, cfg: &NavConfig) -> ReducerOutput {
    let mut effects = Vec::new();

    // Update logical time
    state.now = state.now.max(event.timestamp());
    state.seq += 1;

    if state.is_finished() {
        effects.push(Effect::Log {
            level: Level::Trace,
            domain: Domain::Nav,
            event: "after_finish",
            msg: format!("ignored {:?}", event),
        });
        return ReducerOutput {
            effects,
            state_hash: state.hash(),
        };
    }

    match event {
        Event::Input(InputEvent::Key { key, .. }) => {
            handle_key(state, &key, cfg, &mut effects);
        }
        Event::Input(InputEvent::Click { control, .. }) => {
            handle_click(state, control, cfg, &mut effects);
        }
        Event::Sys(SysEvent::GateOpen { token, .. }) => {
            handle_gate_open(state, token, cfg, &mut effects);
        }
    }

    ReducerOutput {
        effects,
        state_hash: state.hash(),
    }
}

fn handle_key(state: &mut NavState, key: &str, cfg: &NavConfig, effects: &mut Vec<Effect>) {
    if !cfg.allow_keys || state.key_listener.is_none() {
        return;
    }

    let is_backward = cfg.keys_match(key, &cfg.key_backward);
    let is_forward = cfg.keys_match(key, &cfg.key_forward);
    if !is_backward && !is_forward {
        // Not a valid response: the listener stays armed
        return;
    }

    // One-shot listener is consumed by this key
    state.key_listener = None;

    if !state.navigation_enabled {
        effects.push(Effect::Log {
            level: Level::Debug,
            domain: Domain::Input,
            event: "input_gated",
            msg: format!("key {} dropped on page {:?}", key, state.current_page()),
        });
        arm_key_listener(state, cfg, effects);
        return;
    }

    let page = current(state);
    if is_backward && page > 0 && cfg.allow_backward {
        go_backward(state, cfg, effects);
    } else if is_forward {
        go_forward(state, cfg, effects);
    }

    if !state.is_finished() {
        arm_key_listener(state, cfg, effects);
    }
}

fn handle_click(
    state: &mut NavState,
    control: NavControl,
    cfg: &NavConfig,
    effects: &mut Vec<Effect>,
) {
    if !cfg.show_clickable_nav {
        return;
    }

    let controls = NavControls::for_page(cfg, current(state), state.navigation_enabled);
    match control {
        NavControl::Next if controls.next.enabled => go_forward(state, cfg, effects),
        NavControl::Previous if controls.previous_enabled() => go_backward(state, cfg, effects),
        _ => effects.push(Effect::Log {
            level: Level::Debug,
            domain: Domain::Input,
            event: "input_gated",
            msg: format!("click {:?} on disabled control", control),
        }),
    }
}

fn handle_gate_open(
    state: &mut NavState,
    token: TimerToken,
    cfg: &NavConfig,
    effects: &mut Vec<Effect>,
) {
    match state.gate {
        Some(gate) if gate.token == token => {
            // Fired gate is consumed; nothing left to cancel
            state.gate = None;
            state.navigation_enabled = true;
            effects.push(Effect::Log {
                level: Level::Debug,
                domain: Domain::Gate,
                event: "gate_open",
                msg: format!("page {} after {}ms", gate.page, gate.delay_ms),
            });
            if cfg.show_clickable_nav {
                effects.push(Effect::RefreshControls(NavControls::for_page(
                    cfg,
                    gate.page,
                    true,
                )));
            }
        }
        _ => effects.push(Effect::Log {
            level: Level::Trace,
            domain: Domain::Gate,
            event: "stale_gate",
            msg: format!("token {} no longer armed", token.0),
        }),
    }
}

fn go_forward(state: &mut NavState, cfg: &NavConfig, effects: &mut Vec<Effect>) {
    let page = current(state);
    leave_page(state, page, effects);

    let next = page + 1;
    if next >= cfg.page_count() {
        finish(state, effects);
    } else {
        enter_page(state, cfg, next, effects);
        effects.push(Effect::PageChanged { page: next });
    }
}

fn go_backward(state: &mut NavState, cfg: &NavConfig, effects: &mut Vec<Effect>) {
    let page = current(state);
    if page == 0 {
        return;
    }
    leave_page(state, page, effects);
    enter_page(state, cfg, page - 1, effects);
    effects.push(Effect::PageChanged { page: page - 1 });
}

/// Record the visit and release the page's gate on every exit path
fn leave_page(state: &mut NavState, page: usize, effects: &mut Vec<Effect>) {
    let viewing_time = state.elapsed_ms(state.last_transition_time);
    state.view_history.push(ViewRecord::new(page, viewing_time));
    state.last_transition_time = state.now;

    if let Some(gate) = state.gate.take() {
        effects.push(gate.release());
    }
}

fn enter_page(state: &mut NavState, cfg: &NavConfig, page: usize, effects: &mut Vec<Effect>) {
    state.phase = Phase::Viewing { page };
    state.page_start_time = state.now;

    let delay = cfg.delay_for(page);
    state.navigation_enabled = delay == 0;

    effects.push(Effect::Render(Frame::build(
        cfg,
        page,
        state.navigation_enabled,
    )));

    if delay > 0 {
        let token = state.next_token();
        let (gate, armed) = DelayGate::arm(token, page, delay);
        state.gate = Some(gate);
        effects.push(armed);
    }
}

fn finish(state: &mut NavState, effects: &mut Vec<Effect>) {
    if let Some(gate) = state.gate.take() {
        effects.push(gate.release());
    }
    if let Some(listener) = state.key_listener.take() {
        effects.push(Effect::CancelKeyListener { listener });
    }

    state.phase = Phase::Finished;
    state.navigation_enabled = false;

    let result = TrialResult {
        view_history: state.view_history.clone(),
        rt: state.elapsed_ms(state.start_time),
    };
    effects.push(Effect::Log {
        level: Level::Info,
        domain: Domain::Nav,
        event: "trial_finish",
        msg: format!("visits={} rt={}", result.view_history.len(), result.rt),
    });
    effects.push(Effect::Finish(result));
}

fn arm_key_listener(state: &mut NavState, cfg: &NavConfig, effects: &mut Vec<Effect>) {
    let listener = state.next_listener();
    state.key_listener = Some(listener);
    effects.push(Effect::ArmKeyListener {
        listener,
        valid_keys: cfg.valid_keys(),
    });
}

fn current(state: &NavState) -> usize {
    state.current_page().unwrap_or(0)
}
