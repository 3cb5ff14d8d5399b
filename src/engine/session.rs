//! Host-side driver over a virtual clock.
//!
//! Owns the controller state, applies the reducer's effects, and feeds timer
//! fires and scheduled input back through an ordered [`EventBus`]. Used for
//! scripted replay and tests; the real-time host lives in `crate::runtime`.

use super::bus::EventBus;
use super::config::{ConfigError, NavConfig};
use super::events::*;
use super::reducer::{reduce, start, ReducerOutput};
use super::state::{NavState, TrialResult};
use super::view::{Frame, NavControls};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};

/// Render target the controller may fully overwrite between pages
pub trait PageSink {
    fn show(&mut self, frame: &Frame);

    fn refresh_controls(&mut self, _controls: &NavControls) {}

    fn page_changed(&mut self, _page: usize) {}

    fn finished(&mut self, _result: &TrialResult) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PageSink for NullSink {
    fn show(&mut self, _frame: &Frame) {}
}

/// Keeps every frame and notification, for assertions
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub frames: Vec<Frame>,
    pub refreshes: Vec<NavControls>,
    pub page_changes: Vec<usize>,
    pub result: Option<TrialResult>,
}

impl PageSink for RecordingSink {
    fn show(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }

    fn refresh_controls(&mut self, controls: &NavControls) {
        self.refreshes.push(controls.clone());
    }

    fn page_changed(&mut self, page: usize) {
        self.page_changes.push(page);
    }

    fn finished(&mut self, result: &TrialResult) {
        self.result = Some(result.clone());
    }
}

/// Apply the effects that only concern the render target and the log.
/// Returns false for timer/listener/finish effects, which the host owns.
pub(crate) fn present<S: PageSink>(sink: &mut S, effect: &Effect) -> bool {
    match effect {
        Effect::Render(frame) => sink.show(frame),
        Effect::RefreshControls(controls) => sink.refresh_controls(controls),
        Effect::PageChanged { page } => sink.page_changed(*page),
        Effect::Log {
            level,
            domain,
            event,
            msg,
        } => {
            log(*level, *domain, event, obj(&[("msg", v_str(msg))]));
        }
        _ => return false,
    }
    true
}

pub struct Session<S: PageSink> {
    cfg: NavConfig,
    state: NavState,
    bus: EventBus,
    sink: S,
    listener: Option<ListenerId>,
    result: Option<TrialResult>,
}

impl<S: PageSink> Session<S> {
    pub fn start(cfg: NavConfig, sink: S) -> Result<Self, ConfigError> {
        Self::start_at(cfg, sink, 0.0)
    }

    pub fn start_at(cfg: NavConfig, sink: S, now: Timestamp) -> Result<Self, ConfigError> {
        let (state, out) = start(&cfg, now)?;
        let mut session = Self {
            cfg,
            state,
            bus: EventBus::new(),
            sink,
            listener: None,
            result: None,
        };
        session.apply(out);
        Ok(session)
    }

    /// Queue an input (or any event) for its timestamp
    pub fn schedule(&mut self, event: Event) {
        self.bus.push(event);
    }

    pub fn schedule_all<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        for event in events {
            self.bus.push(event);
        }
    }

    pub fn press_key(&mut self, key: &str, ts: Timestamp) {
        self.schedule(Event::key(ts, key));
    }

    pub fn click(&mut self, control: NavControl, ts: Timestamp) {
        self.schedule(Event::click(ts, control));
    }

    /// Deliver the next queued event. Returns false when idle or finished.
    pub fn step(&mut self) -> bool {
        if self.result.is_some() {
            return false;
        }
        match self.bus.pop() {
            Some(event) => {
                self.deliver(event);
                true
            }
            None => false,
        }
    }

    /// Deliver queued events until the trial finishes or the bus is empty
    pub fn run(&mut self) -> Option<&TrialResult> {
        while self.step() {}
        self.result.as_ref()
    }

    /// Deliver one event now. Queued events due at or before it (gate fires
    /// included) are delivered first.
    pub fn dispatch(&mut self, event: Event) {
        let ts = event.timestamp();
        while self.result.is_none() && self.bus.peek().is_some_and(|due| due.timestamp() <= ts) {
            if let Some(due) = self.bus.pop() {
                self.deliver(due);
            }
        }
        if self.result.is_none() {
            self.deliver(event);
        }
    }

    fn deliver(&mut self, event: Event) {
        if let Event::Input(InputEvent::Key { ts, key }) = &event {
            if self.listener.is_none() {
                log(
                    Level::Trace,
                    Domain::Input,
                    "key_unheard",
                    obj(&[("key", v_str(key)), ("ts", v_num(*ts))]),
                );
                return;
            }
        }
        let out = reduce(&mut self.state, event, &self.cfg);
        self.apply(out);
    }

    fn apply(&mut self, out: ReducerOutput) {
        for effect in out.effects {
            if present(&mut self.sink, &effect) {
                continue;
            }
            match effect {
                Effect::ArmGate { token, delay_ms } => {
                    self.bus
                        .push(Event::gate_open(self.state.now + delay_ms as f64, token));
                }
                Effect::CancelGate { token } => {
                    self.bus.cancel_gate(token);
                }
                Effect::ArmKeyListener { listener, .. } => {
                    self.listener = Some(listener);
                }
                Effect::CancelKeyListener { listener } => {
                    if self.listener == Some(listener) {
                        self.listener = None;
                    }
                }
                Effect::Finish(result) => {
                    self.listener = None;
                    self.sink.finished(&result);
                    self.result = Some(result);
                }
                _ => {}
            }
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.cfg
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn result(&self) -> Option<&TrialResult> {
        self.result.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Events still queued (scripted input and armed gates)
    pub fn pending(&self) -> usize {
        self.bus.pending()
    }

    pub fn has_live_listener(&self) -> bool {
        self.listener.is_some()
    }
}
