//! Real-time host for one trial.
//!
//! Inputs arrive on an mpsc channel; the armed gate is a `sleep_until`
//! raced against the channel. Timestamps are milliseconds since the trial
//! started on the tokio clock, so paused-time tests are exact.

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};

use crate::engine::config::{ConfigError, NavConfig};
use crate::engine::events::*;
use crate::engine::reducer::{reduce, start, ReducerOutput};
use crate::engine::session::{present, PageSink};
use crate::engine::state::TrialResult;
use crate::logging::{log, log_trial_result, obj, v_num, v_str, Domain, Level};

/// Raw input from whatever device the host reads
#[derive(Debug, Clone, PartialEq)]
pub enum LiveInput {
    Key(String),
    Click(NavControl),
}

#[derive(Debug)]
pub enum RuntimeError {
    Config(ConfigError),
    /// Every sender dropped before the trial finished
    InputClosed,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Config(e) => write!(f, "invalid config: {}", e),
            RuntimeError::InputClosed => write!(f, "input closed before the trial finished"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Config(e) => Some(e),
            RuntimeError::InputClosed => None,
        }
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(e: ConfigError) -> Self {
        RuntimeError::Config(e)
    }
}

struct LiveHost {
    origin: Instant,
    gate: Option<(TimerToken, Instant)>,
    listener: Option<ListenerId>,
    result: Option<TrialResult>,
}

impl LiveHost {
    fn ms_at(&self, at: Instant) -> Timestamp {
        at.duration_since(self.origin).as_secs_f64() * 1000.0
    }

    fn apply<S: PageSink>(&mut self, sink: &mut S, now: Timestamp, out: ReducerOutput) {
        for effect in out.effects {
            if present(sink, &effect) {
                continue;
            }
            match effect {
                Effect::ArmGate { token, delay_ms } => {
                    let due = (now + delay_ms as f64) / 1000.0;
                    self.gate = Some((token, self.origin + Duration::from_secs_f64(due)));
                }
                Effect::CancelGate { token } => {
                    if matches!(self.gate, Some((armed, _)) if armed == token) {
                        self.gate = None;
                    }
                }
                Effect::ArmKeyListener { listener, .. } => self.listener = Some(listener),
                Effect::CancelKeyListener { listener } => {
                    if self.listener == Some(listener) {
                        self.listener = None;
                    }
                }
                Effect::Finish(result) => {
                    self.listener = None;
                    sink.finished(&result);
                    self.result = Some(result);
                }
                _ => {}
            }
        }
    }

    fn to_event(&self, input: LiveInput) -> Event {
        let ts = self.ms_at(Instant::now());
        match input {
            LiveInput::Key(key) => Event::key(ts, key),
            LiveInput::Click(control) => Event::click(ts, control),
        }
    }
}

/// Run one trial to completion on the current tokio runtime
pub async fn run_live<S: PageSink>(
    cfg: NavConfig,
    mut sink: S,
    mut inputs: mpsc::Receiver<LiveInput>,
) -> Result<(TrialResult, S), RuntimeError> {
    let mut host = LiveHost {
        origin: Instant::now(),
        gate: None,
        listener: None,
        result: None,
    };
    log(
        Level::Debug,
        Domain::Session,
        "live_start",
        obj(&[("pages", v_num(cfg.page_count() as f64))]),
    );

    let (mut state, out) = start(&cfg, 0.0)?;
    host.apply(&mut sink, state.now, out);

    loop {
        if let Some(result) = host.result.take() {
            log_trial_result("live", &result, Some(state.hash()));
            return Ok((result, sink));
        }

        let event = match host.gate {
            Some((token, deadline)) => {
                tokio::select! {
                    biased;
                    _ = sleep_until(deadline) => {
                        host.gate = None;
                        Event::gate_open(host.ms_at(deadline), token)
                    }
                    input = inputs.recv() => match input {
                        Some(input) => host.to_event(input),
                        None => return Err(RuntimeError::InputClosed),
                    },
                }
            }
            None => match inputs.recv().await {
                Some(input) => host.to_event(input),
                None => return Err(RuntimeError::InputClosed),
            },
        };

        if let Event::Input(InputEvent::Key { key, .. }) = &event {
            if host.listener.is_none() {
                log(Level::Trace, Domain::Input, "key_unheard", obj(&[("key", v_str(key))]));
                continue;
            }
        }

        let out = reduce(&mut state, event, &cfg);
        host.apply(&mut sink, state.now, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::NullSink;

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_is_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let err = run_live(NavConfig::with_pages(["a"]), NullSink, rx)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InputClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pages_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let cfg = NavConfig::with_pages(Vec::<String>::new());
        let err = run_live(cfg, NullSink, rx).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Config(ConfigError::EmptyPages)));
    }
}
