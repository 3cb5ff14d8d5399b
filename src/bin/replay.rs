use std::io::{self, BufRead};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;

use paged_instructions::engine::config::NavConfig;
use paged_instructions::engine::events::{Event, NavControl};
use paged_instructions::engine::session::{NullSink, Session};
use paged_instructions::logging::{log, log_config_loaded, log_trial_result, obj, v_str, Domain, Level};
use paged_instructions::verify::invariants::{
    assert_state_invariants, check_gate_respected, check_trial_result, InvariantViolation,
};

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum InputEvent {
    Key { ts: f64, key: String },
    Click { ts: f64, control: NavControl },
}

impl From<InputEvent> for Event {
    fn from(evt: InputEvent) -> Self {
        match evt {
            InputEvent::Key { ts, key } => Event::key(ts, key),
            InputEvent::Click { ts, control } => Event::click(ts, control),
        }
    }
}

fn report(violation: &InvariantViolation, violations: &mut usize) {
    *violations += 1;
    log(
        Level::Warn,
        Domain::Session,
        "invariant_violation",
        obj(&[("msg", v_str(&violation.msg))]),
    );
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: replay <config.json> < events.jsonl")?;
    let cfg = NavConfig::load(Path::new(&path)).with_context(|| format!("loading {}", path))?;
    log_config_loaded(&path, cfg.page_count(), cfg.delay_time.max());

    let mut session = Session::start(cfg.clone(), NullSink)?;
    let stdin = io::stdin();
    for line in stdin.lock().lines().map_while(std::result::Result::ok) {
        if line.trim().is_empty() {
            continue;
        }
        let evt: InputEvent = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("bad event json: {}", err);
                continue;
            }
        };
        session.schedule(evt.into());
    }

    let mut violations = 0usize;
    while session.step() {
        if let Err(v) = assert_state_invariants(session.state(), &cfg) {
            report(&v, &mut violations);
        }
    }

    let state_hash = session.state().hash();
    let Some(result) = session.result().cloned() else {
        println!(
            "{}",
            json!({
                "result": null,
                "page": session.state().current_page(),
                "state_hash": format!("{:016x}", state_hash),
            })
        );
        bail!("events ended before the trial finished");
    };

    for check in [
        check_trial_result(&cfg, &result),
        check_gate_respected(&cfg, &result.view_history),
    ] {
        if let Err(v) = check {
            report(&v, &mut violations);
        }
    }

    log_trial_result("replay", &result, Some(state_hash));
    println!(
        "{}",
        json!({
            "result": result,
            "state_hash": format!("{:016x}", state_hash),
            "violations": violations,
        })
    );
    if violations > 0 {
        bail!("{} invariant violations", violations);
    }
    Ok(())
}
