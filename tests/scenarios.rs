//! End-to-end navigation scenarios driven through the session host.

use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use paged_instructions::engine::config::{DelayTime, NavConfig};
use paged_instructions::engine::events::{Effect, Event, NavControl};
use paged_instructions::engine::reducer::{reduce, start};
use paged_instructions::engine::session::{NullSink, RecordingSink, Session};
use paged_instructions::engine::state::ViewRecord;
use paged_instructions::verify::invariants::{
    assert_state_invariants, check_gate_respected, check_trial_result,
};

fn pages(n: usize) -> NavConfig {
    NavConfig::with_pages((0..n).map(|i| format!("<p>page {}</p>", i)))
}

fn history(pairs: &[(usize, u64)]) -> Vec<ViewRecord> {
    pairs.iter().map(|(p, t)| ViewRecord::new(*p, *t)).collect()
}

#[test]
fn forward_only_three_pages() {
    let cfg = NavConfig {
        allow_backward: false,
        ..pages(3)
    };
    let mut session = Session::start(cfg, RecordingSink::default()).unwrap();
    session.press_key("ArrowRight", 1200.0);
    session.press_key("ArrowRight", 2000.0);
    session.run();
    // two forwards land on the last page; it stays up until a third
    assert!(session.result().is_none());
    assert_eq!(session.state().current_page(), Some(2));
    assert_eq!(session.state().view_history, history(&[(0, 1200), (1, 800)]));

    session.press_key("ArrowRight", 2750.0);
    let result = session.run().cloned().unwrap();
    assert_eq!(result.view_history, history(&[(0, 1200), (1, 800), (2, 750)]));
    assert_eq!(result.rt, 2750);
    assert_eq!(session.sink().page_changes, vec![1, 2]);
    check_trial_result(session.config(), &result).unwrap();
}

#[test]
fn delayed_first_page_discards_early_input() {
    let cfg = NavConfig {
        delay_time: DelayTime::PerPage(vec![500, 0]),
        ..pages(2)
    };
    let mut session = Session::start(cfg, RecordingSink::default()).unwrap();
    session.press_key("ArrowRight", 100.0);
    session.press_key("ArrowRight", 600.0);
    session.press_key("ArrowLeft", 700.0);
    session.press_key("ArrowRight", 1300.0);
    session.press_key("ArrowRight", 1400.0);

    let result = session.run().cloned().unwrap();
    assert_eq!(
        result.view_history,
        history(&[(0, 600), (1, 100), (0, 600), (1, 100)])
    );
    assert_eq!(result.rt, 1400);
    check_gate_respected(session.config(), &result.view_history).unwrap();
}

#[test]
fn input_exactly_at_delay_is_accepted() {
    let cfg = NavConfig {
        delay_time: DelayTime::PerPage(vec![500, 0]),
        ..pages(2)
    };
    let mut session = Session::start(cfg, NullSink).unwrap();
    session.press_key("ArrowRight", 499.0);
    session.press_key("ArrowRight", 500.0);
    session.run();
    assert_eq!(session.state().current_page(), Some(1));
    assert_eq!(session.state().view_history, history(&[(0, 500)]));
}

#[test]
fn scalar_delay_regates_every_entry() {
    let cfg = NavConfig {
        delay_time: DelayTime::Uniform(300),
        ..pages(5)
    };
    let mut session = Session::start(cfg, RecordingSink::default()).unwrap();
    session.schedule_all([
        Event::key(100.0, "ArrowRight"),
        Event::key(300.0, "ArrowRight"),
        Event::key(400.0, "ArrowLeft"),
        Event::key(600.0, "ArrowLeft"),
        Event::key(800.0, "ArrowRight"),
        Event::key(900.0, "ArrowRight"),
        Event::key(1200.0, "ArrowRight"),
        Event::key(1500.0, "ArrowRight"),
        Event::key(1800.0, "ArrowRight"),
        Event::key(2100.0, "ArrowRight"),
    ]);

    let result = session.run().cloned().unwrap();
    assert_eq!(
        result.view_history,
        history(&[(0, 300), (1, 300), (0, 300), (1, 300), (2, 300), (3, 300), (4, 300)])
    );
    assert_eq!(result.rt, 2100);
    assert_eq!(session.sink().frames.len(), 7);
    assert!(session.sink().frames.iter().all(|f| f.content.starts_with("<p>page")));
}

#[test]
fn backward_on_first_page_never_moves() {
    for allow_backward in [true, false] {
        let cfg = NavConfig {
            allow_backward,
            ..pages(2)
        };
        let mut session = Session::start(cfg, RecordingSink::default()).unwrap();
        session.press_key("ArrowLeft", 50.0);
        session.run();
        assert_eq!(session.state().current_page(), Some(0));
        assert!(session.state().view_history.is_empty());
        // listener re-armed; forward still works
        assert!(session.has_live_listener());
        session.press_key("ArrowRight", 80.0);
        session.run();
        assert_eq!(session.state().current_page(), Some(1));
    }
}

#[test]
fn backward_disallowed_is_ignored() {
    let cfg = NavConfig {
        allow_backward: false,
        ..pages(3)
    };
    let mut session = Session::start(cfg, NullSink).unwrap();
    session.press_key("ArrowRight", 10.0);
    session.press_key("ArrowLeft", 20.0);
    session.press_key("ArrowRight", 30.0);
    session.press_key("ArrowRight", 40.0);
    let result = session.run().cloned().unwrap();
    assert_eq!(result.view_history, history(&[(0, 10), (1, 20), (2, 10)]));
}

#[test]
fn clicks_drive_navigation_and_refresh_controls() {
    let cfg = NavConfig {
        allow_keys: false,
        show_clickable_nav: true,
        show_page_number: true,
        delay_time: DelayTime::Uniform(200),
        ..pages(2)
    };
    let mut session = Session::start(cfg, RecordingSink::default()).unwrap();
    let first = &session.sink().frames[0];
    let controls = first.controls.as_ref().unwrap();
    assert!(!controls.next.enabled);
    assert_eq!(controls.page_number.as_deref(), Some("Page 1/2"));

    session.click(NavControl::Next, 100.0);
    session.click(NavControl::Next, 250.0);
    session.click(NavControl::Previous, 450.0);
    session.click(NavControl::Next, 700.0);
    session.click(NavControl::Next, 900.0);
    let result = session.run().cloned().unwrap();

    assert_eq!(
        result.view_history,
        history(&[(0, 250), (1, 200), (0, 250), (1, 200)])
    );
    let refreshes = &session.sink().refreshes;
    assert_eq!(refreshes.len(), 4);
    assert!(refreshes.iter().all(|c| c.next.enabled));
}

#[test]
fn keys_ignored_when_disabled() {
    let cfg = NavConfig {
        allow_keys: false,
        show_clickable_nav: true,
        ..pages(1)
    };
    let mut session = Session::start(cfg, NullSink).unwrap();
    session.press_key("ArrowRight", 10.0);
    session.run();
    assert!(session.result().is_none());
    session.click(NavControl::Next, 20.0);
    assert_eq!(session.run().map(|r| r.rt), Some(20));
}

#[test]
fn stale_timer_never_enables_later_page() {
    let cfg = NavConfig {
        delay_time: DelayTime::Uniform(300),
        ..pages(3)
    };
    let (mut state, out) = start(&cfg, 0.0).unwrap();
    let first = out
        .effects
        .iter()
        .find_map(|e| match e {
            Effect::ArmGate { token, .. } => Some(*token),
            _ => None,
        })
        .unwrap();

    reduce(&mut state, Event::gate_open(300.0, first), &cfg);
    reduce(&mut state, Event::key(300.0, "ArrowRight"), &cfg);
    assert_eq!(state.current_page(), Some(1));
    assert!(!state.navigation_enabled);

    reduce(&mut state, Event::gate_open(350.0, first), &cfg);
    assert!(!state.navigation_enabled);
    reduce(&mut state, Event::key(360.0, "ArrowRight"), &cfg);
    assert_eq!(state.current_page(), Some(1));
}

#[test]
fn nothing_processed_after_finish() {
    let cfg = pages(1);
    let (mut state, _) = start(&cfg, 0.0).unwrap();
    let out = reduce(&mut state, Event::key(40.0, "ArrowRight"), &cfg);
    assert!(out.finished().is_some());

    let out = reduce(&mut state, Event::key(80.0, "ArrowRight"), &cfg);
    assert!(out.finished().is_none());
    assert!(!out.effects.iter().any(|e| matches!(e, Effect::Render(_))));
    assert_eq!(state.view_history, history(&[(0, 40)]));
}

#[test]
fn random_input_keeps_invariants() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..200 {
        let n = rng.gen_range(1..=6);
        let delays: Vec<u64> = (0..n).map(|_| rng.gen_range(0..400)).collect();
        let cfg = NavConfig {
            allow_backward: rng.gen_bool(0.5),
            delay_time: DelayTime::PerPage(delays),
            ..pages(n)
        };
        let mut session = Session::start(cfg.clone(), NullSink).unwrap();

        let mut ts = 0u64;
        for _ in 0..300 {
            ts += rng.gen_range(0..250);
            let key = match rng.gen_range(0..10) {
                0..=5 => "ArrowRight",
                6..=8 => "ArrowLeft",
                _ => "x",
            };
            session.press_key(key, ts as f64);
        }

        while session.step() {
            assert_state_invariants(session.state(), &cfg).unwrap();
        }
        if let Some(result) = session.result() {
            check_trial_result(&cfg, result).unwrap();
            check_gate_respected(&cfg, &result.view_history).unwrap();
        }
    }
}

#[test]
fn config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"pages":["one","two"],"delay_time":[250,"oops"],"allow_backward":false}}"#
    )
    .unwrap();

    let cfg = NavConfig::load(file.path()).unwrap();
    assert_eq!(cfg.page_count(), 2);
    assert_eq!(cfg.delay_for(0), 250);
    assert_eq!(cfg.delay_for(1), 0);
    assert!(!cfg.allow_backward);

    let mut empty = tempfile::NamedTempFile::new().unwrap();
    write!(empty, r#"{{"pages":[]}}"#).unwrap();
    assert!(NavConfig::load(empty.path()).is_err());
}
