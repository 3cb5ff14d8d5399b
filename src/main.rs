use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use paged_instructions::engine::config::NavConfig;
use paged_instructions::engine::events::NavControl;
use paged_instructions::engine::session::PageSink;
use paged_instructions::engine::state::TrialResult;
use paged_instructions::engine::view::{Frame, NavControls};
use paged_instructions::logging::{log, log_config_loaded, obj, v_str, Domain, Level};
use paged_instructions::runtime::{run_live, LiveInput};

/// Pages and controls go to stderr; stdout carries only the result
struct TerminalSink;

impl TerminalSink {
    fn controls_line(controls: &NavControls) -> String {
        let mut parts = Vec::new();
        if let Some(prev) = &controls.previous {
            parts.push(format!("[p] {}{}", prev.label, if prev.enabled { "" } else { " (disabled)" }));
        }
        let next = &controls.next;
        parts.push(format!("[n] {}{}", next.label, if next.enabled { "" } else { " (disabled)" }));
        if let Some(label) = &controls.page_number {
            parts.push(label.clone());
        }
        parts.join("   ")
    }
}

impl PageSink for TerminalSink {
    fn show(&mut self, frame: &Frame) {
        eprintln!("\n{}\n", frame.content);
        if let Some(controls) = &frame.controls {
            eprintln!("{}", Self::controls_line(controls));
        } else if let Some(label) = &frame.page_number {
            eprintln!("{}", label);
        }
    }

    fn refresh_controls(&mut self, controls: &NavControls) {
        eprintln!("{}", Self::controls_line(controls));
    }

    fn finished(&mut self, result: &TrialResult) {
        eprintln!("done: {} visits in {}ms", result.view_history.len(), result.rt);
    }
}

fn demo_config() -> NavConfig {
    NavConfig {
        show_clickable_nav: true,
        show_page_number: true,
        ..NavConfig::with_pages([
            "Welcome. Each page of these instructions is shown in turn.",
            "Type n (or the forward key name) to go on, p to go back.",
            "That's all. Advance once more to start.",
        ])
    }
}

/// `n`/`p` pick whichever channel the config enables; anything else is a key name
fn parse_line(cfg: &NavConfig, line: &str) -> Option<LiveInput> {
    let nav = |control: NavControl, key: &str| {
        if cfg.allow_keys {
            LiveInput::Key(key.to_string())
        } else {
            LiveInput::Click(control)
        }
    };
    match line.trim() {
        "" => None,
        "n" | "next" => Some(nav(NavControl::Next, &cfg.key_forward)),
        "p" | "prev" | "previous" => Some(nav(NavControl::Previous, &cfg.key_backward)),
        key => Some(LiveInput::Key(key.to_string())),
    }
}

async fn read_stdin(cfg: NavConfig, tx: mpsc::Sender<LiveInput>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(input) = parse_line(&cfg, &line) {
                    if tx.send(input).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Input,
                    "stdin_error",
                    obj(&[("msg", v_str(&err.to_string()))]),
                );
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => {
            let cfg = NavConfig::load(Path::new(&path))
                .with_context(|| format!("loading config from {}", path))?;
            log_config_loaded(&path, cfg.page_count(), cfg.delay_time.max());
            cfg
        }
        None => {
            let cfg = demo_config();
            log_config_loaded("demo", cfg.page_count(), cfg.delay_time.max());
            cfg
        }
    };

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(read_stdin(cfg.clone(), tx));

    let (result, _) = run_live(cfg, TerminalSink, rx).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_prefers_keys() {
        let cfg = NavConfig::with_pages(["a"]);
        assert_eq!(parse_line(&cfg, "n"), Some(LiveInput::Key("ArrowRight".into())));
        assert_eq!(parse_line(&cfg, " p "), Some(LiveInput::Key("ArrowLeft".into())));
        assert_eq!(parse_line(&cfg, "Enter"), Some(LiveInput::Key("Enter".into())));
        assert_eq!(parse_line(&cfg, "  "), None);
    }

    #[test]
    fn test_parse_line_clicks_without_keys() {
        let cfg = NavConfig {
            allow_keys: false,
            show_clickable_nav: true,
            ..NavConfig::with_pages(["a"])
        };
        assert_eq!(parse_line(&cfg, "next"), Some(LiveInput::Click(NavControl::Next)));
    }
}
