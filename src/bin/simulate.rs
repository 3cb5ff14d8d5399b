use std::path::Path;

use anyhow::{Context, Result};

use paged_instructions::engine::config::NavConfig;
use paged_instructions::logging::{log, log_config_loaded, obj, v_str, Domain, Level};
use paged_instructions::simulate::{simulate, SimConfig};
use paged_instructions::verify::invariants::check_trial_result;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: simulate <config.json>")?;
    let cfg = NavConfig::load(Path::new(&path)).with_context(|| format!("loading {}", path))?;
    log_config_loaded(&path, cfg.page_count(), cfg.delay_time.max());

    let sim = SimConfig::from_env();
    let result = simulate(&cfg, &sim.options())?;

    if let Err(v) = check_trial_result(&cfg, &result) {
        log(Level::Warn, Domain::Sim, "invariant_violation", obj(&[("msg", v_str(&v.msg))]));
    }
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
