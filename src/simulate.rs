//! Synthetic participants.
//!
//! Data-only mode produces a plausible `TrialResult` straight from the
//! config. Visual mode turns that result into scripted input and drives a
//! real [`Session`] with it, so the controller itself produces the answer.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::config::{ConfigError, NavConfig};
use crate::engine::session::{NullSink, PageSink, Session};
use crate::engine::state::{TrialResult, ViewRecord};
use crate::logging::{log, log_simulation, obj, v_num, v_str, Domain, Level};
use crate::sampling::{sample_bernoulli, ViewTimeModel};
use crate::script::script_from_history;

#[derive(Debug)]
pub enum SimError {
    /// Neither keys nor clickable controls are enabled
    NoInputChannel,
    Config(ConfigError),
    /// The scripted input ran out before the trial finished
    Unfinished,
    /// Backward probability must be finite and in `[0, 1)`
    InvalidProbability(f64),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::NoInputChannel => {
                write!(f, "visual simulation needs keys or clickable navigation")
            }
            SimError::Config(e) => write!(f, "invalid config: {}", e),
            SimError::Unfinished => write!(f, "scripted input ended before the trial finished"),
            SimError::InvalidProbability(p) => {
                write!(f, "backward probability {} is not in [0, 1)", p)
            }
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Config(e)
    }
}

/// Caller-supplied parts of the result; missing parts are generated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimData {
    pub view_history: Option<Vec<ViewRecord>>,
    pub rt: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    DataOnly,
    Visual,
}

impl SimulationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationMode::DataOnly => "data_only",
            SimulationMode::Visual => "visual",
        }
    }
}

impl FromStr for SimulationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data_only" | "data-only" | "data" => Ok(SimulationMode::DataOnly),
            "visual" => Ok(SimulationMode::Visual),
            other => Err(format!("unknown simulation mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    pub data: SimData,
    pub backward_probability: f64,
    pub seed: Option<u64>,
    pub mode: SimulationMode,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            data: SimData::default(),
            backward_probability: 0.1,
            seed: None,
            mode: SimulationMode::DataOnly,
        }
    }
}

/// Simulator knobs from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub mode: SimulationMode,
    pub seed: Option<u64>,
    pub backward_probability: f64,
    pub target_rt: Option<u64>,
}

impl SimConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same knobs from any key/value source. Unparseable values fall back to
    /// defaults; an out-of-range `BACKWARD_PROB` is logged and replaced.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let backward_probability = match get("BACKWARD_PROB").and_then(|v| v.trim().parse::<f64>().ok()) {
            Some(p) if check_backward_probability(p).is_ok() => p,
            Some(p) => {
                log(
                    Level::Warn,
                    Domain::Sim,
                    "invalid_backward_prob",
                    obj(&[("value", v_str(&p.to_string())), ("fallback", v_num(0.1))]),
                );
                0.1
            }
            None => 0.1,
        };
        Self {
            mode: get("SIM_MODE").and_then(|v| v.parse().ok()).unwrap_or_default(),
            seed: get("SEED").and_then(|v| v.trim().parse().ok()),
            backward_probability,
            target_rt: get("TARGET_RT").and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn options(&self) -> SimulationOptions {
        SimulationOptions {
            data: SimData {
                view_history: None,
                rt: self.target_rt,
            },
            backward_probability: self.backward_probability,
            seed: self.seed,
            mode: self.mode,
        }
    }
}

pub fn check_backward_probability(p: f64) -> Result<f64, SimError> {
    if p.is_finite() && (0.0..1.0).contains(&p) {
        Ok(p)
    } else {
        Err(SimError::InvalidProbability(p))
    }
}

/// Sequence of visited pages, starting at 0 and ending on the last page.
/// A probability outside `[0, 1)` never terminates, so it walks forward only.
pub fn walk_pages<R: Rng + ?Sized>(cfg: &NavConfig, backward_probability: f64, rng: &mut R) -> Vec<usize> {
    let backward_probability = check_backward_probability(backward_probability).unwrap_or(0.0);
    let n = cfg.page_count();
    let mut visits = Vec::new();
    if n == 0 {
        return visits;
    }
    let mut page = 0usize;
    loop {
        visits.push(page);
        let forward = page == 0
            || !cfg.allow_backward
            || !sample_bernoulli(rng, backward_probability);
        if forward {
            page += 1;
            if page >= n {
                break;
            }
        } else {
            page -= 1;
        }
    }
    visits
}

/// Shift `times` so they sum to exactly `target`.
///
/// A surplus is spread evenly (integer share, one extra unit to the first
/// `r` visits). A deficit is taken evenly from the time above each visit's
/// floor, and only then from the floors themselves.
pub fn distribute_residual(times: &mut [u64], floors: &[u64], target: u64) {
    if times.is_empty() {
        return;
    }
    let sum: u64 = times.iter().sum();
    if target >= sum {
        let n = times.len() as u64;
        let diff = target - sum;
        let (share, extra) = (diff / n, diff % n);
        for (i, t) in times.iter_mut().enumerate() {
            *t += share + u64::from((i as u64) < extra);
        }
        return;
    }

    let deficit = sum - target;
    let remaining = take_evenly(times, |i| floors.get(i).copied().unwrap_or(0), deficit);
    let remaining = take_evenly(times, |_| 0, remaining);
    debug_assert_eq!(remaining, 0);
}

fn take_evenly(times: &mut [u64], floor: impl Fn(usize) -> u64, mut remaining: u64) -> u64 {
    while remaining > 0 {
        let active: Vec<usize> = (0..times.len()).filter(|&i| times[i] > floor(i)).collect();
        if active.is_empty() {
            break;
        }
        let k = active.len() as u64;
        let (share, extra) = (remaining / k, remaining % k);
        for (j, &i) in active.iter().enumerate() {
            let want = share + u64::from((j as u64) < extra);
            let take = want.min(times[i] - floor(i));
            times[i] -= take;
            remaining -= take;
        }
    }
    remaining
}

/// Fresh history from the default per-page model
pub fn generate_history<R: Rng + ?Sized>(cfg: &NavConfig, backward_probability: f64, rng: &mut R) -> Vec<ViewRecord> {
    let model = ViewTimeModel::default_page();
    walk_pages(cfg, backward_probability, rng)
        .into_iter()
        .map(|page| ViewRecord::new(page, model.sample(rng, cfg.delay_for(page))))
        .collect()
}

/// History whose viewing times sum to `target_rt`
pub fn generate_history_for_target<R: Rng + ?Sized>(
    cfg: &NavConfig,
    backward_probability: f64,
    target_rt: u64,
    rng: &mut R,
) -> Vec<ViewRecord> {
    let visits = walk_pages(cfg, backward_probability, rng);
    if visits.is_empty() {
        return Vec::new();
    }
    let model = ViewTimeModel::around(target_rt as f64 / visits.len() as f64);
    let floors: Vec<u64> = visits.iter().map(|&p| cfg.delay_for(p)).collect();
    let mut times: Vec<u64> = floors.iter().map(|&floor| model.sample(rng, floor)).collect();
    distribute_residual(&mut times, &floors, target_rt);

    visits
        .into_iter()
        .zip(times)
        .map(|(page, t)| ViewRecord::new(page, t))
        .collect()
}

/// Fill in whatever `opts.data` leaves out
pub fn create_simulation_data<R: Rng + ?Sized>(cfg: &NavConfig, opts: &SimulationOptions, rng: &mut R) -> TrialResult {
    let p = opts.backward_probability;
    match (&opts.data.view_history, opts.data.rt) {
        (Some(history), Some(rt)) => TrialResult {
            view_history: history.clone(),
            rt,
        },
        (Some(history), None) => TrialResult {
            view_history: history.clone(),
            rt: history.iter().map(|r| r.viewing_time).sum(),
        },
        (None, Some(rt)) => TrialResult {
            view_history: generate_history_for_target(cfg, p, rt, rng),
            rt,
        },
        (None, None) => {
            let view_history = generate_history(cfg, p, rng);
            let rt = view_history.iter().map(|r| r.viewing_time).sum();
            TrialResult { view_history, rt }
        }
    }
}

/// Drive a session with the scripted form of `data`
pub fn simulate_visual<S: PageSink>(cfg: &NavConfig, data: &TrialResult, sink: S) -> Result<(TrialResult, S), SimError> {
    let script = script_from_history(cfg, &data.view_history, 0.0)?;
    let mut session = Session::start(cfg.clone(), sink)?;
    session.schedule_all(script);
    let result = session.run().cloned();
    match result {
        Some(result) => Ok((result, session.into_sink())),
        None => {
            log(
                Level::Warn,
                Domain::Sim,
                "replay_unfinished",
                obj(&[("pending", serde_json::json!(session.pending()))]),
            );
            Err(SimError::Unfinished)
        }
    }
}

pub fn simulate(cfg: &NavConfig, opts: &SimulationOptions) -> Result<TrialResult, SimError> {
    simulate_with_sink(cfg, opts, NullSink).map(|(result, _)| result)
}

pub fn simulate_with_sink<S: PageSink>(
    cfg: &NavConfig,
    opts: &SimulationOptions,
    sink: S,
) -> Result<(TrialResult, S), SimError> {
    cfg.validate()?;
    check_backward_probability(opts.backward_probability)?;
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let data = create_simulation_data(cfg, opts, &mut rng);
    let (result, sink) = match opts.mode {
        SimulationMode::DataOnly => (data, sink),
        SimulationMode::Visual => simulate_visual(cfg, &data, sink)?,
    };
    log_simulation(opts.mode.as_str(), opts.seed, result.view_history.len(), result.rt);
    Ok((result, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::DelayTime;

    fn pages(n: usize) -> NavConfig {
        NavConfig::with_pages((0..n).map(|i| format!("page {}", i)))
    }

    #[test]
    fn test_walk_forward_only_without_backward() {
        let cfg = NavConfig {
            allow_backward: false,
            ..pages(4)
        };
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(walk_pages(&cfg, 0.9, &mut rng), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_walk_steps_are_adjacent() {
        let cfg = pages(5);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let walk = walk_pages(&cfg, 0.4, &mut rng);
            assert_eq!(walk.first(), Some(&0));
            assert_eq!(walk.last(), Some(&4));
            for pair in walk.windows(2) {
                assert_eq!((pair[0] as i64 - pair[1] as i64).abs(), 1);
            }
        }
    }

    #[test]
    fn test_surplus_spread_evenly() {
        let mut times = vec![10, 10, 10];
        distribute_residual(&mut times, &[0, 0, 0], 35);
        assert_eq!(times, vec![12, 12, 11]);
    }

    #[test]
    fn test_deficit_respects_floors() {
        let mut times = vec![500, 100, 300];
        distribute_residual(&mut times, &[450, 0, 0], 600);
        assert_eq!(times.iter().sum::<u64>(), 600);
        assert!(times[0] >= 450);
    }

    #[test]
    fn test_infeasible_floors_still_hit_target() {
        let mut times = vec![1000, 1000];
        distribute_residual(&mut times, &[1000, 1000], 100);
        assert_eq!(times, vec![50, 50]);
    }

    #[test]
    fn test_target_sum_exact() {
        let cfg = NavConfig {
            delay_time: DelayTime::Uniform(200),
            ..pages(3)
        };
        let mut rng = StdRng::seed_from_u64(42);
        for target in [0u64, 1, 999, 12_345] {
            let h = generate_history_for_target(&cfg, 0.2, target, &mut rng);
            assert_eq!(h.iter().map(|r| r.viewing_time).sum::<u64>(), target);
        }
    }

    #[test]
    fn test_history_without_rt_sums() {
        let opts = SimulationOptions {
            data: SimData {
                view_history: Some(vec![ViewRecord::new(0, 120), ViewRecord::new(1, 80)]),
                rt: None,
            },
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let result = create_simulation_data(&pages(2), &opts, &mut rng);
        assert_eq!(result.rt, 200);
    }

    #[test]
    fn test_both_supplied_used_as_is() {
        let history = vec![ViewRecord::new(0, 10)];
        let opts = SimulationOptions {
            data: SimData {
                view_history: Some(history.clone()),
                rt: Some(9999),
            },
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let result = create_simulation_data(&pages(1), &opts, &mut rng);
        assert_eq!(result.view_history, history);
        assert_eq!(result.rt, 9999);
    }

    #[test]
    fn test_walk_terminates_on_bad_probability() {
        let cfg = pages(3);
        let mut rng = StdRng::seed_from_u64(4);
        for p in [1.0, 7.5, f64::NAN, f64::INFINITY, -0.2] {
            assert_eq!(walk_pages(&cfg, p, &mut rng), vec![0, 1, 2]);
        }
    }

    #[test]
    fn test_simulate_rejects_bad_probability() {
        for p in [1.0, f64::NAN, -0.5] {
            let opts = SimulationOptions {
                backward_probability: p,
                seed: Some(1),
                ..Default::default()
            };
            assert!(matches!(
                simulate(&pages(3), &opts),
                Err(SimError::InvalidProbability(_))
            ));
        }
        assert!(check_backward_probability(0.0).is_ok());
        assert!(check_backward_probability(0.999).is_ok());
    }

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_sim_config_defaults() {
        let sim = SimConfig::from_lookup(lookup(&[]));
        assert_eq!(
            sim,
            SimConfig {
                mode: SimulationMode::DataOnly,
                seed: None,
                backward_probability: 0.1,
                target_rt: None,
            }
        );
    }

    #[test]
    fn test_sim_config_parses_values() {
        let sim = SimConfig::from_lookup(lookup(&[
            ("SIM_MODE", "visual"),
            ("SEED", "42"),
            ("BACKWARD_PROB", "0.25"),
            ("TARGET_RT", "12000"),
        ]));
        assert_eq!(sim.mode, SimulationMode::Visual);
        assert_eq!(sim.seed, Some(42));
        assert_eq!(sim.backward_probability, 0.25);
        let opts = sim.options();
        assert_eq!(opts.data.rt, Some(12000));
        assert_eq!(opts.mode, SimulationMode::Visual);
    }

    #[test]
    fn test_sim_config_replaces_bad_probability() {
        for raw in ["1", "nan", "-3", "inf"] {
            let sim = SimConfig::from_lookup(lookup(&[("BACKWARD_PROB", raw)]));
            assert_eq!(sim.backward_probability, 0.1, "BACKWARD_PROB={}", raw);
        }
        let sim = SimConfig::from_lookup(lookup(&[("BACKWARD_PROB", "often"), ("SEED", "x")]));
        assert_eq!(sim.backward_probability, 0.1);
        assert_eq!(sim.seed, None);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("visual".parse::<SimulationMode>(), Ok(SimulationMode::Visual));
        assert_eq!("DATA_ONLY".parse::<SimulationMode>(), Ok(SimulationMode::DataOnly));
        assert!("video".parse::<SimulationMode>().is_err());
    }

    #[test]
    fn test_visual_without_channel_errors() {
        let cfg = NavConfig {
            allow_keys: false,
            show_clickable_nav: false,
            ..pages(2)
        };
        let opts = SimulationOptions {
            seed: Some(1),
            mode: SimulationMode::Visual,
            ..Default::default()
        };
        assert!(matches!(simulate(&cfg, &opts), Err(SimError::NoInputChannel)));
    }
}
