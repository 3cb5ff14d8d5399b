//! Random draws used by the simulator.
//!
//! Viewing times follow an ex-Gaussian (normal + exponential), the usual
//! shape for human response times.

use rand::Rng;

/// Normal draw via Box-Muller
pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    // 1 - [0, 1) keeps u1 away from zero
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + sd * z
}

/// Exponential draw with the given rate (1 / mean)
pub fn sample_exponential<R: Rng + ?Sized>(rng: &mut R, rate: f64) -> f64 {
    if !(rate.is_finite() && rate > 0.0) {
        return 0.0;
    }
    let u: f64 = rng.gen();
    -(1.0 - u).ln() / rate
}

pub fn sample_ex_gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64, rate: f64) -> f64 {
    sample_normal(rng, mean, sd) + sample_exponential(rng, rate)
}

/// NaN counts as never
pub fn sample_bernoulli<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    if p.is_nan() {
        return false;
    }
    rng.gen_bool(p.clamp(0.0, 1.0))
}

/// Ex-Gaussian parameters for one viewing-time draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTimeModel {
    pub mean: f64,
    pub sd: f64,
    pub rate: f64,
}

impl ViewTimeModel {
    /// ~3.3s per page
    pub fn default_page() -> Self {
        Self {
            mean: 3000.0,
            sd: 300.0,
            rate: 1.0 / 300.0,
        }
    }

    /// Centred on an even share of a target duration
    pub fn around(avg_ms: f64) -> Self {
        let sd = avg_ms / 10.0;
        Self {
            mean: avg_ms,
            sd,
            rate: if sd > 0.0 { 1.0 / sd } else { 0.0 },
        }
    }

    /// Whole milliseconds, never below `floor_ms`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, floor_ms: u64) -> u64 {
        let t = sample_ex_gaussian(rng, self.mean, self.sd, self.rate);
        t.max(floor_ms as f64).max(0.0).round() as u64
    }
}
