//! Cohort mortality
//!
//! Annual mortality is age-banded and modulated by regional development and
//! welfare; the per-tick probability is `1 − (1 − p_year)^(1/ticks_per_year)`.
//! Deaths per cohort are drawn once from a binomial, then realized on
//! uniformly sampled members.

use rand::Rng;
use rand_distr::{Binomial, Distribution};

use crate::agents::table::AgentTable;
use crate::config::KernelConfig;
use crate::demography::{CohortLedger, NUM_BANDS};
use crate::economy::Economy;
use crate::error::KernelError;
use crate::events::EventLog;

/// Annual mortality per age band: [0,5) [5,15) [15,50) [50,70) [70,85) [85,90) 90+.
const BAND_MORTALITY: [f64; NUM_BANDS] = [0.01, 0.001, 0.002, 0.01, 0.05, 0.15, 1.0];

/// Annual mortality for one cohort, after regional modulation.
pub fn annual_mortality(band: usize, development: f64, welfare: f64) -> f64 {
    let base = BAND_MORTALITY[band];
    let modulation = (1.0 - 0.3 * development.min(1.0)) * (1.0 - 0.2 * welfare.min(1.0));
    let p = (base * modulation).max(0.1 * base);
    if band == NUM_BANDS - 1 {
        // The terminal band never drops below 50%/year
        p.max(0.5)
    } else {
        p.min(1.0)
    }
}

/// Convert an annual probability to a per-tick probability.
pub fn per_tick_probability(p_year: f64, ticks_per_year: u32) -> f64 {
    1.0 - (1.0 - p_year.clamp(0.0, 1.0)).powf(1.0 / ticks_per_year as f64)
}

pub fn apply_mortality<R: Rng>(
    table: &mut AgentTable,
    cohorts: &CohortLedger,
    econ: &Economy,
    cfg: &KernelConfig,
    tick: u64,
    rng: &mut R,
    events: &mut EventLog,
) -> Result<(), KernelError> {
    for region in 0..cohorts.num_regions() as u32 {
        let dev = econ.regions[region as usize].development;
        let welfare = econ.regions[region as usize].welfare;
        for band in 0..NUM_BANDS {
            let p_year = annual_mortality(band, dev, welfare);
            let p_tick = per_tick_probability(p_year, cfg.ticks_per_year);
            for female in [false, true] {
                let members = cohorts.members(region, band, female);
                if members.is_empty() || p_tick <= 0.0 {
                    continue;
                }
                let deaths = if p_tick >= 1.0 {
                    members.len() as u64
                } else {
                    Binomial::new(members.len() as u64, p_tick)
                        .expect("per-tick probability in [0,1]")
                        .sample(rng)
                };
                if deaths == 0 {
                    continue;
                }
                for &id in sample_distinct(members, deaths as usize, rng).iter() {
                    let age = table.age[id as usize];
                    table.mark_dead(id);
                    events.log_death(tick, id, region, age);
                }
            }
        }
    }

    // Hard cull at the configured maximum age
    let overdue: Vec<u32> = table
        .iter_live()
        .filter(|&i| table.age[i] > cfg.max_age_years)
        .map(|i| i as u32)
        .collect();
    for id in overdue {
        let i = id as usize;
        let (age, region) = (table.age[i], table.region[i]);
        table.mark_dead(id);
        events.log_death(tick, id, region, age);
    }
    Ok(())
}

/// Sample `count` distinct members uniformly (partial Fisher–Yates).
fn sample_distinct<R: Rng>(members: &[u32], count: usize, rng: &mut R) -> Vec<u32> {
    let count = count.min(members.len());
    let mut pool = members.to_vec();
    for i in 0..count {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
    }
    pool.truncate(count);
    pool
}
