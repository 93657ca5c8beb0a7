//! Cohort demographics
//!
//! Agents are aggregated into (region × age-band × sex) cohorts each tick;
//! mortality and fertility are sampled per cohort with exact binomial
//! counts, so the RNG cost is O(cohorts) rather than O(N). Individual
//! agents only appear at the sampling points: who dies, who gives birth.

pub mod fertility;
pub mod mortality;

use crate::agents::table::AgentTable;
use crate::config::KernelConfig;
use crate::economy::Economy;
use crate::error::KernelError;
use crate::events::EventLog;
use crate::seeds;
use crate::validation::NumericWarnings;

/// Age band boundaries in years; the last band is open-ended.
pub const AGE_BAND_EDGES: [f64; 7] = [0.0, 5.0, 15.0, 50.0, 70.0, 85.0, 90.0];

pub const NUM_BANDS: usize = 7;

/// Band index of the fertile female cohorts, [15, 50).
pub const FERTILE_BAND: usize = 2;

/// Band index for an age in years.
pub fn age_band(age: f64) -> usize {
    match AGE_BAND_EDGES.iter().rposition(|&edge| age >= edge) {
        Some(band) => band,
        None => 0,
    }
}

/// Member lists for every (region, band, sex) cohort.
///
/// Rebuilt from the table each demography tick; the totals therefore always
/// reconcile with the individual rows they were read from.
pub struct CohortLedger {
    num_regions: usize,
    /// Indexed by `(region * NUM_BANDS + band) * 2 + sex`
    members: Vec<Vec<u32>>,
}

impl CohortLedger {
    pub fn from_table(table: &AgentTable) -> Self {
        let num_regions = table.num_regions() as usize;
        let mut members = vec![Vec::new(); num_regions * NUM_BANDS * 2];
        for i in table.iter_live() {
            let idx = cohort_index(
                table.region[i],
                age_band(table.age[i]),
                table.female[i],
            );
            members[idx].push(i as u32);
        }
        CohortLedger {
            num_regions,
            members,
        }
    }

    pub fn members(&self, region: u32, band: usize, female: bool) -> &[u32] {
        &self.members[cohort_index(region, band, female)]
    }

    pub fn count(&self, region: u32, band: usize, female: bool) -> usize {
        self.members(region, band, female).len()
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    /// Total members across all cohorts (equals the live population).
    pub fn total(&self) -> usize {
        self.members.iter().map(Vec::len).sum()
    }
}

fn cohort_index(region: u32, band: usize, female: bool) -> usize {
    (region as usize * NUM_BANDS + band) * 2 + female as usize
}

/// One demography tick: aging, cohort mortality, cohort fertility.
pub fn run_demography_tick(
    table: &mut AgentTable,
    econ: &Economy,
    cfg: &KernelConfig,
    tick: u64,
    demography_seed: u64,
    events: &mut EventLog,
    warnings: &mut NumericWarnings,
) -> Result<(), KernelError> {
    let mut rng = seeds::tick_rng(demography_seed, tick);
    let years_per_tick = 1.0 / cfg.ticks_per_year as f64;

    let live: Vec<usize> = table.iter_live().collect();
    for i in live {
        table.age[i] += years_per_tick;
    }

    let cohorts = CohortLedger::from_table(table);
    mortality::apply_mortality(table, &cohorts, econ, cfg, tick, &mut rng, events)?;
    fertility::apply_fertility(table, &cohorts, econ, cfg, tick, &mut rng, events, warnings)?;
    Ok(())
}
