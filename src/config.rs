//! Configuration for the simulation kernel

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration for a kernel instance.
///
/// Invalid combinations are rejected by [`KernelConfig::validate`] before any
/// state is allocated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelConfig {
    // Table sizes
    /// Number of agents created at init
    pub population: u32,
    /// Number of regions on the unit grid
    pub regions: u32,
    /// Hard cap on the live population (births are skipped beyond it)
    pub max_population: u32,

    // Social graph
    /// Watts–Strogatz mean degree (rounded up to even)
    pub avg_connections: u32,
    /// Probability that a lattice edge is rewired to a random target
    pub rewire_prob: f64,

    // Belief dynamics
    /// Influence step size per tick
    pub step_size: f64,
    /// Lower bound on the similarity gate
    pub sim_floor: f64,
    /// Use the regional mean-field approximation instead of pairwise updates
    pub use_mean_field: bool,

    // Demographic pacing
    /// Simulation ticks per year (a tick is 1/ticks_per_year years)
    pub ticks_per_year: u32,
    /// Age at which the terminal mortality band begins
    pub max_age_years: f64,
    /// Comfortable population per region; crowding penalties start above it
    pub region_capacity: u32,
    /// Gates mortality, fertility, aging and migration
    pub demography_enabled: bool,

    // Determinism
    /// Master RNG seed; every subsystem stream derives from it
    pub seed: u64,

    /// Path the `run` command writes metrics CSV rows to
    pub metrics_path: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            population: 50_000,
            regions: 200,
            max_population: 200_000,
            avg_connections: 8,
            rewire_prob: 0.05,
            step_size: 0.15,
            sim_floor: 0.05,
            use_mean_field: false,
            ticks_per_year: 10,
            max_age_years: 90.0,
            region_capacity: 1_000,
            demography_enabled: true,
            seed: 42,
            metrics_path: "data/metrics.csv".to_string(),
        }
    }
}

impl KernelConfig {
    /// Check the configuration for nonsensical values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population == 0 {
            return Err(ConfigError::ZeroPopulation);
        }
        if self.regions == 0 {
            return Err(ConfigError::ZeroRegions);
        }
        if self.ticks_per_year == 0 {
            return Err(ConfigError::NonPositive {
                field: "ticks_per_year",
            });
        }
        if self.max_age_years <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "max_age_years",
            });
        }
        if self.region_capacity == 0 {
            return Err(ConfigError::NonPositive {
                field: "region_capacity",
            });
        }
        if self.max_population < self.population {
            return Err(ConfigError::CapBelowPopulation {
                cap: self.max_population,
                population: self.population,
            });
        }
        if !(0.0..=1.0).contains(&self.rewire_prob) {
            return Err(ConfigError::OutOfRange {
                field: "rewire_prob",
                value: self.rewire_prob,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.step_size < 0.0 || !self.step_size.is_finite() {
            return Err(ConfigError::OutOfRange {
                field: "step_size",
                value: self.step_size,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if !(0.0..=1.0).contains(&self.sim_floor) {
            return Err(ConfigError::OutOfRange {
                field: "sim_floor",
                value: self.sim_floor,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }

    /// Parameters for a small fast test kernel.
    #[cfg(test)]
    pub fn fast_test() -> Self {
        KernelConfig {
            population: 400,
            regions: 8,
            max_population: 2_000,
            avg_connections: 6,
            rewire_prob: 0.05,
            ..KernelConfig::default()
        }
    }
}
