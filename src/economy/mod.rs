//! Regional economy: production, consumption, trade, and system change
//!
//! Five goods are produced and consumed per region; surpluses diffuse along
//! a geography-derived trade graph. Prices, specialization and economic
//! systems all emerge from the same loop. Runs every
//! [`ECONOMY_INTERVAL`] ticks.

pub mod production;
pub mod systems;
pub mod trade;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agents::table::AgentTable;
use crate::error::KernelError;
use crate::events::EventLog;
use crate::seeds;
use crate::validation::NumericWarnings;

pub use systems::EconomicSystem;

/// Ticks between economy updates.
pub const ECONOMY_INTERVAL: u64 = 10;

/// Number of tradeable goods.
pub const NUM_GOODS: usize = 5;

/// Good indices; sectors use the same numbering.
pub const GOOD_NAMES: [&str; NUM_GOODS] = ["food", "energy", "tools", "services", "luxury"];

pub const FOOD: usize = 0;
pub const ENERGY: usize = 1;
pub const TOOLS: usize = 2;
pub const SERVICES: usize = 3;
pub const LUXURY: usize = 4;

/// Technology multiplier per good, shared by all regions.
pub const TECH: [f64; NUM_GOODS] = [1.0, 1.1, 1.2, 1.3, 1.4];

/// Broad climate band derived from the latitude proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClimateBand {
    Hot,
    Temperate,
    Cold,
}

/// Economic state of one region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionEconomy {
    /// Position on the unit grid
    pub x: f64,
    pub y: f64,
    /// Climate proxy: 0 at the equator, 1 at the poles
    pub latitude: f64,

    pub endowment: [f64; NUM_GOODS],
    pub production: [f64; NUM_GOODS],
    pub demand: [f64; NUM_GOODS],
    pub prices: [f64; NUM_GOODS],
    pub specialization: [f64; NUM_GOODS],

    pub development: f64,
    pub welfare: f64,
    pub hardship: f64,
    pub inequality: f64,
    /// Intrinsic productive efficiency; the economic system's factor is
    /// applied on top at production time
    pub efficiency: f64,
    pub system_stability: f64,
    pub system: EconomicSystem,

    /// Partner regions of the current trade graph (symmetric)
    pub trade_partners: Vec<u32>,
    /// Production suppression from conflict, 0 in peacetime
    pub war_intensity: f64,
}

impl RegionEconomy {
    pub fn climate(&self) -> ClimateBand {
        if self.latitude < 0.33 {
            ClimateBand::Hot
        } else if self.latitude < 0.66 {
            ClimateBand::Temperate
        } else {
            ClimateBand::Cold
        }
    }
}

/// Aggregate flows of the most recent trade pass, for metrics and
/// conservation checks.
#[derive(Clone, Debug, Default)]
pub struct TradeSummary {
    /// Value of goods shipped (quantity × exporter price)
    pub volume: f64,
    /// Quantity lost in transport across all goods
    pub transport_loss: f64,
    /// Per-good (exports, imports, loss) totals
    pub per_good: [(f64, f64, f64); NUM_GOODS],
}

/// The whole economic layer: all regions plus trade bookkeeping.
#[derive(Clone, Debug)]
pub struct Economy {
    pub regions: Vec<RegionEconomy>,
    pub trade: TradeSummary,
    /// Region ids sorted by distance from each region (excluding itself),
    /// fixed at construction since geography never changes
    neighbor_order: Vec<Vec<u32>>,
}

impl Economy {
    /// Lay out `num_regions` regions on the unit grid and roll their
    /// endowments from the economy seed.
    pub fn new(num_regions: u32, economy_seed: u64) -> Self {
        let mut rng = seeds::tick_rng(economy_seed, 0);
        let side = (num_regions as f64).sqrt().ceil() as u32;

        let mut regions = Vec::with_capacity(num_regions as usize);
        for r in 0..num_regions {
            let gx = (r % side) as f64 + 0.5;
            let gy = (r / side) as f64 + 0.5;
            let x = (gx / side as f64 + rng.gen_range(-0.02..0.02)).clamp(0.0, 1.0);
            let y = (gy / side as f64 + rng.gen_range(-0.02..0.02)).clamp(0.0, 1.0);
            let latitude = (y - 0.5).abs() * 2.0;

            let mut endowment = [0.0; NUM_GOODS];
            for slot in &mut endowment {
                *slot = rng.gen_range(0.5..1.5);
            }
            // Climate biases the resource base
            if latitude > 0.66 {
                endowment[FOOD] *= 0.7;
                endowment[ENERGY] *= 1.3;
            } else if latitude < 0.33 {
                endowment[FOOD] *= 1.2;
            }

            regions.push(RegionEconomy {
                x,
                y,
                latitude,
                endowment,
                production: [0.0; NUM_GOODS],
                demand: [0.0; NUM_GOODS],
                prices: [1.0; NUM_GOODS],
                specialization: [0.0; NUM_GOODS],
                development: rng.gen_range(0.1..0.5),
                welfare: 0.5,
                hardship: 0.0,
                inequality: 0.0,
                efficiency: rng.gen_range(0.8..1.2),
                system_stability: 1.0,
                system: EconomicSystem::Mixed,
                trade_partners: Vec::new(),
                war_intensity: 0.0,
            });
        }

        let neighbor_order = build_neighbor_order(&regions);
        Economy {
            regions,
            trade: TradeSummary::default(),
            neighbor_order,
        }
    }

    /// Reassemble an economy from restored region state (checkpoint load).
    pub fn from_regions(regions: Vec<RegionEconomy>) -> Self {
        let neighbor_order = build_neighbor_order(&regions);
        Economy {
            regions,
            trade: TradeSummary::default(),
            neighbor_order,
        }
    }

    /// Other regions of `r`, nearest first.
    pub fn neighbors_by_distance(&self, r: usize) -> &[u32] {
        &self.neighbor_order[r]
    }

    /// One full economy pass, in the fixed phase order: production, demand,
    /// trade diffusion, prices, specialization, income, hardship, transitions.
    pub fn run_tick(
        &mut self,
        table: &mut AgentTable,
        tick: u64,
        economy_seed: u64,
        events: &mut EventLog,
        warnings: &mut NumericWarnings,
    ) -> Result<(), KernelError> {
        let mut rng = seeds::tick_rng(economy_seed, tick);

        trade::refresh_trade_partners(self, &mut rng);
        production::update_production(self, table);
        production::update_demand(self, table);
        trade::diffuse_trade(self, tick, events, warnings)?;
        trade::update_prices(self);
        trade::drift_specialization(self);
        production::update_income_and_wealth(self, table, warnings)?;
        production::update_hardship_and_development(self, table, tick, events, warnings)?;
        systems::update_system_transitions(self, table, tick, &mut rng, events);
        Ok(())
    }
}

fn build_neighbor_order(regions: &[RegionEconomy]) -> Vec<Vec<u32>> {
    (0..regions.len())
        .map(|r| {
            let mut others: Vec<u32> = (0..regions.len() as u32)
                .filter(|&o| o as usize != r)
                .collect();
            others.sort_by(|&a, &b| {
                let da = dist_sq(&regions[r], &regions[a as usize]);
                let db = dist_sq(&regions[r], &regions[b as usize]);
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });
            others
        })
        .collect()
}

fn dist_sq(a: &RegionEconomy, b: &RegionEconomy) -> f64 {
    (a.x - b.x).powi(2) + (a.y - b.y).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_economy_layout() {
        let econ = Economy::new(16, 99);
        assert_eq!(econ.regions.len(), 16);
        for region in &econ.regions {
            assert!((0.0..=1.0).contains(&region.x));
            assert!((0.0..=1.0).contains(&region.y));
            assert!((0.0..=1.0).contains(&region.latitude));
            assert!(region.prices.iter().all(|&p| p == 1.0));
            assert_eq!(region.system, EconomicSystem::Mixed);
        }
    }

    #[test]
    fn test_neighbor_order_is_sorted_by_distance() {
        let econ = Economy::new(12, 5);
        let order = econ.neighbors_by_distance(0);
        assert_eq!(order.len(), 11);
        for pair in order.windows(2) {
            let da = dist_sq(&econ.regions[0], &econ.regions[pair[0] as usize]);
            let db = dist_sq(&econ.regions[0], &econ.regions[pair[1] as usize]);
            assert!(da <= db);
        }
    }

    #[test]
    fn test_same_seed_same_economy() {
        let a = Economy::new(20, 777);
        let b = Economy::new(20, 777);
        for (ra, rb) in a.regions.iter().zip(&b.regions) {
            assert_eq!(ra.endowment, rb.endowment);
            assert_eq!(ra.development, rb.development);
        }
    }
}
