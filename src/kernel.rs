//! The simulation kernel
//!
//! Owns all state (agent table, economy, cluster model) and advances it
//! tick by tick in a fixed phase order: economy, demography, migration,
//! beliefs, clustering, cleanup. A tick is a synchronous transaction; the
//! only parallelism lives inside the belief engine's two-phase update.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::agents::graph;
use crate::agents::table::{AgentTable, AgentTemplate, BELIEF_DIMS, NONE};
use crate::beliefs;
use crate::clustering::{ClusterModel, DEFAULT_K};
use crate::config::KernelConfig;
use crate::demography;
use crate::economy::{Economy, ECONOMY_INTERVAL};
use crate::error::KernelError;
use crate::events::EventLog;
use crate::metrics::{self, Metrics};
use crate::migration::{self, MIGRATION_INTERVAL, MIGRATION_PHASE};
use crate::seeds::{self, SubsystemSeeds};
use crate::validation::NumericWarnings;

/// Ticks between dead-slot compactions.
pub const COMPACT_INTERVAL: u64 = 5;

/// The complete simulation state.
#[derive(Debug)]
pub struct Kernel {
    cfg: KernelConfig,
    seeds: SubsystemSeeds,
    generation: u64,
    pub table: AgentTable,
    pub economy: Economy,
    pub clusters: ClusterModel,
    warnings: NumericWarnings,
}

impl Kernel {
    /// Build a kernel from a validated configuration.
    pub fn new(cfg: KernelConfig) -> Result<Self, KernelError> {
        cfg.validate()?;
        let seeds = SubsystemSeeds::from_master(cfg.seed);

        let mut table = AgentTable::new(cfg.regions);
        init_agents(&mut table, &cfg, seeds.init);

        let mut graph_rng = seeds::tick_rng(seeds.graph, 0);
        graph::build_small_world(&mut table, cfg.avg_connections, cfg.rewire_prob, &mut graph_rng);
        table.rebuild_region_index();

        let economy = Economy::new(cfg.regions, seeds.economy);
        let mut cluster_rng = seeds::tick_rng(seeds.clustering, 0);
        let clusters = ClusterModel::new(DEFAULT_K, &table, &mut cluster_rng);

        Ok(Kernel {
            cfg,
            seeds,
            generation: 0,
            table,
            economy,
            clusters,
            warnings: NumericWarnings::default(),
        })
    }

    /// Reassemble a kernel from restored parts (checkpoint load).
    pub fn from_parts(
        cfg: KernelConfig,
        generation: u64,
        table: AgentTable,
        economy: Economy,
    ) -> Result<Self, KernelError> {
        cfg.validate()?;
        let seeds = SubsystemSeeds::from_master(cfg.seed);
        let mut cluster_rng = seeds::tick_rng(seeds.clustering, generation);
        let clusters = ClusterModel::new(DEFAULT_K, &table, &mut cluster_rng);
        Ok(Kernel {
            cfg,
            seeds,
            generation,
            table,
            economy,
            clusters,
            warnings: NumericWarnings::default(),
        })
    }

    /// Rebuild all state under a new configuration.
    pub fn reset(&mut self, cfg: KernelConfig) -> Result<(), KernelError> {
        *self = Kernel::new(cfg)?;
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &KernelConfig {
        &self.cfg
    }

    pub fn seeds(&self) -> &SubsystemSeeds {
        &self.seeds
    }

    /// Advance one tick. Phases run in the fixed order; a fatal error stops
    /// the run with the state as of the failing phase.
    pub fn tick(&mut self, events: &mut EventLog) -> Result<(), KernelError> {
        let t = self.generation;

        // Debug builds verify every agent→region and neighbor index before
        // the phases dereference them.
        #[cfg(debug_assertions)]
        self.validate_indices()?;

        // (a) Economy
        if t % ECONOMY_INTERVAL == 0 {
            self.table.rebuild_region_index();
            self.economy.run_tick(
                &mut self.table,
                t,
                self.seeds.economy,
                events,
                &mut self.warnings,
            )?;
        }

        // (b) Demography, (c) Migration, both gated by the same knob
        if self.cfg.demography_enabled {
            demography::run_demography_tick(
                &mut self.table,
                &self.economy,
                &self.cfg,
                t,
                self.seeds.demography,
                events,
                &mut self.warnings,
            )?;
            self.table.rebuild_region_index();

            if t % MIGRATION_INTERVAL == MIGRATION_PHASE {
                migration::run_migration_tick(
                    &mut self.table,
                    &self.economy,
                    &self.cfg,
                    t,
                    self.seeds.migration,
                    events,
                );
            }
        }

        // (d) Beliefs
        beliefs::update_beliefs(
            &mut self.table,
            &self.cfg,
            &self.economy,
            t,
            self.seeds.beliefs,
            &mut self.warnings,
        )?;

        // (e) Clustering
        if self.clusters.reassign_interval > 0 && t > 0 && t % self.clusters.reassign_interval == 0
        {
            self.clusters
                .reassign(&self.table, t, self.seeds.clustering, events);
        } else {
            self.clusters
                .online_update(&self.table, t, self.seeds.clustering);
        }

        // (f) Cleanup
        if t % COMPACT_INTERVAL == 0 {
            self.table.compact();
        }

        self.generation += 1;
        self.warnings.report_and_reset(t);
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn validate_indices(&self) -> Result<(), KernelError> {
        use crate::validation::check_index;
        let num_regions = self.economy.regions.len();
        let num_agents = self.table.len();
        for i in self.table.iter_live() {
            check_index("agent region", self.table.region[i] as usize, num_regions)?;
            for &j in &self.table.neighbors[i] {
                check_index("neighbor id", j as usize, num_agents)?;
            }
        }
        Ok(())
    }

    pub fn step_n(&mut self, n: u64, events: &mut EventLog) -> Result<(), KernelError> {
        for _ in 0..n {
            self.tick(events)?;
        }
        Ok(())
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::compute(&self.table, &self.economy, self.generation)
    }

    /// Trajectory fingerprint for determinism checks.
    pub fn belief_hash(&self) -> u64 {
        metrics::belief_hash(&self.table)
    }
}

/// Roll the initial population.
fn init_agents(table: &mut AgentTable, cfg: &KernelConfig, init_seed: u64) {
    let mut rng = seeds::tick_rng(init_seed, 0);
    let belief_dist: Normal<f64> = Normal::new(0.0, 0.75).unwrap();
    let trait_dist: Normal<f64> = Normal::new(0.5, 0.15).unwrap();

    for i in 0..cfg.population {
        let openness: f64 = trait_dist.sample(&mut rng).clamp(0.0, 1.0);
        let conformity: f64 = trait_dist.sample(&mut rng).clamp(0.0, 1.0);
        let assertiveness: f64 = trait_dist.sample(&mut rng).clamp(0.0, 1.0);
        let sociality: f64 = trait_dist.sample(&mut rng).clamp(0.0, 1.0);

        let mut x = [0.0; BELIEF_DIMS];
        for slot in &mut x {
            *slot = belief_dist.sample(&mut rng);
        }

        table.add_agent(AgentTemplate {
            region: rng.gen_range(0..cfg.regions),
            age: rng.gen_range(0.0..70.0),
            female: rng.gen_bool(0.5),
            parent_a: NONE,
            parent_b: NONE,
            lineage_id: i,
            primary_lang: rng.gen_range(0..4),
            dialect: rng.gen::<u8>(),
            fluency: (0.7 + 0.3 * (rng.gen::<f64>() - 0.5)).clamp(0.3, 1.0),
            openness,
            conformity,
            assertiveness,
            sociality,
            x,
            m_comm: 1.0,
            m_susceptibility: (0.7 + 0.6 * (openness - 0.5)).clamp(0.4, 1.2),
            m_mobility: 0.8 + 0.4 * sociality,
            wealth: rng.gen_range(0.5..2.0),
            productivity: rng.gen_range(0.5..1.5),
            sector: rng.gen_range(0..crate::economy::NUM_GOODS as u8),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_kernel_honors_config_sizes() {
        let cfg = KernelConfig::fast_test();
        let kernel = Kernel::new(cfg.clone()).unwrap();
        assert_eq!(kernel.table.live_count(), cfg.population as usize);
        assert_eq!(kernel.economy.regions.len(), cfg.regions as usize);
        assert_eq!(kernel.generation(), 0);
        assert!(graph::is_symmetric(&kernel.table));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cfg = KernelConfig {
            regions: 0,
            ..KernelConfig::fast_test()
        };
        assert!(Kernel::new(cfg).is_err());
    }

    #[test]
    fn test_tick_preserves_invariants() {
        let mut kernel = Kernel::new(KernelConfig::fast_test()).unwrap();
        let mut events = EventLog::new();
        kernel.step_n(25, &mut events).unwrap();

        assert_eq!(kernel.generation(), 25);
        for i in kernel.table.iter_live() {
            for k in 0..BELIEF_DIMS {
                assert!(kernel.table.b[i][k].is_finite());
                assert!((-1.0..=1.0).contains(&kernel.table.b[i][k]));
            }
            assert!(kernel.table.wealth[i] >= 0.0);
            assert!(kernel.table.age[i] >= 0.0);
            assert!((kernel.table.region[i] as usize) < kernel.economy.regions.len());
        }
        assert!(graph::is_symmetric(&kernel.table));

        // Region index reconciles with the alive flags
        kernel.table.rebuild_region_index();
        let indexed: usize = (0..kernel.table.num_regions())
            .map(|r| kernel.table.region_index(r).len())
            .sum();
        assert_eq!(indexed, kernel.table.live_count());
    }

    #[test]
    fn test_population_conserved_without_demography() {
        let cfg = KernelConfig {
            demography_enabled: false,
            ..KernelConfig::fast_test()
        };
        let mut kernel = Kernel::new(cfg.clone()).unwrap();
        let mut events = EventLog::new();
        kernel.step_n(50, &mut events).unwrap();
        assert_eq!(kernel.table.live_count(), cfg.population as usize);
    }

    #[test]
    fn test_identical_seeds_identical_trajectories() {
        let cfg = KernelConfig {
            seed: 12345,
            use_mean_field: true,
            ..KernelConfig::fast_test()
        };
        let mut a = Kernel::new(cfg.clone()).unwrap();
        let mut b = Kernel::new(cfg).unwrap();
        let mut events_a = EventLog::new();
        let mut events_b = EventLog::new();
        a.step_n(10, &mut events_a).unwrap();
        b.step_n(10, &mut events_b).unwrap();

        assert_eq!(a.belief_hash(), b.belief_hash());
        assert_eq!(a.table.b, b.table.b);
        assert_eq!(a.table.live_count(), b.table.live_count());
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = Kernel::new(KernelConfig {
            seed: 1,
            ..KernelConfig::fast_test()
        })
        .unwrap();
        let mut b = Kernel::new(KernelConfig {
            seed: 2,
            ..KernelConfig::fast_test()
        })
        .unwrap();
        let mut events = EventLog::new();
        a.step_n(5, &mut events).unwrap();
        b.step_n(5, &mut events).unwrap();
        assert_ne!(a.belief_hash(), b.belief_hash());
    }

    #[test]
    fn test_reset_rebuilds_from_new_config() {
        let mut kernel = Kernel::new(KernelConfig::fast_test()).unwrap();
        let mut events = EventLog::new();
        kernel.step_n(10, &mut events).unwrap();

        let new_cfg = KernelConfig {
            population: 200,
            regions: 5,
            ..KernelConfig::fast_test()
        };
        kernel.reset(new_cfg).unwrap();
        assert_eq!(kernel.generation(), 0);
        assert_eq!(kernel.table.live_count(), 200);
        assert_eq!(kernel.economy.regions.len(), 5);
    }

    #[test]
    fn test_cluster_assignments_cover_live_population() {
        let mut kernel = Kernel::new(KernelConfig::fast_test()).unwrap();
        let mut events = EventLog::new();
        kernel.step_n(12, &mut events).unwrap();

        let stats = kernel
            .clusters
            .stats(&kernel.table, kernel.generation(), kernel.seeds().clustering);
        let total: usize = stats.iter().map(|s| s.size).sum();
        assert_eq!(total, kernel.table.live_count());
    }
}
