//! Migration between regions
//!
//! Every migration tick, agents under hardship consider relocating. Push
//! pressure comes from the origin region and the agent's mobility and age;
//! pull is the attractiveness gap to the best of a handful of sampled
//! destinations. Movers keep a sociality-dependent fraction of their old
//! ties and drop the rest symmetrically.

use rand::Rng;

use crate::agents::graph;
use crate::agents::table::AgentTable;
use crate::config::KernelConfig;
use crate::economy::Economy;
use crate::events::EventLog;
use crate::seeds;

/// Ticks between migration passes. Offset from the economy interval so a
/// migration tick always sees settled prices and hardship.
pub const MIGRATION_INTERVAL: u64 = 10;
pub const MIGRATION_PHASE: u64 = 5;

/// Destinations sampled per migration candidate.
const DESTINATION_SAMPLES: usize = 5;

/// Mobility peaks at 25 and fades quadratically to zero by 75.
pub fn age_mobility(age: f64) -> f64 {
    (1.0 - (age - 25.0).powi(2) / 2500.0).max(0.0)
}

/// How appealing a region looks to would-be migrants.
pub fn attractiveness(region: &crate::economy::RegionEconomy, pop: usize, capacity: f64) -> f64 {
    let crowding_penalty = -0.5 * (pop as f64 / capacity - 1.0).max(0.0);
    region.welfare - 2.0 * region.hardship + 0.2 * region.development + crowding_penalty
}

/// One migration pass over all live agents.
pub fn run_migration_tick(
    table: &mut AgentTable,
    econ: &Economy,
    cfg: &KernelConfig,
    tick: u64,
    migration_seed: u64,
    events: &mut EventLog,
) {
    let num_regions = econ.regions.len();
    if num_regions < 2 {
        return;
    }
    let mut rng = seeds::tick_rng(migration_seed, tick);
    let capacity = cfg.region_capacity as f64;

    // Freeze region populations and attractiveness for the whole pass so the
    // decision of one mover cannot reorder another's.
    table.rebuild_region_index();
    let scores: Vec<f64> = (0..num_regions)
        .map(|r| {
            attractiveness(
                &econ.regions[r],
                table.region_index(r as u32).len(),
                capacity,
            )
        })
        .collect();

    let candidates: Vec<usize> = table.iter_live().collect();
    for i in candidates {
        let origin = table.region[i] as usize;
        let age_factor = age_mobility(table.age[i]);
        if age_factor <= 0.0 {
            continue;
        }
        let push = econ.regions[origin].hardship * table.m_mobility[i] * age_factor;
        let p = (0.01 * push).clamp(0.0, 1.0);
        if p <= 0.0 || !rng.gen_bool(p) {
            continue;
        }

        // Sample a handful of destinations and take the best
        let mut best: Option<(usize, f64)> = None;
        for _ in 0..DESTINATION_SAMPLES {
            let d = rng.gen_range(0..num_regions);
            if d == origin {
                continue;
            }
            if best.map_or(true, |(_, score)| scores[d] > score) {
                best = Some((d, scores[d]));
            }
        }
        let Some((dest, dest_score)) = best else {
            continue;
        };

        let threshold = 0.15 + 0.3 * (1.0 - table.openness[i]);
        if dest_score - scores[origin] <= threshold {
            continue;
        }

        relocate(table, i as u32, dest as u32, &mut rng);
        events.log_migration(tick, i as u32, origin as u32, dest as u32);
    }

    table.rebuild_region_index();
}

/// Move one agent: update its region, keep a sociality-dependent fraction of
/// its old ties, and drop the rest from both sides.
fn relocate<R: Rng>(table: &mut AgentTable, id: u32, dest: u32, rng: &mut R) {
    let i = id as usize;
    table.region[i] = dest;

    let old = table.neighbors[i].clone();
    if old.is_empty() {
        return;
    }
    let keep_fraction = 0.2 + 0.4 * table.sociality[i];
    let keep_count = (keep_fraction * old.len() as f64).round() as usize;

    // Uniform choice of which ties survive the move
    let mut pool = old;
    for slot in 0..keep_count.min(pool.len()) {
        let j = rng.gen_range(slot..pool.len());
        pool.swap(slot, j);
    }
    for &dropped in &pool[keep_count.min(pool.len())..] {
        graph::remove_edge(table, id, dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::table::test_template;

    fn setup(per_region: usize, regions: u32) -> (AgentTable, Economy) {
        let mut table = AgentTable::new(regions);
        for r in 0..regions {
            for j in 0..per_region {
                let mut tpl = test_template(r);
                tpl.age = 25.0;
                tpl.sociality = (j % 10) as f64 / 10.0;
                table.add_agent(tpl);
            }
        }
        table.rebuild_region_index();
        let econ = Economy::new(regions, 9);
        (table, econ)
    }

    #[test]
    fn test_age_mobility_peaks_at_25() {
        assert_eq!(age_mobility(25.0), 1.0);
        assert!(age_mobility(40.0) < 1.0);
        assert_eq!(age_mobility(80.0), 0.0);
        assert!(age_mobility(5.0) > 0.0);
    }

    #[test]
    fn test_migration_flows_from_hardship_to_welfare() {
        let (mut table, mut econ) = setup(200, 4);
        econ.regions[0].hardship = 0.95;
        econ.regions[0].welfare = 0.0;
        for r in 1..4 {
            econ.regions[r].hardship = 0.0;
            econ.regions[r].welfare = 1.5;
        }
        let cfg = KernelConfig::fast_test();
        let mut events = EventLog::new();

        let before = table.region_index(0).len();
        for tick in 0..200 {
            run_migration_tick(&mut table, &econ, &cfg, tick, 31, &mut events);
        }
        let after = table.region_index(0).len();
        assert!(after < before, "hardship region should lose people: {after} vs {before}");
        assert!(!events.is_empty());
        // Conservation: migration never changes the live count
        assert_eq!(table.live_count(), 800);
    }

    #[test]
    fn test_contented_population_stays_put() {
        let (mut table, mut econ) = setup(100, 4);
        for region in &mut econ.regions {
            region.hardship = 0.0;
            region.welfare = 1.0;
        }
        let cfg = KernelConfig::fast_test();
        let mut events = EventLog::new();
        for tick in 0..50 {
            run_migration_tick(&mut table, &econ, &cfg, tick, 31, &mut events);
        }
        assert!(events.is_empty(), "no hardship, no migration");
    }

    #[test]
    fn test_relocation_prunes_edges_symmetrically() {
        let (mut table, _) = setup(50, 2);
        // Build a hub: agent 0 knows 10 others
        for j in 1..=10 {
            graph::add_edge(&mut table, 0, j);
        }
        let mut rng = crate::seeds::tick_rng(1, 1);
        relocate(&mut table, 0, 1, &mut rng);

        assert_eq!(table.region[0], 1);
        let kept = table.neighbors[0].len();
        // sociality 0.0 -> keep ~20% of 10 ties
        assert!(kept <= 4, "kept {kept}");
        assert!(graph::is_symmetric(&table));
    }
}
