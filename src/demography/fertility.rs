//! Cohort fertility and birth materialization
//!
//! Births are sampled per fertile female cohort with the same binomial
//! scheme as mortality. Each sampled birth is then materialized as a full
//! agent: beliefs and personality blended from the parents with mutation,
//! the mother's language at half fluency, and edges into the mother's
//! neighborhood.

use rand::Rng;
use rand_distr::{Binomial, Distribution, Normal};

use crate::agents::table::{AgentTable, AgentTemplate, BELIEF_DIMS, NONE};
use crate::agents::graph;
use crate::config::KernelConfig;
use crate::demography::{CohortLedger, FERTILE_BAND};
use crate::economy::{systems, Economy};
use crate::error::KernelError;
use crate::events::EventLog;
use crate::validation::NumericWarnings;

/// Annual births per fertile woman before modulation.
const BASE_FERTILITY: f64 = 0.12;

const BELIEF_MUTATION_STD: f64 = 0.2;
const PERSONALITY_MUTATION_STD: f64 = 0.05;

/// Edges a newborn gets into the mother's neighborhood, besides the mother.
const INHERITED_NEIGHBORS: usize = 3;

/// Annual fertility for one cohort, after regional modulation.
///
/// `tradition_axis` is the regional centroid on Tradition↔Progress
/// (positive = Progress); traditional regions bear more children,
/// developed regions fewer, crowding against capacity caps everything.
pub fn annual_fertility(
    tradition_axis: f64,
    development: f64,
    wealth_ratio: f64,
    crowding: f64,
) -> f64 {
    let tradition_factor = 1.0 - 0.4 * tradition_axis.clamp(-1.0, 1.0);
    let development_factor = 1.0 - 0.3 * development.min(1.0);
    let wealth_factor = (0.8 + 0.2 * wealth_ratio).clamp(0.8, 1.2);
    (BASE_FERTILITY * tradition_factor * development_factor * wealth_factor * crowding).max(0.0)
}

#[allow(clippy::too_many_arguments)]
pub fn apply_fertility<R: Rng>(
    table: &mut AgentTable,
    cohorts: &CohortLedger,
    econ: &Economy,
    cfg: &KernelConfig,
    tick: u64,
    rng: &mut R,
    events: &mut EventLog,
    warnings: &mut NumericWarnings,
) -> Result<(), KernelError> {
    let centroids = systems::belief_centroids(table, econ.regions.len());
    let region_mean_wealth = mean_wealth(table, econ.regions.len());
    let mut capped_births: u64 = 0;

    for region in 0..cohorts.num_regions() as u32 {
        let members = cohorts.members(region, FERTILE_BAND, true);
        if members.is_empty() {
            continue;
        }
        let r = region as usize;
        let pop = table.region_index(region).len() as f64;
        let crowding = (1.0 - pop / cfg.region_capacity as f64).max(0.0);
        if crowding <= 0.0 {
            continue;
        }

        let cohort_wealth: f64 = members
            .iter()
            .map(|&id| table.wealth[id as usize])
            .sum::<f64>()
            / members.len() as f64;
        let wealth_ratio = if region_mean_wealth[r] > 0.0 {
            cohort_wealth / region_mean_wealth[r]
        } else {
            1.0
        };

        let p_year = annual_fertility(
            centroids[r][1],
            econ.regions[r].development,
            wealth_ratio,
            crowding,
        );
        let p_tick = crate::demography::mortality::per_tick_probability(p_year, cfg.ticks_per_year);
        if p_tick <= 0.0 {
            continue;
        }

        let births = Binomial::new(members.len() as u64, p_tick.min(1.0))
            .expect("per-tick probability in [0,1]")
            .sample(rng);

        for _ in 0..births {
            if table.live_count() >= cfg.max_population as usize {
                capped_births += 1;
                continue;
            }
            // The mother must still be alive; mortality ran first this tick
            let mother = members[rng.gen_range(0..members.len())];
            if !table.alive[mother as usize] {
                continue;
            }
            let child = materialize_birth(table, mother, region, rng);
            events.log_birth(tick, child, region, mother);
        }
    }

    if capped_births > 0 {
        warnings.clamped += capped_births;
        tracing::warn!(tick, capped_births, "births skipped at max_population");
    }
    Ok(())
}

fn mean_wealth(table: &AgentTable, num_regions: usize) -> Vec<f64> {
    let mut sums = vec![0.0; num_regions];
    let mut counts = vec![0usize; num_regions];
    for i in table.iter_live() {
        let r = table.region[i] as usize;
        sums[r] += table.wealth[i];
        counts[r] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect()
}

/// Create one newborn from `mother` and a father drawn from her live male
/// neighbors (falling back to asexual inheritance).
fn materialize_birth<R: Rng>(
    table: &mut AgentTable,
    mother: u32,
    region: u32,
    rng: &mut R,
) -> u32 {
    let m = mother as usize;
    let father = {
        let candidates: Vec<u32> = table.neighbors[m]
            .iter()
            .copied()
            .filter(|&j| table.alive[j as usize] && !table.female[j as usize])
            .collect();
        if candidates.is_empty() {
            NONE
        } else {
            candidates[rng.gen_range(0..candidates.len())]
        }
    };

    let belief_noise = Normal::new(0.0, BELIEF_MUTATION_STD).unwrap();
    let trait_noise = Normal::new(0.0, PERSONALITY_MUTATION_STD).unwrap();

    let mut x = [0.0; BELIEF_DIMS];
    for (k, slot) in x.iter_mut().enumerate() {
        let inherited = if father == NONE {
            table.x[m][k]
        } else {
            0.5 * (table.x[m][k] + table.x[father as usize][k])
        };
        *slot = inherited + belief_noise.sample(rng);
    }

    let blend_trait = |mother_v: f64, father_v: Option<f64>, rng: &mut R| -> f64 {
        let base = match father_v {
            Some(f) => 0.5 * (mother_v + f),
            None => mother_v,
        };
        (base + trait_noise.sample(rng)).clamp(0.0, 1.0)
    };
    let father_idx = (father != NONE).then(|| father as usize);

    let openness = blend_trait(table.openness[m], father_idx.map(|f| table.openness[f]), rng);
    let conformity = blend_trait(table.conformity[m], father_idx.map(|f| table.conformity[f]), rng);
    let assertiveness = blend_trait(
        table.assertiveness[m],
        father_idx.map(|f| table.assertiveness[f]),
        rng,
    );
    let sociality = blend_trait(table.sociality[m], father_idx.map(|f| table.sociality[f]), rng);
    let productivity = match father_idx {
        Some(f) => (0.5 * (table.productivity[m] + table.productivity[f])).max(0.1),
        None => table.productivity[m].max(0.1),
    };

    let tpl = AgentTemplate {
        region,
        age: 0.0,
        female: rng.gen_bool(0.5),
        parent_a: mother,
        parent_b: father,
        lineage_id: table.lineage_id[m],
        primary_lang: table.primary_lang[m],
        dialect: table.dialect[m],
        fluency: 0.5,
        openness,
        conformity,
        assertiveness,
        sociality,
        x,
        m_comm: 1.0,
        m_susceptibility: (0.7 + 0.6 * (openness - 0.5)).clamp(0.4, 1.2),
        m_mobility: 0.8 + 0.4 * sociality,
        wealth: 0.0,
        productivity,
        sector: table.sector[m],
    };
    let child = table.add_agent(tpl);

    // Wire the newborn to the mother and a few of her live neighbors
    graph::add_edge(table, child, mother);
    let inherited: Vec<u32> = table.neighbors[m]
        .iter()
        .copied()
        .filter(|&j| j != child && table.alive[j as usize])
        .take(INHERITED_NEIGHBORS)
        .collect();
    for j in inherited {
        graph::add_edge(table, child, j);
    }
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::table::test_template;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn fertile_table(n: u32) -> AgentTable {
        let mut table = AgentTable::new(1);
        for i in 0..n {
            let mut tpl = test_template(0);
            tpl.age = 25.0;
            tpl.female = i % 2 == 0;
            table.add_agent(tpl);
        }
        // Chain the agents so mothers have male neighbors
        for i in 1..n {
            graph::add_edge(&mut table, i - 1, i);
        }
        table.rebuild_region_index();
        table
    }

    #[test]
    fn test_annual_fertility_modulation() {
        // Traditional regions out-breed progressive ones
        assert!(annual_fertility(-0.8, 0.3, 1.0, 1.0) > annual_fertility(0.8, 0.3, 1.0, 1.0));
        // Development suppresses fertility
        assert!(annual_fertility(0.0, 1.0, 1.0, 1.0) < annual_fertility(0.0, 0.0, 1.0, 1.0));
        // Crowding is a hard cap
        assert_eq!(annual_fertility(0.0, 0.3, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_births_materialize_with_lineage_and_edges() {
        let mut table = fertile_table(100);
        let econ = Economy::new(1, 2);
        let cfg = KernelConfig::fast_test();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut events = EventLog::new();
        let mut warnings = NumericWarnings::default();

        let before = table.live_count();
        // Run many ticks so some births land despite the small per-tick rate
        for tick in 0..200 {
            let cohorts = CohortLedger::from_table(&table);
            apply_fertility(
                &mut table, &cohorts, &econ, &cfg, tick, &mut rng, &mut events, &mut warnings,
            )
            .unwrap();
        }
        let born = table.live_count() - before;
        assert!(born > 0, "expected births over 200 ticks");

        for i in before..table.len() {
            assert_eq!(table.age[i], 0.0);
            assert_ne!(table.parent_a[i], NONE);
            assert_eq!(table.fluency[i], 0.5);
            // Child is connected to its mother
            let mother = table.parent_a[i];
            assert!(table.neighbors[i].contains(&mother));
            assert!(table.neighbors[i].len() <= 1 + INHERITED_NEIGHBORS);
            // Personality stays in range after mutation
            assert!((0.0..=1.0).contains(&table.openness[i]));
            assert!((0.0..=1.0).contains(&table.conformity[i]));
        }
        assert_eq!(events.len(), born);
    }

    #[test]
    fn test_max_population_caps_births() {
        let mut table = fertile_table(100);
        let econ = Economy::new(1, 2);
        let cfg = KernelConfig {
            max_population: 100,
            ..KernelConfig::fast_test()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut events = EventLog::new();
        let mut warnings = NumericWarnings::default();

        for tick in 0..300 {
            let cohorts = CohortLedger::from_table(&table);
            apply_fertility(
                &mut table, &cohorts, &econ, &cfg, tick, &mut rng, &mut events, &mut warnings,
            )
            .unwrap();
        }
        assert_eq!(table.live_count(), 100);
    }

    #[test]
    fn test_crowded_region_has_no_births() {
        let mut table = fertile_table(100);
        let econ = Economy::new(1, 2);
        let cfg = KernelConfig {
            region_capacity: 50, // already over capacity
            ..KernelConfig::fast_test()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut events = EventLog::new();
        let mut warnings = NumericWarnings::default();

        for tick in 0..100 {
            let cohorts = CohortLedger::from_table(&table);
            apply_fertility(
                &mut table, &cohorts, &econ, &cfg, tick, &mut rng, &mut events, &mut warnings,
            )
            .unwrap();
        }
        assert_eq!(table.live_count(), 100);
    }
}
