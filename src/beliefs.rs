//! Belief dynamics over the social graph
//!
//! The hot inner loop. Two modes share one contract: a read-only pass
//! computes per-agent deltas in x-space, then a write pass applies them and
//! recomputes `B = tanh(x)`. The split makes the result independent of
//! worker count; innovation noise comes from per-chunk substreams keyed by
//! `(seed, tick, chunk)`, never from a shared stream.

use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::agents::table::{AgentTable, BELIEF_DIMS};
use crate::config::KernelConfig;
use crate::economy::Economy;
use crate::error::KernelError;
use crate::seeds;
use crate::validation::{check_finite, NumericWarnings};

/// Agents per parallel work chunk. Fixed so substream assignment does not
/// depend on the rayon worker count.
const CHUNK: usize = 4096;

/// Std-dev of the per-tick innovation noise added to x.
const NOISE_STD: f64 = 0.03;

// Anchoring: resistance to influence grows with age and assertiveness.
const ANCHOR_BASE: f64 = 0.1;
const ANCHOR_AGE_WEIGHT: f64 = 0.3;
const ANCHOR_ASSERT_WEIGHT: f64 = 0.2;
const ANCHOR_MAX: f64 = 0.9;

// Economic feedback: hardship radicalizes, excess wealth entrenches.
const HARDSHIP_NUDGE_THRESHOLD: f64 = 0.5;
const HARDSHIP_NUDGE: f64 = 0.001;
const WEALTH_NUDGE_RATIO: f64 = 1.5;
const WEALTH_NUDGE: f64 = 0.001;

/// Rational tanh approximation: `v·(27 + v²)/(27 + 9·v²)`, exact to ~4e-3
/// on the saturating range and clamped to ±1 outside it.
#[inline]
pub fn fast_tanh(v: f64) -> f64 {
    if v >= 3.0 {
        1.0
    } else if v <= -3.0 {
        -1.0
    } else {
        let v2 = v * v;
        (v * (27.0 + v2) / (27.0 + 9.0 * v2)).clamp(-1.0, 1.0)
    }
}

/// Influence damping for one agent, in [0, ANCHOR_MAX].
#[inline]
fn anchoring(table: &AgentTable, i: usize, max_age_years: f64) -> f64 {
    let anchor = ANCHOR_BASE
        + (table.age[i] / max_age_years) * ANCHOR_AGE_WEIGHT
        + table.assertiveness[i] * ANCHOR_ASSERT_WEIGHT;
    anchor.min(ANCHOR_MAX)
}

/// Cosine similarity gate in belief space, mapped to [0, 1] and floored.
#[inline]
fn similarity_gate(
    bi: &[f64; BELIEF_DIMS],
    bj: &[f64; BELIEF_DIMS],
    norm_sq_i: f64,
    norm_sq_j: f64,
    floor: f64,
) -> f64 {
    let mut dot = 0.0;
    for k in 0..BELIEF_DIMS {
        dot += bi[k] * bj[k];
    }
    let sim = if norm_sq_i > 0.0 && norm_sq_j > 0.0 {
        dot / (norm_sq_i.sqrt() * norm_sq_j.sqrt())
    } else {
        0.0
    };
    (0.5 * (sim + 1.0)).max(floor)
}

/// Shared-language quality: cross-lingual influence attenuates to a quarter.
#[inline]
fn language_quality(table: &AgentTable, i: usize, j: usize) -> f64 {
    let min_fluency = table.fluency[i].min(table.fluency[j]);
    if table.primary_lang[i] == table.primary_lang[j] {
        min_fluency
    } else {
        0.25 * min_fluency
    }
}

/// Regional mean field for the decoupled update mode.
struct RegionField {
    centroid: [f64; BELIEF_DIMS],
    strength: f64,
}

fn compute_region_fields(table: &AgentTable, econ: &Economy) -> Vec<RegionField> {
    let num_regions = econ.regions.len();
    let mut sums = vec![[0.0; BELIEF_DIMS]; num_regions];
    let mut counts = vec![0usize; num_regions];
    for i in table.iter_live() {
        let r = table.region[i] as usize;
        for k in 0..BELIEF_DIMS {
            sums[r][k] += table.b[i][k];
        }
        counts[r] += 1;
    }
    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(r, (mut sum, count))| {
            if count > 0 {
                for v in &mut sum {
                    *v /= count as f64;
                }
            }
            // Hardship dampens regional cohesion
            let strength = (0.5 + 0.5 * (1.0 - econ.regions[r].hardship)).clamp(0.25, 1.0);
            RegionField {
                centroid: sum,
                strength,
            }
        })
        .collect()
}

fn mean_wealth_by_region(table: &AgentTable, num_regions: usize) -> Vec<f64> {
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

/// One belief tick: influence deltas, innovation noise, economic feedback.
///
/// With `step_size == 0` the update is skipped entirely, so stepping the
/// kernel leaves beliefs bit-identical.
pub fn update_beliefs(
    table: &mut AgentTable,
    cfg: &KernelConfig,
    econ: &Economy,
    tick: u64,
    belief_seed: u64,
    warnings: &mut NumericWarnings,
) -> Result<(), KernelError> {
    if cfg.step_size == 0.0 {
        return Ok(());
    }

    let n = table.len();
    if n == 0 {
        return Ok(());
    }

    let fields = if cfg.use_mean_field {
        Some(compute_region_fields(table, econ))
    } else {
        None
    };

    // Phase 1: read-only delta computation over fixed-size chunks.
    let num_chunks = (n + CHUNK - 1) / CHUNK;
    let shared: &AgentTable = table;
    let chunked: Vec<Vec<[f64; BELIEF_DIMS]>> = (0..num_chunks)
        .into_par_iter()
        .map(|c| {
            let mut rng = seeds::chunk_rng(belief_seed, tick, c as u64);
            let noise = Normal::new(0.0, NOISE_STD).unwrap();
            let start = c * CHUNK;
            let end = (start + CHUNK).min(n);
            let mut out = Vec::with_capacity(end - start);
            for i in start..end {
                let mut acc = [0.0; BELIEF_DIMS];
                if shared.alive[i] {
                    let anchor_scale = 1.0 - anchoring(shared, i, cfg.max_age_years);
                    match &fields {
                        Some(fields) => {
                            let field = &fields[shared.region[i] as usize];
                            let w = cfg.step_size
                                * shared.m_susceptibility[i]
                                * field.strength
                                * anchor_scale;
                            for k in 0..BELIEF_DIMS {
                                acc[k] = w * (field.centroid[k] - shared.b[i][k]);
                            }
                        }
                        None => {
                            for &jid in &shared.neighbors[i] {
                                let j = jid as usize;
                                if !shared.alive[j] {
                                    continue;
                                }
                                let sim = similarity_gate(
                                    &shared.b[i],
                                    &shared.b[j],
                                    shared.b_norm_sq[i],
                                    shared.b_norm_sq[j],
                                    cfg.sim_floor,
                                );
                                let lang_q = language_quality(shared, i, j);
                                let comm = 0.5 * (shared.m_comm[i] + shared.m_comm[j]);
                                // Susceptibility stays asymmetric: only the
                                // receiving side's multiplier applies.
                                let w = cfg.step_size
                                    * sim
                                    * lang_q
                                    * comm
                                    * shared.m_susceptibility[i]
                                    * anchor_scale;
                                for k in 0..BELIEF_DIMS {
                                    acc[k] += w * fast_tanh(shared.b[j][k] - shared.b[i][k]);
                                }
                            }
                        }
                    }
                    for item in &mut acc {
                        *item += noise.sample(&mut rng);
                    }
                }
                out.push(acc);
            }
            out
        })
        .collect();

    // Phase 2: sequential apply, with economic feedback folded in before the
    // single tanh recompute. Nudges land in x-space; a nudge applied to B
    // directly would be erased by the next recompute.
    let mean_wealth = mean_wealth_by_region(table, econ.regions.len());
    for (c, chunk) in chunked.into_iter().enumerate() {
        let start = c * CHUNK;
        for (offset, delta) in chunk.into_iter().enumerate() {
            let i = start + offset;
            if !table.alive[i] {
                continue;
            }
            for k in 0..BELIEF_DIMS {
                table.x[i][k] += delta[k];
            }

            let hardship = table.hardship[i];
            if hardship > HARDSHIP_NUDGE_THRESHOLD {
                table.x[i][0] -= HARDSHIP_NUDGE * hardship;
                table.x[i][2] -= HARDSHIP_NUDGE * hardship;
            }
            let regional_mean = mean_wealth[table.region[i] as usize];
            if regional_mean > 0.0 && table.wealth[i] > WEALTH_NUDGE_RATIO * regional_mean {
                let rel_wealth = table.wealth[i] / regional_mean;
                let shift =
                    (1.0 - table.openness[i]) * 0.5 * (1.0 + rel_wealth).ln() * WEALTH_NUDGE;
                table.x[i][0] += shift;
                table.x[i][2] += shift;
            }

            for k in 0..BELIEF_DIMS {
                table.x[i][k] = check_finite("belief x", table.x[i][k], 0.0, warnings)?;
            }
            table.refresh_expressed_beliefs(i);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::graph;
    use crate::agents::table::test_template;

    fn setup(n: u32, regions: u32) -> (AgentTable, Economy) {
        let mut table = AgentTable::new(regions);
        for i in 0..n {
            let mut tpl = test_template(i % regions);
            tpl.x = [0.5 * (i as f64 % 3.0) - 0.5, 0.1, -0.2, 0.3];
            table.add_agent(tpl);
        }
        let econ = Economy::new(regions, 12345);
        (table, econ)
    }

    #[test]
    fn test_fast_tanh_bounds_and_shape() {
        assert_eq!(fast_tanh(10.0), 1.0);
        assert_eq!(fast_tanh(-10.0), -1.0);
        assert_eq!(fast_tanh(0.0), 0.0);
        assert!((fast_tanh(1.0) - 1.0_f64.tanh()).abs() < 0.005);
        assert!((fast_tanh(-0.5) - (-0.5_f64).tanh()).abs() < 0.005);
        for step in -30..=30 {
            let v = step as f64 / 5.0;
            assert!(fast_tanh(v).abs() <= 1.0);
        }
    }

    #[test]
    fn test_similarity_gate_range() {
        let a = [1.0, 0.0, 0.0, 0.0];
        let b = [-1.0, 0.0, 0.0, 0.0];
        let same = similarity_gate(&a, &a, 1.0, 1.0, 0.05);
        let opposite = similarity_gate(&a, &b, 1.0, 1.0, 0.05);
        assert!((same - 1.0).abs() < 1e-12);
        assert!((opposite - 0.05).abs() < 1e-12, "opposed agents hit the floor");
    }

    #[test]
    fn test_zero_norm_similarity_uses_midpoint() {
        let zero = [0.0; BELIEF_DIMS];
        let a = [0.5, 0.0, 0.0, 0.0];
        let sim = similarity_gate(&zero, &a, 0.0, 0.25, 0.05);
        assert!((sim - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_step_size_is_identity() {
        let (mut table, econ) = setup(50, 2);
        let cfg = KernelConfig {
            step_size: 0.0,
            ..KernelConfig::fast_test()
        };
        let before = table.x.clone();
        let mut warnings = NumericWarnings::default();
        update_beliefs(&mut table, &cfg, &econ, 0, 1, &mut warnings).unwrap();
        assert_eq!(table.x, before);
    }

    #[test]
    fn test_beliefs_stay_bounded_and_finite() {
        use rand::SeedableRng;
        let (mut table, econ) = setup(200, 4);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(5);
        graph::build_small_world(&mut table, 6, 0.1, &mut rng);
        let cfg = KernelConfig::fast_test();
        let mut warnings = NumericWarnings::default();
        for tick in 0..50 {
            update_beliefs(&mut table, &cfg, &econ, tick, 9, &mut warnings).unwrap();
        }
        for i in table.iter_live() {
            for k in 0..BELIEF_DIMS {
                assert!(table.b[i][k].is_finite());
                assert!((-1.0..=1.0).contains(&table.b[i][k]));
            }
        }
    }

    #[test]
    fn test_pairwise_pulls_connected_agents_together() {
        let mut table = AgentTable::new(1);
        let mut a = test_template(0);
        a.x = [1.5, 0.0, 0.0, 0.0];
        let mut b = test_template(0);
        b.x = [-1.5, 0.0, 0.0, 0.0];
        let ia = table.add_agent(a);
        let ib = table.add_agent(b);
        graph::add_edge(&mut table, ia, ib);

        let econ = Economy::new(1, 1);
        let cfg = KernelConfig {
            sim_floor: 0.05,
            ..KernelConfig::fast_test()
        };
        let gap_before = table.b[0][0] - table.b[1][0];
        let mut warnings = NumericWarnings::default();
        for tick in 0..200 {
            update_beliefs(&mut table, &cfg, &econ, tick, 3, &mut warnings).unwrap();
        }
        let gap_after = table.b[0][0] - table.b[1][0];
        assert!(
            gap_after.abs() < gap_before.abs(),
            "gap {gap_before} should shrink, got {gap_after}"
        );
    }

    #[test]
    fn test_mean_field_converges_toward_centroid() {
        let (mut table, econ) = setup(100, 1);
        let cfg = KernelConfig {
            use_mean_field: true,
            ..KernelConfig::fast_test()
        };
        let mut warnings = NumericWarnings::default();
        let spread_before = belief_spread(&table);
        for tick in 0..100 {
            update_beliefs(&mut table, &cfg, &econ, tick, 4, &mut warnings).unwrap();
        }
        let spread_after = belief_spread(&table);
        assert!(spread_after < spread_before, "{spread_after} < {spread_before}");
    }

    #[test]
    fn test_update_is_worker_count_independent() {
        // Same inputs, two runs in the same process: rayon may schedule chunks
        // differently but chunk substreams are positional.
        let (mut a, econ) = setup(300, 3);
        let mut b = a.clone();
        let cfg = KernelConfig::fast_test();
        let mut wa = NumericWarnings::default();
        let mut wb = NumericWarnings::default();
        update_beliefs(&mut a, &cfg, &econ, 7, 11, &mut wa).unwrap();
        update_beliefs(&mut b, &cfg, &econ, 7, 11, &mut wb).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.b, b.b);
    }

    fn belief_spread(table: &AgentTable) -> f64 {
        let mut mean = [0.0; BELIEF_DIMS];
        let mut count = 0.0;
        for i in table.iter_live() {
            for k in 0..BELIEF_DIMS {
                mean[k] += table.b[i][k];
            }
            count += 1.0;
        }
        for v in &mut mean {
            *v /= count;
        }
        let mut spread = 0.0;
        for i in table.iter_live() {
            for k in 0..BELIEF_DIMS {
                spread += (table.b[i][k] - mean[k]).powi(2);
            }
        }
        spread
    }
}
