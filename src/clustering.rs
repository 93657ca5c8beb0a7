//! Online cultural clustering in belief space
//!
//! An incremental k-means over the 4-D expressed beliefs runs every tick;
//! a full reassignment pass every `reassign_interval` ticks recomputes
//! published statistics and flags clusters dense and charismatic enough to
//! seed political movements. A DBSCAN sweep is available on demand from the
//! shell for density-based comparison.

use rand::Rng;

use crate::agents::table::{AgentTable, BELIEF_DIMS, NONE};
use crate::events::EventLog;
use crate::seeds;

/// Default number of cultural clusters.
pub const DEFAULT_K: usize = 8;

/// Default centroid learning rate.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Default ticks between full reassignment passes.
pub const DEFAULT_REASSIGN_INTERVAL: u64 = 1000;

/// Minimum share of the live population for a movement seed.
const MOVEMENT_SIZE_SHARE: f64 = 0.05;

/// Minimum charisma density (assertiveness > 0.7) for a movement seed.
const MOVEMENT_CHARISMA_DENSITY: f64 = 0.15;

/// Sample cap for the pairwise coherence estimate.
const COHERENCE_SAMPLE: usize = 64;

/// Published per-cluster outputs.
#[derive(Clone, Debug)]
pub struct ClusterStats {
    pub id: u32,
    pub size: usize,
    pub centroid: [f64; BELIEF_DIMS],
    /// Mean pairwise cosine similarity over a member sample
    pub coherence: f64,
    /// Fraction of members with assertiveness > 0.7
    pub charisma_density: f64,
}

/// Online k-means state.
#[derive(Clone, Debug)]
pub struct ClusterModel {
    pub centroids: Vec<[f64; BELIEF_DIMS]>,
    /// Cluster id per table slot; NONE for dead or never-assigned agents
    pub assignment: Vec<u32>,
    pub alpha: f64,
    pub reassign_interval: u64,
    /// Sizes published by the previous reassignment pass, for split detection
    last_sizes: Vec<usize>,
}

/// A cluster must have held this many members before its collapse counts
/// as a cultural split.
const SPLIT_MIN_SIZE: usize = 50;

impl ClusterModel {
    /// Seed `k` centroids from random live agents.
    pub fn new<R: Rng>(k: usize, table: &AgentTable, rng: &mut R) -> Self {
        let mut model = ClusterModel {
            centroids: vec![[0.0; BELIEF_DIMS]; k.max(1)],
            assignment: vec![NONE; table.len()],
            alpha: DEFAULT_ALPHA,
            reassign_interval: DEFAULT_REASSIGN_INTERVAL,
            last_sizes: vec![0; k.max(1)],
        };
        model.reseed_all(table, rng);
        model
    }

    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    fn reseed_all<R: Rng>(&mut self, table: &AgentTable, rng: &mut R) {
        let live: Vec<usize> = table.iter_live().collect();
        for centroid in &mut self.centroids {
            if let Some(&i) = pick(&live, rng) {
                *centroid = table.b[i];
            }
        }
    }

    /// One online pass: assign every live agent to its nearest centroid and
    /// nudge that centroid toward it. Empty clusters are reseeded so the
    /// published sizes never include a stale zero.
    pub fn online_update(&mut self, table: &AgentTable, tick: u64, clustering_seed: u64) {
        self.assignment.resize(table.len(), NONE);
        let mut sizes = vec![0usize; self.k()];

        for i in 0..table.len() {
            if !table.alive[i] {
                self.assignment[i] = NONE;
                continue;
            }
            let c = self.nearest(&table.b[i]);
            self.assignment[i] = c as u32;
            sizes[c] += 1;
            for k in 0..BELIEF_DIMS {
                self.centroids[c][k] += self.alpha * (table.b[i][k] - self.centroids[c][k]);
            }
        }

        if sizes.contains(&0) {
            let mut rng = seeds::tick_rng(clustering_seed, tick);
            let live: Vec<usize> = table.iter_live().collect();
            for (c, &size) in sizes.iter().enumerate() {
                if size == 0 {
                    if let Some(&i) = pick(&live, &mut rng) {
                        self.centroids[c] = table.b[i];
                    }
                }
            }
        }
    }

    /// Full reassignment: one online pass plus published statistics and
    /// movement-seed detection.
    pub fn reassign(
        &mut self,
        table: &AgentTable,
        tick: u64,
        clustering_seed: u64,
        events: &mut EventLog,
    ) -> Vec<ClusterStats> {
        self.online_update(table, tick, clustering_seed);
        let stats = self.stats(table, tick, clustering_seed);

        let live = table.live_count();
        for s in &stats {
            if live > 0
                && s.size as f64 >= MOVEMENT_SIZE_SHARE * live as f64
                && s.charisma_density >= MOVEMENT_CHARISMA_DENSITY
            {
                let region = dominant_region(table, &self.assignment, s.id);
                events.log_movement_formed(tick, s.id, region, s.size);
            }
            // A culture that lost half its members since the last pass has
            // fractured into neighboring clusters
            let previous = self.last_sizes.get(s.id as usize).copied().unwrap_or(0);
            if previous >= SPLIT_MIN_SIZE && s.size * 2 < previous {
                events.log_cluster_split(tick, s.id, s.size);
            }
        }
        self.last_sizes = stats.iter().map(|s| s.size).collect();
        stats
    }

    /// Compute published statistics from the current assignment.
    pub fn stats(&self, table: &AgentTable, tick: u64, clustering_seed: u64) -> Vec<ClusterStats> {
        let k = self.k();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
        for i in table.iter_live() {
            let c = self.assignment[i];
            if c != NONE {
                members[c as usize].push(i);
            }
        }

        let mut rng = seeds::tick_rng(clustering_seed, tick.wrapping_add(1));
        (0..k)
            .map(|c| {
                let group = &members[c];
                let mut centroid = [0.0; BELIEF_DIMS];
                let mut charismatic = 0usize;
                for &i in group {
                    for d in 0..BELIEF_DIMS {
                        centroid[d] += table.b[i][d];
                    }
                    if table.assertiveness[i] > 0.7 {
                        charismatic += 1;
                    }
                }
                if !group.is_empty() {
                    for v in &mut centroid {
                        *v /= group.len() as f64;
                    }
                }
                ClusterStats {
                    id: c as u32,
                    size: group.len(),
                    centroid,
                    coherence: coherence(table, group, &mut rng),
                    charisma_density: if group.is_empty() {
                        0.0
                    } else {
                        charismatic as f64 / group.len() as f64
                    },
                }
            })
            .collect()
    }

    fn nearest(&self, b: &[f64; BELIEF_DIMS]) -> usize {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (c, centroid) in self.centroids.iter().enumerate() {
            let mut dist = 0.0;
            for k in 0..BELIEF_DIMS {
                dist += (b[k] - centroid[k]).powi(2);
            }
            if dist < best_dist {
                best_dist = dist;
                best = c;
            }
        }
        best
    }
}

/// Re-cluster from scratch with `k` clusters: farthest-point seeding, then a
/// few Lloyd iterations to settle. Used by the `cluster kmeans` verb.
pub fn kmeans_from_scratch(
    table: &AgentTable,
    k: usize,
    tick: u64,
    clustering_seed: u64,
) -> ClusterModel {
    let mut rng = seeds::tick_rng(clustering_seed, tick.wrapping_add(2));
    let mut model = ClusterModel::new(k, table, &mut rng);
    model.assignment.resize(table.len(), NONE);
    let live: Vec<usize> = table.iter_live().collect();

    // Farthest-point seeding: first seed random, each further seed is the
    // agent maximizing its distance to the nearest chosen seed
    if let Some(&first) = pick(&live, &mut rng) {
        model.centroids[0] = table.b[first];
        for c in 1..model.k() {
            let chosen = &model.centroids[..c];
            let farthest = live.iter().copied().max_by(|&a, &b| {
                let da = min_dist_sq(&table.b[a], chosen);
                let db = min_dist_sq(&table.b[b], chosen);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });
            if let Some(i) = farthest {
                model.centroids[c] = table.b[i];
            }
        }
    }

    for _ in 0..10 {
        // Plain Lloyd step: hard assignment, then means
        let mut sums = vec![[0.0; BELIEF_DIMS]; model.k()];
        let mut counts = vec![0usize; model.k()];
        for &i in &live {
            let c = model.nearest(&table.b[i]);
            model.assignment[i] = c as u32;
            for d in 0..BELIEF_DIMS {
                sums[c][d] += table.b[i][d];
            }
            counts[c] += 1;
        }
        for c in 0..model.k() {
            if counts[c] > 0 {
                for d in 0..BELIEF_DIMS {
                    model.centroids[c][d] = sums[c][d] / counts[c] as f64;
                }
            } else if let Some(&i) = pick(&live, &mut rng) {
                // Dead centroid: restart it on a random live agent
                model.centroids[c] = table.b[i];
            }
        }
    }
    model
}

/// Density-based sweep over belief space for the `cluster dbscan` verb.
///
/// Neighbor search uses an ε-grid over the 4-D cube, so the pass stays near
/// O(N) for reasonable ε. Returns (assignment, cluster sizes); noise points
/// get NONE.
pub fn dbscan(table: &AgentTable, eps: f64, min_pts: usize) -> (Vec<u32>, Vec<usize>) {
    use std::collections::HashMap;

    let live: Vec<usize> = table.iter_live().collect();
    let mut grid: HashMap<[i32; BELIEF_DIMS], Vec<usize>> = HashMap::new();
    let cell = |b: &[f64; BELIEF_DIMS]| -> [i32; BELIEF_DIMS] {
        let mut c = [0; BELIEF_DIMS];
        for k in 0..BELIEF_DIMS {
            c[k] = (b[k] / eps).floor() as i32;
        }
        c
    };
    for &i in &live {
        grid.entry(cell(&table.b[i])).or_default().push(i);
    }

    let eps_sq = eps * eps;
    let neighbors_of = |i: usize| -> Vec<usize> {
        let base = cell(&table.b[i]);
        let mut found = Vec::new();
        // 3^4 adjacent cells cover every point within eps
        for d0 in -1..=1 {
            for d1 in -1..=1 {
                for d2 in -1..=1 {
                    for d3 in -1..=1 {
                        let key = [base[0] + d0, base[1] + d1, base[2] + d2, base[3] + d3];
                        if let Some(bin) = grid.get(&key) {
                            for &j in bin {
                                let mut dist = 0.0;
                                for k in 0..BELIEF_DIMS {
                                    dist += (table.b[i][k] - table.b[j][k]).powi(2);
                                }
                                if dist <= eps_sq {
                                    found.push(j);
                                }
                            }
                        }
                    }
                }
            }
        }
        found
    };

    let mut assignment = vec![NONE; table.len()];
    let mut visited = vec![false; table.len()];
    let mut sizes = Vec::new();

    for &i in &live {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seed_neighbors = neighbors_of(i);
        if seed_neighbors.len() < min_pts {
            continue; // noise (may be claimed by a later cluster)
        }
        let cluster_id = sizes.len() as u32;
        let mut size = 0usize;
        let mut queue = seed_neighbors;
        assignment[i] = cluster_id;
        size += 1;
        while let Some(j) = queue.pop() {
            if assignment[j] == NONE {
                assignment[j] = cluster_id;
                size += 1;
            }
            if !visited[j] {
                visited[j] = true;
                let expansion = neighbors_of(j);
                if expansion.len() >= min_pts {
                    queue.extend(expansion);
                }
            }
        }
        sizes.push(size);
    }
    (assignment, sizes)
}

fn coherence<R: Rng>(table: &AgentTable, group: &[usize], rng: &mut R) -> f64 {
    if group.len() < 2 {
        return 1.0;
    }
    let sample: Vec<usize> = if group.len() <= COHERENCE_SAMPLE {
        group.to_vec()
    } else {
        (0..COHERENCE_SAMPLE)
            .map(|_| group[rng.gen_range(0..group.len())])
            .collect()
    };
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (a, &i) in sample.iter().enumerate() {
        for &j in &sample[a + 1..] {
            let mut dot = 0.0;
            for k in 0..BELIEF_DIMS {
                dot += table.b[i][k] * table.b[j][k];
            }
            let norms = (table.b_norm_sq[i] * table.b_norm_sq[j]).sqrt();
            if norms > 0.0 {
                total += dot / norms;
            }
            pairs += 1;
        }
    }
    if pairs > 0 {
        total / pairs as f64
    } else {
        1.0
    }
}

fn dominant_region(table: &AgentTable, assignment: &[u32], cluster: u32) -> u32 {
    let mut counts = vec![0usize; table.num_regions() as usize];
    for i in table.iter_live() {
        if assignment[i] == cluster {
            counts[table.region[i] as usize] += 1;
        }
    }
    counts
        .iter()
        .enumerate()
        .max_by_key(|&(_, &count)| count)
        .map(|(r, _)| r as u32)
        .unwrap_or(0)
}

fn min_dist_sq(b: &[f64; BELIEF_DIMS], centroids: &[[f64; BELIEF_DIMS]]) -> f64 {
    centroids
        .iter()
        .map(|c| {
            let mut dist = 0.0;
            for k in 0..BELIEF_DIMS {
                dist += (b[k] - c[k]).powi(2);
            }
            dist
        })
        .fold(f64::MAX, f64::min)
}

fn pick<'a, T, R: Rng>(slice: &'a [T], rng: &mut R) -> Option<&'a T> {
    if slice.is_empty() {
        None
    } else {
        Some(&slice[rng.gen_range(0..slice.len())])
    }
}
