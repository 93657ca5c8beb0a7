//! Scalar metrics over the kernel state
//!
//! Polarization is measured as the spread of regional belief centroids;
//! inequality as a true Gini over sorted wealth. The belief hash gives the
//! determinism tests a cheap trajectory fingerprint.

use serde::Serialize;

use crate::agents::table::{AgentTable, BELIEF_DIMS};
use crate::economy::Economy;

/// Fixed header of the metrics CSV.
pub const CSV_HEADER: &str = "generation,polarization_mean,polarization_std,avg_openness,avg_conformity,welfare,inequality,hardship,trade_volume,population";

/// Scalar metrics of one kernel state.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Metrics {
    pub generation: u64,
    pub polarization_mean: f64,
    pub polarization_std: f64,
    pub avg_openness: f64,
    pub avg_conformity: f64,
    pub welfare: f64,
    pub inequality: f64,
    pub hardship: f64,
    pub trade_volume: f64,
    pub population: usize,
}

impl Metrics {
    pub fn compute(table: &AgentTable, econ: &Economy, generation: u64) -> Self {
        let (polarization_mean, polarization_std) = polarization(table, econ.regions.len());

        let mut avg_openness = 0.0;
        let mut avg_conformity = 0.0;
        let mut count = 0usize;
        for i in table.iter_live() {
            avg_openness += table.openness[i];
            avg_conformity += table.conformity[i];
            count += 1;
        }
        if count > 0 {
            avg_openness /= count as f64;
            avg_conformity /= count as f64;
        }

        let num_regions = econ.regions.len().max(1) as f64;
        let welfare = econ.regions.iter().map(|r| r.welfare).sum::<f64>() / num_regions;
        let inequality = econ.regions.iter().map(|r| r.inequality).sum::<f64>() / num_regions;
        let hardship = econ.regions.iter().map(|r| r.hardship).sum::<f64>() / num_regions;

        Metrics {
            generation,
            polarization_mean,
            polarization_std,
            avg_openness,
            avg_conformity,
            welfare,
            inequality,
            hardship,
            trade_volume: econ.trade.volume,
            population: count,
        }
    }

    /// One comma-separated row matching [`CSV_HEADER`].
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{}",
            self.generation,
            self.polarization_mean,
            self.polarization_std,
            self.avg_openness,
            self.avg_conformity,
            self.welfare,
            self.inequality,
            self.hardship,
            self.trade_volume,
            self.population,
        )
    }

    /// Human-readable block for the `metrics` shell verb.
    pub fn report(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Generation: {}\n", self.generation));
        s.push_str(&format!(
            "Polarization: {:.4} (±{:.4})\n",
            self.polarization_mean, self.polarization_std
        ));
        s.push_str(&format!("Avg Openness: {:.4}\n", self.avg_openness));
        s.push_str(&format!("Avg Conformity: {:.4}\n", self.avg_conformity));
        s.push_str(&format!("Welfare: {:.4}\n", self.welfare));
        s.push_str(&format!("Inequality: {:.4}\n", self.inequality));
        s.push_str(&format!("Hardship: {:.4}\n", self.hardship));
        s.push_str(&format!("Trade Volume: {:.4}\n", self.trade_volume));
        s.push_str(&format!("Population: {}\n", self.population));
        s
    }
}

/// Mean and std of pairwise distances between regional belief centroids.
/// Empty regions are skipped.
pub fn polarization(table: &AgentTable, num_regions: usize) -> (f64, f64) {
    let mut centroids = vec![[0.0; BELIEF_DIMS]; num_regions];
    let mut counts = vec![0usize; num_regions];
    for i in table.iter_live() {
        let r = table.region[i] as usize;
        for k in 0..BELIEF_DIMS {
            centroids[r][k] += table.b[i][k];
        }
        counts[r] += 1;
    }
    for (centroid, &count) in centroids.iter_mut().zip(&counts) {
        if count > 0 {
            for v in centroid.iter_mut() {
                *v /= count as f64;
            }
        }
    }

    let mut dists = Vec::new();
    for a in 0..num_regions {
        if counts[a] == 0 {
            continue;
        }
        for b in (a + 1)..num_regions {
            if counts[b] == 0 {
                continue;
            }
            let mut d = 0.0;
            for k in 0..BELIEF_DIMS {
                d += (centroids[a][k] - centroids[b][k]).powi(2);
            }
            dists.push(d.sqrt());
        }
    }
    if dists.is_empty() {
        return (0.0, 0.0);
    }
    let mean = dists.iter().sum::<f64>() / dists.len() as f64;
    let var = dists.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / dists.len() as f64;
    (mean, var.sqrt())
}

/// Gini coefficient over wealth values (0 = equal, 1 = one holds all).
/// Sorts a copy: O(n log n).
pub fn gini(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;
    let sum: f64 = sorted.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }
    let mut numerator = 0.0;
    for (i, &v) in sorted.iter().enumerate() {
        numerator += (2.0 * (i as f64 + 1.0) - n - 1.0) * v;
    }
    (numerator / (n * sum)).clamp(0.0, 1.0)
}

/// FNV-1a fold over the little-endian bytes of every live agent's expressed
/// beliefs, in id order. Identical trajectories hash identically.
pub fn belief_hash(table: &AgentTable) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for i in table.iter_live() {
        for k in 0..BELIEF_DIMS {
            for byte in table.b[i][k].to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
            }
        }
    }
    hash
}
