//! Small-world social graph over the agent table
//!
//! The graph is stored as per-agent neighbor id lists inside the table;
//! every edge is kept symmetric by construction. The initial topology is a
//! Watts–Strogatz ring lattice with random rewiring.

use rand::Rng;

use crate::agents::table::AgentTable;

/// Add an undirected edge, skipping self-loops and duplicates.
pub fn add_edge(table: &mut AgentTable, i: u32, j: u32) {
    if i == j {
        return;
    }
    if !table.neighbors[i as usize].contains(&j) {
        table.neighbors[i as usize].push(j);
        table.neighbors[j as usize].push(i);
    }
}

/// Remove an undirected edge from both endpoints.
pub fn remove_edge(table: &mut AgentTable, i: u32, j: u32) {
    table.neighbors[i as usize].retain(|&n| n != j);
    table.neighbors[j as usize].retain(|&n| n != i);
}

/// Build the initial Watts–Strogatz graph over all agents.
///
/// Ring lattice with `k` nearest connections (rounded up to even), then each
/// clockwise lattice edge is rewired with probability `p` to a uniformly
/// chosen non-self, non-duplicate target. Lists are de-duplicated and
/// self-loops removed afterwards.
pub fn build_small_world<R: Rng>(table: &mut AgentTable, k: u32, p: f64, rng: &mut R) {
    let n = table.len() as u32;
    if n < 2 {
        return;
    }
    let mut k = k.max(2);
    if k % 2 == 1 {
        k += 1;
    }
    // A lattice needs k < n; small test populations get the largest even degree
    let half_k = (k / 2).min((n - 1) / 2);

    for list in &mut table.neighbors {
        list.clear();
    }

    // Ring lattice
    for i in 0..n {
        for d in 1..=half_k {
            let j = (i + d) % n;
            table.neighbors[i as usize].push(j);
            table.neighbors[j as usize].push(i);
        }
    }

    // Rewiring
    for i in 0..n {
        for d in 1..=half_k {
            if rng.gen::<f64>() >= p {
                continue;
            }
            let old_j = (i + d) % n;
            remove_edge(table, i, old_j);

            let new_j = loop {
                let candidate = rng.gen_range(0..n);
                if candidate != i && !table.neighbors[i as usize].contains(&candidate) {
                    break candidate;
                }
            };
            table.neighbors[i as usize].push(new_j);
            table.neighbors[new_j as usize].push(i);
        }
    }

    // Cleanup pass: drop self-loops and duplicates, preserving order
    for i in 0..n as usize {
        let list = &mut table.neighbors[i];
        let mut cleaned = Vec::with_capacity(list.len());
        for &nid in list.iter() {
            if nid != i as u32 && !cleaned.contains(&nid) {
                cleaned.push(nid);
            }
        }
        *list = cleaned;
    }
}

/// Check undirected symmetry: `j ∈ neighbors(i) ⇔ i ∈ neighbors(j)`.
pub fn is_symmetric(table: &AgentTable) -> bool {
    for i in 0..table.len() {
        for &j in &table.neighbors[i] {
            if !table.neighbors[j as usize].contains(&(i as u32)) {
                return false;
            }
        }
    }
    true
}

/// Total undirected edge count.
pub fn edge_count(table: &AgentTable) -> usize {
    table.neighbors.iter().map(Vec::len).sum::<usize>() / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::table::test_template;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn make_table(n: u32) -> AgentTable {
        let mut table = AgentTable::new(1);
        for _ in 0..n {
            table.add_agent(test_template(0));
        }
        table
    }

    #[test]
    fn test_ring_lattice_without_rewiring() {
        let mut table = make_table(10);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        build_small_world(&mut table, 4, 0.0, &mut rng);

        for i in 0..10 {
            assert_eq!(table.neighbors[i].len(), 4, "agent {i} degree");
        }
        assert!(is_symmetric(&table));
        assert_eq!(edge_count(&table), 20);
    }

    #[test]
    fn test_rewired_graph_stays_symmetric_and_clean() {
        let mut table = make_table(200);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        build_small_world(&mut table, 8, 0.2, &mut rng);

        assert!(is_symmetric(&table));
        for i in 0..table.len() {
            let list = &table.neighbors[i];
            assert!(!list.contains(&(i as u32)), "self-loop at {i}");
            let mut seen = list.clone();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), list.len(), "duplicate edge at {i}");
        }
        // Rewiring must not change the total edge count
        assert_eq!(edge_count(&table), 200 * 4);
    }

    #[test]
    fn test_odd_k_rounds_up() {
        let mut table = make_table(20);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        build_small_world(&mut table, 5, 0.0, &mut rng);
        assert_eq!(table.neighbors[0].len(), 6);
    }

    #[test]
    fn test_same_seed_same_graph() {
        let mut a = make_table(100);
        let mut b = make_table(100);
        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let mut rng_b = ChaCha8Rng::seed_from_u64(99);
        build_small_world(&mut a, 6, 0.1, &mut rng_a);
        build_small_world(&mut b, 6, 0.1, &mut rng_b);
        assert_eq!(a.neighbors, b.neighbors);
    }
}
