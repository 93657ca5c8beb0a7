//! Trade graph and Laplacian surplus diffusion
//!
//! Partnerships are geography-derived: each region links to its nearest
//! neighbors, with the link count growing with development. For each good,
//! surplus flows down the gradient of the partnership graph's Laplacian,
//! minus a per-hop transport loss. Mass is conserved up to that loss, and
//! the pass checks its own books.

use rand::Rng;

use crate::economy::{Economy, NUM_GOODS};
use crate::error::KernelError;
use crate::events::EventLog;
use crate::validation::NumericWarnings;

/// Diffusion rate per economy tick.
const DIFFUSION_RATE: f64 = 0.15;

/// Fraction of each shipment lost per hop.
pub const TRANSPORT_LOSS: f64 = 0.02;

/// Multiplicative price step.
const PRICE_EPS: f64 = 0.05;

const PRICE_MIN: f64 = 0.01;
const PRICE_MAX: f64 = 100.0;

const SPECIALIZATION_GAIN: f64 = 0.001;
const SPECIALIZATION_DECAY: f64 = 0.0005;
const SPECIALIZATION_MIN: f64 = -0.5;
const SPECIALIZATION_MAX: f64 = 0.3;

/// Conservation tolerance: 1% of the larger flow side.
const CONSERVATION_TOLERANCE: f64 = 0.01;

/// Only shipments above this value are worth an event record.
const TRADE_EVENT_MIN_VALUE: f64 = 25.0;

/// Re-sample each region's trade partners:
/// `2 + ⌊development·10⌋ + U{0,3}` nearest regions, then symmetrize.
pub fn refresh_trade_partners<R: Rng>(econ: &mut Economy, rng: &mut R) {
    let num_regions = econ.regions.len();
    let mut partner_sets: Vec<Vec<u32>> = Vec::with_capacity(num_regions);
    for r in 0..num_regions {
        let count = 2 + (econ.regions[r].development * 10.0).floor() as usize + rng.gen_range(0..4);
        let count = count.min(num_regions.saturating_sub(1));
        partner_sets.push(econ.neighbors_by_distance(r)[..count].to_vec());
    }

    // Partnership is mutual: union both directions
    for r in 0..num_regions {
        for idx in 0..partner_sets[r].len() {
            let p = partner_sets[r][idx] as usize;
            if !partner_sets[p].contains(&(r as u32)) {
                partner_sets[p].push(r as u32);
            }
        }
    }
    for (region, partners) in econ.regions.iter_mut().zip(partner_sets) {
        region.trade_partners = partners;
    }
}

/// Diffuse per-good surplus along the trade graph.
///
/// The flow on edge (a, b) is `rate · (surplus_a − surplus_b)`; the importer
/// receives the shipment minus transport loss. A region's combined outflow
/// across all of its links is limited to what it produced this tick, so
/// post-trade availability never goes negative. Per good, total exports must
/// equal total imports plus loss within tolerance; a violation is fatal in
/// debug builds and a counted warning in release.
pub fn diffuse_trade(
    econ: &mut Economy,
    tick: u64,
    events: &mut EventLog,
    warnings: &mut NumericWarnings,
) -> Result<(), KernelError> {
    let num_regions = econ.regions.len();

    // Undirected edge list from the symmetric partner sets
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for (r, region) in econ.regions.iter().enumerate() {
        for &p in &region.trade_partners {
            let p = p as usize;
            if r < p {
                edges.push((r, p));
            }
        }
    }

    econ.trade.volume = 0.0;
    econ.trade.transport_loss = 0.0;

    for g in 0..NUM_GOODS {
        let surplus: Vec<f64> = econ
            .regions
            .iter()
            .map(|region| region.production[g] - region.demand[g])
            .collect();

        let mut outflow = vec![0.0; num_regions];
        let mut inflow = vec![0.0; num_regions];
        let mut loss_total = 0.0;

        for &(a, b) in &edges {
            let gradient = DIFFUSION_RATE * (surplus[a] - surplus[b]);
            let (from, to, desired) = if gradient >= 0.0 {
                (a, b, gradient)
            } else {
                (b, a, -gradient)
            };
            // Remaining shippable capacity: production minus what earlier
            // edges already committed this tick
            let capacity = (econ.regions[from].production[g] - outflow[from]).max(0.0);
            let amount = desired.min(capacity);
            if amount <= 0.0 {
                continue;
            }
            let delivered = amount * (1.0 - TRANSPORT_LOSS);
            let loss = amount - delivered;
            outflow[from] += amount;
            inflow[to] += delivered;
            loss_total += loss;

            let value = amount * econ.regions[from].prices[g];
            econ.trade.volume += value;
            if value > TRADE_EVENT_MIN_VALUE {
                events.log_trade(tick, from as u32, to as u32, g, amount, value);
            }
        }

        let exports: f64 = outflow.iter().sum();
        let imports: f64 = inflow.iter().sum();
        let imbalance = (exports - imports - loss_total).abs();
        if imbalance > CONSERVATION_TOLERANCE * exports.max(imports).max(1e-9) {
            if cfg!(debug_assertions) {
                return Err(KernelError::TradeConservation {
                    good: g,
                    exports,
                    imports,
                    loss: loss_total,
                });
            }
            warnings.clamped += 1;
        }

        econ.trade.per_good[g] = (exports, imports, loss_total);
        econ.trade.transport_loss += loss_total;

        // Post-trade availability feeds the price signal
        for (r, region) in econ.regions.iter_mut().enumerate() {
            region.production[g] = region.production[g] - outflow[r] + inflow[r];
        }
    }
    Ok(())
}

/// Emergent price response: scarcity raises, glut lowers, both bounded.
pub fn update_prices(econ: &mut Economy) {
    for region in &mut econ.regions {
        for g in 0..NUM_GOODS {
            let factor = if region.demand[g] > region.production[g] {
                1.0 + PRICE_EPS
            } else {
                1.0 - 0.5 * PRICE_EPS
            };
            region.prices[g] = (region.prices[g] * factor).clamp(PRICE_MIN, PRICE_MAX);
        }
    }
}

/// Regions slowly lean into goods they run surpluses of.
pub fn drift_specialization(econ: &mut Economy) {
    for region in &mut econ.regions {
        for g in 0..NUM_GOODS {
            let drift = if region.production[g] > region.demand[g] {
                SPECIALIZATION_GAIN
            } else {
                -SPECIALIZATION_DECAY
            };
            region.specialization[g] =
                (region.specialization[g] + drift).clamp(SPECIALIZATION_MIN, SPECIALIZATION_MAX);
        }
    }
}
