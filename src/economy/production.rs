//! Production, demand, income, and hardship

use crate::agents::table::AgentTable;
use crate::economy::{
    ClimateBand, Economy, ECONOMY_INTERVAL, ENERGY, FOOD, LUXURY, NUM_GOODS, SERVICES, TECH, TOOLS,
};
use crate::error::KernelError;
use crate::events::EventLog;
use crate::validation::{check_range, NumericWarnings};

/// Fraction of wealth liquid for consumption each economy tick.
const WEALTH_LIQUIDITY: f64 = 0.1;

/// Regional production per good:
/// `endowment · pop · (1 + specialization) · tech · efficiency · (1 + 0.2·dev) · (1 − war)`.
pub fn update_production(econ: &mut Economy, table: &AgentTable) {
    for (r, region) in econ.regions.iter_mut().enumerate() {
        let pop = table.region_index(r as u32).len() as f64;
        let eff = region.efficiency * region.system.efficiency_factor();
        let dev_bonus = 1.0 + 0.2 * region.development;
        let war_penalty = (1.0 - region.war_intensity).max(0.0);
        for g in 0..NUM_GOODS {
            region.production[g] = region.endowment[g]
                * pop
                * (1.0 + region.specialization[g])
                * TECH[g]
                * eff
                * dev_bonus
                * war_penalty;
        }
    }
}

/// Per-capita subsistence needs, by climate band and development.
pub fn per_capita_demand(climate: ClimateBand, development: f64) -> [f64; NUM_GOODS] {
    let mut pc = [0.0; NUM_GOODS];
    pc[FOOD] = match climate {
        ClimateBand::Hot => 0.9,
        ClimateBand::Temperate => 1.0,
        ClimateBand::Cold => 1.1,
    };
    pc[ENERGY] = match climate {
        ClimateBand::Hot => 0.4,
        ClimateBand::Temperate => 0.6,
        ClimateBand::Cold => 0.9,
    };
    // Needs for tools, services and luxury grow with development
    pc[TOOLS] = 0.2 + 0.3 * development;
    pc[SERVICES] = 0.1 + 0.4 * development;
    pc[LUXURY] = 0.05 + 0.3 * (development - 0.5).max(0.0);
    pc
}

pub fn update_demand(econ: &mut Economy, table: &AgentTable) {
    for (r, region) in econ.regions.iter_mut().enumerate() {
        let pop = table.region_index(r as u32).len() as f64;
        let pc = per_capita_demand(region.climate(), region.development);
        for g in 0..NUM_GOODS {
            region.demand[g] = pc[g] * pop;
        }
    }
}

/// Distribute sector output to agents proportionally to productivity:
/// `income_i = (productivity_i / Σ productivity in (r, s)) · prod[r,s] · price[r,s]`,
/// then settle wealth against consumption spending.
pub fn update_income_and_wealth(
    econ: &Economy,
    table: &mut AgentTable,
    warnings: &mut NumericWarnings,
) -> Result<(), KernelError> {
    let num_regions = econ.regions.len();

    // Σ productivity per (region, sector)
    let mut sector_productivity = vec![[0.0; NUM_GOODS]; num_regions];
    for i in table.iter_live() {
        let r = table.region[i] as usize;
        sector_productivity[r][table.sector[i] as usize] += table.productivity[i];
    }

    let live: Vec<usize> = table.iter_live().collect();
    for i in live {
        let r = table.region[i] as usize;
        let s = table.sector[i] as usize;
        let total = sector_productivity[r][s];
        let region = &econ.regions[r];
        let income = if total > 0.0 {
            (table.productivity[i] / total) * region.production[s] * region.prices[s]
        } else {
            0.0
        };
        table.income[i] = income;

        // Spend on subsistence out of income plus liquid wealth
        let pc = per_capita_demand(region.climate(), region.development);
        let budget = table.wealth[i] * WEALTH_LIQUIDITY + income;
        let mut spending = 0.0;
        for g in [FOOD, ENERGY, TOOLS, SERVICES] {
            let afford_qty = (budget / region.prices[g] / 4.0).min(pc[g]).max(0.0);
            spending += afford_qty * region.prices[g];
        }
        let wealth = (table.wealth[i] + income - spending).max(0.0);
        table.wealth[i] = check_range("wealth", wealth, 0.0, f64::MAX, warnings)?;
    }
    Ok(())
}

/// Development-weighted consumption shortfall per agent, rolled up into the
/// regional average; development and welfare track the result.
pub fn update_hardship_and_development(
    econ: &mut Economy,
    table: &mut AgentTable,
    tick: u64,
    events: &mut EventLog,
    warnings: &mut NumericWarnings,
) -> Result<(), KernelError> {
    let num_regions = econ.regions.len();
    let mut hardship_sum = vec![0.0; num_regions];
    let mut counts = vec![0usize; num_regions];

    let live: Vec<usize> = table.iter_live().collect();
    for i in live {
        let r = table.region[i] as usize;
        let region = &econ.regions[r];
        let dev = region.development;
        let pc = per_capita_demand(region.climate(), dev);
        let budget = table.wealth[i] * WEALTH_LIQUIDITY + table.income[i];

        // Weight shifts from bare subsistence toward tools/services as the
        // region develops
        let weights = [1.0, 0.8, 0.2 + 0.4 * dev, 0.1 + 0.5 * dev];
        let goods = [FOOD, ENERGY, TOOLS, SERVICES];
        let mut shortfall = 0.0;
        let mut weight_sum = 0.0;
        for (&g, &w) in goods.iter().zip(&weights) {
            if pc[g] <= 0.0 {
                continue;
            }
            let afford_qty = (budget / region.prices[g] / 4.0).min(pc[g]).max(0.0);
            shortfall += w * (1.0 - afford_qty / pc[g]).max(0.0);
            weight_sum += w;
        }
        let hardship = if weight_sum > 0.0 {
            shortfall / weight_sum
        } else {
            0.0
        };
        table.hardship[i] = check_range("hardship", hardship, 0.0, 1.0, warnings)?;
        hardship_sum[r] += table.hardship[i];
        counts[r] += 1;
    }

    for (r, region) in econ.regions.iter_mut().enumerate() {
        let hardship = if counts[r] > 0 {
            hardship_sum[r] / counts[r] as f64
        } else {
            0.0
        };
        region.hardship = hardship;

        let satisfaction = 1.0 - hardship;
        let dev_before = region.development;
        region.development =
            (region.development + 0.002 * (satisfaction - 0.5) * ECONOMY_INTERVAL as f64 / 10.0)
                .clamp(0.0, 2.0);
        region.welfare = ((1.0 - hardship) * (0.5 + 0.5 * region.development)).clamp(0.0, 2.0);

        if hardship > 0.8 {
            events.log_hardship_crisis(tick, r as u32, hardship);
        }
        // Milestone when development crosses a half-point boundary upward
        if (dev_before / 0.5).floor() < (region.development / 0.5).floor() {
            events.log_development_milestone(tick, r as u32, region.development);
        }
    }

    // True Gini over sorted agent wealth, per region
    for r in 0..num_regions {
        let wealth: Vec<f64> = table
            .region_index(r as u32)
            .iter()
            .map(|&id| table.wealth[id as usize])
            .collect();
        econ.regions[r].inequality = crate::metrics::gini(&wealth);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::table::test_template;

    fn setup(agents_per_region: usize, regions: u32) -> (Economy, AgentTable) {
        let econ = Economy::new(regions, 1);
        let mut table = AgentTable::new(regions);
        for r in 0..regions {
            for j in 0..agents_per_region {
                let mut tpl = test_template(r);
                tpl.sector = (j % NUM_GOODS) as u8;
                tpl.productivity = 0.5 + 0.1 * (j % 5) as f64;
                table.add_agent(tpl);
            }
        }
        table.rebuild_region_index();
        (econ, table)
    }

    #[test]
    fn test_production_scales_with_population() {
        let (mut econ, table) = setup(10, 2);
        update_production(&mut econ, &table);
        let small = econ.regions[0].production[FOOD];

        let (mut econ2, mut table2) = setup(10, 2);
        for _ in 0..10 {
            table2.add_agent(test_template(0));
        }
        table2.rebuild_region_index();
        update_production(&mut econ2, &table2);
        assert!(econ2.regions[0].production[FOOD] > small);
    }

    #[test]
    fn test_war_suppresses_production() {
        let (mut econ, table) = setup(10, 1);
        update_production(&mut econ, &table);
        let peacetime = econ.regions[0].production[FOOD];
        econ.regions[0].war_intensity = 0.5;
        update_production(&mut econ, &table);
        assert!(econ.regions[0].production[FOOD] < peacetime);
    }

    #[test]
    fn test_demand_grows_with_development() {
        let low = per_capita_demand(ClimateBand::Temperate, 0.1);
        let high = per_capita_demand(ClimateBand::Temperate, 1.5);
        assert!(high[TOOLS] > low[TOOLS]);
        assert!(high[SERVICES] > low[SERVICES]);
        assert!(high[LUXURY] > low[LUXURY]);
        assert_eq!(low[FOOD], high[FOOD]);
    }

    #[test]
    fn test_cold_regions_need_more_energy() {
        let hot = per_capita_demand(ClimateBand::Hot, 0.5);
        let cold = per_capita_demand(ClimateBand::Cold, 0.5);
        assert!(cold[ENERGY] > hot[ENERGY]);
        assert!(cold[FOOD] > hot[FOOD]);
    }

    #[test]
    fn test_income_shares_sum_to_sector_output() {
        let (mut econ, mut table) = setup(20, 1);
        update_production(&mut econ, &table);
        update_demand(&mut econ, &table);
        let mut warnings = NumericWarnings::default();
        update_income_and_wealth(&econ, &mut table, &mut warnings).unwrap();

        for s in 0..NUM_GOODS {
            let total_income: f64 = table
                .iter_live()
                .filter(|&i| table.sector[i] as usize == s)
                .map(|i| table.income[i])
                .sum();
            let expected = econ.regions[0].production[s] * econ.regions[0].prices[s];
            assert!(
                (total_income - expected).abs() < 1e-9 * expected.max(1.0),
                "sector {s}: {total_income} vs {expected}"
            );
        }
    }

    #[test]
    fn test_wealth_never_negative() {
        let (mut econ, mut table) = setup(15, 2);
        // Make goods ruinously expensive
        for region in &mut econ.regions {
            region.prices = [90.0; NUM_GOODS];
        }
        update_production(&mut econ, &table);
        update_demand(&mut econ, &table);
        let mut warnings = NumericWarnings::default();
        update_income_and_wealth(&econ, &mut table, &mut warnings).unwrap();
        for i in table.iter_live() {
            assert!(table.wealth[i] >= 0.0);
        }
    }

    #[test]
    fn test_hardship_in_unit_range_and_aggregated() {
        let (mut econ, mut table) = setup(25, 3);
        update_production(&mut econ, &table);
        update_demand(&mut econ, &table);
        let mut warnings = NumericWarnings::default();
        update_income_and_wealth(&econ, &mut table, &mut warnings).unwrap();
        let mut events = EventLog::new();
        update_hardship_and_development(&mut econ, &mut table, 0, &mut events, &mut warnings)
            .unwrap();

        for i in table.iter_live() {
            assert!((0.0..=1.0).contains(&table.hardship[i]));
        }
        for region in &econ.regions {
            assert!((0.0..=1.0).contains(&region.hardship));
            assert!((0.0..=1.0).contains(&region.inequality));
            assert!((0.0..=2.0).contains(&region.welfare));
        }
    }
}
