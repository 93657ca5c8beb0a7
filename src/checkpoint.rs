//! Binary checkpoint save/load
//!
//! Little-endian throughout; the byte layout is part of the external
//! contract, so fields are written one by one instead of going through a
//! serializer. Fixed-size arrays are written raw, variable-length arrays
//! carry a u32 count prefix. Magic or version mismatch refuses the load,
//! and the restore is all-or-nothing: agents, regions, and per-agent
//! economy all come back or the file is rejected.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::agents::table::{AgentTable, BELIEF_DIMS};
use crate::config::KernelConfig;
use crate::economy::{Economy, EconomicSystem, RegionEconomy, NUM_GOODS};
use crate::error::CheckpointError;
use crate::kernel::Kernel;

pub const MAGIC: u32 = 0x4543_5356;
pub const VERSION: u32 = 1;

/// Save the kernel to `path`. In-memory state is untouched either way.
pub fn save(kernel: &Kernel, path: &Path) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut w = BufWriter::new(File::create(path)?);
    let table = &kernel.table;

    // Header
    write_u32(&mut w, MAGIC)?;
    write_u32(&mut w, VERSION)?;
    write_u64(&mut w, kernel.generation())?;
    write_u32(&mut w, table.len() as u32)?;
    write_u32(&mut w, kernel.economy.regions.len() as u32)?;
    write_u64(&mut w, kernel.config().seed)?;
    write_u64(&mut w, unix_timestamp())?;

    // Agents, field order fixed by the data model
    for i in 0..table.len() {
        write_u32(&mut w, i as u32)?;
        write_u32(&mut w, table.region[i])?;
        write_u8(&mut w, table.alive[i] as u8)?;
        write_f64(&mut w, table.age[i])?;
        write_u8(&mut w, table.female[i] as u8)?;
        write_u32(&mut w, table.parent_a[i])?;
        write_u32(&mut w, table.parent_b[i])?;
        write_u32(&mut w, table.lineage_id[i])?;
        write_u8(&mut w, table.primary_lang[i])?;
        write_u8(&mut w, table.dialect[i])?;
        write_f64(&mut w, table.fluency[i])?;
        write_f64(&mut w, table.openness[i])?;
        write_f64(&mut w, table.conformity[i])?;
        write_f64(&mut w, table.assertiveness[i])?;
        write_f64(&mut w, table.sociality[i])?;
        for k in 0..BELIEF_DIMS {
            write_f64(&mut w, table.x[i][k])?;
        }
        for k in 0..BELIEF_DIMS {
            write_f64(&mut w, table.b[i][k])?;
        }
        write_f64(&mut w, table.b_norm_sq[i])?;
        write_f64(&mut w, table.m_comm[i])?;
        write_f64(&mut w, table.m_susceptibility[i])?;
        write_f64(&mut w, table.m_mobility[i])?;
        write_u32(&mut w, table.neighbors[i].len() as u32)?;
        for &n in &table.neighbors[i] {
            write_u32(&mut w, n)?;
        }
    }

    // Regions
    for region in &kernel.economy.regions {
        write_f64(&mut w, region.x)?;
        write_f64(&mut w, region.y)?;
        write_f64(&mut w, region.latitude)?;
        for g in 0..NUM_GOODS {
            write_f64(&mut w, region.endowment[g])?;
        }
        for g in 0..NUM_GOODS {
            write_f64(&mut w, region.production[g])?;
        }
        for g in 0..NUM_GOODS {
            write_f64(&mut w, region.demand[g])?;
        }
        for g in 0..NUM_GOODS {
            write_f64(&mut w, region.prices[g])?;
        }
        for g in 0..NUM_GOODS {
            write_f64(&mut w, region.specialization[g])?;
        }
        write_f64(&mut w, region.development)?;
        write_f64(&mut w, region.welfare)?;
        write_f64(&mut w, region.hardship)?;
        write_f64(&mut w, region.inequality)?;
        write_f64(&mut w, region.efficiency)?;
        write_f64(&mut w, region.system_stability)?;
        write_string(&mut w, region.system.name())?;
        write_u32(&mut w, region.trade_partners.len() as u32)?;
        for &p in &region.trade_partners {
            write_u32(&mut w, p)?;
        }
        write_f64(&mut w, region.war_intensity)?;
    }

    // Per-agent economy records
    for i in 0..table.len() {
        write_f64(&mut w, table.wealth[i])?;
        write_f64(&mut w, table.income[i])?;
        write_f64(&mut w, table.productivity[i])?;
        write_u8(&mut w, table.sector[i])?;
        write_f64(&mut w, table.hardship[i])?;
    }

    w.flush()?;
    Ok(())
}

/// Load a kernel from `path`. Configuration fields that are not part of the
/// checkpoint (step size, intervals, paths) come from `base_cfg`.
pub fn load(path: &Path, base_cfg: &KernelConfig) -> Result<Kernel, CheckpointError> {
    let mut r = BufReader::new(File::open(path)?);

    // Header
    let magic = read_u32(&mut r, "header")?;
    if magic != MAGIC {
        return Err(CheckpointError::BadMagic {
            found: magic,
            expected: MAGIC,
        });
    }
    let version = read_u32(&mut r, "header")?;
    if version != VERSION {
        return Err(CheckpointError::BadVersion {
            found: version,
            expected: VERSION,
        });
    }
    let generation = read_u64(&mut r, "header")?;
    let num_agents = read_u32(&mut r, "header")? as usize;
    let num_regions = read_u32(&mut r, "header")?;
    let seed = read_u64(&mut r, "header")?;
    let _timestamp = read_u64(&mut r, "header")?;

    if num_regions == 0 || num_agents == 0 {
        return Err(CheckpointError::Corrupt(
            "zero agents or regions in header".to_string(),
        ));
    }

    // Agents
    let mut table = AgentTable::new(num_regions);
    for i in 0..num_agents {
        let id = read_u32(&mut r, "agents")?;
        if id != i as u32 {
            return Err(CheckpointError::Corrupt(format!(
                "agent record {i} carries id {id}"
            )));
        }
        let region = read_u32(&mut r, "agents")?;
        if region >= num_regions {
            return Err(CheckpointError::Corrupt(format!(
                "agent {i} region {region} out of range"
            )));
        }
        table.region.push(region);
        table.alive.push(read_u8(&mut r, "agents")? != 0);
        table.age.push(read_f64(&mut r, "agents")?);
        table.female.push(read_u8(&mut r, "agents")? != 0);
        table.parent_a.push(read_u32(&mut r, "agents")?);
        table.parent_b.push(read_u32(&mut r, "agents")?);
        table.lineage_id.push(read_u32(&mut r, "agents")?);
        table.primary_lang.push(read_u8(&mut r, "agents")?);
        table.dialect.push(read_u8(&mut r, "agents")?);
        table.fluency.push(read_f64(&mut r, "agents")?);
        table.openness.push(read_f64(&mut r, "agents")?);
        table.conformity.push(read_f64(&mut r, "agents")?);
        table.assertiveness.push(read_f64(&mut r, "agents")?);
        table.sociality.push(read_f64(&mut r, "agents")?);
        let mut x = [0.0; BELIEF_DIMS];
        for slot in &mut x {
            *slot = read_f64(&mut r, "agents")?;
        }
        table.x.push(x);
        let mut b = [0.0; BELIEF_DIMS];
        for slot in &mut b {
            *slot = read_f64(&mut r, "agents")?;
        }
        table.b.push(b);
        table.b_norm_sq.push(read_f64(&mut r, "agents")?);
        table.m_comm.push(read_f64(&mut r, "agents")?);
        table.m_susceptibility.push(read_f64(&mut r, "agents")?);
        table.m_mobility.push(read_f64(&mut r, "agents")?);
        let degree = read_u32(&mut r, "agents")? as usize;
        if degree > num_agents {
            return Err(CheckpointError::Corrupt(format!(
                "agent {i} neighbor count {degree} exceeds table"
            )));
        }
        let mut neighbors = Vec::with_capacity(degree);
        for _ in 0..degree {
            let n = read_u32(&mut r, "agents")?;
            if n as usize >= num_agents {
                return Err(CheckpointError::Corrupt(format!(
                    "agent {i} neighbor id {n} out of range"
                )));
            }
            neighbors.push(n);
        }
        table.neighbors.push(neighbors);
        // Economy columns are filled by the trailing records
        table.wealth.push(0.0);
        table.income.push(0.0);
        table.productivity.push(0.0);
        table.hardship.push(0.0);
        table.sector.push(0);
    }

    // Regions
    let mut regions = Vec::with_capacity(num_regions as usize);
    for _ in 0..num_regions {
        let x = read_f64(&mut r, "regions")?;
        let y = read_f64(&mut r, "regions")?;
        let latitude = read_f64(&mut r, "regions")?;
        let mut endowment = [0.0; NUM_GOODS];
        for slot in &mut endowment {
            *slot = read_f64(&mut r, "regions")?;
        }
        let mut production = [0.0; NUM_GOODS];
        for slot in &mut production {
            *slot = read_f64(&mut r, "regions")?;
        }
        let mut demand = [0.0; NUM_GOODS];
        for slot in &mut demand {
            *slot = read_f64(&mut r, "regions")?;
        }
        let mut prices = [0.0; NUM_GOODS];
        for slot in &mut prices {
            *slot = read_f64(&mut r, "regions")?;
        }
        let mut specialization = [0.0; NUM_GOODS];
        for slot in &mut specialization {
            *slot = read_f64(&mut r, "regions")?;
        }
        let development = read_f64(&mut r, "regions")?;
        let welfare = read_f64(&mut r, "regions")?;
        let hardship = read_f64(&mut r, "regions")?;
        let inequality = read_f64(&mut r, "regions")?;
        let efficiency = read_f64(&mut r, "regions")?;
        let system_stability = read_f64(&mut r, "regions")?;
        let system_name = read_string(&mut r, "regions")?;
        let system = EconomicSystem::from_name(&system_name).ok_or_else(|| {
            CheckpointError::Corrupt(format!("unknown economic system '{system_name}'"))
        })?;
        let partner_count = read_u32(&mut r, "regions")? as usize;
        let mut trade_partners = Vec::with_capacity(partner_count);
        for _ in 0..partner_count {
            let p = read_u32(&mut r, "regions")?;
            if p >= num_regions {
                return Err(CheckpointError::Corrupt(format!(
                    "trade partner {p} out of range"
                )));
            }
            trade_partners.push(p);
        }
        let war_intensity = read_f64(&mut r, "regions")?;

        regions.push(RegionEconomy {
            x,
            y,
            latitude,
            endowment,
            production,
            demand,
            prices,
            specialization,
            development,
            welfare,
            hardship,
            inequality,
            efficiency,
            system_stability,
            system,
            trade_partners,
            war_intensity,
        });
    }

    // Per-agent economy records
    for i in 0..num_agents {
        table.wealth[i] = read_f64(&mut r, "agent economy")?;
        table.income[i] = read_f64(&mut r, "agent economy")?;
        table.productivity[i] = read_f64(&mut r, "agent economy")?;
        table.sector[i] = read_u8(&mut r, "agent economy")?;
        table.hardship[i] = read_f64(&mut r, "agent economy")?;
    }

    table.rebuild_bookkeeping();
    let economy = Economy::from_regions(regions);

    let cfg = KernelConfig {
        population: table.live_count().max(1) as u32,
        regions: num_regions,
        seed,
        max_population: base_cfg.max_population.max(num_agents as u32),
        ..base_cfg.clone()
    };
    Kernel::from_parts(cfg, generation, table, economy)
        .map_err(|e| CheckpointError::Corrupt(e.to_string()))
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// === Little-endian field I/O ===

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f64<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn read_u8<R: Read>(r: &mut R, section: &'static str) -> Result<u8, CheckpointError> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf, section)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(r: &mut R, section: &'static str) -> Result<u32, CheckpointError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf, section)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R, section: &'static str) -> Result<u64, CheckpointError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf, section)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R, section: &'static str) -> Result<f64, CheckpointError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf, section)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_string<R: Read>(r: &mut R, section: &'static str) -> Result<String, CheckpointError> {
    let len = read_u32(r, section)? as usize;
    if len > 1024 {
        return Err(CheckpointError::Corrupt(format!(
            "string length {len} implausible in {section}"
        )));
    }
    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf, section)?;
    String::from_utf8(buf)
        .map_err(|_| CheckpointError::Corrupt(format!("invalid utf-8 in {section}")))
}

fn read_exact<R: Read>(
    r: &mut R,
    buf: &mut [u8],
    section: &'static str,
) -> Result<(), CheckpointError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CheckpointError::Truncated { section }
        } else {
            CheckpointError::Io(e)
        }
    })
}
