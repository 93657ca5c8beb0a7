//! Line-oriented command shell
//!
//! Reads one command per line from stdin. Protocol output (JSON, CSV
//! confirmations, metrics blocks) goes to the output writer; help and
//! progress go to stderr. Command errors print help and keep the loop
//! alive; kernel errors are fatal and surface as a nonzero exit code.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde_json::json;

use crate::checkpoint;
use crate::clustering;
use crate::config::KernelConfig;
use crate::error::CommandError;
use crate::events::EventLog;
use crate::kernel::Kernel;
use crate::snapshot::{self, MetricsCsv};

const HELP: &str = "Kernel commands:\n  step N                 # advance N ticks, print JSON snapshot\n  run T L                # run T ticks, log metrics CSV every L ticks\n  metrics                # print current scalar metrics\n  state [traits]         # JSON snapshot (traits: include personality)\n  reset [N R k p]        # rebuild: population, regions, degree, rewire prob\n  cluster kmeans K       # re-cluster beliefs into K clusters\n  cluster dbscan EPS M   # density clustering with radius EPS, min pts M\n  economy                # per-region economic summary\n  save PATH              # write binary checkpoint\n  load PATH              # restore binary checkpoint\n  help                   # this text\n  quit                   # exit";

/// Run the shell until EOF, `quit`, or a fatal kernel error.
/// Returns the process exit code.
pub fn run_shell<R: BufRead, W: Write>(
    kernel: &mut Kernel,
    events: &mut EventLog,
    input: R,
    out: &mut W,
) -> io::Result<i32> {
    eprintln!("{HELP}");

    for line in input.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            continue;
        };
        let args: Vec<&str> = parts.collect();

        let outcome = match verb {
            "quit" => return Ok(0),
            "help" => {
                eprintln!("{HELP}");
                Ok(Flow::Continue)
            }
            "step" => cmd_step(kernel, events, &args, out),
            "run" => cmd_run(kernel, events, &args, out),
            "metrics" => {
                write!(out, "{}", kernel.metrics().report())?;
                out.flush()?;
                Ok(Flow::Continue)
            }
            "state" => {
                let traits = args.first() == Some(&"traits");
                writeln!(out, "{}", snapshot::snapshot_string(kernel, traits))?;
                out.flush()?;
                Ok(Flow::Continue)
            }
            "reset" => cmd_reset(kernel, &args, out),
            "cluster" => cmd_cluster(kernel, &args, out),
            "economy" => cmd_economy(kernel, out),
            "save" => cmd_save(kernel, &args, out),
            "load" => cmd_load(kernel, &args, out),
            other => Err(CommandError::UnknownVerb(other.to_string())),
        };

        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Fatal(code)) => return Ok(code),
            Err(e) => {
                eprintln!("{e}");
                eprintln!("{HELP}");
            }
        }
    }
    Ok(0)
}

enum Flow {
    Continue,
    Fatal(i32),
}

fn parse<T: std::str::FromStr>(
    args: &[&str],
    idx: usize,
    default: T,
    verb: &'static str,
) -> Result<T, CommandError> {
    match args.get(idx) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| CommandError::BadArguments {
            verb,
            detail: format!("cannot parse '{raw}'"),
        }),
    }
}

fn cmd_step<W: Write>(
    kernel: &mut Kernel,
    events: &mut EventLog,
    args: &[&str],
    out: &mut W,
) -> Result<Flow, CommandError> {
    let n: u64 = parse(args, 0, 1, "step")?.max(1);
    for i in 0..n {
        if let Err(e) = kernel.tick(events) {
            eprintln!("fatal kernel error: {e}");
            return Ok(Flow::Fatal(1));
        }
        if (i + 1) % 100 == 0 || i + 1 == n {
            eprint!("Tick {}/{}\r", i + 1, n);
        }
    }
    eprintln!();
    let _ = writeln!(out, "{}", snapshot::snapshot_string(kernel, false));
    let _ = out.flush();
    Ok(Flow::Continue)
}

fn cmd_run<W: Write>(
    kernel: &mut Kernel,
    events: &mut EventLog,
    args: &[&str],
    out: &mut W,
) -> Result<Flow, CommandError> {
    let total: u64 = parse(args, 0, 1000, "run")?;
    let log_every: u64 = parse(args, 1, 10, "run")?.max(1);

    let path = kernel.config().metrics_path.clone();
    let mut csv = match MetricsCsv::create(Path::new(&path)) {
        Ok(csv) => csv,
        Err(e) => {
            eprintln!("cannot open metrics file {path}: {e}");
            return Ok(Flow::Continue);
        }
    };

    for t in 0..total {
        if let Err(e) = kernel.tick(events) {
            eprintln!("fatal kernel error: {e}");
            return Ok(Flow::Fatal(1));
        }
        if (t + 1) % 100 == 0 || t + 1 == total {
            eprint!("Tick {}/{}\r", t + 1, total);
        }
        if t % log_every == 0 {
            if let Err(e) = csv.append(&kernel.metrics()) {
                eprintln!("metrics write failed: {e}");
                break;
            }
        }
    }
    eprintln!();
    if let Err(e) = csv.finish() {
        eprintln!("metrics flush failed: {e}");
    }
    let _ = writeln!(out, "Completed {total} ticks. Metrics written to {path}");
    let _ = out.flush();
    Ok(Flow::Continue)
}

fn cmd_reset<W: Write>(
    kernel: &mut Kernel,
    args: &[&str],
    out: &mut W,
) -> Result<Flow, CommandError> {
    let current = kernel.config().clone();
    let population: u32 = parse(args, 0, current.population, "reset")?;
    let regions: u32 = parse(args, 1, current.regions, "reset")?;
    let avg_connections: u32 = parse(args, 2, current.avg_connections, "reset")?;
    let rewire_prob: f64 = parse(args, 3, current.rewire_prob, "reset")?;

    let cfg = KernelConfig {
        population,
        regions,
        avg_connections,
        rewire_prob,
        max_population: current.max_population.max(population.saturating_mul(4)),
        ..current
    };
    match kernel.reset(cfg) {
        Ok(()) => {
            let _ = writeln!(out, "Reset: {population} agents, {regions} regions");
            let _ = out.flush();
            Ok(Flow::Continue)
        }
        Err(e) => Err(CommandError::BadArguments {
            verb: "reset",
            detail: e.to_string(),
        }),
    }
}

fn cmd_cluster<W: Write>(
    kernel: &mut Kernel,
    args: &[&str],
    out: &mut W,
) -> Result<Flow, CommandError> {
    match args.first() {
        Some(&"kmeans") => {
            let k: usize = parse(args, 1, clustering::DEFAULT_K, "cluster")?;
            if k == 0 {
                return Err(CommandError::BadArguments {
                    verb: "cluster",
                    detail: "k must be positive".to_string(),
                });
            }
            kernel.clusters = clustering::kmeans_from_scratch(
                &kernel.table,
                k,
                kernel.generation(),
                kernel.seeds().clustering,
            );
            let stats = kernel.clusters.stats(
                &kernel.table,
                kernel.generation(),
                kernel.seeds().clustering,
            );
            let payload = json!({
                "method": "kmeans",
                "k": k,
                "clusters": stats.iter().map(|s| json!({
                    "id": s.id,
                    "size": s.size,
                    "centroid": s.centroid,
                    "coherence": s.coherence,
                    "charisma_density": s.charisma_density,
                })).collect::<Vec<_>>(),
            });
            let _ = writeln!(out, "{payload}");
            let _ = out.flush();
            Ok(Flow::Continue)
        }
        Some(&"dbscan") => {
            let eps: f64 = parse(args, 1, 0.2, "cluster")?;
            let min_pts: usize = parse(args, 2, 5, "cluster")?;
            if eps <= 0.0 {
                return Err(CommandError::BadArguments {
                    verb: "cluster",
                    detail: "eps must be positive".to_string(),
                });
            }
            let (assignment, sizes) = clustering::dbscan(&kernel.table, eps, min_pts);
            let noise = kernel
                .table
                .iter_live()
                .filter(|&i| assignment[i] == crate::agents::NONE)
                .count();
            let payload = json!({
                "method": "dbscan",
                "eps": eps,
                "min_pts": min_pts,
                "clusters": sizes.len(),
                "sizes": sizes,
                "noise": noise,
            });
            let _ = writeln!(out, "{payload}");
            let _ = out.flush();
            Ok(Flow::Continue)
        }
        _ => Err(CommandError::BadArguments {
            verb: "cluster",
            detail: "expected 'kmeans K' or 'dbscan EPS MINPTS'".to_string(),
        }),
    }
}

fn cmd_economy<W: Write>(kernel: &Kernel, out: &mut W) -> Result<Flow, CommandError> {
    let regions: Vec<_> = kernel
        .economy
        .regions
        .iter()
        .enumerate()
        .map(|(r, region)| {
            json!({
                "region": r,
                "system": region.system.name(),
                "population": kernel.table.region_index(r as u32).len(),
                "development": region.development,
                "welfare": region.welfare,
                "hardship": region.hardship,
                "inequality": region.inequality,
                "prices": region.prices,
                "specialization": region.specialization,
                "trade_partners": region.trade_partners,
            })
        })
        .collect();
    let payload = json!({
        "trade_volume": kernel.economy.trade.volume,
        "transport_loss": kernel.economy.trade.transport_loss,
        "regions": regions,
    });
    let _ = writeln!(out, "{payload}");
    let _ = out.flush();
    Ok(Flow::Continue)
}

fn cmd_save<W: Write>(
    kernel: &Kernel,
    args: &[&str],
    out: &mut W,
) -> Result<Flow, CommandError> {
    let Some(path) = args.first() else {
        return Err(CommandError::BadArguments {
            verb: "save",
            detail: "missing path".to_string(),
        });
    };
    match checkpoint::save(kernel, Path::new(path)) {
        Ok(()) => {
            let _ = writeln!(
                out,
                "Checkpoint saved: {path} (gen {}, {} agents)",
                kernel.generation(),
                kernel.table.len()
            );
            let _ = out.flush();
        }
        // I/O failure is recoverable: state is intact, the operation just failed
        Err(e) => eprintln!("checkpoint save failed: {e}"),
    }
    Ok(Flow::Continue)
}

fn cmd_load<W: Write>(
    kernel: &mut Kernel,
    args: &[&str],
    out: &mut W,
) -> Result<Flow, CommandError> {
    let Some(path) = args.first() else {
        return Err(CommandError::BadArguments {
            verb: "load",
            detail: "missing path".to_string(),
        });
    };
    match checkpoint::load(Path::new(path), kernel.config()) {
        Ok(restored) => {
            *kernel = restored;
            let _ = writeln!(
                out,
                "Checkpoint loaded: {path} (gen {}, {} agents)",
                kernel.generation(),
                kernel.table.len()
            );
            let _ = out.flush();
        }
        // In-memory state is preserved on a failed load
        Err(e) => eprintln!("checkpoint load failed: {e}"),
    }
    Ok(Flow::Continue)
}
