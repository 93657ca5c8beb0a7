use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use civsim::config::KernelConfig;
use civsim::events::EventLog;
use civsim::kernel::Kernel;
use civsim::shell;

#[derive(Parser, Debug)]
#[command(name = "civsim")]
#[command(about = "Agent-based simulation kernel for emergent civilizational dynamics")]
struct Args {
    /// Number of agents
    #[arg(short = 'n', long, default_value = "50000")]
    population: u32,

    /// Number of regions
    #[arg(short = 'r', long, default_value = "200")]
    regions: u32,

    /// Mean social graph degree (Watts-Strogatz k)
    #[arg(short = 'k', long, default_value = "8")]
    connections: u32,

    /// Edge rewiring probability (Watts-Strogatz p)
    #[arg(short = 'p', long, default_value = "0.05")]
    rewire: f64,

    /// Belief update step size
    #[arg(long, default_value = "0.15")]
    step_size: f64,

    /// Lower bound on the belief similarity gate
    #[arg(long, default_value = "0.05")]
    sim_floor: f64,

    /// Master RNG seed (random if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Use the regional mean-field belief update instead of pairwise
    #[arg(long)]
    mean_field: bool,

    /// Disable births, deaths, aging and migration
    #[arg(long)]
    no_demography: bool,

    /// Hard cap on the live population
    #[arg(long)]
    max_population: Option<u32>,

    /// Path for metrics CSV rows written by the `run` command
    #[arg(long, default_value = "data/metrics.csv")]
    metrics_path: String,

    /// Mirror simulation events to a CSV file
    #[arg(long)]
    events_csv: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    let cfg = KernelConfig {
        population: args.population,
        regions: args.regions,
        avg_connections: args.connections,
        rewire_prob: args.rewire,
        step_size: args.step_size,
        sim_floor: args.sim_floor,
        use_mean_field: args.mean_field,
        demography_enabled: !args.no_demography,
        max_population: args.max_population.unwrap_or(args.population.saturating_mul(4)),
        seed,
        metrics_path: args.metrics_path,
        ..KernelConfig::default()
    };

    let mut events = match &args.events_csv {
        Some(path) => match EventLog::with_csv(std::path::Path::new(path)) {
            Ok(log) => log,
            Err(e) => {
                eprintln!("cannot open event log {path}: {e}");
                return ExitCode::from(2);
            }
        },
        None => EventLog::new(),
    };

    eprintln!(
        "civsim: {} agents, {} regions, seed {}",
        cfg.population, cfg.regions, seed
    );

    let mut kernel = match Kernel::new(cfg) {
        Ok(kernel) => kernel,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match shell::run_shell(&mut kernel, &mut events, stdin.lock(), &mut stdout) {
        Ok(code) => {
            let _ = events.flush();
            ExitCode::from(code as u8)
        }
        Err(e) => {
            eprintln!("shell I/O error: {e}");
            ExitCode::from(1)
        }
    }
}
