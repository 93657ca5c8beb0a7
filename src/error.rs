//! Error taxonomy for the simulation kernel
//!
//! Configuration and logic errors are fatal; I/O and command errors are
//! recoverable and handled at the shell boundary.

use std::io;

/// Invalid or nonsensical configuration, rejected at init.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("population must be nonzero")]
    ZeroPopulation,

    #[error("regions must be nonzero")]
    ZeroRegions,

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("max_population {cap} is below initial population {population}")]
    CapBelowPopulation { cap: u32, population: u32 },

    #[error("{field} = {value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Fatal errors that abort a tick. Bounds and numeric variants indicate a
/// logic bug, not bad input.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An agent→region or neighbor index escaped its table.
    #[error("{what} index {index} out of bounds (len {len})")]
    Bounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A non-finite or out-of-range value survived clamping in a debug build.
    #[error("numeric error in {context}: {detail}")]
    Numeric {
        context: &'static str,
        detail: String,
    },

    /// Trade diffusion lost or created mass beyond the transport-loss budget.
    #[error("trade conservation violated for good {good}: exports {exports:.4}, imports {imports:.4}, loss {loss:.4}")]
    TradeConservation {
        good: usize,
        exports: f64,
        imports: f64,
        loss: f64,
    },
}

/// Recoverable checkpoint/metrics I/O failure; in-memory state is preserved.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("bad checkpoint magic {found:#010x} (expected {expected:#010x})")]
    BadMagic { found: u32, expected: u32 },

    #[error("checkpoint version {found} unsupported (expected {expected})")]
    BadVersion { found: u32, expected: u32 },

    #[error("checkpoint truncated while reading {section}")]
    Truncated { section: &'static str },

    #[error("checkpoint field invalid: {0}")]
    Corrupt(String),
}

/// Recoverable command-parse failure; the shell prints help and continues.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownVerb(String),

    #[error("bad arguments for {verb}: {detail}")]
    BadArguments { verb: &'static str, detail: String },
}
