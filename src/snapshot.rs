//! JSON state snapshots and the metrics CSV
//!
//! The snapshot is written by hand rather than through a serializer so
//! every floating-point value carries a fixed four-decimal format, which
//! downstream analysis relies on.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::kernel::Kernel;
use crate::metrics::{Metrics, CSV_HEADER};

/// Render the full kernel state as one JSON line.
///
/// `include_traits` adds the personality fields per agent.
pub fn snapshot_string(kernel: &Kernel, include_traits: bool) -> String {
    let metrics = kernel.metrics();
    let table = &kernel.table;

    let mut out = String::with_capacity(table.len() * 128 + 512);
    out.push('{');
    let _ = write!(out, "\"generation\":{}", kernel.generation());

    out.push_str(",\"metrics\":{");
    let _ = write!(
        out,
        "\"polarization_mean\":{:.4},\"polarization_std\":{:.4},\"avg_openness\":{:.4},\"avg_conformity\":{:.4},\"welfare\":{:.4},\"inequality\":{:.4},\"hardship\":{:.4},\"trade_volume\":{:.4},\"population\":{}",
        metrics.polarization_mean,
        metrics.polarization_std,
        metrics.avg_openness,
        metrics.avg_conformity,
        metrics.welfare,
        metrics.inequality,
        metrics.hardship,
        metrics.trade_volume,
        metrics.population,
    );
    out.push('}');

    out.push_str(",\"agents\":[");
    for i in 0..table.len() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(
            out,
            "{{\"id\":{},\"region\":{},\"lang\":{},\"beliefs\":[{:.4},{:.4},{:.4},{:.4}],\"alive\":{},\"age\":{:.4},\"female\":{}",
            i,
            table.region[i],
            table.primary_lang[i],
            table.b[i][0],
            table.b[i][1],
            table.b[i][2],
            table.b[i][3],
            table.alive[i],
            table.age[i],
            table.female[i],
        );
        if include_traits {
            let _ = write!(
                out,
                ",\"openness\":{:.4},\"conformity\":{:.4},\"assertiveness\":{:.4},\"sociality\":{:.4}",
                table.openness[i],
                table.conformity[i],
                table.assertiveness[i],
                table.sociality[i],
            );
        }
        out.push('}');
    }
    out.push_str("]}");
    out
}

/// Append-only metrics CSV with the fixed header row.
pub struct MetricsCsv {
    writer: BufWriter<File>,
}

impl MetricsCsv {
    /// Create (truncating) the CSV at `path`, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(MetricsCsv { writer })
    }

    pub fn append(&mut self, metrics: &Metrics) -> io::Result<()> {
        writeln!(self.writer, "{}", metrics.csv_row())
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
