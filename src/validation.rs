//! Debug-build numeric and bounds validation
//!
//! In debug builds these checks abort the tick with a typed error so logic
//! bugs surface at the indexing or arithmetic site that produced them. In
//! release builds numeric problems are clamped and counted instead; the
//! counters are reported through `tracing` so long runs stay observable.

use crate::error::KernelError;

/// Running totals of release-mode clamp events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumericWarnings {
    /// Non-finite values replaced with a fallback
    pub non_finite: u64,
    /// Values pulled back inside their range
    pub clamped: u64,
}

impl NumericWarnings {
    pub fn total(&self) -> u64 {
        self.non_finite + self.clamped
    }

    /// Emit a single warning line if anything was clamped since the last report.
    pub fn report_and_reset(&mut self, tick: u64) {
        if self.total() > 0 {
            tracing::warn!(
                tick,
                non_finite = self.non_finite,
                clamped = self.clamped,
                "numeric values clamped during tick"
            );
            *self = NumericWarnings::default();
        }
    }
}

/// Validate an index against a table length. Always on: an out-of-bounds id
/// is a logic bug in every build.
#[inline]
pub fn check_index(what: &'static str, index: usize, len: usize) -> Result<(), KernelError> {
    if index >= len {
        return Err(KernelError::Bounds { what, index, len });
    }
    Ok(())
}

/// Validate that a value is finite; debug builds fail, release builds clamp
/// to `fallback` and count.
#[inline]
pub fn check_finite(
    context: &'static str,
    value: f64,
    fallback: f64,
    warnings: &mut NumericWarnings,
) -> Result<f64, KernelError> {
    if value.is_finite() {
        return Ok(value);
    }
    if cfg!(debug_assertions) {
        return Err(KernelError::Numeric {
            context,
            detail: format!("non-finite value {value}"),
        });
    }
    warnings.non_finite += 1;
    Ok(fallback)
}

/// Validate that a value lies in `[min, max]`; debug builds fail, release
/// builds clamp and count.
#[inline]
pub fn check_range(
    context: &'static str,
    value: f64,
    min: f64,
    max: f64,
    warnings: &mut NumericWarnings,
) -> Result<f64, KernelError> {
    if value.is_finite() && value >= min && value <= max {
        return Ok(value);
    }
    if cfg!(debug_assertions) {
        return Err(KernelError::Numeric {
            context,
            detail: format!("{value} outside [{min}, {max}]"),
        });
    }
    if value.is_finite() {
        warnings.clamped += 1;
        Ok(value.clamp(min, max))
    } else {
        warnings.non_finite += 1;
        Ok(min)
    }
}
