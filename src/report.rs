//! Conformance findings and the failure sink
//!
//! Every violation the validators detect leaves the subsystem through
//! exactly one channel: a [`FailureSink`] taking (severity, call name,
//! message). The sink never influences the result returned to the
//! application; it only records.
//!
//! Three sinks are provided:
//! - [`LogSink`]: forwards findings to the `log` facade (default)
//! - [`CollectingSink`]: keeps findings in memory for embedders and tests
//! - [`JsonFileSink`]: appends findings as JSON lines for the reporting
//!   pipeline to consume

use log::{error, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Finding severity. `Error` is a definite specification violation;
/// `Warning` covers cases the specification does not fully pin down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// A single conformance finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Name of the intercepted call the finding is attributed to.
    pub call: String,
    pub message: String,
}

/// The one channel through which findings leave the subsystem.
pub trait FailureSink: Send + Sync {
    fn report(&self, severity: Severity, call: &str, message: String);
}

/// Default sink: forwards findings to the `log` facade.
pub struct LogSink;

impl FailureSink for LogSink {
    fn report(&self, severity: Severity, call: &str, message: String) {
        match severity {
            Severity::Error => error!("[{}] nonconformant: {}", call, message),
            Severity::Warning => warn!("[{}] possibly nonconformant: {}", call, message),
        }
    }
}

/// Discards every finding. Used to mute a validator family that is
/// disabled in configuration while its state tracking keeps running.
pub struct NullSink;

impl FailureSink for NullSink {
    fn report(&self, _severity: Severity, _call: &str, _message: String) {}
}

/// In-memory sink for embedders and tests.
#[derive(Default)]
pub struct CollectingSink {
    findings: Mutex<Vec<Finding>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all findings reported so far.
    pub fn findings(&self) -> Vec<Finding> {
        self.findings.lock().clone()
    }

    pub fn error_count(&self) -> usize {
        self.findings
            .lock()
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings
            .lock()
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    pub fn clear(&self) {
        self.findings.lock().clear();
    }
}

impl FailureSink for CollectingSink {
    fn report(&self, severity: Severity, call: &str, message: String) {
        self.findings.lock().push(Finding {
            severity,
            call: call.to_string(),
            message,
        });
    }
}

/// Appends findings as JSON lines to a file, one object per finding, for
/// the external reporting pipeline.
pub struct JsonFileSink {
    writer: Mutex<File>,
}

impl JsonFileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(file),
        })
    }
}

impl FailureSink for JsonFileSink {
    fn report(&self, severity: Severity, call: &str, message: String) {
        let finding = Finding {
            severity,
            call: call.to_string(),
            message,
        };
        match serde_json::to_string(&finding) {
            Ok(line) => {
                let mut file = self.writer.lock();
                if let Err(e) = writeln!(file, "{}", line) {
                    error!("failed to append finding to log file: {}", e);
                }
            }
            Err(e) => error!("failed to serialize finding: {}", e),
        }
    }
}

/// Shared reporter handed to every validator. Wraps the sink with the
/// severity conventions of the finding taxonomy and keeps running counters.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn FailureSink>,
    strict: bool,
    errors: Arc<AtomicU64>,
    warnings: Arc<AtomicU64>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn FailureSink>) -> Self {
        Self {
            sink,
            strict: false,
            errors: Arc::new(AtomicU64::new(0)),
            warnings: Arc::new(AtomicU64::new(0)),
        }
    }

    /// In strict mode, possibly-nonconformant findings are promoted to
    /// error severity.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Report a definite specification violation.
    pub fn nonconformant(&self, call: &str, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.sink.report(Severity::Error, call, message.into());
    }

    /// Report a case the specification leaves ambiguous.
    pub fn possibly_nonconformant(&self, call: &str, message: impl Into<String>) {
        let severity = if self.strict {
            self.errors.fetch_add(1, Ordering::Relaxed);
            Severity::Error
        } else {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            Severity::Warning
        };
        self.sink.report(severity, call, message.into());
    }

    /// Report an illegal in-place mutation of an extension struct chain.
    pub fn chain_mutated(&self, call: &str, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.sink.report(Severity::Error, call, message.into());
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}
