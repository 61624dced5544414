//! Replication telemetry events and sinks.
//!
//! Colloquy runs inside a local agent process, but it still benefits from
//! lightweight telemetry to support debugging and to make partial directive
//! application observable instead of silent.

use std::io;

use serde::{Deserialize, Serialize};

/// A structured telemetry event emitted by the replication core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A directive batch was applied to the backend replica.
    DirectiveBatchApplied {
        /// Provider the pull request belongs to.
        provider_id: String,
        /// Directives applied successfully.
        applied: usize,
        /// Directives skipped because they could not be applied.
        skipped: usize,
    },
    /// A stale cache entry forced a full conversation refetch.
    StaleConversationsRefetched {
        /// Provider the pull request belongs to.
        provider_id: String,
    },
    /// The provider rejected the access token; calls now short-circuit.
    ProviderTokenInvalidated {
        /// Provider whose token was rejected.
        provider_id: String,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Records telemetry events to stderr as JSON lines (JSONL).
///
/// This is intended for local debugging and is not transmitted anywhere.
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}
