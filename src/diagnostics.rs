//! Operation diagnostics: the append-only trace tests and observability
//! tooling assert against.

use crate::fault::RuleEvaluationResult;
use crate::types::ConnectionType;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::time::Duration;

/// One attempt's record in the trace.
#[derive(Debug, Clone)]
pub struct AttemptStatistics {
    /// Status code observed (real or injected).
    pub status: u32,
    /// Substatus code observed.
    pub sub_status: u32,
    /// Lower-cased region contacted.
    pub region: String,
    /// Whether a rule substituted this outcome.
    pub injected: bool,
    /// Id of the rule that fired, when injected.
    pub fault_injection_rule_id: Option<String>,
    /// Mismatch reasons for rules that were considered but did not apply.
    pub fault_injection_evaluation_results: Vec<String>,
    /// Attempt latency, injected delays included.
    pub latency: Duration,
}

/// One address-resolution call's record.
#[derive(Debug, Clone)]
pub struct AddressResolutionStatistics {
    /// Lower-cased region the resolution targeted.
    pub region: String,
    /// Whether the cache was force-refreshed.
    pub forced_refresh: bool,
    /// Rule that intercepted the call, if any.
    pub fault_injection_rule_id: Option<String>,
}

/// A named metadata call with its duration.
#[derive(Debug, Clone)]
pub struct MetadataCallRecord {
    /// Call name, e.g. "AddressRefresh" or "PartitionKeyRanges".
    pub name: String,
    /// Wall-clock duration of the call including retries' waits.
    pub duration: Duration,
}

/// The full trace for one logical operation. Append-only while the operation
/// runs; handed to the caller on completion, success or failure.
#[derive(Debug, Clone, Default)]
pub struct OperationDiagnostics {
    /// Lower-cased names of every region contacted.
    pub contacted_region_names: BTreeSet<String>,
    /// Per-attempt records for direct-mode attempts, in order.
    pub response_statistics: Vec<AttemptStatistics>,
    /// Per-attempt records for gateway-mode attempts, in order.
    pub gateway_statistics: Vec<AttemptStatistics>,
    /// Address-resolution call records, in order.
    pub address_resolution_statistics: Vec<AddressResolutionStatistics>,
    /// Named metadata calls with durations, in order.
    pub metadata_diagnostics: Vec<MetadataCallRecord>,
}

impl OperationDiagnostics {
    /// All attempt records regardless of connection mode, direct first.
    pub fn all_attempts(&self) -> impl Iterator<Item = &AttemptStatistics> {
        self.response_statistics
            .iter()
            .chain(self.gateway_statistics.iter())
    }

    /// Count of attempts a rule injected.
    pub fn injected_attempt_count(&self) -> usize {
        self.all_attempts().filter(|a| a.injected).count()
    }
}

/// Records trace entries as the executor drives an operation.
#[derive(Debug, Default)]
pub struct DiagnosticsRecorder {
    inner: Mutex<OperationDiagnostics>,
}

impl DiagnosticsRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt record, routed by connection mode.
    pub fn record_attempt(
        &self,
        connection_type: ConnectionType,
        region: &str,
        status: u32,
        sub_status: u32,
        rule_id: Option<&str>,
        evaluation_results: &[RuleEvaluationResult],
        latency: Duration,
    ) {
        let stats = AttemptStatistics {
            status,
            sub_status,
            region: region.to_ascii_lowercase(),
            injected: rule_id.is_some(),
            fault_injection_rule_id: rule_id.map(str::to_string),
            fault_injection_evaluation_results: evaluation_results
                .iter()
                .map(|r| r.to_string())
                .collect(),
            latency,
        };
        let mut inner = self.inner.lock();
        inner.contacted_region_names.insert(stats.region.clone());
        match connection_type {
            ConnectionType::Direct => inner.response_statistics.push(stats),
            ConnectionType::Gateway | ConnectionType::GatewayV2 => {
                inner.gateway_statistics.push(stats)
            }
        }
    }

    /// Append an address-resolution record.
    pub fn record_address_resolution(
        &self,
        region: &str,
        forced_refresh: bool,
        rule_id: Option<&str>,
    ) {
        self.inner
            .lock()
            .address_resolution_statistics
            .push(AddressResolutionStatistics {
                region: region.to_ascii_lowercase(),
                forced_refresh,
                fault_injection_rule_id: rule_id.map(str::to_string),
            });
    }

    /// Append a named metadata call record.
    pub fn record_metadata_call(&self, name: &str, duration: Duration) {
        self.inner
            .lock()
            .metadata_diagnostics
            .push(MetadataCallRecord {
                name: name.to_string(),
                duration,
            });
    }

    /// Take the accumulated trace.
    pub fn finish(self) -> OperationDiagnostics {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_route_by_connection_mode() {
        let recorder = DiagnosticsRecorder::new();
        recorder.record_attempt(
            ConnectionType::Direct,
            "East US",
            410,
            21005,
            Some("r1"),
            &[],
            Duration::from_millis(1),
        );
        recorder.record_attempt(
            ConnectionType::Gateway,
            "West US",
            200,
            0,
            None,
            &[],
            Duration::from_millis(2),
        );

        let trace = recorder.finish();
        assert_eq!(trace.response_statistics.len(), 1);
        assert_eq!(trace.gateway_statistics.len(), 1);
        assert_eq!(
            trace.contacted_region_names,
            ["east us", "west us"].map(String::from).into_iter().collect()
        );
        assert_eq!(trace.injected_attempt_count(), 1);
        assert_eq!(
            trace.response_statistics[0].fault_injection_rule_id.as_deref(),
            Some("r1")
        );
    }

    #[test]
    fn region_names_are_lowercased() {
        let recorder = DiagnosticsRecorder::new();
        recorder.record_attempt(
            ConnectionType::Direct,
            "NoRtH Eu",
            200,
            0,
            None,
            &[],
            Duration::ZERO,
        );
        recorder.record_address_resolution("NoRtH Eu", true, None);

        let trace = recorder.finish();
        assert!(trace.contacted_region_names.contains("north eu"));
        assert_eq!(trace.address_resolution_statistics[0].region, "north eu");
        assert!(trace.address_resolution_statistics[0].forced_refresh);
    }

    #[test]
    fn metadata_calls_are_named() {
        let recorder = DiagnosticsRecorder::new();
        recorder.record_metadata_call("AddressRefresh", Duration::from_millis(3));
        let trace = recorder.finish();
        assert_eq!(trace.metadata_diagnostics[0].name, "AddressRefresh");
    }
}
