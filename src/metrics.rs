//! Metric names, label helpers and exporter wiring.

pub mod collector;

pub use collector::{ClientCounts, MetricsCollector};

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::{
	_prelude::*,
	error::ErrorKind,
	reconcile::Outcome,
	resource::{ClientKind, SyncState},
};

type LabelSet = SmallVec<[Label; 4]>;

const METRIC_RECONCILIATIONS_TOTAL: &str = "digdirator_reconciliations_total";
const METRIC_RECONCILE_DURATION: &str = "digdirator_reconcile_duration_seconds";
const METRIC_PROVIDER_MUTATIONS_TOTAL: &str = "digdirator_provider_mutations_total";
const METRIC_RECONCILE_ERRORS_TOTAL: &str = "digdirator_reconcile_errors_total";
const METRIC_ROTATED_CREDENTIALS_TOTAL: &str = "digdirator_rotated_credentials_total";
const METRIC_CLIENTS: &str = "digdirator_clients";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a finished reconciliation and its latency.
pub fn record_reconcile(kind: ClientKind, outcome: &Outcome, duration: Duration) {
	metrics::counter!(
		METRIC_RECONCILIATIONS_TOTAL,
		labeled(kind, "result", outcome.result_label()).iter()
	)
	.increment(1);
	metrics::histogram!(METRIC_RECONCILE_DURATION, kind_labels(kind).iter())
		.record(duration.as_secs_f64());
}

/// Record a mutating call against the registration API.
pub fn record_provider_mutation(kind: ClientKind, operation: &'static str) {
	metrics::counter!(METRIC_PROVIDER_MUTATIONS_TOTAL, labeled(kind, "operation", operation).iter())
		.increment(1);
}

/// Record a failed reconciliation by error classification.
pub fn record_reconcile_error(kind: ClientKind, error: ErrorKind) {
	metrics::counter!(METRIC_RECONCILE_ERRORS_TOTAL, labeled(kind, "error", error.as_str()).iter())
		.increment(1);
}

/// Record newly issued client credentials.
pub fn record_rotated_credentials(kind: ClientKind) {
	metrics::counter!(METRIC_ROTATED_CREDENTIALS_TOTAL, kind_labels(kind).iter()).increment(1);
}

/// Publish the number of managed clients in `state`.
pub fn set_client_count(kind: ClientKind, state: SyncState, count: u64) {
	metrics::gauge!(METRIC_CLIENTS, labeled(kind, "state", state.as_str()).iter()).set(count as f64);
}

fn kind_labels(kind: ClientKind) -> LabelSet {
	let mut labels = LabelSet::with_capacity(2);

	labels.push(Label::new("kind", kind.as_str()));

	labels
}

fn labeled(kind: ClientKind, key: &'static str, value: &'static str) -> LabelSet {
	let mut labels = kind_labels(kind);

	labels.push(Label::new(key, value));

	labels
}
