//! Periodic client gauges.

// crates.io
use tokio::{
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	metrics,
	resource::{ClientKind, ClientResource, SyncState},
	store::ClientStore,
};

/// Managed clients bucketed by kind and lifecycle state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientCounts(BTreeMap<(ClientKind, SyncState), u64>);
impl ClientCounts {
	/// Count `resources` per bucket.
	pub fn tally(resources: &[ClientResource]) -> Self {
		let mut counts = BTreeMap::new();

		for resource in resources {
			*counts.entry((resource.kind(), resource.status.state)).or_default() += 1;
		}

		Self(counts)
	}

	/// Count in one bucket.
	pub fn get(&self, kind: ClientKind, state: SyncState) -> u64 {
		self.0.get(&(kind, state)).copied().unwrap_or_default()
	}

	/// Total across buckets.
	pub fn total(&self) -> u64 {
		self.0.values().sum()
	}

	/// Set every gauge, including empty buckets so vanished clients reset to zero.
	pub fn publish(&self) {
		for kind in ClientKind::ALL {
			for state in SyncState::ALL {
				metrics::set_client_count(kind, state, self.get(kind, state));
			}
		}
	}
}

/// Lists managed resources on a fixed interval and publishes [`ClientCounts`].
#[derive(Clone, Debug)]
pub struct MetricsCollector {
	store: Arc<dyn ClientStore>,
	interval: Duration,
}
impl MetricsCollector {
	/// Collector reading `store` every `interval`.
	pub fn new(store: Arc<dyn ClientStore>, interval: Duration) -> Self {
		Self { store, interval }
	}

	/// List once and publish.
	pub async fn collect_once(&self) -> Result<ClientCounts> {
		let resources = self.store.list().await?;
		let counts = ClientCounts::tally(&resources);

		counts.publish();

		tracing::debug!(total = counts.total(), "published client gauges");

		Ok(counts)
	}

	/// Run until `cancel` fires. Listing failures are logged and retried on the next tick.
	pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = time::interval(self.interval);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = cancel.cancelled() => break,
					_ = ticker.tick() => {
						if let Err(err) = self.collect_once().await {
							tracing::warn!(error = %err, "failed to list clients for metrics");
						}
					},
				}
			}

			tracing::debug!("metrics collector stopped");
		})
	}
}
