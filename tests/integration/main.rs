mod common;

mod metrics_collector;
mod provider_client;
mod reconcile_deletion;
mod reconcile_idporten;
