//! Convergence engine shared by every client kind.
//!
//! One invocation reads the resource, compares the desired spec with the applied fingerprint,
//! the provider registration and the credential secret, performs the smallest set of remote
//! mutations and writes status back. Progress lives in status only, so re-running an
//! invocation from scratch converges to the same end state.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	config::{Config, ReconcileSettings},
	error::ErrorKind,
	jwk::{ClientJwk, ClientJwks, KeyMinter, RsaKeyMinter},
	metrics,
	provider::{ClientRegistration, DeleteOutcome, ProviderClient, ProviderMetadata},
	reconcile::{
		backoff::BackoffPolicy,
		context::ReconcileContext,
		outcome::{Change, Outcome},
		strategy::{self, RegistrationStrategy},
	},
	resource::{ClientResource, ConditionType, ObservedStatus, ResourceKey, SyncState},
	scope::{self, FilteredScopes},
	secret::{Secret, SecretMaterializer},
	signer::{AssertionSigner, KeySigner},
	store::{ClientStore, Event},
};

/// Default number of status write attempts before reporting a conflict.
pub const DEFAULT_STATUS_WRITE_ATTEMPTS: u32 = 3;
/// Budget for the failure status write once the invocation was interrupted.
pub const FAILURE_WRITE_GRACE: Duration = Duration::from_secs(5);
/// Default age of a synchronization after which denied scopes are checked for approval again.
pub const DEFAULT_SCOPE_RECHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Builder for [`Reconciler`].
#[derive(Debug)]
pub struct ReconcilerBuilder<S> {
	strategy: S,
	provider: ProviderClient,
	metadata: ProviderMetadata,
	store: Arc<dyn ClientStore>,
	secrets: SecretMaterializer,
	cluster_name: String,
	minter: Arc<dyn KeyMinter>,
	backoff: BackoffPolicy,
	status_write_attempts: u32,
	scope_recheck_interval: Duration,
}
impl<S> ReconcilerBuilder<S>
where
	S: RegistrationStrategy,
{
	/// Builder over the required collaborators, with default tuning.
	pub fn new(
		strategy: S,
		provider: ProviderClient,
		metadata: ProviderMetadata,
		store: Arc<dyn ClientStore>,
		secrets: SecretMaterializer,
	) -> Self {
		Self {
			strategy,
			provider,
			metadata,
			store,
			secrets,
			cluster_name: String::new(),
			minter: Arc::new(RsaKeyMinter::default()),
			backoff: BackoffPolicy::default(),
			status_write_attempts: DEFAULT_STATUS_WRITE_ATTEMPTS,
			scope_recheck_interval: DEFAULT_SCOPE_RECHECK_INTERVAL,
		}
	}

	/// Discover the provider for the strategy's kind and wire a builder from `config`.
	pub async fn from_config(
		strategy: S,
		config: &Config,
		http: reqwest::Client,
		backend: Arc<dyn KeySigner>,
		store: Arc<dyn ClientStore>,
		secrets: SecretMaterializer,
	) -> Result<Self> {
		let kind = strategy.kind();
		let Some(provider_config) = config.provider(kind) else {
			return Err(Error::Validation {
				field: "features",
				reason: format!("Client kind {kind} is not enabled."),
			});
		};
		let metadata = ProviderMetadata::discover(&http, &provider_config.well_known_url).await?;
		let signer = AssertionSigner::new(provider_config.signer_config()?, backend)?;
		let provider = ProviderClient::new(http, config.admin_base_url.clone(), signer, &metadata);

		tracing::info!(%kind, issuer = %metadata.issuer, "discovered provider");

		Ok(Self::new(strategy, provider, metadata, store, secrets)
			.cluster_name(config.cluster_name.clone())
			.settings(&config.reconcile))
	}

	/// Cluster name used in registration descriptions.
	pub fn cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
		self.cluster_name = cluster_name.into();

		self
	}

	/// Replace the client key source.
	pub fn minter(mut self, minter: Arc<dyn KeyMinter>) -> Self {
		self.minter = minter;

		self
	}

	/// Replace the backoff policy.
	pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
		self.backoff = backoff;

		self
	}

	/// Bound the number of status write attempts per write.
	pub fn status_write_attempts(mut self, attempts: u32) -> Self {
		self.status_write_attempts = attempts;

		self
	}

	/// How long a synchronized resource with denied scopes is left alone before access
	/// records are consulted again.
	pub fn scope_recheck_interval(mut self, interval: Duration) -> Self {
		self.scope_recheck_interval = interval;

		self
	}

	/// Apply backoff, status write, scope recheck and key size settings.
	pub fn settings(self, settings: &ReconcileSettings) -> Self {
		self.backoff(settings.backoff_policy())
			.status_write_attempts(settings.status_write_attempts)
			.scope_recheck_interval(settings.resync_interval())
			.minter(Arc::new(RsaKeyMinter::new(settings.client_key_bits)))
	}

	/// Validate and build.
	pub fn build(self) -> Result<Reconciler<S>> {
		if self.cluster_name.trim().is_empty() {
			return Err(Error::Validation {
				field: "cluster_name",
				reason: "Must not be empty.".into(),
			});
		}
		if self.status_write_attempts == 0 {
			return Err(Error::Validation {
				field: "reconcile.status_write_attempts",
				reason: "Must be at least 1.".into(),
			});
		}

		self.backoff.validate()?;

		Ok(Reconciler {
			strategy: self.strategy,
			provider: self.provider,
			metadata: self.metadata,
			store: self.store,
			secrets: self.secrets,
			cluster_name: self.cluster_name,
			minter: self.minter,
			backoff: self.backoff,
			status_write_attempts: self.status_write_attempts,
			scope_recheck_interval: self.scope_recheck_interval,
		})
	}
}

/// Reconciles resources of the kind handled by `S`.
#[derive(Debug)]
pub struct Reconciler<S> {
	strategy: S,
	provider: ProviderClient,
	metadata: ProviderMetadata,
	store: Arc<dyn ClientStore>,
	secrets: SecretMaterializer,
	cluster_name: String,
	minter: Arc<dyn KeyMinter>,
	backoff: BackoffPolicy,
	status_write_attempts: u32,
	scope_recheck_interval: Duration,
}
impl<S> Reconciler<S>
where
	S: RegistrationStrategy,
{
	/// Create a [`ReconcilerBuilder`].
	pub fn builder(
		strategy: S,
		provider: ProviderClient,
		metadata: ProviderMetadata,
		store: Arc<dyn ClientStore>,
		secrets: SecretMaterializer,
	) -> ReconcilerBuilder<S> {
		ReconcilerBuilder::new(strategy, provider, metadata, store, secrets)
	}

	/// Strategy in use.
	pub fn strategy(&self) -> &S {
		&self.strategy
	}

	/// Converge one resource and report what happened.
	///
	/// Never panics and never sleeps; retry scheduling belongs to the caller, guided by
	/// [`Outcome::backoff`].
	#[tracing::instrument(
		skip(self, ctx, key),
		fields(kind = %self.strategy.kind(), resource = %key)
	)]
	pub async fn reconcile(&self, ctx: &ReconcileContext, key: &ResourceKey) -> Outcome {
		let started = Instant::now();
		let kind = self.strategy.kind();
		let outcome = match ctx.run(self.store.get(kind, key)).await {
			Ok(Some(resource)) => self.reconcile_resource(ctx, resource).await,
			Ok(None) => {
				tracing::debug!("resource no longer exists");

				Outcome::Applied(Change::Absent)
			},
			Err(err) => {
				let error_kind = err.kind();

				tracing::warn!(error = %err, %error_kind, "failed to read resource");
				metrics::record_reconcile_error(kind, error_kind);

				self.outcome_for(&err, 1)
			},
		};

		metrics::record_reconcile(kind, &outcome, started.elapsed());

		outcome
	}

	async fn reconcile_resource(&self, ctx: &ReconcileContext, mut resource: ClientResource) -> Outcome {
		let result = if resource.deletion_requested {
			self.deregister(ctx, &mut resource).await
		} else {
			self.converge(ctx, &mut resource).await
		};

		match result {
			Ok(change) => {
				tracing::info!(change = change.as_str(), "reconciled");

				Outcome::Applied(change)
			},
			Err(err) => self.fail(ctx, &mut resource, err).await,
		}
	}

	async fn converge(&self, ctx: &ReconcileContext, resource: &mut ClientResource) -> Result<Change> {
		self.strategy.validate(resource)?;

		let fingerprint = resource.spec.fingerprint()?;
		let secret = ctx.run(self.secrets.get(resource)).await?;

		if self.is_converged(resource, &fingerprint, secret.as_ref()) {
			tracing::debug!("spec fingerprint and credentials match status; nothing to do");

			return Ok(Change::Unchanged);
		}

		let spec_changed = resource.status.applied_hash.as_deref() != Some(fingerprint.as_str());
		let scopes = self.filter_scopes(ctx, resource).await?;
		let registration =
			self.strategy.build_registration(resource, &self.cluster_name, &scopes.valid)?;
		let known_id = resource.status.client_id.clone().or_else(|| {
			let recovered = secret.as_ref().and_then(|secret| self.secret_value(secret, strategy::CLIENT_ID));

			if let Some(client_id) = &recovered {
				tracing::info!(%client_id, "recovered client id from credential secret");
			}

			recovered
		});

		if spec_changed && known_id.is_some() && resource.status.state == SyncState::Registered {
			let mut status = resource.status.clone();

			status.state = SyncState::Reconciling;
			status.observed_generation = resource.generation;

			self.write_status(ctx, resource, status).await?;
		}

		let (client_id, change) = match known_id {
			Some(client_id) => match ctx.run(self.provider.get(&client_id)).await? {
				// A changed spec is pushed even when its filtered payload matches the remote.
				Some(remote) if spec_changed || registration.differs_from(&remote.registration) => {
					ctx.run(self.provider.update(&client_id, &registration)).await?;
					metrics::record_provider_mutation(self.strategy.kind(), "update");

					(client_id, Change::Updated)
				},
				Some(_) => (client_id, Change::Unchanged),
				None => {
					tracing::warn!(%client_id, "registration vanished at the provider; recreating");

					(self.create(ctx, resource, &registration).await?, Change::Recreated)
				},
			},
			None => (self.create(ctx, resource, &registration).await?, Change::Created),
		};
		let previous = secret
			.as_ref()
			.filter(|secret| {
				self.secret_value(secret, strategy::CLIENT_ID).as_deref() == Some(client_id.as_str())
			})
			.and_then(|secret| self.secret_jwk(secret));
		let reusable = previous.clone().filter(|jwk| {
			change == Change::Unchanged
				&& jwk.is_private()
				&& resource.status.key_ids.contains(&jwk.kid)
		});
		let (jwk, key_ids, change) = match reusable {
			Some(jwk) => (jwk, resource.status.key_ids.clone(), change),
			None => {
				let jwk = self.mint(ctx).await?;
				let jwks = ClientJwks::rotation(&jwk, previous.as_ref());

				ctx.run(self.provider.register_keys(&client_id, &jwks)).await?;
				metrics::record_provider_mutation(self.strategy.kind(), "register_keys");
				metrics::record_rotated_credentials(self.strategy.kind());

				let change = if change == Change::Unchanged { Change::Rotated } else { change };

				(jwk, jwks.key_ids(), change)
			},
		};
		let data =
			self.strategy.secret_data(resource, &client_id, &jwk, &self.metadata, &registration)?;

		ctx.run(self.secrets.put(resource, data)).await?;

		let mut status = resource.status.clone();

		status.state = SyncState::Registered;
		status.client_id = Some(client_id.clone());
		status.applied_hash = Some(fingerprint);
		status.synchronized_at = Some(Utc::now());
		status.key_ids = key_ids;
		status.error_kind = None;
		status.consecutive_failures = 0;
		status.observed_generation = resource.generation;
		status.set_condition(
			ConditionType::Ready,
			true,
			"Synchronized",
			format!("Client {client_id} is in sync."),
		);

		if scopes.has_invalid() {
			status.set_condition(
				ConditionType::ScopesDenied,
				true,
				"ScopesDenied",
				format!("Access not approved for: {}.", scopes.invalid.join(", ")),
			);
		} else {
			status.remove_condition(ConditionType::ScopesDenied);
		}

		status.granted_scopes = scopes.valid;
		status.denied_scopes = scopes.invalid;

		self.write_status(ctx, resource, status).await?;

		let event = match change {
			Change::Created => Event::normal("Created", format!("Registered client {client_id}.")),
			Change::Updated => Event::normal("Updated", format!("Updated client {client_id}.")),
			Change::Recreated =>
				Event::warning("Recreated", format!("Client vanished; registered {client_id}.")),
			Change::Rotated =>
				Event::normal("Rotated", format!("Issued new credentials for {client_id}.")),
			_ => Event::normal("Synchronized", format!("Client {client_id} is in sync.")),
		};

		self.publish(ctx, resource, event).await;

		Ok(change)
	}

	async fn deregister(
		&self,
		ctx: &ReconcileContext,
		resource: &mut ClientResource,
	) -> Result<Change> {
		let secret = ctx.run(self.secrets.get(resource)).await?;
		let client_id = resource.status.client_id.clone().or_else(|| {
			secret.as_ref().and_then(|secret| self.secret_value(secret, strategy::CLIENT_ID))
		});

		if resource.status.state != SyncState::Deleting {
			let mut status = resource.status.clone();

			status.state = SyncState::Deleting;

			self.write_status(ctx, resource, status).await?;
		}

		let change = match &client_id {
			Some(client_id) => match ctx.run(self.provider.delete(client_id)).await? {
				DeleteOutcome::Deleted => {
					metrics::record_provider_mutation(self.strategy.kind(), "delete");

					Change::Deleted
				},
				DeleteOutcome::NotFound => Change::Absent,
			},
			None => Change::Absent,
		};

		ctx.run(self.secrets.delete(resource)).await?;

		let mut status = ObservedStatus {
			state: SyncState::Deregistered,
			observed_generation: resource.generation,
			conditions: resource.status.conditions.clone(),
			..Default::default()
		};

		status.remove_condition(ConditionType::ScopesDenied);
		status.set_condition(
			ConditionType::Ready,
			false,
			"Deregistered",
			"Registration and credentials removed.",
		);

		self.write_status(ctx, resource, status).await?;

		let message = match &client_id {
			Some(client_id) => format!("Deregistered client {client_id}."),
			None => "No registration to remove.".to_owned(),
		};

		self.publish(ctx, resource, Event::normal("Deleted", message)).await;

		ctx.run(self.store.finalize(self.strategy.kind(), &resource.key)).await?;

		Ok(change)
	}

	async fn fail(&self, ctx: &ReconcileContext, resource: &mut ClientResource, err: Error) -> Outcome {
		let kind = self.strategy.kind();
		let error_kind = err.kind();
		let failures = resource.status.consecutive_failures.saturating_add(1);
		let outcome = self.outcome_for(&err, failures);

		tracing::warn!(
			error = %err,
			%error_kind,
			failures,
			backoff = ?outcome.backoff(),
			"reconciliation failed"
		);
		metrics::record_reconcile_error(kind, error_kind);

		// The next immediate attempt re-reads the resource and writes status itself.
		if error_kind == ErrorKind::StatusWriteConflict {
			return outcome;
		}

		let grace;
		let ctx = if ctx.is_interrupted() {
			grace = ReconcileContext::detached(FAILURE_WRITE_GRACE);

			&grace
		} else {
			ctx
		};
		let mut status = resource.status.clone();

		status.state = SyncState::Degraded;
		status.error_kind = Some(error_kind);
		status.consecutive_failures = failures;
		status.observed_generation = resource.generation;
		status.set_condition(ConditionType::Ready, false, error_kind.as_str(), err.to_string());

		if let Err(write_err) = self.write_status(ctx, resource, status).await {
			tracing::warn!(error = %write_err, "failed to record failure in status");
		}

		self.publish(ctx, resource, Event::warning("Failed", err.to_string())).await;

		outcome
	}

	fn outcome_for(&self, err: &Error, failures: u32) -> Outcome {
		let kind = err.kind();

		if kind.is_retryable() {
			Outcome::Retry { kind, backoff: self.backoff.hint(kind, failures, err.retry_after()) }
		} else {
			Outcome::Terminal { kind, message: err.to_string() }
		}
	}

	async fn create(
		&self,
		ctx: &ReconcileContext,
		resource: &mut ClientResource,
		registration: &ClientRegistration,
	) -> Result<String> {
		let created = ctx.run(self.provider.create(registration)).await?;

		metrics::record_provider_mutation(self.strategy.kind(), "create");

		// Persist the id before anything else can fail so a retry updates instead of duplicating.
		let mut status = resource.status.clone();

		status.state = SyncState::Registering;
		status.client_id = Some(created.client_id.clone());
		status.key_ids.clear();
		status.observed_generation = resource.generation;

		self.write_status(ctx, resource, status).await?;

		Ok(created.client_id)
	}

	async fn filter_scopes(
		&self,
		ctx: &ReconcileContext,
		resource: &ClientResource,
	) -> Result<FilteredScopes> {
		let consumed = self.strategy.consumed_scopes(resource);

		if consumed.is_empty() {
			return Ok(FilteredScopes::default());
		}

		let accessible = ctx.run(self.provider.accessible_scopes()).await?;
		let filtered = scope::filter_scopes(consumed, &accessible);

		if filtered.has_invalid() && filtered.invalid != resource.status.denied_scopes {
			tracing::warn!(denied = ?filtered.invalid, "consumed scopes without approved access");

			self.publish(
				ctx,
				resource,
				Event::warning(
					"ScopesDenied",
					format!("Access not approved for: {}.", filtered.invalid.join(", ")),
				),
			)
			.await;
		}

		Ok(filtered)
	}

	async fn mint(&self, ctx: &ReconcileContext) -> Result<ClientJwk> {
		mint_key(ctx, self.minter.clone()).await
	}

	/// Denied scopes are due for another access check once the last synchronization is older
	/// than the recheck interval.
	fn scope_recheck_due(&self, status: &ObservedStatus) -> bool {
		if status.denied_scopes.is_empty() {
			return false;
		}

		status.synchronized_at.is_none_or(|at| {
			Utc::now()
				.signed_duration_since(at)
				.to_std()
				.is_ok_and(|elapsed| elapsed >= self.scope_recheck_interval)
		})
	}

	/// Applied fingerprint matches, the last attempt succeeded and the secret agrees with status.
	fn is_converged(
		&self,
		resource: &ClientResource,
		fingerprint: &str,
		secret: Option<&Secret>,
	) -> bool {
		let status = &resource.status;

		if !status.is_ready()
			|| status.applied_hash.as_deref() != Some(fingerprint)
			|| self.scope_recheck_due(status)
		{
			return false;
		}

		let Some(secret) = secret else {
			return false;
		};
		let Some(client_id) = &status.client_id else {
			return false;
		};

		self.secret_value(secret, strategy::CLIENT_ID).as_ref() == Some(client_id)
			&& self
				.secret_jwk(secret)
				.is_some_and(|jwk| jwk.is_private() && status.key_ids.contains(&jwk.kid))
	}

	fn secret_value(&self, secret: &Secret, suffix: &str) -> Option<String> {
		secret.data.get(&strategy::secret_key(self.strategy.secret_prefix(), suffix)).cloned()
	}

	fn secret_jwk(&self, secret: &Secret) -> Option<ClientJwk> {
		let raw = self.secret_value(secret, strategy::CLIENT_JWK)?;

		match serde_json::from_str(&raw) {
			Ok(jwk) => Some(jwk),
			Err(err) => {
				tracing::warn!(error = %err, "credential secret holds an unreadable key");

				None
			},
		}
	}

	/// Write `status` with optimistic concurrency, re-reading the version on conflict while the
	/// spec generation is unchanged.
	async fn write_status(
		&self,
		ctx: &ReconcileContext,
		resource: &mut ClientResource,
		status: ObservedStatus,
	) -> Result<()> {
		let kind = self.strategy.kind();
		let mut attempt = 1;

		loop {
			let written = ctx
				.run(self.store.update_status(kind, &resource.key, resource.resource_version, &status))
				.await;

			match written {
				Ok(version) => {
					resource.resource_version = version;
					resource.status = status;

					return Ok(());
				},
				Err(err @ Error::StatusWriteConflict { .. }) => {
					if attempt >= self.status_write_attempts {
						return Err(err);
					}

					let Some(fresh) = ctx.run(self.store.get(kind, &resource.key)).await? else {
						return Err(err);
					};

					if fresh.uid != resource.uid || fresh.generation != resource.generation {
						tracing::debug!(
							generation = fresh.generation,
							"spec changed during reconciliation; abandoning status write"
						);

						return Err(err);
					}

					tracing::debug!(attempt, "status write conflicted; retrying");

					resource.resource_version = fresh.resource_version;
					resource.deletion_requested = fresh.deletion_requested;
					attempt += 1;
				},
				Err(err) => return Err(err),
			}
		}
	}

	async fn publish(&self, ctx: &ReconcileContext, resource: &ClientResource, event: Event) {
		let reason = event.reason.clone();

		if let Err(err) =
			ctx.run(self.store.record_event(self.strategy.kind(), &resource.key, event)).await
		{
			tracing::warn!(error = %err, %reason, "failed to publish event");
		}
	}
}

/// Generate a client key on the blocking pool.
///
/// Generation cannot be aborted once started, so abandoned invocations never start one; a
/// generation already running when the invocation is abandoned finishes on the pool.
async fn mint_key(ctx: &ReconcileContext, minter: Arc<dyn KeyMinter>) -> Result<ClientJwk> {
	if ctx.is_interrupted() {
		return Err(if ctx.cancellation().is_cancelled() {
			Error::Cancelled
		} else {
			Error::DeadlineExceeded
		});
	}

	let task = tokio::task::spawn_blocking(move || minter.mint());

	ctx.run(async move {
		match task.await {
			Ok(minted) => minted,
			Err(err) => Err(Error::KeyMaterial(err.to_string())),
		}
	})
	.await
}
