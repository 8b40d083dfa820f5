//! Query/mutation cache policy layer.
//!
//! [`QueryCache`] keeps JSON snapshots keyed by [`QueryKey`] and applies the user-facing policy on
//! top of the client: freshness windows, per-key single-flight fetches, the query and mutation
//! retry rules, refetch triggers, and a broadcast for every entry that lands in the error state.
//!
//! Fetchers are plain async closures, usually wrapping an [`ApiClient`](crate::client::ApiClient)
//! call, so the cache has no dependency on a particular transport.

// crates.io
use futures_util::future;
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	error,
	events::{ClientEvent, EventBus},
	obs::Stage,
	retry::{self, MutationRetryPolicy, QueryRetryPolicy},
};

/// Ordered key identifying a cached query (e.g. `["surveys", "42"]`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);
impl QueryKey {
	/// Builds a key from its segments.
	pub fn new<S>(segments: impl IntoIterator<Item = S>) -> Self
	where
		S: Into<String>,
	{
		Self(segments.into_iter().map(Into::into).collect())
	}

	/// Key segments in order.
	pub fn segments(&self) -> &[String] {
		&self.0
	}

	/// Returns `true` when `prefix` matches the leading segments of this key.
	pub fn starts_with(&self, prefix: &QueryKey) -> bool {
		self.0.starts_with(&prefix.0)
	}

	/// Returns a new key with `segment` appended.
	pub fn child(&self, segment: impl Into<String>) -> Self {
		let mut segments = self.0.clone();

		segments.push(segment.into());

		Self(segments)
	}
}
impl From<&str> for QueryKey {
	fn from(segment: &str) -> Self {
		Self(vec![segment.to_owned()])
	}
}
impl From<String> for QueryKey {
	fn from(segment: String) -> Self {
		Self(vec![segment])
	}
}
impl<const N: usize> From<[&str; N]> for QueryKey {
	fn from(segments: [&str; N]) -> Self {
		Self::new(segments)
	}
}
impl Display for QueryKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0.join("/"))
	}
}

/// How a refetch trigger treats an existing entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefetchMode {
	/// Never refetch on this trigger.
	Never,
	/// Refetch only when the entry is stale or missing.
	IfStale,
	/// Refetch even when the entry is fresh.
	Always,
}

/// External events that may warrant a refetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefetchTrigger {
	/// A consumer started observing the query.
	Mount,
	/// The application regained focus.
	WindowFocus,
	/// Network connectivity was restored.
	Reconnect,
}

/// Freshness, eviction, refetch, and retry defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
	/// Age below which data is served without refetching.
	pub stale_time: Duration,
	/// Inactivity after which an entry is evicted. Idle entries are swept whenever the cache is
	/// read or written, and on demand by [`QueryCache::collect_garbage`].
	pub gc_time: Duration,
	/// Behavior when a consumer mounts.
	pub refetch_on_mount: RefetchMode,
	/// Behavior when the window regains focus.
	pub refetch_on_window_focus: RefetchMode,
	/// Behavior when connectivity returns.
	pub refetch_on_reconnect: RefetchMode,
	/// Retry rule for query fetchers.
	pub query_retry: QueryRetryPolicy,
	/// Retry rule for mutations.
	pub mutation_retry: MutationRetryPolicy,
}
impl CacheConfig {
	/// Returns the refetch mode configured for `trigger`.
	pub fn refetch_mode(&self, trigger: RefetchTrigger) -> RefetchMode {
		match trigger {
			RefetchTrigger::Mount => self.refetch_on_mount,
			RefetchTrigger::WindowFocus => self.refetch_on_window_focus,
			RefetchTrigger::Reconnect => self.refetch_on_reconnect,
		}
	}
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			stale_time: Duration::from_secs(5 * 60),
			gc_time: Duration::from_secs(10 * 60),
			refetch_on_mount: RefetchMode::IfStale,
			refetch_on_window_focus: RefetchMode::Never,
			refetch_on_reconnect: RefetchMode::Always,
			query_retry: QueryRetryPolicy::default(),
			mutation_retry: MutationRetryPolicy::default(),
		}
	}
}

/// Entry counts by state. An entry can be counted in more than one bucket (e.g. stale and
/// loading while a background refetch runs).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
	/// All entries.
	pub total: usize,
	/// Entries holding data younger than the stale time.
	pub fresh: usize,
	/// Entries holding data that is old or invalidated.
	pub stale: usize,
	/// Entries with a fetch in flight.
	pub loading: usize,
	/// Entries whose last fetch failed.
	pub errored: usize,
}

/// Outcome of [`QueryCache::prefetch_queries`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrefetchReport {
	/// Keys that were fetched (or already fresh).
	pub succeeded: Vec<QueryKey>,
	/// Keys whose fetch failed, with the final error.
	pub failed: Vec<(QueryKey, ApiError)>,
}
impl PrefetchReport {
	/// Returns `true` when every prefetch succeeded.
	pub fn is_complete(&self) -> bool {
		self.failed.is_empty()
	}
}

#[derive(Debug)]
struct CacheEntry {
	data: Option<Value>,
	error: Option<ApiError>,
	updated_at: Option<Instant>,
	invalidated: bool,
	last_access: Instant,
	// Bumped after every settled fetch so single-flight waiters can adopt its result.
	generation: u64,
	// Bumped by every reset; a fetch started under an older epoch must not write back.
	epoch: u64,
	// Bumped by every invalidation so a fetch in flight does not clear a newer one.
	invalidations: u64,
	guard: Arc<AsyncMutex<()>>,
}
impl CacheEntry {
	fn new(now: Instant) -> Self {
		Self {
			data: None,
			error: None,
			updated_at: None,
			invalidated: false,
			last_access: now,
			generation: 0,
			epoch: 0,
			invalidations: 0,
			guard: Default::default(),
		}
	}

	fn fresh_data(&self, now: Instant, stale_time: Duration) -> Option<&Value> {
		let updated_at = self.updated_at?;

		if self.invalidated || now.saturating_duration_since(updated_at) >= stale_time {
			return None;
		}

		self.data.as_ref()
	}

	fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
		self.fresh_data(now, stale_time).is_some()
	}

	fn is_loading(&self) -> bool {
		self.guard.try_lock().is_none()
	}

	fn is_idle(&self, now: Instant, gc_time: Duration) -> bool {
		!self.is_loading() && now.saturating_duration_since(self.last_access) >= gc_time
	}

	fn stamp(&self) -> FetchStamp {
		FetchStamp { epoch: self.epoch, invalidations: self.invalidations }
	}

	fn invalidate(&mut self) {
		self.invalidated = true;
		self.invalidations += 1;
	}

	fn reset(&mut self) {
		self.data = None;
		self.error = None;
		self.updated_at = None;
		self.invalidated = false;
		self.epoch += 1;
	}

	fn settle(&mut self, outcome: &Result<Value, ApiError>, now: Instant) {
		match outcome {
			Ok(value) => {
				self.data = Some(value.clone());
				self.error = None;
				self.updated_at = Some(now);
				self.invalidated = false;
			},
			Err(err) => self.error = Some(err.clone()),
		}

		self.last_access = now;
		self.generation += 1;
	}
}

// Entry state observed when a fetch took the single-flight guard.
#[derive(Clone, Copy, Debug)]
struct FetchStamp {
	epoch: u64,
	invalidations: u64,
}

enum Claim {
	// Another fetch settled while this caller waited.
	Adopt(Result<Value, ApiError>),
	// The entry was removed or replaced while this caller waited.
	Retake,
	Fetch(FetchStamp),
}

/// Query/mutation cache with freshness, single-flight, and retry policy applied.
#[derive(Debug)]
pub struct QueryCache {
	config: CacheConfig,
	events: EventBus,
	entries: Mutex<HashMap<QueryKey, CacheEntry>>,
}
impl QueryCache {
	/// Creates an empty cache publishing failures to `events`.
	pub fn new(config: CacheConfig, events: EventBus) -> Self {
		Self { config, events, entries: Default::default() }
	}

	/// Active configuration.
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Returns cached data for `key`, fetching it when missing or stale.
	///
	/// Concurrent calls for the same key share one fetch: later callers wait for the in-flight
	/// fetch and adopt its outcome. Failures are retried per [`CacheConfig::query_retry`]; a
	/// final failure records the error on the entry and publishes [`ClientEvent::QueryError`].
	pub async fn fetch_query<R, F, Fut>(
		&self,
		key: impl Into<QueryKey>,
		mut fetcher: F,
	) -> Result<R, ApiError>
	where
		R: Serialize + DeserializeOwned,
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<R, ApiError>>,
	{
		let key = key.into();
		let value = self
			.fetch_value(&key, || {
				let pending = fetcher();

				async move { pending.await.and_then(|data| error::encode_json(&data)) }
			})
			.await?;

		decode(value)
	}

	/// Warms the cache for `key`. Fresh entries are left untouched.
	pub async fn prefetch_query<R, F, Fut>(
		&self,
		key: impl Into<QueryKey>,
		fetcher: F,
	) -> Result<(), ApiError>
	where
		R: Serialize + DeserializeOwned,
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<R, ApiError>>,
	{
		self.fetch_query::<R, _, _>(key, fetcher).await.map(|_| ())
	}

	/// Prefetches every query concurrently. One failure never cancels its siblings.
	pub async fn prefetch_queries<R, F, Fut>(
		&self,
		queries: impl IntoIterator<Item = (QueryKey, F)>,
	) -> PrefetchReport
	where
		R: Serialize + DeserializeOwned,
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<R, ApiError>>,
	{
		let runs = queries.into_iter().map(|(key, fetcher)| async move {
			let outcome = self.prefetch_query::<R, _, _>(key.clone(), fetcher).await;

			(key, outcome)
		});
		let mut report = PrefetchReport::default();

		for (key, outcome) in future::join_all(runs).await {
			match outcome {
				Ok(()) => report.succeeded.push(key),
				Err(err) => report.failed.push((key, err)),
			}
		}

		report
	}

	/// Runs a mutation under [`CacheConfig::mutation_retry`].
	///
	/// A final failure publishes [`ClientEvent::MutationError`] before being returned.
	pub async fn mutate<R, F, Fut>(&self, mutation: F) -> Result<R, ApiError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<R, ApiError>>,
	{
		let outcome =
			retry::run_with_retry(&self.config.mutation_retry, Stage::Mutation, mutation).await;

		if let Err(err) = &outcome {
			self.events.publish(ClientEvent::MutationError { error: err.clone() });
		}

		outcome
	}

	/// Returns the cached data for `key`, if any.
	pub fn get_query_data<R>(&self, key: &QueryKey) -> Result<Option<R>, ApiError>
	where
		R: DeserializeOwned,
	{
		let value = {
			let now = Instant::now();
			let mut entries = self.entries.lock();

			evict_idle(&mut entries, now, self.config.gc_time);

			let Some(entry) = entries.get_mut(key) else {
				return Ok(None);
			};

			entry.last_access = now;
			entry.data.clone()
		};

		value.map(decode).transpose()
	}

	/// Stores `data` for `key` as freshly fetched.
	pub fn set_query_data<R>(&self, key: impl Into<QueryKey>, data: &R) -> Result<(), ApiError>
	where
		R: ?Sized + Serialize,
	{
		let value = error::encode_json(data)?;
		let now = Instant::now();
		let mut entries = self.entries.lock();

		evict_idle(&mut entries, now, self.config.gc_time);
		entries.entry(key.into()).or_insert_with(|| CacheEntry::new(now)).settle(&Ok(value), now);

		Ok(())
	}

	/// Marks matching entries stale so the next fetch refetches. `None` matches every entry.
	///
	/// Returns the number of entries affected.
	pub fn invalidate_queries(&self, prefix: Option<&QueryKey>) -> usize {
		self.for_each_matching(prefix, CacheEntry::invalidate)
	}

	/// Returns matching entries to their initial, data-less state. `None` matches every entry.
	pub fn reset_queries(&self, prefix: Option<&QueryKey>) -> usize {
		self.for_each_matching(prefix, CacheEntry::reset)
	}

	/// Removes matching entries. `None` matches every entry.
	pub fn remove_queries(&self, prefix: Option<&QueryKey>) -> usize {
		let mut entries = self.entries.lock();
		let before = entries.len();

		entries.retain(|key, _| !matches(key, prefix));

		before - entries.len()
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Counts entries by state.
	pub fn stats(&self) -> CacheStats {
		let now = Instant::now();
		let mut entries = self.entries.lock();

		evict_idle(&mut entries, now, self.config.gc_time);

		let mut stats = CacheStats { total: entries.len(), ..Default::default() };

		for entry in entries.values() {
			if entry.is_fresh(now, self.config.stale_time) {
				stats.fresh += 1;
			} else if entry.data.is_some() {
				stats.stale += 1;
			}
			if entry.is_loading() {
				stats.loading += 1;
			}
			if entry.error.is_some() {
				stats.errored += 1;
			}
		}

		stats
	}

	/// Decides whether `trigger` should refetch `key` under the configured refetch modes.
	pub fn should_refetch(&self, key: &QueryKey, trigger: RefetchTrigger) -> bool {
		match self.config.refetch_mode(trigger) {
			RefetchMode::Never => false,
			RefetchMode::Always => true,
			RefetchMode::IfStale => !self
				.entries
				.lock()
				.get(key)
				.is_some_and(|entry| entry.is_fresh(Instant::now(), self.config.stale_time)),
		}
	}

	/// Evicts entries idle for at least [`CacheConfig::gc_time`]. Entries with a fetch in flight
	/// are kept. Returns the number of evicted entries.
	pub fn collect_garbage(&self) -> usize {
		evict_idle(&mut self.entries.lock(), Instant::now(), self.config.gc_time)
	}

	async fn fetch_value<F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<Value, ApiError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<Value, ApiError>>,
	{
		loop {
			let (guard, seen_generation) = {
				let now = Instant::now();
				let mut entries = self.entries.lock();

				evict_idle(&mut entries, now, self.config.gc_time);

				let entry = entries.entry(key.clone()).or_insert_with(|| CacheEntry::new(now));

				entry.last_access = now;

				if let Some(data) = entry.fresh_data(now, self.config.stale_time) {
					return Ok(data.clone());
				}

				(entry.guard.clone(), entry.generation)
			};
			let _singleflight = guard.lock().await;
			let stamp = match self.claim(key, &guard, seen_generation) {
				Claim::Adopt(outcome) => return outcome,
				Claim::Retake => continue,
				Claim::Fetch(stamp) => stamp,
			};
			let outcome =
				retry::run_with_retry(&self.config.query_retry, Stage::Query, fetcher).await;

			self.settle(key, &guard, stamp, &outcome);

			if let Err(err) = &outcome {
				self.events
					.publish(ClientEvent::QueryError { key: key.clone(), error: err.clone() });
			}

			return outcome;
		}
	}

	// Decides what a caller holding `guard` does once it owns the single-flight slot.
	fn claim(&self, key: &QueryKey, guard: &Arc<AsyncMutex<()>>, seen_generation: u64) -> Claim {
		let entries = self.entries.lock();
		let Some(entry) = entries.get(key).filter(|entry| Arc::ptr_eq(&entry.guard, guard)) else {
			return Claim::Retake;
		};

		if entry.generation == seen_generation {
			return Claim::Fetch(entry.stamp());
		}

		match (&entry.error, &entry.data) {
			(Some(err), _) => Claim::Adopt(Err(err.clone())),
			(None, Some(data)) => Claim::Adopt(Ok(data.clone())),
			(None, None) => Claim::Fetch(entry.stamp()),
		}
	}

	// Writes a fetch outcome back unless the entry was removed, replaced, or reset meanwhile.
	fn settle(
		&self,
		key: &QueryKey,
		guard: &Arc<AsyncMutex<()>>,
		stamp: FetchStamp,
		outcome: &Result<Value, ApiError>,
	) {
		let mut entries = self.entries.lock();
		let Some(entry) = entries.get_mut(key) else {
			return;
		};

		if !Arc::ptr_eq(&entry.guard, guard) || entry.epoch != stamp.epoch {
			return;
		}

		entry.settle(outcome, Instant::now());

		if entry.invalidations != stamp.invalidations {
			entry.invalidated = true;
		}
	}

	fn for_each_matching(
		&self,
		prefix: Option<&QueryKey>,
		mut apply: impl FnMut(&mut CacheEntry),
	) -> usize {
		let mut entries = self.entries.lock();
		let mut affected = 0;

		for (key, entry) in entries.iter_mut() {
			if matches(key, prefix) {
				apply(entry);

				affected += 1;
			}
		}

		affected
	}
}
impl Default for QueryCache {
	fn default() -> Self {
		Self::new(CacheConfig::default(), EventBus::default())
	}
}

fn evict_idle(
	entries: &mut HashMap<QueryKey, CacheEntry>,
	now: Instant,
	gc_time: Duration,
) -> usize {
	let before = entries.len();

	entries.retain(|_, entry| !entry.is_idle(now, gc_time));

	before - entries.len()
}

fn matches(key: &QueryKey, prefix: Option<&QueryKey>) -> bool {
	prefix.is_none_or(|prefix| key.starts_with(prefix))
}

fn decode<R>(value: Value) -> Result<R, ApiError>
where
	R: DeserializeOwned,
{
	serde_path_to_error::deserialize(value).map_err(|err| ApiError::decode(200, err))
}
