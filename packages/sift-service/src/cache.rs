use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

use sift_storage::cache::CacheStore;

pub const EMBEDDING_TTL_SECS: i64 = 3_600;
pub const PROCESSED_QUERY_TTL_SECS: i64 = 3_600;
pub const VECTOR_RESULTS_TTL_SECS: i64 = 600;
pub const METADATA_TTL_SECS: i64 = 1_800;
pub const RECENT_SEARCH_TTL_SECS: i64 = 300;
pub const PERF_TTL_SECS: i64 = 86_400;

const KEY_HASH_LEN: usize = 16;

pub fn hash_key_part(payload: &Value) -> String {
	let raw = serde_json::to_vec(payload).unwrap_or_default();
	let hex = blake3::hash(&raw).to_hex().to_string();

	hex[..KEY_HASH_LEN.min(hex.len())].to_string()
}

pub fn embedding_key(model: &str, text: &str) -> String {
	let hash = hash_key_part(&serde_json::json!({ "model": model, "text": text }));

	format!("search:embedding:{hash}")
}

pub fn processed_query_key(text: &str, filters_fingerprint: &Value) -> String {
	let hash = hash_key_part(&serde_json::json!({ "text": text, "filters": filters_fingerprint }));

	format!("search:processed_query:{hash}")
}

pub fn vector_results_key(collection: &str, fingerprint: &Value) -> String {
	let hash = hash_key_part(fingerprint);

	format!("search:results:{collection}:{hash}")
}

pub fn metadata_key(document_id: &str) -> String {
	format!("search:metadata:{document_id}")
}

pub fn recent_search_key(user_id: &str) -> String {
	format!("search:recent:{user_id}")
}

pub fn perf_key(bucket: &str) -> String {
	format!("search:perf:{bucket}")
}

/// Read-through cache over `cache_entries`. Every failure is swallowed
/// and logged; a broken cache degrades to a slower search, never a
/// failed one.
pub struct CacheFacade {
	store: CacheStore,
	enabled: bool,
	hits: AtomicU64,
	misses: AtomicU64,
	errors: AtomicU64,
}
impl CacheFacade {
	pub fn new(store: CacheStore, enabled: bool) -> Self {
		Self {
			store,
			enabled,
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			errors: AtomicU64::new(0),
		}
	}

	pub fn enabled(&self) -> bool {
		self.enabled
	}

	pub async fn get<T>(&self, key: &str, now: OffsetDateTime) -> Option<T>
	where
		T: DeserializeOwned,
	{
		if !self.enabled {
			return None;
		}

		match self.store.get(key, now).await {
			Ok(Some(value)) => match serde_json::from_value(value) {
				Ok(decoded) => {
					self.hits.fetch_add(1, Ordering::Relaxed);

					Some(decoded)
				},
				Err(err) => {
					self.errors.fetch_add(1, Ordering::Relaxed);

					warn!(key, "Cached payload failed to decode: {err}.");

					None
				},
			},
			Ok(None) => {
				self.misses.fetch_add(1, Ordering::Relaxed);

				None
			},
			Err(err) => {
				self.errors.fetch_add(1, Ordering::Relaxed);

				warn!(key, "Cache read failed: {err}.");

				None
			},
		}
	}

	pub async fn set<T>(&self, key: &str, value: &T, now: OffsetDateTime, ttl_secs: i64)
	where
		T: Serialize,
	{
		if !self.enabled {
			return;
		}

		let payload = match serde_json::to_value(value) {
			Ok(payload) => payload,
			Err(err) => {
				self.errors.fetch_add(1, Ordering::Relaxed);

				warn!(key, "Failed to encode cache payload: {err}.");

				return;
			},
		};

		if let Err(err) = self.store.set(key, &payload, now, ttl_secs).await {
			self.errors.fetch_add(1, Ordering::Relaxed);

			warn!(key, "Cache write failed: {err}.");
		}
	}

	pub async fn delete(&self, key: &str) -> bool {
		if !self.enabled {
			return false;
		}

		match self.store.delete(key).await {
			Ok(deleted) => deleted,
			Err(err) => {
				self.errors.fetch_add(1, Ordering::Relaxed);

				warn!(key, "Cache delete failed: {err}.");

				false
			},
		}
	}

	/// Hit rate over reads that reached the store, in percent.
	pub fn hit_rate(&self) -> f64 {
		let hits = self.hits.load(Ordering::Relaxed) as f64;
		let misses = self.misses.load(Ordering::Relaxed) as f64;
		let reads = hits + misses;

		if reads == 0. {
			return 0.;
		}

		hits / reads * 100.
	}

	pub fn counters(&self) -> (u64, u64, u64) {
		(
			self.hits.load(Ordering::Relaxed),
			self.misses.load(Ordering::Relaxed),
			self.errors.load(Ordering::Relaxed),
		)
	}
}
