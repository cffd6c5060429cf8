use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default = "default_bind_localhost_only")]
	pub bind_localhost_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub default_collection: String,
	pub collections: Vec<CollectionConfig>,
}

/// One searchable Qdrant collection. Collections are listed in priority
/// order; that order decides which copy of a duplicated document wins
/// during merge.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
	pub name: String,
	pub weight: f32,
	/// Named vector slot for collections that store multiple vectors per
	/// point. Absent for single unnamed-vector collections.
	pub vector_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub retry: Retry,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub rate_limit_backoff_ms: u64,
	pub timeout_backoff_base_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, rate_limit_backoff_ms: 5_000, timeout_backoff_base_ms: 1_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub cache_enabled: bool,
	pub max_embed_chars: usize,
}
impl Default for Search {
	fn default() -> Self {
		Self { cache_enabled: true, max_embed_chars: 8_000 }
	}
}

fn default_bind_localhost_only() -> bool {
	true
}
