mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	CollectionConfig, Config, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Retry, Search,
	Service, Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collections.is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collections must be non-empty.".to_string(),
		});
	}

	let mut names = HashSet::new();

	for collection in &cfg.storage.qdrant.collections {
		if collection.name.trim().is_empty() {
			return Err(Error::Validation {
				message: "storage.qdrant.collections.name must be non-empty.".to_string(),
			});
		}
		if !names.insert(collection.name.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"storage.qdrant.collections contains duplicate name {:?}.",
					collection.name
				),
			});
		}
		if !collection.weight.is_finite() {
			return Err(Error::Validation {
				message: "storage.qdrant.collections.weight must be a finite number.".to_string(),
			});
		}
		if !(collection.weight > 0.0 && collection.weight <= 1.0) {
			return Err(Error::Validation {
				message: "storage.qdrant.collections.weight must be greater than zero and 1.0 or less."
					.to_string(),
			});
		}
	}

	if !names.contains(cfg.storage.qdrant.default_collection.as_str()) {
		return Err(Error::Validation {
			message: "storage.qdrant.default_collection must name a configured collection."
				.to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.retry.max_attempts must be greater than zero."
				.to_string(),
		});
	}
	if cfg.search.max_embed_chars == 0 {
		return Err(Error::Validation {
			message: "search.max_embed_chars must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for collection in &mut cfg.storage.qdrant.collections {
		if collection.vector_name.as_deref().map(|name| name.trim().is_empty()).unwrap_or(false) {
			collection.vector_name = None;
		}
	}
}
