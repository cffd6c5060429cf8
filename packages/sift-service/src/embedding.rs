use std::{sync::atomic::Ordering, time::Duration};

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{Error, Result, SiftService, cache};

/// Collapses whitespace and caps the text fed to the embedding
/// provider. Oversized queries are truncated with a visible marker
/// rather than rejected.
pub fn prepare_embed_text(text: &str, max_chars: usize) -> String {
	let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

	if collapsed.chars().count() <= max_chars {
		return collapsed;
	}

	let mut capped: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();

	capped.push('…');

	capped
}

fn validate_vector(vector: &[f32], expected_dim: u32) -> Result<()> {
	if vector.is_empty() {
		return Err(Error::EmbeddingUnavailable {
			message: "Provider returned an empty vector.".to_string(),
		});
	}
	if vector.len() != expected_dim as usize {
		return Err(Error::EmbeddingUnavailable {
			message: format!(
				"Provider returned a {}-dimensional vector; expected {expected_dim}.",
				vector.len()
			),
		});
	}
	if vector.iter().any(|value| !value.is_finite()) {
		return Err(Error::EmbeddingUnavailable {
			message: "Provider returned a non-finite vector component.".to_string(),
		});
	}
	if vector.iter().all(|value| *value == 0.) {
		return Err(Error::EmbeddingUnavailable {
			message: "Provider returned an all-zero vector.".to_string(),
		});
	}

	Ok(())
}

impl SiftService {
	/// Embeds a query, reusing a cached vector when one exists.
	/// Rate-limit and timeout failures are retried with backoff;
	/// provider API errors abort immediately.
	pub async fn embed_query(&self, text: &str, now: OffsetDateTime) -> Result<Vec<f32>> {
		let provider_cfg = &self.cfg.providers.embedding;
		let prepared = prepare_embed_text(text, self.cfg.search.max_embed_chars);
		let key = cache::embedding_key(&provider_cfg.model, &prepared);

		if let Some(cached) = self.cache.get::<Vec<f32>>(&key, now).await
			&& validate_vector(&cached, provider_cfg.dimensions).is_ok()
		{
			debug!("Reusing cached query embedding.");

			return Ok(cached);
		}

		let texts = [prepared];
		let retry = &provider_cfg.retry;
		let mut last_message = String::new();

		for attempt in 1..=retry.max_attempts {
			match self.providers.embedding.embed(provider_cfg, &texts).await {
				Ok(mut vectors) => {
					let Some(vector) = (!vectors.is_empty()).then(|| vectors.swap_remove(0))
					else {
						return Err(Error::EmbeddingUnavailable {
							message: "Provider returned no vectors.".to_string(),
						});
					};

					validate_vector(&vector, provider_cfg.dimensions)?;

					self.counters.embeddings_generated.fetch_add(1, Ordering::Relaxed);
					self.cache.set(&key, &vector, now, cache::EMBEDDING_TTL_SECS).await;

					return Ok(vector);
				},
				Err(err) if err.is_rate_limited() && attempt < retry.max_attempts => {
					warn!(attempt, "Embedding provider rate limited; backing off.");
					tokio::time::sleep(Duration::from_millis(retry.rate_limit_backoff_ms)).await;

					last_message = err.to_string();
				},
				Err(err) if err.is_timeout() && attempt < retry.max_attempts => {
					let backoff = retry.timeout_backoff_base_ms * 2u64.pow(attempt - 1);

					warn!(attempt, backoff_ms = backoff, "Embedding request timed out; retrying.");
					tokio::time::sleep(Duration::from_millis(backoff)).await;

					last_message = err.to_string();
				},
				Err(err) if err.is_rate_limited() || err.is_timeout() => {
					last_message = err.to_string();

					break;
				},
				Err(err) => {
					self.counters.embedding_failures.fetch_add(1, Ordering::Relaxed);

					return Err(Error::Provider { message: err.to_string() });
				},
			}
		}

		self.counters.embedding_failures.fetch_add(1, Ordering::Relaxed);

		Err(Error::EmbeddingUnavailable {
			message: format!(
				"Gave up after {} attempts; last error: {last_message}",
				retry.max_attempts
			),
		})
	}
}
