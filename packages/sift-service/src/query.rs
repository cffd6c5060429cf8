use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;

use crate::{SiftService, cache};
use sift_domain::{
	query,
	types::{ProcessedQuery, SearchFilters},
};

fn filters_fingerprint(filters: Option<&SearchFilters>) -> Value {
	filters.and_then(|filters| serde_json::to_value(filters).ok()).unwrap_or(Value::Null)
}

impl SiftService {
	/// Analyzes a validated query, reusing a cached analysis when the
	/// same text and explicit filters were seen recently.
	pub async fn process_query(
		&self,
		text: &str,
		explicit_filters: Option<&SearchFilters>,
		now: OffsetDateTime,
	) -> ProcessedQuery {
		let key = cache::processed_query_key(text, &filters_fingerprint(explicit_filters));

		if let Some(cached) = self.cache.get::<ProcessedQuery>(&key, now).await {
			debug!("Reusing cached query analysis.");

			return cached;
		}

		let processed = query::analyze(text, explicit_filters, now);

		self.cache.set(&key, &processed, now, cache::PROCESSED_QUERY_TTL_SECS).await;

		processed
	}
}
