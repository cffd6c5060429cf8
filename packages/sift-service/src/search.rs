use std::{collections::HashMap, sync::atomic::Ordering, time::Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{CacheAdvice, Result, SiftService, cache};
use sift_domain::{
	query,
	types::{
		ProcessedQuery, SearchLogEntry, SearchMode, SearchRequest, SearchResponse, SearchResult,
	},
};

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
	pub status: &'static str,
	pub components: HashMap<&'static str, &'static str>,
}

impl SiftService {
	/// Runs the whole search pipeline: validate, analyze, embed,
	/// retrieve, enrich, then log. Logging failures never fail the
	/// search.
	pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let now = OffsetDateTime::now_utc();
		let query_id = Uuid::new_v4();

		self.counters.searches_total.fetch_add(1, Ordering::Relaxed);

		let (hits_before, misses_before, _) = self.cache.counters();
		let outcome = self.run_pipeline(request, now).await;
		let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.;

		self.counters.record_response_time(elapsed_ms);

		let (hits_after, misses_after, _) = self.cache.counters();
		let traffic = self
			.record_cache_traffic(
				(hits_after - hits_before) as i64,
				(misses_after - misses_before) as i64,
				now,
			)
			.await;

		if let Err(err) = traffic {
			warn!("Failed to record cache traffic: {err}.");
		}

		self.snapshot_stage_timings(now).await;

		match outcome {
			Ok((results, collections_searched, processed)) => {
				let response = build_response(
					request,
					results,
					collections_searched,
					&processed,
					query_id,
					elapsed_ms as u64,
				);

				info!(
					query_id = %query_id,
					results = response.returned_count,
					elapsed_ms = response.search_time_ms,
					"Search completed."
				);
				self.record_outcome(request, &response, query_id, now).await;

				Ok(response)
			},
			Err(err) => {
				self.counters.searches_failed.fetch_add(1, Ordering::Relaxed);
				warn!(query_id = %query_id, "Search failed: {err}.");
				self.record_failure(request, query_id, elapsed_ms as i64, &err, now).await;

				Err(err)
			},
		}
	}

	async fn run_pipeline(
		&self,
		request: &SearchRequest,
		now: OffsetDateTime,
	) -> Result<(Vec<SearchResult>, Vec<String>, ProcessedQuery)> {
		query::validate_request(request)?;

		let stage = Instant::now();
		let explicit_filters = request.filters.as_ref();
		// A vector-only search with extraction disabled skips the full
		// analysis; nothing downstream would consume it.
		let processed =
			if request.search_mode == SearchMode::VectorOnly && !request.auto_extract_filters {
				query::analyze_minimal(&request.query_text, explicit_filters)
			} else {
				self.process_query(&request.query_text, explicit_filters, now).await
			};

		self.monitor.record("query_processing", stage.elapsed().as_secs_f64() * 1_000.);

		let filters = if request.auto_extract_filters {
			processed.extracted_filters.clone()
		} else {
			request.filters.clone()
		};
		let vector = if request.search_mode == SearchMode::FilterOnly {
			None
		} else {
			let stage = Instant::now();
			let embed_text = if processed.normalized_text.is_empty() {
				&request.query_text
			} else {
				&processed.normalized_text
			};
			let vector = self.embed_query(embed_text, now).await?;

			self.monitor.record("embedding", stage.elapsed().as_secs_f64() * 1_000.);

			Some(vector)
		};
		let stage = Instant::now();
		let outcome = self.retrieve(request, vector, filters.as_ref(), now).await?;

		self.monitor.record("vector_search", stage.elapsed().as_secs_f64() * 1_000.);

		if outcome.matches.is_empty() {
			return Ok((Vec::new(), outcome.collections_searched, processed));
		}

		let stage = Instant::now();
		let results = self
			.enrich(
				&outcome.matches,
				&request.query_text,
				&processed.keywords,
				request.highlight,
				now,
			)
			.await;

		self.monitor.record("enrichment", stage.elapsed().as_secs_f64() * 1_000.);

		Ok((results, outcome.collections_searched, processed))
	}

	// Best-effort hourly snapshot of per-stage timings so the numbers
	// survive a restart. A disabled or broken cache is ignored.
	async fn snapshot_stage_timings(&self, now: OffsetDateTime) {
		if !self.cache.enabled() {
			return;
		}

		let summary = self.monitor.metrics_summary();
		let hour = now.unix_timestamp() / 3_600;

		for stats in &summary.operations {
			let key = cache::perf_key(&format!("ops:{}:{hour}", stats.operation));

			self.cache.set(&key, stats, now, cache::PERF_TTL_SECS).await;
		}
	}

	async fn record_outcome(
		&self,
		request: &SearchRequest,
		response: &SearchResponse,
		query_id: Uuid,
		now: OffsetDateTime,
	) {
		let entry = SearchLogEntry {
			query_id,
			user_id: request.user_id.clone(),
			query_text: request.query_text.clone(),
			search_mode: request.search_mode,
			filters: request.filters.clone(),
			result_count: response.returned_count as i64,
			search_time_ms: response.search_time_ms as i64,
			timestamp: now,
			success: true,
			error_message: None,
		};

		if let Err(err) = self.log_search(&entry).await {
			warn!("Failed to log search: {err}.");
		}
		if let Err(err) = self.record_stats(&entry, &response.collections_searched).await {
			warn!("Failed to record search stats: {err}.");
		}
		if let Some(user_id) = &request.user_id {
			self.record_recent_search(user_id, &request.query_text, now).await;
		}
	}

	async fn record_failure(
		&self,
		request: &SearchRequest,
		query_id: Uuid,
		elapsed_ms: i64,
		err: &crate::Error,
		now: OffsetDateTime,
	) {
		let entry = SearchLogEntry {
			query_id,
			user_id: request.user_id.clone(),
			query_text: request.query_text.clone(),
			search_mode: request.search_mode,
			filters: request.filters.clone(),
			result_count: 0,
			search_time_ms: elapsed_ms,
			timestamp: now,
			success: false,
			error_message: Some(err.to_string()),
		};

		if let Err(err) = self.log_search(&entry).await {
			warn!("Failed to log search failure: {err}.");
		}
		if let Err(err) = self.record_stats(&entry, &[]).await {
			warn!("Failed to record search stats: {err}.");
		}
	}

	/// Cache tuning advice from the live hit rate and stage timings.
	pub fn cache_advice(&self) -> CacheAdvice {
		self.monitor.optimize_cache_strategy(self.cache.hit_rate())
	}

	/// Probes each dependency independently. The cache probe is
	/// reported per component but never changes the overall status;
	/// a broken cache only slows searches down.
	pub async fn health(&self) -> HealthReport {
		let now = OffsetDateTime::now_utc();
		let mut components = HashMap::new();
		let postgres_ok = sqlx::query("SELECT 1").execute(&self.db.pool).await.is_ok();

		components.insert("postgres", if postgres_ok { "up" } else { "down" });

		let qdrant_ok = self.qdrant.list_collections().await.is_ok();

		components.insert("qdrant", if qdrant_ok { "up" } else { "down" });

		let cache_ok = if self.cache.enabled() {
			let probe = Value::String("ok".to_string());

			self.cache.set("search:health", &probe, now, 60).await;
			self.cache.get::<Value>("search:health", now).await == Some(probe)
		} else {
			true
		};

		components.insert("cache", if cache_ok { "up" } else { "down" });

		let generated = self.counters.embeddings_generated.load(Ordering::Relaxed);
		let failures = self.counters.embedding_failures.load(Ordering::Relaxed);
		let embedding_ok = failures == 0 || generated > failures;

		components.insert("embedding", if embedding_ok { "up" } else { "failing" });

		let status =
			if postgres_ok && qdrant_ok && embedding_ok { "healthy" } else { "degraded" };

		HealthReport { status, components }
	}
}

fn build_response(
	request: &SearchRequest,
	results: Vec<SearchResult>,
	collections_searched: Vec<String>,
	processed: &ProcessedQuery,
	query_id: Uuid,
	search_time_ms: u64,
) -> SearchResponse {
	let mut metadata = Map::new();

	metadata
		.insert("query_type".to_string(), Value::String(processed.query_type.as_str().to_string()));
	metadata.insert("language".to_string(), Value::String(processed.language.as_str().to_string()));
	metadata.insert(
		"keywords".to_string(),
		Value::Array(processed.keywords.iter().cloned().map(Value::String).collect()),
	);

	if results.is_empty() {
		metadata
			.insert("message".to_string(), Value::String("검색 결과가 없습니다".to_string()));
	}

	let filters_applied = processed.extracted_filters.is_some() || request.filters.is_some();
	let returned_count = results.len();

	SearchResponse {
		query: request.query_text.clone(),
		results,
		total_count: returned_count,
		returned_count,
		search_time_ms,
		query_id,
		search_mode: request.search_mode,
		collections_searched,
		filters_applied,
		metadata,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sift_domain::types::SearchRequest;

	#[test]
	fn empty_results_carry_an_explanatory_message() {
		let request = SearchRequest { query_text: "분기 보고서".to_string(), ..Default::default() };
		let processed = query::analyze_minimal(&request.query_text, None);
		let response = build_response(&request, Vec::new(), Vec::new(), &processed, Uuid::new_v4(), 3);

		assert_eq!(response.total_count, 0);
		assert_eq!(response.returned_count, 0);
		assert_eq!(
			response.metadata.get("message").and_then(Value::as_str),
			Some("검색 결과가 없습니다")
		);
	}

	#[test]
	fn non_empty_results_carry_no_message() {
		let request = SearchRequest { query_text: "분기 보고서".to_string(), ..Default::default() };
		let processed = query::analyze_minimal(&request.query_text, None);
		let result = SearchResult {
			document_id: "1".to_string(),
			title: "분기 매출 보고서".to_string(),
			snippet: String::new(),
			highlighted_snippet: None,
			score: 0.9,
			relevance_score: 0.9,
			source_collection: "emails".to_string(),
			enrichment: None,
			metadata: Map::new(),
		};
		let response = build_response(&request, vec![result], Vec::new(), &processed, Uuid::new_v4(), 3);

		assert!(!response.metadata.contains_key("message"));
	}
}
