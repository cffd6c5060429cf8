use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::Row;
use time::{Duration, OffsetDateTime, Time};
use tracing::warn;

use crate::{Error, Result, SiftService, cache};
use sift_domain::types::{PopularQuery, SearchFilters, SearchLogEntry, SearchMode, SearchStats};

/// A stored document as the enricher consumes it. Serializable so the
/// per-document metadata cache can hold it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DocumentRecord {
	pub document_id: String,
	pub collection: String,
	pub title: String,
	pub content: String,
	pub sender: Option<String>,
	#[serde(default)]
	pub recipients: Vec<String>,
	#[serde(default, with = "sift_domain::time_serde::option")]
	pub sent_at: Option<OffsetDateTime>,
	pub has_attachments: bool,
	#[serde(default)]
	pub attachments: Vec<Value>,
	pub thread_id: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

fn hour_bucket(now: OffsetDateTime) -> OffsetDateTime {
	now.replace_time(Time::from_hms(now.hour(), 0, 0).unwrap_or(Time::MIDNIGHT))
}

fn json_vec<T>(value: Option<Value>) -> Vec<T>
where
	T: serde::de::DeserializeOwned,
{
	value.and_then(|value| serde_json::from_value(value).ok()).unwrap_or_default()
}

fn json_map(value: Option<Value>) -> Map<String, Value> {
	match value {
		Some(Value::Object(map)) => map,
		_ => Map::new(),
	}
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<DocumentRecord> {
	Ok(DocumentRecord {
		document_id: row.try_get("document_id")?,
		collection: row.try_get("collection")?,
		title: row.try_get("title")?,
		content: row.try_get("content")?,
		sender: row.try_get("sender")?,
		recipients: json_vec(row.try_get("recipients")?),
		sent_at: row.try_get("sent_at")?,
		has_attachments: row.try_get("has_attachments")?,
		attachments: json_vec(row.try_get("attachments")?),
		thread_id: row.try_get("thread_id")?,
		tags: json_vec(row.try_get("tags")?),
		metadata: json_map(row.try_get("metadata")?),
	})
}

impl SiftService {
	/// Bulk-loads document metadata, serving what it can from the
	/// per-document cache and filling the cache for the rest.
	pub async fn fetch_metadata(
		&self,
		ids: &[String],
		now: OffsetDateTime,
	) -> Result<HashMap<String, DocumentRecord>> {
		let mut records = HashMap::with_capacity(ids.len());
		let mut missing = Vec::new();

		for id in ids {
			match self.cache.get::<DocumentRecord>(&cache::metadata_key(id), now).await {
				Some(record) => {
					records.insert(id.clone(), record);
				},
				None => missing.push(id.clone()),
			}
		}

		if missing.is_empty() {
			return Ok(records);
		}

		let rows = sqlx::query(
			"\
SELECT
	document_id,
	collection,
	title,
	content,
	sender,
	recipients,
	sent_at,
	has_attachments,
	attachments,
	thread_id,
	tags,
	metadata
FROM documents
WHERE document_id = ANY($1)",
		)
		.bind(&missing)
		.fetch_all(&self.db.pool)
		.await?;

		for row in &rows {
			let record = row_to_record(row)?;

			self.cache
				.set(
					&cache::metadata_key(&record.document_id),
					&record,
					now,
					cache::METADATA_TTL_SECS,
				)
				.await;
			records.insert(record.document_id.clone(), record);
		}

		Ok(records)
	}

	pub async fn log_search(&self, entry: &SearchLogEntry) -> Result<()> {
		let filters = entry
			.filters
			.as_ref()
			.map(serde_json::to_value)
			.transpose()
			.map_err(|err| Error::Storage { message: format!("Failed to encode filters: {err}") })?;

		sqlx::query(
			"\
INSERT INTO search_logs (
	query_id,
	user_id,
	query_text,
	search_mode,
	filters,
	result_count,
	search_time_ms,
	success,
	error_message,
	created_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
		)
		.bind(entry.query_id)
		.bind(&entry.user_id)
		.bind(&entry.query_text)
		.bind(entry.search_mode.as_str())
		.bind(filters)
		.bind(entry.result_count)
		.bind(entry.search_time_ms)
		.bind(entry.success)
		.bind(&entry.error_message)
		.bind(entry.timestamp)
		.execute(&self.db.pool)
		.await?;

		Ok(())
	}

	/// Rolls a finished search into the hourly aggregates and, on
	/// success, into the popular-query tally.
	pub async fn record_stats(&self, entry: &SearchLogEntry, collections: &[String]) -> Result<()> {
		let bucket = hour_bucket(entry.timestamp);
		let successful = i64::from(entry.success);
		let failed = i64::from(!entry.success);

		sqlx::query(
			"\
INSERT INTO search_stats (
	bucket_start,
	total_searches,
	successful_searches,
	failed_searches,
	response_time_ms_sum,
	cache_hits,
	cache_misses
)
VALUES ($1,1,$2,$3,$4,0,0)
ON CONFLICT (bucket_start) DO UPDATE SET
	total_searches = search_stats.total_searches + 1,
	successful_searches = search_stats.successful_searches + EXCLUDED.successful_searches,
	failed_searches = search_stats.failed_searches + EXCLUDED.failed_searches,
	response_time_ms_sum = search_stats.response_time_ms_sum + EXCLUDED.response_time_ms_sum",
		)
		.bind(bucket)
		.bind(successful)
		.bind(failed)
		.bind(entry.search_time_ms)
		.execute(&self.db.pool)
		.await?;
		sqlx::query(
			"\
INSERT INTO search_stat_modes (bucket_start, search_mode, search_count)
VALUES ($1,$2,1)
ON CONFLICT (bucket_start, search_mode) DO UPDATE SET
	search_count = search_stat_modes.search_count + 1",
		)
		.bind(bucket)
		.bind(entry.search_mode.as_str())
		.execute(&self.db.pool)
		.await?;

		for collection in collections {
			sqlx::query(
				"\
INSERT INTO search_stat_collections (bucket_start, collection, search_count)
VALUES ($1,$2,1)
ON CONFLICT (bucket_start, collection) DO UPDATE SET
	search_count = search_stat_collections.search_count + 1",
			)
			.bind(bucket)
			.bind(collection)
			.execute(&self.db.pool)
			.await?;
		}

		if entry.success {
			sqlx::query(
				"\
INSERT INTO popular_queries (query_text, search_count, last_searched_at)
VALUES ($1,1,$2)
ON CONFLICT (query_text) DO UPDATE SET
	search_count = popular_queries.search_count + 1,
	last_searched_at = EXCLUDED.last_searched_at",
			)
			.bind(&entry.query_text)
			.bind(entry.timestamp)
			.execute(&self.db.pool)
			.await?;
		}

		Ok(())
	}

	/// Records cache traffic for the hour so hit rates survive process
	/// restarts.
	pub async fn record_cache_traffic(
		&self,
		hits: i64,
		misses: i64,
		now: OffsetDateTime,
	) -> Result<()> {
		if hits == 0 && misses == 0 {
			return Ok(());
		}

		sqlx::query(
			"\
INSERT INTO search_stats (
	bucket_start,
	total_searches,
	successful_searches,
	failed_searches,
	response_time_ms_sum,
	cache_hits,
	cache_misses
)
VALUES ($1,0,0,0,0,$2,$3)
ON CONFLICT (bucket_start) DO UPDATE SET
	cache_hits = search_stats.cache_hits + EXCLUDED.cache_hits,
	cache_misses = search_stats.cache_misses + EXCLUDED.cache_misses",
		)
		.bind(hour_bucket(now))
		.bind(hits)
		.bind(misses)
		.execute(&self.db.pool)
		.await?;

		Ok(())
	}

	pub async fn search_history(
		&self,
		user_id: Option<&str>,
		limit: i64,
		offset: i64,
	) -> Result<Vec<SearchLogEntry>> {
		let rows = sqlx::query(
			"\
SELECT
	query_id,
	user_id,
	query_text,
	search_mode,
	filters,
	result_count,
	search_time_ms,
	success,
	error_message,
	created_at
FROM search_logs
WHERE $1::text IS NULL OR user_id = $1
ORDER BY created_at DESC
LIMIT $2 OFFSET $3",
		)
		.bind(user_id)
		.bind(limit)
		.bind(offset)
		.fetch_all(&self.db.pool)
		.await?;
		let mut entries = Vec::with_capacity(rows.len());

		for row in rows {
			let mode: String = row.try_get("search_mode")?;
			let filters: Option<Value> = row.try_get("filters")?;
			let filters = filters.and_then(|value| {
				serde_json::from_value::<SearchFilters>(value)
					.map_err(|err| warn!("Stored filters failed to decode: {err}."))
					.ok()
			});

			entries.push(SearchLogEntry {
				query_id: row.try_get("query_id")?,
				user_id: row.try_get("user_id")?,
				query_text: row.try_get("query_text")?,
				search_mode: parse_search_mode(&mode),
				filters,
				result_count: row.try_get("result_count")?,
				search_time_ms: row.try_get("search_time_ms")?,
				timestamp: row.try_get("created_at")?,
				success: row.try_get("success")?,
				error_message: row.try_get("error_message")?,
			});
		}

		Ok(entries)
	}

	pub async fn popular_queries(&self, limit: i64) -> Result<Vec<PopularQuery>> {
		let rows = sqlx::query(
			"\
SELECT query_text, search_count
FROM popular_queries
ORDER BY search_count DESC, last_searched_at DESC
LIMIT $1",
		)
		.bind(limit)
		.fetch_all(&self.db.pool)
		.await?;

		rows.into_iter()
			.map(|row| {
				Ok(PopularQuery {
					query_text: row.try_get("query_text")?,
					search_count: row.try_get("search_count")?,
				})
			})
			.collect()
	}

	/// Aggregated statistics over the trailing `period_hours`, built
	/// from the hourly buckets.
	pub async fn stats(&self, period_hours: i64, now: OffsetDateTime) -> Result<SearchStats> {
		let period_start = now - Duration::hours(period_hours);
		let totals = sqlx::query(
			"\
SELECT
	COALESCE(SUM(total_searches), 0)::bigint AS total,
	COALESCE(SUM(successful_searches), 0)::bigint AS successful,
	COALESCE(SUM(failed_searches), 0)::bigint AS failed,
	COALESCE(SUM(response_time_ms_sum), 0)::bigint AS response_sum,
	COALESCE(SUM(cache_hits), 0)::bigint AS cache_hits,
	COALESCE(SUM(cache_misses), 0)::bigint AS cache_misses
FROM search_stats
WHERE bucket_start >= $1",
		)
		.bind(period_start)
		.fetch_one(&self.db.pool)
		.await?;
		let total: i64 = totals.try_get("total")?;
		let successful: i64 = totals.try_get("successful")?;
		let failed: i64 = totals.try_get("failed")?;
		let response_sum: i64 = totals.try_get("response_sum")?;
		let cache_hits: i64 = totals.try_get("cache_hits")?;
		let cache_misses: i64 = totals.try_get("cache_misses")?;
		let mode_rows = sqlx::query(
			"\
SELECT search_mode, SUM(search_count)::bigint AS search_count
FROM search_stat_modes
WHERE bucket_start >= $1
GROUP BY search_mode",
		)
		.bind(period_start)
		.fetch_all(&self.db.pool)
		.await?;
		let mut search_modes = HashMap::new();

		for row in mode_rows {
			search_modes
				.insert(row.try_get::<String, _>("search_mode")?, row.try_get("search_count")?);
		}

		let collection_rows = sqlx::query(
			"\
SELECT collection, SUM(search_count)::bigint AS search_count
FROM search_stat_collections
WHERE bucket_start >= $1
GROUP BY collection",
		)
		.bind(period_start)
		.fetch_all(&self.db.pool)
		.await?;
		let mut collections = HashMap::new();

		for row in collection_rows {
			collections
				.insert(row.try_get::<String, _>("collection")?, row.try_get("search_count")?);
		}

		let average_response_time_ms =
			if total > 0 { response_sum as f64 / total as f64 } else { 0. };
		let cache_reads = cache_hits + cache_misses;
		let cache_hit_rate =
			if cache_reads > 0 { cache_hits as f64 / cache_reads as f64 * 100. } else { 0. };

		Ok(SearchStats {
			total_searches: total,
			successful_searches: successful,
			failed_searches: failed,
			average_response_time_ms,
			cache_hit_rate,
			popular_queries: self.popular_queries(5).await?,
			search_modes,
			collections,
			period_start,
			period_end: now,
		})
	}

	/// Keeps the last ten query texts per user in the short-lived
	/// recent-search cache.
	pub async fn record_recent_search(&self, user_id: &str, query_text: &str, now: OffsetDateTime) {
		let key = cache::recent_search_key(user_id);
		let mut recent =
			self.cache.get::<Vec<String>>(&key, now).await.unwrap_or_default();

		recent.retain(|existing| existing != query_text);
		recent.insert(0, query_text.to_string());
		recent.truncate(10);

		self.cache.set(&key, &recent, now, cache::RECENT_SEARCH_TTL_SECS).await;
	}
}

fn parse_search_mode(text: &str) -> SearchMode {
	match text {
		"vector_only" => SearchMode::VectorOnly,
		"filter_only" => SearchMode::FilterOnly,
		_ => SearchMode::Hybrid,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::datetime;

	#[test]
	fn hour_bucket_truncates_minutes() {
		let now = datetime!(2025-06-05 14:37:22 UTC);

		assert_eq!(hour_bucket(now), datetime!(2025-06-05 14:00:00 UTC));
	}

	#[test]
	fn search_mode_round_trips_through_text() {
		for mode in [SearchMode::Hybrid, SearchMode::VectorOnly, SearchMode::FilterOnly] {
			assert_eq!(parse_search_mode(mode.as_str()), mode);
		}
	}
}
