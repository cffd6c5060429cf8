use std::collections::HashSet;

use qdrant_client::qdrant::{
	Condition, Filter, Range, ScoredPoint, point_id::PointIdOptions, value::Kind,
};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::warn;

use crate::{Result, SiftService, cache};
use sift_domain::types::{SearchFilters, SearchMode, SearchRequest, VectorMatch};
use sift_storage::qdrant::CollectionProfile;

pub struct RetrievalOutcome {
	pub matches: Vec<VectorMatch>,
	pub collections_searched: Vec<String>,
}

impl SiftService {
	/// Runs the vector leg of a search: picks collections, fans the
	/// query out, and merges the per-collection hits into one ranked
	/// list. Filter-only searches skip vectors entirely.
	pub async fn retrieve(
		&self,
		request: &SearchRequest,
		vector: Option<Vec<f32>>,
		filters: Option<&SearchFilters>,
		now: OffsetDateTime,
	) -> Result<RetrievalOutcome> {
		if request.search_mode == SearchMode::FilterOnly {
			warn!("Filter-only search returns no vector matches; no metadata index is wired up.");

			return Ok(RetrievalOutcome { matches: Vec::new(), collections_searched: Vec::new() });
		}

		let Some(vector) = vector else {
			return Ok(RetrievalOutcome { matches: Vec::new(), collections_searched: Vec::new() });
		};
		let profiles = self.select_collections(request);
		let collections_searched =
			profiles.iter().map(|profile| profile.name.clone()).collect::<Vec<_>>();
		let filter = filters.and_then(build_vector_filter);
		// Over-fetch so pagination still has enough rows after the merge
		// deduplicates across collections.
		let fetch_limit = (request.limit + request.offset).max(1) as u64;
		let per_collection_threshold = (request.search_mode == SearchMode::VectorOnly)
			.then_some(request.score_threshold);
		let mut grouped = self
			.fan_out(&profiles, vector, filter, fetch_limit, per_collection_threshold, now)
			.await;

		for (profile, matches) in profiles.iter().zip(grouped.iter_mut()) {
			apply_weight(matches, profile.weight);
			normalize_scores(matches);
		}

		let mut merged = merge_ranked(grouped, request.limit, request.offset);

		if request.search_mode == SearchMode::VectorOnly {
			// The threshold is a raw similarity bound; normalized scores
			// bottom out at 0.0 per collection and would drop valid hits.
			merged.retain(|item| item.score >= request.score_threshold);
		}

		Ok(RetrievalOutcome { matches: merged, collections_searched })
	}

	/// Resolves the request's collection strategy against the
	/// configured collections, preserving configured order.
	pub fn select_collections(&self, request: &SearchRequest) -> Vec<CollectionProfile> {
		use sift_domain::types::CollectionStrategy;

		let known = &self.qdrant.collections;
		let requested: HashSet<&str> = request
			.target_collections
			.iter()
			.flatten()
			.map(|name| name.as_str())
			.collect();

		match request.collection_strategy {
			// Single ignores target_collections; only multiple routes by
			// the explicit list.
			CollectionStrategy::Single => self
				.qdrant
				.profile(&self.qdrant.default_collection)
				.cloned()
				.into_iter()
				.collect(),
			CollectionStrategy::Multiple => {
				let selected = known
					.iter()
					.filter(|profile| requested.contains(profile.name.as_str()))
					.cloned()
					.collect::<Vec<_>>();

				if selected.is_empty() {
					warn!("No requested collection is configured; using default.");

					return self
						.qdrant
						.profile(&self.qdrant.default_collection)
						.cloned()
						.into_iter()
						.collect();
				}

				selected
			},
			CollectionStrategy::Auto => known.clone(),
		}
	}

	async fn fan_out(
		&self,
		profiles: &[CollectionProfile],
		vector: Vec<f32>,
		filter: Option<Filter>,
		limit: u64,
		score_threshold: Option<f32>,
		now: OffsetDateTime,
	) -> Vec<Vec<VectorMatch>> {
		let mut grouped: Vec<Vec<VectorMatch>> = vec![Vec::new(); profiles.len()];
		let mut pending = Vec::new();

		for (index, profile) in profiles.iter().enumerate() {
			let fingerprint = serde_json::json!({
				"vector": vector,
				"filter": filter.as_ref().map(|filter| format!("{filter:?}")),
				"limit": limit,
				"threshold": score_threshold,
			});
			let key = cache::vector_results_key(&profile.name, &fingerprint);

			if let Some(cached) = self.cache.get::<Vec<VectorMatch>>(&key, now).await {
				grouped[index] = cached;
			} else {
				pending.push((index, profile.clone(), key));
			}
		}

		let mut tasks = JoinSet::new();

		for (index, profile, key) in pending {
			let qdrant = self.qdrant.clone();
			let vector = vector.clone();
			let filter = filter.clone();

			tasks.spawn(async move {
				let result = qdrant.search(&profile, vector, filter, limit, score_threshold).await;

				(index, profile.name, key, result)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			let Ok((index, collection, key, result)) = joined else {
				warn!("A collection search task was cancelled.");

				continue;
			};

			match result {
				Ok(points) => {
					let matches = points
						.into_iter()
						.filter_map(|point| scored_point_to_match(point, &collection))
						.collect::<Vec<_>>();

					self.cache.set(&key, &matches, now, cache::VECTOR_RESULTS_TTL_SECS).await;

					grouped[index] = matches;
				},
				Err(err) => {
					warn!(collection = %collection, "Collection search failed: {err}.");
				},
			}
		}

		grouped
	}
}

fn scored_point_to_match(point: ScoredPoint, collection: &str) -> Option<VectorMatch> {
	let document_id = match point.id.and_then(|id| id.point_id_options)? {
		PointIdOptions::Num(num) => num.to_string(),
		PointIdOptions::Uuid(uuid) => uuid,
	};
	let payload = point
		.payload
		.into_iter()
		.map(|(key, value)| (key, payload_value_to_json(value)))
		.collect::<Map<String, Value>>();

	Some(VectorMatch {
		document_id,
		score: point.score,
		collection: collection.to_string(),
		weighted_score: None,
		normalized_score: None,
		payload,
	})
}

fn payload_value_to_json(value: qdrant_client::qdrant::Value) -> Value {
	match value.kind {
		Some(Kind::NullValue(_)) | None => Value::Null,
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::IntegerValue(int)) => Value::Number(int.into()),
		Some(Kind::DoubleValue(double)) =>
			serde_json::Number::from_f64(double).map(Value::Number).unwrap_or(Value::Null),
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::ListValue(list)) =>
			Value::Array(list.values.into_iter().map(payload_value_to_json).collect()),
		Some(Kind::StructValue(fields)) => Value::Object(
			fields
				.fields
				.into_iter()
				.map(|(key, value)| (key, payload_value_to_json(value)))
				.collect(),
		),
	}
}

/// Builds the Qdrant payload filter for extracted and explicit search
/// filters. Dates compare against the `sent_at_ts` unix-seconds payload
/// field.
pub fn build_vector_filter(filters: &SearchFilters) -> Option<Filter> {
	let mut conditions = Vec::new();

	if let Some(range) = &filters.date_range
		&& (range.start_date.is_some() || range.end_date.is_some())
	{
		conditions.push(Condition::range("sent_at_ts", Range {
			gte: range.start_date.map(|start| start.unix_timestamp() as f64),
			lte: range.end_date.map(|end| end.unix_timestamp() as f64),
			..Default::default()
		}));
	}
	if let Some(sender) = &filters.sender {
		conditions.push(Condition::matches("sender", sender.clone()));
	}

	for recipient in &filters.recipients {
		conditions.push(Condition::matches("recipients", recipient.clone()));
	}

	for keyword in &filters.subject_keywords {
		conditions.push(Condition::matches_text("subject", keyword.clone()));
	}

	if let Some(has_attachments) = filters.has_attachments {
		conditions.push(Condition::matches("has_attachments", has_attachments));
	}
	if let Some(thread_id) = &filters.thread_id {
		conditions.push(Condition::matches("thread_id", thread_id.clone()));
	}

	for tag in &filters.tags {
		conditions.push(Condition::matches("tags", tag.clone()));
	}

	for (key, value) in &filters.custom {
		match value {
			Value::String(text) => conditions.push(Condition::matches(key, text.clone())),
			Value::Bool(flag) => conditions.push(Condition::matches(key, *flag)),
			Value::Number(number) =>
				if let Some(int) = number.as_i64() {
					conditions.push(Condition::matches(key, int));
				},
			_ => {},
		}
	}

	if conditions.is_empty() {
		return None;
	}

	Some(Filter::must(conditions))
}

fn apply_weight(matches: &mut [VectorMatch], weight: f32) {
	for item in matches {
		item.weighted_score = Some(item.score * weight);
	}
}

/// Min-max normalizes the weighted scores within one collection so
/// collections with different score scales can be merged. A constant
/// score list normalizes to 1.0.
fn normalize_scores(matches: &mut [VectorMatch]) {
	let scores = matches
		.iter()
		.map(|item| item.weighted_score.unwrap_or(item.score))
		.collect::<Vec<_>>();
	let Some(min) = scores.iter().copied().reduce(f32::min) else {
		return;
	};
	let Some(max) = scores.iter().copied().reduce(f32::max) else {
		return;
	};

	for (item, score) in matches.iter_mut().zip(scores) {
		item.normalized_score =
			Some(if max > min { (score - min) / (max - min) } else { 1.0 });
	}
}

/// Merges per-collection hits: deduplicates by document id (the first
/// collection in configured order wins), ranks by effective score, and
/// applies pagination.
fn merge_ranked(grouped: Vec<Vec<VectorMatch>>, limit: usize, offset: usize) -> Vec<VectorMatch> {
	let mut seen = HashSet::new();
	let mut merged = Vec::new();

	for matches in grouped {
		for item in matches {
			if seen.insert(item.document_id.clone()) {
				merged.push(item);
			}
		}
	}

	merged.sort_by(|a, b| {
		b.effective_score().partial_cmp(&a.effective_score()).unwrap_or(std::cmp::Ordering::Equal)
	});

	merged.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use sift_domain::types::DateRange;
	use time::macros::datetime;

	fn raw(document_id: &str, score: f32, collection: &str) -> VectorMatch {
		VectorMatch {
			document_id: document_id.to_string(),
			score,
			collection: collection.to_string(),
			weighted_score: None,
			normalized_score: None,
			payload: Map::new(),
		}
	}

	#[test]
	fn weights_scale_raw_scores() {
		let mut matches = vec![raw("a", 0.8, "emails"), raw("b", 0.5, "emails")];

		apply_weight(&mut matches, 0.9);

		assert_eq!(matches[0].weighted_score, Some(0.8 * 0.9));
		assert_eq!(matches[1].weighted_score, Some(0.5 * 0.9));
	}

	#[test]
	fn normalization_spans_zero_to_one() {
		let mut matches =
			vec![raw("a", 0.9, "emails"), raw("b", 0.5, "emails"), raw("c", 0.1, "emails")];

		apply_weight(&mut matches, 1.0);
		normalize_scores(&mut matches);

		assert_eq!(matches[0].normalized_score, Some(1.0));
		assert_eq!(matches[1].normalized_score, Some(0.5));
		assert_eq!(matches[2].normalized_score, Some(0.0));
	}

	#[test]
	fn constant_scores_normalize_to_one() {
		let mut matches = vec![raw("a", 0.4, "emails"), raw("b", 0.4, "emails")];

		apply_weight(&mut matches, 1.0);
		normalize_scores(&mut matches);

		assert_eq!(matches[0].normalized_score, Some(1.0));
		assert_eq!(matches[1].normalized_score, Some(1.0));
	}

	#[test]
	fn merge_dedups_by_first_collection() {
		let emails = vec![raw("dup", 0.5, "emails"), raw("a", 0.9, "emails")];
		let documents = vec![raw("dup", 0.99, "documents"), raw("b", 0.3, "documents")];
		let merged = merge_ranked(vec![emails, documents], 10, 0);

		assert_eq!(merged.len(), 3);

		let dup = merged.iter().find(|item| item.document_id == "dup").unwrap();

		assert_eq!(dup.collection, "emails");
	}

	#[test]
	fn merge_sorts_by_effective_score_and_paginates() {
		let emails = vec![raw("a", 0.2, "emails"), raw("b", 0.9, "emails")];
		let documents = vec![raw("c", 0.5, "documents")];
		let merged = merge_ranked(vec![emails, documents], 2, 1);
		let ids = merged.iter().map(|item| item.document_id.as_str()).collect::<Vec<_>>();

		// Full order is b, c, a; offset 1 drops b.
		assert_eq!(ids, ["c", "a"]);
	}

	#[test]
	fn score_threshold_keeps_matches_that_pass_on_raw_score() {
		let mut matches = vec![raw("a", 0.9, "emails"), raw("b", 0.8, "emails")];

		apply_weight(&mut matches, 1.0);
		normalize_scores(&mut matches);

		let mut merged = merge_ranked(vec![matches], 10, 0);

		// The lowest match normalizes to 0.0; the threshold compares
		// against the raw similarity, so both survive.
		merged.retain(|item| item.score >= 0.7);

		let ids = merged.iter().map(|item| item.document_id.as_str()).collect::<Vec<_>>();

		assert_eq!(ids, ["a", "b"]);
	}

	#[test]
	fn effective_score_prefers_normalized() {
		let mut item = raw("a", 0.3, "emails");

		assert_eq!(item.effective_score(), 0.3);

		item.weighted_score = Some(0.27);

		assert_eq!(item.effective_score(), 0.27);

		item.normalized_score = Some(0.8);

		assert_eq!(item.effective_score(), 0.8);
	}

	#[test]
	fn filter_covers_every_populated_field() {
		let filters = SearchFilters {
			date_range: Some(DateRange {
				start_date: Some(datetime!(2025-06-01 00:00:00 UTC)),
				end_date: Some(datetime!(2025-06-30 23:59:59 UTC)),
			}),
			sender: Some("kim@example.com".to_string()),
			recipients: vec!["lee@example.com".to_string()],
			subject_keywords: vec!["보고서".to_string()],
			has_attachments: Some(true),
			thread_id: Some("thread_7".to_string()),
			tags: vec!["finance".to_string()],
			custom: Map::new(),
		};
		let filter = build_vector_filter(&filters).unwrap();

		// Date range, sender, recipient, subject keyword, attachments,
		// thread, tag.
		assert_eq!(filter.must.len(), 7);
	}

	#[test]
	fn subject_keywords_alone_build_a_filter() {
		let filters = SearchFilters {
			subject_keywords: vec!["보고서".to_string(), "매출".to_string()],
			..Default::default()
		};
		let filter = build_vector_filter(&filters).expect("Subject keywords must build a filter.");

		assert_eq!(filter.must.len(), 2);
	}

	#[test]
	fn empty_filters_build_no_filter() {
		assert!(build_vector_filter(&SearchFilters::default()).is_none());
	}
}
