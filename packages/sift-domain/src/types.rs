use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	#[default]
	Hybrid,
	VectorOnly,
	FilterOnly,
}
impl SearchMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Hybrid => "hybrid",
			Self::VectorOnly => "vector_only",
			Self::FilterOnly => "filter_only",
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStrategy {
	#[default]
	Single,
	Multiple,
	Auto,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DateRange {
	#[serde(default, with = "crate::time_serde::option")]
	pub start_date: Option<OffsetDateTime>,
	#[serde(default, with = "crate::time_serde::option")]
	pub end_date: Option<OffsetDateTime>,
}

/// Structured constraints attached to a search. A field counts as set
/// only when it is non-null and non-empty; unset fields are ignored by
/// every consumer.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SearchFilters {
	pub date_range: Option<DateRange>,
	pub sender: Option<String>,
	pub recipients: Vec<String>,
	pub subject_keywords: Vec<String>,
	pub has_attachments: Option<bool>,
	pub thread_id: Option<String>,
	pub tags: Vec<String>,
	pub custom: Map<String, Value>,
}
impl SearchFilters {
	pub fn populated_fields(&self) -> usize {
		let mut count = 0;

		if self.date_range.is_some() {
			count += 1;
		}
		if self.sender.as_deref().map(|sender| !sender.is_empty()).unwrap_or(false) {
			count += 1;
		}
		if !self.recipients.is_empty() {
			count += 1;
		}
		if !self.subject_keywords.is_empty() {
			count += 1;
		}
		if self.has_attachments.is_some() {
			count += 1;
		}
		if self.thread_id.as_deref().map(|id| !id.is_empty()).unwrap_or(false) {
			count += 1;
		}
		if !self.tags.is_empty() {
			count += 1;
		}
		if !self.custom.is_empty() {
			count += 1;
		}

		count
	}

	pub fn is_empty(&self) -> bool {
		self.populated_fields() == 0
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchRequest {
	pub query_text: String,
	pub search_mode: SearchMode,
	pub collection_strategy: CollectionStrategy,
	pub target_collections: Option<Vec<String>>,
	pub filters: Option<SearchFilters>,
	pub limit: usize,
	pub offset: usize,
	pub score_threshold: f32,
	pub auto_extract_filters: bool,
	pub highlight: bool,
	pub user_id: Option<String>,
}
impl Default for SearchRequest {
	fn default() -> Self {
		Self {
			query_text: String::new(),
			search_mode: SearchMode::default(),
			collection_strategy: CollectionStrategy::default(),
			target_collections: None,
			filters: None,
			limit: 20,
			offset: 0,
			score_threshold: 0.7,
			auto_extract_filters: true,
			highlight: true,
			user_id: None,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
	#[default]
	Ko,
	En,
	Mixed,
}
impl Language {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Ko => "ko",
			Self::En => "en",
			Self::Mixed => "mixed",
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
	FilteredSearch,
	ExactSearch,
	Question,
	#[default]
	General,
}
impl QueryType {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::FilteredSearch => "filtered_search",
			Self::ExactSearch => "exact_search",
			Self::Question => "question",
			Self::General => "general",
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ProcessedQuery {
	pub original_text: String,
	pub normalized_text: String,
	pub extracted_filters: Option<SearchFilters>,
	#[serde(default)]
	pub language: Language,
	#[serde(default)]
	pub query_type: QueryType,
	#[serde(default)]
	pub keywords: Vec<String>,
	#[serde(default)]
	pub processing_metadata: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VectorMatch {
	pub document_id: String,
	pub score: f32,
	pub collection: String,
	#[serde(default)]
	pub weighted_score: Option<f32>,
	#[serde(default)]
	pub normalized_score: Option<f32>,
	#[serde(default)]
	pub payload: Map<String, Value>,
}
impl VectorMatch {
	/// Ranking score used after merge: normalized when present, else
	/// weighted, else the raw similarity score.
	pub fn effective_score(&self) -> f32 {
		self.normalized_score.or(self.weighted_score).unwrap_or(self.score)
	}
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EnrichmentData {
	pub sender: Option<String>,
	#[serde(default)]
	pub recipients: Vec<String>,
	#[serde(default, with = "crate::time_serde::option")]
	pub sent_at: Option<OffsetDateTime>,
	#[serde(default)]
	pub attachments: Vec<Value>,
	pub thread_id: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchResult {
	pub document_id: String,
	pub title: String,
	pub snippet: String,
	#[serde(default)]
	pub highlighted_snippet: Option<String>,
	pub score: f32,
	pub relevance_score: f32,
	pub source_collection: String,
	#[serde(default)]
	pub enrichment: Option<EnrichmentData>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchResponse {
	pub query: String,
	pub results: Vec<SearchResult>,
	pub total_count: usize,
	pub returned_count: usize,
	pub search_time_ms: u64,
	pub query_id: Uuid,
	pub search_mode: SearchMode,
	pub collections_searched: Vec<String>,
	pub filters_applied: bool,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchLogEntry {
	pub query_id: Uuid,
	pub user_id: Option<String>,
	pub query_text: String,
	pub search_mode: SearchMode,
	pub filters: Option<SearchFilters>,
	pub result_count: i64,
	pub search_time_ms: i64,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
	pub success: bool,
	pub error_message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PopularQuery {
	pub query_text: String,
	pub search_count: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SearchStats {
	pub total_searches: i64,
	pub successful_searches: i64,
	pub failed_searches: i64,
	pub average_response_time_ms: f64,
	pub cache_hit_rate: f64,
	#[serde(default)]
	pub popular_queries: Vec<PopularQuery>,
	#[serde(default)]
	pub search_modes: HashMap<String, i64>,
	#[serde(default)]
	pub collections: HashMap<String, i64>,
	#[serde(with = "crate::time_serde")]
	pub period_start: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub period_end: OffsetDateTime,
}
