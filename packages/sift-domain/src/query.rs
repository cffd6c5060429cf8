use regex::Regex;
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use unicode_normalization::UnicodeNormalization;
use unicode_script::{Script, UnicodeScript};

use crate::{
	extract,
	types::{Language, ProcessedQuery, QueryType, SearchFilters, SearchRequest},
};

pub const MAX_QUERY_CHARS: usize = 1_000;
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_KEYWORDS: usize = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryRejection {
	Empty,
	TooLong,
	TooShort,
	NoSearchableChars,
	LimitOutOfRange,
	ThresholdOutOfRange,
}
impl QueryRejection {
	pub fn message(&self) -> &'static str {
		match self {
			Self::Empty => "query is empty",
			Self::TooLong => "query exceeds 1000 characters",
			Self::TooShort => "query is shorter than 2 characters after trimming",
			Self::NoSearchableChars => "query contains no searchable characters",
			Self::LimitOutOfRange => "limit must be between 1 and 100",
			Self::ThresholdOutOfRange => "score_threshold must be between 0.0 and 1.0",
		}
	}
}

pub fn validate_text(text: &str) -> Result<(), QueryRejection> {
	if text.trim().is_empty() {
		return Err(QueryRejection::Empty);
	}
	if text.chars().count() > MAX_QUERY_CHARS {
		return Err(QueryRejection::TooLong);
	}
	if text.trim().chars().count() < MIN_QUERY_CHARS {
		return Err(QueryRejection::TooShort);
	}
	if text.chars().all(|ch| !is_searchable_char(ch)) {
		return Err(QueryRejection::NoSearchableChars);
	}

	Ok(())
}

pub fn validate_request(request: &SearchRequest) -> Result<(), QueryRejection> {
	validate_text(&request.query_text)?;

	if request.limit == 0 || request.limit > 100 {
		return Err(QueryRejection::LimitOutOfRange);
	}
	if !request.score_threshold.is_finite()
		|| !(0.0..=1.0).contains(&request.score_threshold)
	{
		return Err(QueryRejection::ThresholdOutOfRange);
	}

	Ok(())
}

fn is_searchable_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || is_hangul_syllable(ch)
}

fn is_hangul_syllable(ch: char) -> bool {
	('가'..='힣').contains(&ch)
}

/// Collapses whitespace runs, strips characters outside the search
/// whitelist (word characters, Hangul, quotes, `@`, `.`, `-`), trims.
pub fn normalize(text: &str) -> String {
	let composed: String = text.nfkc().collect();
	let stripped = Regex::new(r#"[^\w\s가-힣"'@.\-]"#)
		.map(|re| re.replace_all(&composed, " ").into_owned())
		.unwrap_or_else(|_| composed.clone());

	stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heuristic script-count detection: majority script wins, tie is
/// reported as mixed.
pub fn detect_language(text: &str) -> Language {
	let mut hangul = 0_usize;
	let mut latin = 0_usize;

	for ch in text.chars() {
		match ch.script() {
			Script::Hangul => hangul += 1,
			Script::Latin => latin += 1,
			_ => {},
		}
	}

	if hangul > latin {
		Language::Ko
	} else if latin > hangul {
		Language::En
	} else {
		Language::Mixed
	}
}

pub fn extract_keywords(text: &str) -> Vec<String> {
	let mut candidates = Vec::new();

	if let Ok(re) = Regex::new(r#""([^"]+)""#) {
		for capture in re.captures_iter(text) {
			candidates.push(capture[1].to_string());
		}
	}

	if Regex::new(r"(?i)중요|important|urgent|긴급")
		.map(|re| re.is_match(text))
		.unwrap_or(false)
	{
		candidates.push("important".to_string());
	}

	for word in text.split_whitespace() {
		if word.chars().count() < 2 || word.starts_with('@') || word.starts_with("http") {
			continue;
		}

		let cleaned = strip_trailing_particle(word);

		if !cleaned.is_empty() {
			candidates.push(cleaned.to_string());
		}
	}

	let mut keywords: Vec<String> = Vec::new();

	for candidate in candidates {
		if !keywords.contains(&candidate) {
			keywords.push(candidate);
		}

		if keywords.len() == MAX_KEYWORDS {
			break;
		}
	}

	keywords
}

// Korean postpositions glued onto a noun (e.g. "회의록을" -> "회의록").
fn strip_trailing_particle(word: &str) -> &str {
	const PARTICLES: [char; 9] = ['은', '는', '이', '가', '을', '를', '에', '서', '의'];

	match word.chars().last() {
		Some(last) if PARTICLES.contains(&last) => &word[..word.len() - last.len_utf8()],
		_ => word,
	}
}

pub fn classify(text: &str, filters: &SearchFilters) -> QueryType {
	if filters.populated_fields() >= 2 {
		return QueryType::FilteredSearch;
	}
	if text.contains('"') {
		return QueryType::ExactSearch;
	}
	if text.trim_end().ends_with('?')
		|| ["어디", "무엇", "언제", "누구"].iter().any(|token| text.contains(token))
	{
		return QueryType::Question;
	}

	QueryType::General
}

/// Full analysis of a validated query. Extraction is best-effort and
/// never fails; callers must run `validate_text` first.
pub fn analyze(
	text: &str,
	explicit_filters: Option<&SearchFilters>,
	now: OffsetDateTime,
) -> ProcessedQuery {
	let normalized_text = normalize(text);
	let extracted = extract::extract_filters(text, now);
	let filters = match explicit_filters {
		Some(explicit) => extract::merge_filters(explicit, &extracted),
		None => extracted,
	};
	let language = detect_language(&normalized_text);
	let keywords = extract_keywords(&normalized_text);
	let query_type = classify(&normalized_text, &filters);
	let has_filters = !filters.is_empty();
	let mut processing_metadata = serde_json::Map::new();

	if let Ok(processed_at) = now.format(&Rfc3339) {
		processing_metadata.insert("processed_at".to_string(), Value::String(processed_at));
	}

	processing_metadata.insert("has_filters".to_string(), Value::Bool(has_filters));

	ProcessedQuery {
		original_text: text.to_string(),
		normalized_text,
		extracted_filters: has_filters.then_some(filters),
		language,
		query_type,
		keywords,
		processing_metadata,
	}
}

/// Degraded analysis used when the full pass fails internally: the
/// pipeline must still receive a usable query.
pub fn analyze_minimal(text: &str, explicit_filters: Option<&SearchFilters>) -> ProcessedQuery {
	ProcessedQuery {
		original_text: text.to_string(),
		normalized_text: text.trim().to_lowercase(),
		extracted_filters: explicit_filters.cloned(),
		language: Language::default(),
		query_type: QueryType::default(),
		keywords: Vec::new(),
		processing_metadata: serde_json::Map::new(),
	}
}
