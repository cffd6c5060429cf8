use serde_json::Map;
use time::{Duration, OffsetDateTime};
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

use crate::{SiftService, repository::DocumentRecord};
use sift_domain::types::{EnrichmentData, SearchResult, VectorMatch};

const SNIPPET_WINDOW_CHARS: usize = 50;
const SNIPPET_FALLBACK_CHARS: usize = 200;
const TITLE_MATCH_BOOST: f32 = 0.2;
const RECENT_BOOST: f32 = 0.1;
const SEMI_RECENT_BOOST: f32 = 0.05;
const ATTACHMENT_BOOST: f32 = 0.05;

impl SiftService {
	/// Turns raw vector matches into presentable results: document
	/// metadata, a keyword-centered snippet, optional highlighting, and
	/// a boosted relevance score. A match whose document is missing is
	/// dropped; if metadata cannot be read at all, placeholder results
	/// keep the response usable.
	pub async fn enrich(
		&self,
		matches: &[VectorMatch],
		query_text: &str,
		keywords: &[String],
		highlight: bool,
		now: OffsetDateTime,
	) -> Vec<SearchResult> {
		if matches.is_empty() {
			return Vec::new();
		}

		let ids = matches.iter().map(|item| item.document_id.clone()).collect::<Vec<_>>();
		let records = match self.fetch_metadata(&ids, now).await {
			Ok(records) => records,
			Err(err) => {
				warn!("Metadata lookup failed; returning placeholder results: {err}.");

				return matches.iter().map(placeholder_result).collect();
			},
		};
		let mut results = Vec::with_capacity(matches.len());

		for item in matches {
			let Some(record) = records.get(&item.document_id) else {
				warn!(document_id = %item.document_id, "Match has no stored document; dropped.");

				continue;
			};

			results.push(build_result(item, record, query_text, keywords, highlight, now));
		}

		results
	}
}

fn placeholder_result(item: &VectorMatch) -> SearchResult {
	SearchResult {
		document_id: item.document_id.clone(),
		title: format!("Document {}", item.document_id),
		snippet: String::new(),
		highlighted_snippet: None,
		score: item.effective_score(),
		relevance_score: item.effective_score(),
		source_collection: item.collection.clone(),
		enrichment: None,
		metadata: Map::new(),
	}
}

fn build_result(
	item: &VectorMatch,
	record: &DocumentRecord,
	query_text: &str,
	keywords: &[String],
	highlight: bool,
	now: OffsetDateTime,
) -> SearchResult {
	let snippet = make_snippet(&record.content, keywords);
	let highlighted_snippet = highlight.then(|| highlight_terms(&snippet, keywords));
	let score = item.effective_score();
	let relevance_score = boost_relevance(
		score,
		&record.title,
		query_text,
		record.sent_at,
		record.has_attachments,
		now,
	);

	SearchResult {
		document_id: record.document_id.clone(),
		title: record.title.clone(),
		snippet,
		highlighted_snippet,
		score,
		relevance_score,
		source_collection: item.collection.clone(),
		enrichment: Some(EnrichmentData {
			sender: record.sender.clone(),
			recipients: record.recipients.clone(),
			sent_at: record.sent_at,
			attachments: record.attachments.clone(),
			thread_id: record.thread_id.clone(),
			tags: record.tags.clone(),
		}),
		metadata: record.metadata.clone(),
	}
}

/// Drops HTML tags and `>`-quoted reply lines before snippet
/// extraction.
pub fn clean_content(content: &str) -> String {
	let without_tags = regex::Regex::new(r"<[^>]*>")
		.map(|re| re.replace_all(content, " ").into_owned())
		.unwrap_or_else(|_| content.to_string());
	let kept_lines = without_tags
		.lines()
		.filter(|line| !line.trim_start().starts_with('>'))
		.collect::<Vec<_>>()
		.join("\n");

	kept_lines.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts a snippet centered on the first keyword occurrence. With
/// no keyword hit the snippet is the head of the document.
pub fn make_snippet(content: &str, keywords: &[String]) -> String {
	let cleaned = clean_content(content);
	let hit = keywords.iter().find_map(|keyword| find_ci(&cleaned, keyword));
	let Some(hit_start) = hit else {
		return head_chars(&cleaned, SNIPPET_FALLBACK_CHARS);
	};
	let chars_before = cleaned[..hit_start].chars().count();
	let start_target = chars_before.saturating_sub(SNIPPET_WINDOW_CHARS);
	let end_target = chars_before + SNIPPET_WINDOW_CHARS;
	let start_byte = snap_to_word_boundary(&cleaned, char_to_byte(&cleaned, start_target), false);
	let end_byte = snap_to_word_boundary(&cleaned, char_to_byte(&cleaned, end_target), true);
	let mut snippet = String::new();

	if start_byte > 0 {
		snippet.push_str("...");
	}

	snippet.push_str(cleaned[start_byte..end_byte].trim());

	if end_byte < cleaned.len() {
		snippet.push_str("...");
	}

	snippet
}

/// Wraps each keyword occurrence in `<mark>` tags, case-insensitively.
/// One-character terms are too noisy to highlight.
pub fn highlight_terms(snippet: &str, keywords: &[String]) -> String {
	let mut highlighted = snippet.to_string();

	for keyword in keywords {
		if keyword.chars().count() < 2 {
			continue;
		}

		highlighted = mark_occurrences(&highlighted, keyword);
	}

	highlighted
}

/// Boosts a base score when the query text appears verbatim in the
/// title (case-insensitive), for recency, and for attachments. The
/// result stays within [0, 1].
pub fn boost_relevance(
	base: f32,
	title: &str,
	query_text: &str,
	sent_at: Option<OffsetDateTime>,
	has_attachments: bool,
	now: OffsetDateTime,
) -> f32 {
	let mut score = base;

	if find_ci(title, query_text.trim()).is_some() {
		score += TITLE_MATCH_BOOST;
	}
	if let Some(sent_at) = sent_at {
		let age = now - sent_at;

		if age <= Duration::days(7) {
			score += RECENT_BOOST;
		} else if age <= Duration::days(30) {
			score += SEMI_RECENT_BOOST;
		}
	}
	if has_attachments {
		score += ATTACHMENT_BOOST;
	}

	score.min(1.0)
}

/// Byte index of the first case-insensitive occurrence of `needle` in
/// `haystack`. Comparison is char-by-char so multibyte text keeps its
/// original offsets.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
	if needle.is_empty() {
		return None;
	}

	for (index, _) in haystack.char_indices() {
		if starts_with_ci(&haystack[index..], needle) {
			return Some(index);
		}
	}

	None
}

fn starts_with_ci(haystack: &str, needle: &str) -> bool {
	let mut haystack_chars = haystack.chars().flat_map(char::to_lowercase);

	for needle_char in needle.chars().flat_map(char::to_lowercase) {
		match haystack_chars.next() {
			Some(haystack_char) if haystack_char == needle_char => {},
			_ => return false,
		}
	}

	true
}

/// Byte length of the case-insensitive match of `needle` at the start
/// of `haystack`.
fn match_len_ci(haystack: &str, needle: &str) -> usize {
	let needle_chars = needle.chars().flat_map(char::to_lowercase).count();
	let mut matched_chars = 0;
	let mut len = 0;

	for ch in haystack.chars() {
		if matched_chars >= needle_chars {
			break;
		}

		matched_chars += ch.to_lowercase().count();
		len += ch.len_utf8();
	}

	len
}

fn mark_occurrences(text: &str, keyword: &str) -> String {
	let mut out = String::with_capacity(text.len());
	let mut rest = text;

	while let Some(start) = find_ci(rest, keyword) {
		let len = match_len_ci(&rest[start..], keyword);

		out.push_str(&rest[..start]);
		out.push_str("<mark>");
		out.push_str(&rest[start..start + len]);
		out.push_str("</mark>");

		rest = &rest[start + len..];
	}

	out.push_str(rest);

	out
}

fn head_chars(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	let mut head: String = text.chars().take(max_chars).collect();

	head.push_str("...");

	head
}

fn char_to_byte(text: &str, char_index: usize) -> usize {
	text.char_indices().nth(char_index).map(|(byte, _)| byte).unwrap_or(text.len())
}

/// Snaps a byte position to the nearest word boundary so snippets never
/// cut a word in half. Forward snapping moves right, backward left.
fn snap_to_word_boundary(text: &str, byte: usize, forward: bool) -> usize {
	if byte == 0 || byte >= text.len() {
		return byte.min(text.len());
	}

	let mut previous = 0;

	for (start, _) in text.split_word_bound_indices() {
		if start == byte {
			return byte;
		}
		if start > byte {
			return if forward { start } else { previous };
		}

		previous = start;
	}

	text.len()
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::datetime;

	#[test]
	fn clean_strips_tags_and_quoted_lines() {
		let content = "<p>회의록 요약</p>\n> 지난 메일 내용\n본문 계속";

		assert_eq!(clean_content(content), "회의록 요약 본문 계속");
	}

	#[test]
	fn snippet_centers_on_first_keyword() {
		let padding = "가나다 ".repeat(40);
		let content = format!("{padding}분기 보고서 본문입니다 {padding}");
		let snippet = make_snippet(&content, &["보고서".to_string()]);

		assert!(snippet.contains("보고서"));
		assert!(snippet.starts_with("..."));
		assert!(snippet.ends_with("..."));
	}

	#[test]
	fn snippet_without_match_takes_the_head() {
		let content = "짧은 본문";
		let snippet = make_snippet(content, &["없는키워드".to_string()]);

		assert_eq!(snippet, "짧은 본문");

		let long = "가".repeat(300);
		let snippet = make_snippet(&long, &[]);

		assert_eq!(snippet.chars().count(), 203);
		assert!(snippet.ends_with("..."));
	}

	#[test]
	fn highlight_is_case_insensitive_and_skips_short_terms() {
		let snippet = "Quarterly Report and quarterly review";
		let marked =
			highlight_terms(snippet, &["quarterly".to_string(), "a".to_string()]);

		assert_eq!(marked, "<mark>Quarterly</mark> Report and <mark>quarterly</mark> review");
	}

	#[test]
	fn boosts_stack_and_clamp() {
		let now = datetime!(2025-06-10 12:00:00 UTC);
		let recent = Some(datetime!(2025-06-08 12:00:00 UTC));
		let boosted = boost_relevance(0.5, "2025 분기 보고서", "분기 보고서", recent, true, now);

		assert!((boosted - 0.85).abs() < 1e-6);

		let clamped = boost_relevance(0.9, "2025 분기 보고서", "분기 보고서", recent, true, now);

		assert_eq!(clamped, 1.0);
	}

	#[test]
	fn title_boost_needs_the_whole_query_verbatim() {
		let now = datetime!(2025-06-10 12:00:00 UTC);
		// Both query words appear in the title, but not contiguously.
		let partial = boost_relevance(0.5, "보고서: 분기 결산", "분기 보고서", None, false, now);

		assert_eq!(partial, 0.5);

		let verbatim = boost_relevance(0.5, "Quarterly Report", "quarterly report", None, false, now);

		assert!((verbatim - 0.7).abs() < 1e-6);
	}

	#[test]
	fn semi_recent_documents_get_the_smaller_boost() {
		let now = datetime!(2025-06-10 12:00:00 UTC);
		let semi_recent = Some(datetime!(2025-05-20 12:00:00 UTC));
		let boosted = boost_relevance(0.5, "무관한 제목", "분기 보고서", semi_recent, false, now);

		assert!((boosted - 0.55).abs() < 1e-6);
	}
}
