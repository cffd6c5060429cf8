use time::macros::datetime;

use sift_domain::{
	query::{self, QueryRejection},
	types::{Language, QueryType, SearchFilters, SearchRequest},
};

#[test]
fn empty_query_is_rejected() {
	assert_eq!(query::validate_text(""), Err(QueryRejection::Empty));
	assert_eq!(query::validate_text("   \t  "), Err(QueryRejection::Empty));
}

#[test]
fn overlong_query_is_rejected() {
	let long = "가".repeat(1_001);

	assert_eq!(query::validate_text(&long), Err(QueryRejection::TooLong));

	let at_limit = "a".repeat(1_000);

	assert_eq!(query::validate_text(&at_limit), Ok(()));
}

#[test]
fn single_char_query_is_rejected() {
	assert_eq!(query::validate_text("a"), Err(QueryRejection::TooShort));
	assert_eq!(query::validate_text(" a "), Err(QueryRejection::TooShort));
	assert_eq!(query::validate_text("ab"), Ok(()));
}

#[test]
fn garbage_only_query_is_rejected() {
	assert_eq!(query::validate_text("!!! ??? ***"), Err(QueryRejection::NoSearchableChars));
	assert_eq!(query::validate_text("!! a !!"), Ok(()));
}

#[test]
fn request_limit_and_threshold_bounds() {
	let mut request = SearchRequest { query_text: "회의록".to_string(), ..Default::default() };

	assert_eq!(query::validate_request(&request), Ok(()));

	request.limit = 0;

	assert_eq!(query::validate_request(&request), Err(QueryRejection::LimitOutOfRange));

	request.limit = 101;

	assert_eq!(query::validate_request(&request), Err(QueryRejection::LimitOutOfRange));

	request.limit = 100;
	request.score_threshold = 1.5;

	assert_eq!(query::validate_request(&request), Err(QueryRejection::ThresholdOutOfRange));
}

#[test]
fn normalization_collapses_whitespace_and_strips_symbols() {
	assert_eq!(query::normalize("  프로젝트   문서  "), "프로젝트 문서");
	assert_eq!(query::normalize("report!!! (final)"), "report final");
	assert_eq!(
		query::normalize(r#"from: kim@example.com "주간 보고""#),
		r#"from kim@example.com "주간 보고""#
	);
}

#[test]
fn normalization_is_idempotent() {
	let once = query::normalize("  중요!!  문서 @lee  ");
	let twice = query::normalize(&once);

	assert_eq!(once, twice);
}

#[test]
fn language_detection_counts_scripts() {
	assert_eq!(query::detect_language("어제 받은 회의록"), Language::Ko);
	assert_eq!(query::detect_language("quarterly report draft"), Language::En);
	assert_eq!(query::detect_language("보고 re"), Language::Mixed);
	assert_eq!(query::detect_language("1234 !!"), Language::Mixed);
}

#[test]
fn keywords_dedupe_and_cap_at_ten() {
	// "서" is stripped as a trailing particle, so both words shorten.
	let keywords = query::extract_keywords("문서 문서 문서 보고서");

	assert_eq!(keywords, vec!["문".to_string(), "보고".to_string()]);

	let many = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
	let keywords = query::extract_keywords(many);

	assert_eq!(keywords.len(), 10);
}

#[test]
fn keywords_include_quoted_phrases_and_strip_particles() {
	let keywords = query::extract_keywords(r#""주간 보고" 회의록을 검토"#);

	assert!(keywords.contains(&"주간 보고".to_string()));
	assert!(keywords.contains(&"회의록".to_string()));
}

#[test]
fn classification_order() {
	let two_filters = SearchFilters {
		sender: Some("kim@example.com".to_string()),
		has_attachments: Some(true),
		..SearchFilters::default()
	};

	assert_eq!(query::classify("아무 질의", &two_filters), QueryType::FilteredSearch);
	assert_eq!(
		query::classify(r#""정확한 구문" 검색"#, &SearchFilters::default()),
		QueryType::ExactSearch
	);
	assert_eq!(query::classify("회의는 어디였지", &SearchFilters::default()), QueryType::Question);
	assert_eq!(query::classify("where is it?", &SearchFilters::default()), QueryType::Question);
	assert_eq!(query::classify("프로젝트 문서", &SearchFilters::default()), QueryType::General);
}

#[test]
fn analyze_extracts_todays_date_range() {
	let now = datetime!(2025-06-05 14:30 UTC);
	let processed = query::analyze("오늘 회의록", None, now);
	let filters = processed.extracted_filters.expect("Filters must be extracted.");
	let range = filters.date_range.expect("Date range must be extracted.");

	assert_eq!(range.start_date, Some(datetime!(2025-06-05 00:00 UTC)));
	assert_eq!(range.end_date, Some(datetime!(2025-06-05 23:59:59 UTC)));
	assert_eq!(processed.language, Language::Ko);
}

#[test]
fn analyze_merges_explicit_filters_over_extracted() {
	let now = datetime!(2025-06-05 14:30 UTC);
	let explicit =
		SearchFilters { sender: Some("boss@example.com".to_string()), ..SearchFilters::default() };
	let processed = query::analyze("from: kim@example.com 첨부 보고서", Some(&explicit), now);
	let filters = processed.extracted_filters.expect("Filters must be extracted.");

	assert_eq!(filters.sender.as_deref(), Some("boss@example.com"));
	assert_eq!(filters.has_attachments, Some(true));
	assert_eq!(processed.query_type, QueryType::FilteredSearch);
}

#[test]
fn analyze_is_deterministic_for_fixed_now() {
	let now = datetime!(2025-06-05 14:30 UTC);
	let first = query::analyze("이번 주 \"주간 보고\"", None, now);
	let second = query::analyze("이번 주 \"주간 보고\"", None, now);

	assert_eq!(first.normalized_text, second.normalized_text);
	assert_eq!(first.extracted_filters, second.extracted_filters);
	assert_eq!(first.keywords, second.keywords);
}

#[test]
fn analyze_minimal_lowercases_and_passes_filters_through() {
	let explicit = SearchFilters { tags: vec!["urgent".to_string()], ..SearchFilters::default() };
	let processed = query::analyze_minimal("  Quarterly REPORT  ", Some(&explicit));

	assert_eq!(processed.normalized_text, "quarterly report");
	assert_eq!(
		processed.extracted_filters.expect("Filters must pass through.").tags,
		vec!["urgent".to_string()]
	);
	assert!(processed.keywords.is_empty());
}
