use regex::Regex;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::types::{DateRange, SearchFilters};

/// Best-effort extraction of structured filters from free text. A
/// pattern that fails to compile or match simply contributes nothing.
pub fn extract_filters(text: &str, now: OffsetDateTime) -> SearchFilters {
	let mut filters = SearchFilters::default();

	filters.date_range = parse_date_filters(text, now);
	filters.sender = extract_sender(text);
	filters.recipients = extract_recipients(text);

	if Regex::new(r"(?i)첨부|attachment|attached|파일")
		.map(|re| re.is_match(text))
		.unwrap_or(false)
	{
		filters.has_attachments = Some(true);
	}
	if let Ok(re) = Regex::new(r#""([^"]+)""#) {
		filters.subject_keywords =
			re.captures_iter(text).map(|capture| capture[1].to_string()).collect();
	}

	filters
}

/// Explicit filters win; extracted values fill only the fields the
/// caller left unset.
pub fn merge_filters(explicit: &SearchFilters, extracted: &SearchFilters) -> SearchFilters {
	let mut merged = explicit.clone();

	if merged.date_range.is_none() {
		merged.date_range = extracted.date_range.clone();
	}
	if merged.sender.as_deref().map(str::is_empty).unwrap_or(true) {
		merged.sender = extracted.sender.clone();
	}
	if merged.recipients.is_empty() {
		merged.recipients = extracted.recipients.clone();
	}
	if merged.subject_keywords.is_empty() {
		merged.subject_keywords = extracted.subject_keywords.clone();
	}
	if merged.has_attachments.is_none() {
		merged.has_attachments = extracted.has_attachments;
	}
	if merged.thread_id.as_deref().map(str::is_empty).unwrap_or(true) {
		merged.thread_id = extracted.thread_id.clone();
	}
	if merged.tags.is_empty() {
		merged.tags = extracted.tags.clone();
	}
	if merged.custom.is_empty() {
		merged.custom = extracted.custom.clone();
	}

	merged
}

pub fn parse_date_filters(text: &str, now: OffsetDateTime) -> Option<DateRange> {
	let today = now.date();

	if matches_pattern(r"(?i)오늘|today", text) {
		return Some(whole_day(today, now.offset()));
	}
	if matches_pattern(r"(?i)어제|yesterday", text) {
		return Some(whole_day(today - Duration::days(1), now.offset()));
	}
	if matches_pattern(r"(?i)이번\s*주|this\s*week", text) {
		let start_of_week = today - Duration::days(today.weekday().number_days_from_monday() as i64);

		return Some(DateRange {
			start_date: Some(day_start(start_of_week, now.offset())),
			end_date: Some(now),
		});
	}
	if matches_pattern(r"(?i)지난\s*주|last\s*week", text) {
		let start_of_week = today - Duration::days(today.weekday().number_days_from_monday() as i64);
		let start = start_of_week - Duration::days(7);
		let end = start_of_week - Duration::days(1);

		return Some(DateRange {
			start_date: Some(day_start(start, now.offset())),
			end_date: Some(day_end(end, now.offset())),
		});
	}

	let range_re =
		Regex::new(r"(\d{4}[-/.]\d{1,2}[-/.]\d{1,2})\s*~\s*(\d{4}[-/.]\d{1,2}[-/.]\d{1,2})")
			.ok()?;

	if let Some(capture) = range_re.captures(text)
		&& let (Some(start), Some(end)) = (parse_date(&capture[1]), parse_date(&capture[2]))
	{
		return Some(DateRange {
			start_date: Some(day_start(start, now.offset())),
			end_date: Some(day_end(end, now.offset())),
		});
	}

	let single_re = Regex::new(r"(\d{4}[-/.]\d{1,2}[-/.]\d{1,2})").ok()?;

	if let Some(capture) = single_re.captures(text)
		&& let Some(date) = parse_date(&capture[1])
	{
		return Some(whole_day(date, now.offset()));
	}

	None
}

fn matches_pattern(pattern: &str, text: &str) -> bool {
	Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

fn parse_date(raw: &str) -> Option<Date> {
	let mut parts = raw.split(['-', '/', '.']);
	let year = parts.next()?.parse::<i32>().ok()?;
	let month = parts.next()?.parse::<u8>().ok()?;
	let day = parts.next()?.parse::<u8>().ok()?;

	Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn day_start(date: Date, offset: time::UtcOffset) -> OffsetDateTime {
	PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(offset)
}

fn day_end(date: Date, offset: time::UtcOffset) -> OffsetDateTime {
	let end = Time::from_hms(23, 59, 59).unwrap_or(Time::MIDNIGHT);

	PrimitiveDateTime::new(date, end).assume_offset(offset)
}

fn whole_day(date: Date, offset: time::UtcOffset) -> DateRange {
	DateRange { start_date: Some(day_start(date, offset)), end_date: Some(day_end(date, offset)) }
}

pub fn extract_sender(text: &str) -> Option<String> {
	if let Ok(re) = Regex::new(r"(?i)(?:from:|발신자:|보낸\s*사람:)\s*([^\s,]+)")
		&& let Some(capture) = re.captures(text)
	{
		return Some(capture[1].to_string());
	}
	if let Ok(re) = Regex::new(r"([a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,})")
		&& let Some(capture) = re.captures(text)
	{
		return Some(capture[1].to_string());
	}

	None
}

pub fn extract_recipients(text: &str) -> Vec<String> {
	let mut recipients = Vec::new();

	if let Ok(re) = Regex::new(r"(?i)(?:to:|수신자:|받는\s*사람:)\s*([^\s,]+)")
		&& let Some(capture) = re.captures(text)
	{
		recipients.push(capture[1].to_string());
	}

	recipients
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn explicit_range_parses_all_separators() {
		let now = datetime!(2025-03-10 12:00 UTC);
		let range = parse_date_filters("2025-01-01 ~ 2025/02/15", now)
			.expect("Range must be extracted.");

		assert_eq!(range.start_date, Some(datetime!(2025-01-01 00:00 UTC)));
		assert_eq!(range.end_date, Some(datetime!(2025-02-15 23:59:59 UTC)));
	}

	#[test]
	fn single_date_covers_the_whole_day() {
		let now = datetime!(2025-03-10 12:00 UTC);
		let range =
			parse_date_filters("메일 2025.03.01 확인", now).expect("Date must be extracted.");

		assert_eq!(range.start_date, Some(datetime!(2025-03-01 00:00 UTC)));
		assert_eq!(range.end_date, Some(datetime!(2025-03-01 23:59:59 UTC)));
	}

	#[test]
	fn yesterday_is_relative_to_now() {
		let now = datetime!(2025-03-10 09:30 UTC);
		let range = parse_date_filters("어제 받은 메일", now).expect("Range must be extracted.");

		assert_eq!(range.start_date, Some(datetime!(2025-03-09 00:00 UTC)));
		assert_eq!(range.end_date, Some(datetime!(2025-03-09 23:59:59 UTC)));
	}

	#[test]
	fn this_week_starts_monday_and_ends_now() {
		// 2025-03-12 is a Wednesday.
		let now = datetime!(2025-03-12 15:00 UTC);
		let range = parse_date_filters("this week reports", now).expect("Range must be extracted.");

		assert_eq!(range.start_date, Some(datetime!(2025-03-10 00:00 UTC)));
		assert_eq!(range.end_date, Some(now));
	}

	#[test]
	fn sender_prefers_from_token_over_bare_email() {
		let sender = extract_sender("from: kim@example.com 그리고 lee@example.com");

		assert_eq!(sender.as_deref(), Some("kim@example.com"));

		let fallback = extract_sender("회신 lee@example.com 참조");

		assert_eq!(fallback.as_deref(), Some("lee@example.com"));
	}

	#[test]
	fn merge_keeps_explicit_fields() {
		let explicit = SearchFilters {
			sender: Some("boss@example.com".to_string()),
			..SearchFilters::default()
		};
		let extracted = SearchFilters {
			sender: Some("other@example.com".to_string()),
			has_attachments: Some(true),
			..SearchFilters::default()
		};
		let merged = merge_filters(&explicit, &extracted);

		assert_eq!(merged.sender.as_deref(), Some("boss@example.com"));
		assert_eq!(merged.has_attachments, Some(true));
	}
}
