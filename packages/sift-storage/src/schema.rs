pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_documents.sql")),
				"tables/002_search_logs.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_search_logs.sql")),
				"tables/003_search_stats.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_search_stats.sql")),
				"tables/004_search_stat_modes.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_search_stat_modes.sql")),
				"tables/005_search_stat_collections.sql" => out
					.push_str(include_str!("../../../sql/tables/005_search_stat_collections.sql")),
				"tables/006_popular_queries.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_popular_queries.sql")),
				"tables/007_cache_entries.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_cache_entries.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_expands_every_include() {
		let sql = render_schema();

		assert!(!sql.contains("\\ir"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS documents"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS search_logs"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS cache_entries"));
	}
}
