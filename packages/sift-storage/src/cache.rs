use serde_json::Value;
use sqlx::{PgPool, Row};
use time::{Duration, OffsetDateTime};

use crate::Result;

/// TTL'd JSON key-value store on top of the `cache_entries` table.
/// Expired rows are invisible to readers and overwritten by writers;
/// physical removal is a maintenance concern, not a read-path one.
pub struct CacheStore {
	pool: PgPool,
}
impl CacheStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn get(&self, key: &str, now: OffsetDateTime) -> Result<Option<Value>> {
		let row =
			sqlx::query("SELECT payload FROM cache_entries WHERE cache_key = $1 AND expires_at > $2")
				.bind(key)
				.bind(now)
				.fetch_optional(&self.pool)
				.await?;

		match row {
			Some(row) => Ok(Some(row.try_get("payload")?)),
			None => Ok(None),
		}
	}

	pub async fn set(
		&self,
		key: &str,
		payload: &Value,
		now: OffsetDateTime,
		ttl_secs: i64,
	) -> Result<()> {
		let expires_at = now + Duration::seconds(ttl_secs);

		sqlx::query(
			"INSERT INTO cache_entries (cache_key, payload, stored_at, expires_at) \
             VALUES ($1,$2,$3,$4) \
             ON CONFLICT (cache_key) DO UPDATE SET \
             payload = EXCLUDED.payload, \
             stored_at = EXCLUDED.stored_at, \
             expires_at = EXCLUDED.expires_at",
		)
		.bind(key)
		.bind(payload)
		.bind(now)
		.bind(expires_at)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	pub async fn delete(&self, key: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM cache_entries WHERE cache_key = $1")
			.bind(key)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}

	pub async fn exists(&self, key: &str, now: OffsetDateTime) -> Result<bool> {
		let row = sqlx::query(
			"SELECT 1 AS present FROM cache_entries WHERE cache_key = $1 AND expires_at > $2",
		)
		.bind(key)
		.bind(now)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.is_some())
	}

	pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64> {
		let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= $1")
			.bind(now)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}
}
