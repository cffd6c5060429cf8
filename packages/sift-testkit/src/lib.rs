mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime, time};
use uuid::Uuid;

const QDRANT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Base Postgres DSN for integration tests. Suites skip themselves when
/// this is unset.
pub fn env_dsn() -> Option<String> {
	env::var("SIFT_PG_DSN").ok()
}

/// Qdrant URL for integration tests.
pub fn env_qdrant_url() -> Option<String> {
	env::var("SIFT_QDRANT_URL").ok()
}

/// A throwaway Postgres database plus any Qdrant collections the test
/// registers through [`collection_name`](Self::collection_name). Both
/// are removed by [`cleanup`](Self::cleanup); a test that panics before
/// cleaning up is torn down from `Drop` instead.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin: PgConnectOptions,
	collections: Mutex<Vec<String>>,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse SIFT_PG_DSN: {err}.")))?;
		let admin = base.clone().database("postgres");
		let mut conn = PgConnection::connect_with(&admin).await?;
		let name = format!("sift_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin, collections: Mutex::new(Vec::new()), cleaned: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// Derives a collection name unique to this database and registers
	/// it for deletion at cleanup.
	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);

		self.collections.lock().unwrap_or_else(|err| err.into_inner()).push(collection.clone());

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		let result = teardown(&self.name, &self.admin, &self.tracked()).await;

		self.cleaned = true;

		result
	}

	fn tracked(&self) -> Vec<String> {
		self.collections.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let admin = self.admin.clone();
		let collections = self.tracked();
		// Drop cannot await; a short-lived runtime on its own thread
		// runs the same teardown a finished test would have.
		let _ = thread::spawn(move || {
			let Ok(rt) = runtime::Builder::new_current_thread().enable_all().build() else {
				eprintln!("Test teardown skipped: failed to build a runtime.");

				return;
			};

			if let Err(err) = rt.block_on(teardown(&name, &admin, &collections)) {
				eprintln!("Test teardown failed: {err}.");
			}
		})
		.join();
	}
}

async fn teardown(name: &str, admin: &PgConnectOptions, collections: &[String]) -> Result<()> {
	drop_collections(collections).await?;
	drop_database(name, admin).await
}

async fn drop_database(name: &str, admin: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin).await?;

	// Leftover pool connections hold the database open; kick them first.
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	sqlx::query(&format!(r#"DROP DATABASE IF EXISTS "{name}""#)).execute(&mut conn).await?;

	Ok(())
}

/// Deletes the registered collections that actually exist. A test may
/// register a name without ever creating the collection.
async fn drop_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(url) = env_qdrant_url() else {
		return Ok(());
	};
	let client = Qdrant::from_url(&url).build()?;
	let existing = time::timeout(QDRANT_CALL_TIMEOUT, client.list_collections())
		.await
		.map_err(|_| Error::Message("Timed out listing Qdrant collections.".to_string()))??;
	let existing =
		existing.collections.into_iter().map(|description| description.name).collect::<Vec<_>>();

	for collection in collections {
		if !existing.contains(collection) {
			continue;
		}

		time::timeout(QDRANT_CALL_TIMEOUT, client.delete_collection(collection.clone()))
			.await
			.map_err(|_| {
				Error::Message(format!("Timed out deleting Qdrant collection {collection:?}."))
			})??;
	}

	Ok(())
}
