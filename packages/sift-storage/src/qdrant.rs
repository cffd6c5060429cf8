use qdrant_client::qdrant::{Filter, Query, QueryPointsBuilder, ScoredPoint};

use crate::Result;

/// How a collection stores its vectors. Resolved once from config;
/// never re-derived from the collection name at query time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VectorMode {
	Unnamed,
	Named(String),
}

/// One searchable collection with its merge weight and vector layout,
/// kept in configured (priority) order.
#[derive(Clone, Debug)]
pub struct CollectionProfile {
	pub name: String,
	pub weight: f32,
	pub mode: VectorMode,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collections: Vec<CollectionProfile>,
	pub default_collection: String,
}
impl QdrantStore {
	pub fn new(cfg: &sift_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;
		let collections = cfg
			.collections
			.iter()
			.map(|collection| CollectionProfile {
				name: collection.name.clone(),
				weight: collection.weight,
				mode: match &collection.vector_name {
					Some(slot) => VectorMode::Named(slot.clone()),
					None => VectorMode::Unnamed,
				},
			})
			.collect();

		Ok(Self { client, collections, default_collection: cfg.default_collection.clone() })
	}

	pub fn profile(&self, name: &str) -> Option<&CollectionProfile> {
		self.collections.iter().find(|profile| profile.name == name)
	}

	pub fn collection_names(&self) -> Vec<String> {
		self.collections.iter().map(|profile| profile.name.clone()).collect()
	}

	pub async fn search(
		&self,
		profile: &CollectionProfile,
		vector: Vec<f32>,
		filter: Option<Filter>,
		limit: u64,
		score_threshold: Option<f32>,
	) -> Result<Vec<ScoredPoint>> {
		let mut search = QueryPointsBuilder::new(profile.name.clone())
			.query(Query::new_nearest(vector))
			.limit(limit)
			.with_payload(true);

		if let VectorMode::Named(slot) = &profile.mode {
			search = search.using(slot.clone());
		}
		if let Some(filter) = filter {
			search = search.filter(filter);
		}
		if let Some(threshold) = score_threshold {
			search = search.score_threshold(threshold);
		}

		let response = self.client.query(search).await?;

		Ok(response.result)
	}

	pub async fn list_collections(&self) -> Result<Vec<String>> {
		let response = self.client.list_collections().await?;

		Ok(response.collections.into_iter().map(|collection| collection.name).collect())
	}
}
