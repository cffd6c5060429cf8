pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid query: {reason}")]
	InvalidQuery { reason: String },
	#[error("Embedding unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Vector store error: {message}")]
	VectorStore { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<sift_storage::Error> for Error {
	fn from(err: sift_storage::Error) -> Self {
		match err {
			sift_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			sift_storage::Error::InvalidArgument(message) => Self::InvalidQuery { reason: message },
			sift_storage::Error::NotFound(message) | sift_storage::Error::Conflict(message) =>
				Self::Storage { message },
			sift_storage::Error::Qdrant(inner) => Self::VectorStore { message: inner.to_string() },
		}
	}
}

impl From<sift_domain::query::QueryRejection> for Error {
	fn from(rejection: sift_domain::query::QueryRejection) -> Self {
		Self::InvalidQuery { reason: rejection.message().to_string() }
	}
}
