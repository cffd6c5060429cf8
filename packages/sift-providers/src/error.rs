pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Provider failures split by how callers should react: rate limits and
/// timeouts are retryable with different backoffs, everything else is
/// terminal for the attempt.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider rate limited the request.")]
	RateLimited,
	#[error("Provider request timed out: {message}")]
	Timeout { message: String },
	#[error("Provider request failed: {message}")]
	Api { message: String },
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	pub fn is_rate_limited(&self) -> bool {
		matches!(self, Self::RateLimited)
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Self::Timeout { message: err.to_string() }
		} else if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
			Self::RateLimited
		} else {
			Self::Api { message: err.to_string() }
		}
	}
}
