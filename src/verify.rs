use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, redirect, Client, Response, StatusCode};
use serenity::async_trait;
use tokio::time::timeout;
use tracing::debug;

/// A stream that answered 200 and produced audio bytes.
///
/// Carries the resolved URL (after at most one redirect hop) so playback
/// opens the same target the verifier proved alive.
#[derive(Debug, Clone)]
pub(crate) struct VerifiedStream {
	pub url: String,
	pub content_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StreamError {
	#[error("stream answered HTTP {0}")]
	BadStatus(u16),
	#[error("stream request failed: {0}")]
	Transport(#[from] reqwest::Error),
	#[error("no data received within {0:?}")]
	FirstByteTimeout(Duration),
	#[error("stream ended before any data arrived")]
	EndedEarly,
}

/// Pre-join check that the remote source is live and returning data.
///
/// Joining voice before this check produces a bot that sits in the channel
/// in silence, so the controller never joins on an unverified stream.
#[async_trait]
pub(crate) trait StreamVerifier: Send + Sync {
	async fn verify(&self, url: &str) -> Result<VerifiedStream, StreamError>;
}

pub(crate) struct HttpVerifier {
	client: Client,
	first_byte: Duration,
}

impl HttpVerifier {
	pub fn new(first_byte: Duration) -> Result<Self, StreamError> {
		let client = Client::builder()
			.redirect(redirect::Policy::limited(1))
			.build()?;

		Ok(Self { client, first_byte })
	}
}

#[async_trait]
impl StreamVerifier for HttpVerifier {
	async fn verify(&self, url: &str) -> Result<VerifiedStream, StreamError> {
		let mut response = self.client.get(url).send().await?;

		let status = response.status();
		if status != StatusCode::OK {
			return Err(StreamError::BadStatus(status.as_u16()));
		}

		let verified = VerifiedStream {
			url: response.url().to_string(),
			content_type: response
				.headers()
				.get(CONTENT_TYPE)
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned),
		};

		// Waiting on the body is what separates a live stream from a
		// server that accepts the request and then sits silent.
		match timeout(self.first_byte, first_data_len(&mut response)).await {
			Err(_) => Err(StreamError::FirstByteTimeout(self.first_byte)),
			Ok(Err(e)) => Err(StreamError::Transport(e)),
			Ok(Ok(None)) => Err(StreamError::EndedEarly),
			Ok(Ok(Some(len))) => {
				debug!("Stream at {} verified, first chunk of {} bytes", verified.url, len);
				Ok(verified)
			}
		}
		// Dropping the response closes the verification socket.
	}
}

async fn first_data_len(response: &mut Response) -> Result<Option<usize>, reqwest::Error> {
	loop {
		match response.chunk().await? {
			Some(chunk) if !chunk.is_empty() => return Ok(Some(chunk.len())),
			Some(_) => continue,
			None => return Ok(None),
		}
	}
}
