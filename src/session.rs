use std::time::Duration;

use songbird::error::JoinError;

use crate::verify::StreamError;

/// Events a live session's transport and player feed into its monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEvent {
	/// The player started (or resumed) producing audio.
	Playing,
	/// The player ran out of audio. A live radio stream never ends on its
	/// own, so outside of a teardown this means the stream dropped.
	Idle,
	/// The voice transport lost its connection.
	Disconnected,
	/// The voice transport came back on its own.
	Reconnected,
}

/// Time bounds and the retry budget of the session lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct Timeouts {
	/// Longest wait for the first byte during stream verification.
	pub first_byte: Duration,
	/// Longest wait for the voice transport to become ready.
	pub voice_ready: Duration,
	/// Window for the transport to self-heal after a disconnect.
	pub disconnect_grace: Duration,
	/// Delay between a stream failure and the next reconnect attempt.
	pub retry_delay: Duration,
	/// Pause between teardown and rejoin on `restart`, so the voice slot
	/// is fully released before it is taken again.
	pub settle: Duration,
	/// A session tears itself down this long after it first started.
	pub session_ttl: Duration,
	/// Consecutive stream failures tolerated before the session is
	/// abandoned.
	pub retry_limit: u32,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			first_byte: Duration::from_secs(10),
			voice_ready: Duration::from_secs(20),
			disconnect_grace: Duration::from_secs(5),
			retry_delay: Duration::from_secs(5),
			settle: Duration::from_secs(2),
			session_ttl: Duration::from_secs(3 * 60 * 60),
			retry_limit: 5,
		}
	}
}

/// Failures while joining the voice channel and starting playback.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
	#[error("voice transport not ready within {0:?}")]
	ReadyTimeout(Duration),
	#[error("could not join voice channel: {0:?}")]
	Join(JoinError),
	#[error("could not open audio source: {0}")]
	Source(String),
}

/// Errors surfaced to the command layer.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RadioError {
	#[error("a radio session is already running")]
	AlreadyActive,
	#[error("no radio session is running")]
	NotActive,
	#[error("stream verification failed: {0}")]
	Verification(#[from] StreamError),
	#[error("voice connection failed: {0}")]
	Connect(#[from] ConnectError),
}
