use std::sync::Arc;

use serenity::{async_trait, http::Http, model::id::ChannelId};
use tracing::{info, warn};

/// Observability events the controller emits as a session progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatusEvent {
	Verifying,
	Verified,
	NowPlaying,
	Reconnected,
	AutoPaused,
	Resumed,
	StreamInterrupted { attempt: u32 },
	ReconnectFailed { attempt: u32 },
	RetriesExhausted,
	ConnectionLost,
	Expired,
	Stopped,
	Restarting,
	StartFailed(String),
}

impl StatusEvent {
	fn message(&self) -> String {
		match self {
			Self::Verifying => "📻 Accessing wTed Radio stream...".into(),
			Self::Verified => "✅ Stream verified. Connecting to voice...".into(),
			Self::NowPlaying => "🎶 **Now playing wTed Radio!** Enjoy the tunes.".into(),
			Self::Reconnected => "🎶 Reconnected. wTed Radio is back on air.".into(),
			Self::AutoPaused => "⏸️ Voice channel is empty, pausing the stream.".into(),
			Self::Resumed => "▶️ Listeners are back, resuming the stream.".into(),
			Self::StreamInterrupted { attempt } => format!(
				"⚠️ Stream interrupted. Attempting to reconnect... (attempt {})",
				attempt
			),
			Self::ReconnectFailed { attempt } => format!(
				"❌ Reconnect attempt {} failed. Trying again shortly.",
				attempt
			),
			Self::RetriesExhausted => {
				"❌ **Reconnect failed.** Please start the bot again with `~play`.".into()
			}
			Self::ConnectionLost => {
				"⚠️ Connection lost. Could not reconnect automatically.".into()
			}
			Self::Expired => {
				"⏰ wTed bot 3-hour session has ended. Use `~play` to start it again.".into()
			}
			Self::Stopped => "🛑 wTed Radio has been stopped by an admin.".into(),
			Self::Restarting => "🔄 Restarting wTed Radio...".into(),
			Self::StartFailed(reason) => format!("❌ **Failed to start radio:** {}", reason),
		}
	}
}

/// One-way sink for status notices. Failures stay inside the sink and
/// never reach the controller.
#[async_trait]
pub(crate) trait Notifier: Send + Sync {
	async fn publish(&self, event: StatusEvent);
}

/// Posts notices to the configured text channel.
pub(crate) struct ChannelNotifier {
	http: Arc<Http>,
	channel: ChannelId,
}

impl ChannelNotifier {
	pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
		Self { http, channel }
	}
}

#[async_trait]
impl Notifier for ChannelNotifier {
	async fn publish(&self, event: StatusEvent) {
		if let Err(e) = self.channel.say(&self.http, event.message()).await {
			warn!("Could not post status notice {:?}: {}", event, e);
		}
	}
}

/// Testing-mode sink: notices only reach the log.
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
	async fn publish(&self, event: StatusEvent) {
		info!("status: {}", event.message());
	}
}
