use std::{sync::Arc, time::Duration};

use serenity::{
	async_trait,
	model::id::{ChannelId, GuildId},
};
use songbird::{
	input::Restartable,
	tracks::{create_player, TrackHandle},
	CoreEvent, Event, Songbird, TrackEvent,
};
use tokio::{sync::mpsc::UnboundedSender, time::timeout};
use tracing::{debug, error};

use crate::{
	events::EventRelay,
	session::{ConnectError, SessionEvent},
	verify::VerifiedStream,
};

/// A live voice connection with an exclusive player, owned by one session.
#[async_trait]
pub(crate) trait VoiceConn: Send + Sync {
	fn pause(&self);
	fn resume(&self);
	fn stop(&self);
	async fn disconnect(&self);
}

/// Joins voice channels and starts playback on them.
#[async_trait]
pub(crate) trait VoiceBackend: Send + Sync {
	async fn connect_and_play(
		&self,
		guild: GuildId,
		channel: ChannelId,
		stream: &VerifiedStream,
		events: UnboundedSender<SessionEvent>,
	) -> Result<Box<dyn VoiceConn>, ConnectError>;
}

pub(crate) struct SongbirdBackend {
	manager: Arc<Songbird>,
	voice_ready: Duration,
}

impl SongbirdBackend {
	pub fn new(manager: Arc<Songbird>, voice_ready: Duration) -> Self {
		Self {
			manager,
			voice_ready,
		}
	}
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
	async fn connect_and_play(
		&self,
		guild: GuildId,
		channel: ChannelId,
		stream: &VerifiedStream,
		events: UnboundedSender<SessionEvent>,
	) -> Result<Box<dyn VoiceConn>, ConnectError> {
		let (handler_lock, success) =
			match timeout(self.voice_ready, self.manager.join(guild, channel)).await {
				Ok(joined) => joined,
				Err(_) => {
					// A half-open transport may be left behind, drop it.
					let _ = self.manager.remove(guild).await;
					return Err(ConnectError::ReadyTimeout(self.voice_ready));
				}
			};

		if let Err(e) = success {
			let _ = self.manager.remove(guild).await;
			return Err(ConnectError::Join(e));
		}

		// Eager source creation: a dead URL fails the start here instead
		// of leaving the bot connected and silent.
		let source = match Restartable::ffmpeg(stream.url.clone(), false).await {
			Ok(source) => source,
			Err(e) => {
				let _ = self.manager.remove(guild).await;
				return Err(ConnectError::Source(format!("{:?}", e)));
			}
		};

		if let Some(content_type) = &stream.content_type {
			debug!("Opening stream advertised as {}", content_type);
		}

		let (track, track_handle) = create_player(source.into());

		{
			let mut handler = handler_lock.lock().await;
			handler.add_global_event(
				Event::Core(CoreEvent::DriverDisconnect),
				EventRelay::new(events.clone(), SessionEvent::Disconnected),
			);
			handler.add_global_event(
				Event::Core(CoreEvent::DriverReconnect),
				EventRelay::new(events.clone(), SessionEvent::Reconnected),
			);
			let _ = track_handle.add_event(
				Event::Track(TrackEvent::Play),
				EventRelay::new(events.clone(), SessionEvent::Playing),
			);
			let _ = track_handle.add_event(
				Event::Track(TrackEvent::End),
				EventRelay::new(events, SessionEvent::Idle),
			);
			handler.play_only(track);
		}

		Ok(Box::new(SongbirdConn {
			manager: self.manager.clone(),
			guild,
			track: track_handle,
		}))
	}
}

struct SongbirdConn {
	manager: Arc<Songbird>,
	guild: GuildId,
	track: TrackHandle,
}

#[async_trait]
impl VoiceConn for SongbirdConn {
	fn pause(&self) {
		let _ = self.track.pause();
	}

	fn resume(&self) {
		let _ = self.track.play();
	}

	fn stop(&self) {
		let _ = self.track.stop();
	}

	async fn disconnect(&self) {
		if let Err(e) = self.manager.remove(self.guild).await {
			error!("Could not leave voice channel: {:?}", e);
		}
	}
}
