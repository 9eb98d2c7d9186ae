use serenity::async_trait;
use songbird::{Event, EventContext, EventHandler as VoiceEventHandler};
use tokio::sync::mpsc::UnboundedSender;

use crate::session::SessionEvent;

/// Forwards a fixed event into the owning session's channel.
///
/// Once the session is gone its receiver is closed, and the relay asks
/// the driver to drop it.
pub(crate) struct EventRelay {
	tx: UnboundedSender<SessionEvent>,
	event: SessionEvent,
}

impl EventRelay {
	pub fn new(tx: UnboundedSender<SessionEvent>, event: SessionEvent) -> Self {
		Self { tx, event }
	}
}

#[async_trait]
impl VoiceEventHandler for EventRelay {
	async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
		if self.tx.send(self.event).is_err() {
			return Some(Event::Cancel);
		}

		None
	}
}
