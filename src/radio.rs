use std::{
	collections::{HashMap, HashSet},
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex, MutexGuard},
};

use serenity::{model::id::GuildId, prelude::TypeMapKey};
use tokio::{
	sync::{
		mpsc::{self, UnboundedReceiver},
		Notify,
	},
	task::JoinHandle,
	time::{sleep, sleep_until, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
	config::Config,
	notify::{Notifier, StatusEvent},
	session::{RadioError, SessionEvent, Timeouts},
	verify::StreamVerifier,
	voice::{VoiceBackend, VoiceConn},
};

pub(crate) struct RadioKey;

impl TypeMapKey for RadioKey {
	type Value = Radio;
}

/// One guild's live radio session.
struct ActiveSession {
	conn: Box<dyn VoiceConn>,
	/// Wakes the session's monitor so it winds down with the session.
	shutdown: Arc<Notify>,
	/// Consecutive stream failures since the player last reported playing.
	retry_count: u32,
	/// Set once an operator teardown is in progress. Monotonic: suppresses
	/// the reconnect path for events that are already in flight.
	intentional: bool,
	autopaused: bool,
}

/// A session between teardown and its scheduled reconnect attempt.
struct PendingReconnect {
	attempt: u32,
	task: JoinHandle<()>,
}

enum Slot {
	Active(ActiveSession),
	Reconnecting(PendingReconnect),
}

struct RadioInner {
	config: Arc<Config>,
	timeouts: Timeouts,
	verifier: Arc<dyn StreamVerifier>,
	backend: Arc<dyn VoiceBackend>,
	notifier: Arc<dyn Notifier>,
	/// Guilds with a verify/join sequence in flight. Keeps admission
	/// duplicate-free before a registry entry exists.
	pending: Mutex<HashSet<GuildId>>,
	/// The session registry: at most one entry per guild.
	sessions: Mutex<HashMap<GuildId, Slot>>,
}

/// Drives the voice-session lifecycle and owns the per-guild registry.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub(crate) struct Radio {
	inner: Arc<RadioInner>,
}

impl Radio {
	pub fn new(
		config: Arc<Config>,
		timeouts: Timeouts,
		verifier: Arc<dyn StreamVerifier>,
		backend: Arc<dyn VoiceBackend>,
		notifier: Arc<dyn Notifier>,
	) -> Self {
		Self {
			inner: Arc::new(RadioInner {
				config,
				timeouts,
				verifier,
				backend,
				notifier,
				pending: Mutex::new(HashSet::new()),
				sessions: Mutex::new(HashMap::new()),
			}),
		}
	}

	pub fn config(&self) -> &Config {
		&self.inner.config
	}

	/// True while a session exists or a start sequence is in flight.
	pub fn is_busy(&self, guild: GuildId) -> bool {
		self.sessions().contains_key(&guild) || self.pending().contains(&guild)
	}

	/// True while the registry holds a session for the guild.
	pub fn has_session(&self, guild: GuildId) -> bool {
		self.sessions().contains_key(&guild)
	}

	pub async fn publish(&self, event: StatusEvent) {
		self.inner.notifier.publish(event).await;
	}

	/// Admission plus the full verify → join → play sequence. A duplicate
	/// request is rejected before any asynchronous work runs.
	pub async fn start(&self, guild: GuildId) -> Result<(), RadioError> {
		self.admit(guild)?;

		let result = self.run_start(guild, 0, Instant::now()).await;
		self.pending().remove(&guild);
		if let Err(e) = &result {
			warn!("Could not start session for guild {}: {}", guild, e);
			self.publish(StatusEvent::StartFailed(e.to_string())).await;
		}

		result
	}

	/// Operator teardown. The registry entry is removed before any handle
	/// is touched, so events still in flight find nothing to act on.
	pub async fn stop(&self, guild: GuildId) -> Result<(), RadioError> {
		let slot = {
			let mut sessions = self.sessions();
			if let Some(Slot::Active(session)) = sessions.get_mut(&guild) {
				session.intentional = true;
			}
			sessions.remove(&guild)
		};

		match slot {
			None => Err(RadioError::NotActive),
			Some(Slot::Active(session)) => {
				session.shutdown.notify_one();
				session.conn.stop();
				session.conn.disconnect().await;
				info!("Session for guild {} torn down", guild);
				Ok(())
			}
			Some(Slot::Reconnecting(reconnect)) => {
				reconnect.task.abort();
				debug!("Cancelled pending reconnect for guild {}", guild);
				Ok(())
			}
		}
	}

	/// Intentional teardown followed by a fresh start, with a settle pause
	/// so the voice slot is fully released before it is taken again.
	pub async fn restart(&self, guild: GuildId) -> Result<(), RadioError> {
		self.stop(guild).await?;
		sleep(self.inner.timeouts.settle).await;
		self.start(guild).await
	}

	/// Autopause: an empty voice channel pauses the player, listeners
	/// returning resume it. Never treated as a stream failure.
	pub async fn occupancy_changed(&self, guild: GuildId, humans: usize) {
		let change = {
			let mut sessions = self.sessions();
			match sessions.get_mut(&guild) {
				Some(Slot::Active(session)) => {
					if humans == 0 && !session.autopaused {
						session.autopaused = true;
						session.conn.pause();
						Some(StatusEvent::AutoPaused)
					} else if humans > 0 && session.autopaused {
						session.autopaused = false;
						session.conn.resume();
						Some(StatusEvent::Resumed)
					} else {
						None
					}
				}
				_ => None,
			}
		};

		if let Some(event) = change {
			self.publish(event).await;
		}
	}

	fn admit(&self, guild: GuildId) -> Result<(), RadioError> {
		if self.sessions().contains_key(&guild) {
			return Err(RadioError::AlreadyActive);
		}
		if !self.pending().insert(guild) {
			return Err(RadioError::AlreadyActive);
		}

		Ok(())
	}

	/// The verify → join → play sequence. The caller must hold the guild's
	/// pending reservation until this returns; the registry entry is only
	/// created once everything succeeded.
	async fn run_start(
		&self,
		guild: GuildId,
		prior_failures: u32,
		started: Instant,
	) -> Result<(), RadioError> {
		self.publish(StatusEvent::Verifying).await;
		let stream = self
			.inner
			.verifier
			.verify(&self.inner.config.stream_url)
			.await?;
		info!("Stream verified at {}", stream.url);
		self.publish(StatusEvent::Verified).await;

		let (tx, rx) = mpsc::unbounded_channel();
		let conn = self
			.inner
			.backend
			.connect_and_play(guild, self.inner.config.voice_channel, &stream, tx)
			.await?;

		let shutdown = Arc::new(Notify::new());
		self.sessions().insert(
			guild,
			Slot::Active(ActiveSession {
				conn,
				shutdown: shutdown.clone(),
				retry_count: prior_failures,
				intentional: false,
				autopaused: false,
			}),
		);
		tokio::spawn(
			self.clone()
				.monitor(guild, prior_failures, started, rx, shutdown),
		);
		info!("Playback started for guild {}", guild);

		Ok(())
	}

	/// Per-session supervisor: pumps transport/player events, enforces the
	/// session expiry, and arbitrates the disconnect grace window. All
	/// transitions go through the controller, so deleting the session is
	/// enough to silence it.
	async fn monitor(
		self,
		guild: GuildId,
		born_of_attempt: u32,
		started: Instant,
		mut rx: UnboundedReceiver<SessionEvent>,
		shutdown: Arc<Notify>,
	) {
		let expiry = sleep_until(started + self.inner.timeouts.session_ttl);
		tokio::pin!(expiry);
		// Disarmed until the transport reports a disconnect.
		let grace = sleep_until(Instant::now() + self.inner.timeouts.disconnect_grace);
		tokio::pin!(grace);
		let mut grace_armed = false;
		let mut announced = false;

		loop {
			tokio::select! {
				_ = shutdown.notified() => return,
				_ = &mut expiry => {
					self.expire(guild).await;
					return;
				}
				_ = &mut grace, if grace_armed => {
					self.connection_lost(guild).await;
					return;
				}
				event = rx.recv() => match event {
					None => return,
					Some(SessionEvent::Playing) => {
						grace_armed = false;
						self.reset_retries(guild);
						if !announced {
							announced = true;
							let event = if born_of_attempt > 0 {
								StatusEvent::Reconnected
							} else {
								StatusEvent::NowPlaying
							};
							self.publish(event).await;
						}
					}
					Some(SessionEvent::Idle) => {
						if self.handle_stream_drop(guild, started).await {
							return;
						}
					}
					Some(SessionEvent::Disconnected) => {
						warn!(
							"Voice transport for guild {} disconnected, waiting for it to recover",
							guild
						);
						grace
							.as_mut()
							.reset(Instant::now() + self.inner.timeouts.disconnect_grace);
						grace_armed = true;
					}
					Some(SessionEvent::Reconnected) => {
						if grace_armed {
							grace_armed = false;
							info!("Voice transport for guild {} recovered", guild);
							self.publish(StatusEvent::Reconnected).await;
						}
					}
				}
			}
		}
	}

	/// Unexpected player idle: a live stream dropped. Tears the session
	/// down and schedules a fresh start, unless the failure budget is
	/// spent or an operator teardown won the race. Returns true when the
	/// session this monitor watched is gone.
	async fn handle_stream_drop(&self, guild: GuildId, started: Instant) -> bool {
		enum Outcome {
			Ignore,
			Retry { attempt: u32, conn: Box<dyn VoiceConn> },
			GiveUp { conn: Box<dyn VoiceConn> },
		}

		let outcome = {
			let mut sessions = self.sessions();
			let eligible = matches!(
				sessions.get(&guild),
				Some(Slot::Active(session)) if !session.intentional
			);
			if !eligible {
				Outcome::Ignore
			} else {
				match sessions.remove(&guild) {
					Some(Slot::Active(session)) => {
						let attempt = session.retry_count + 1;
						if attempt >= self.inner.timeouts.retry_limit {
							Outcome::GiveUp { conn: session.conn }
						} else {
							let task = self.schedule_reconnect(guild, attempt, started);
							sessions.insert(
								guild,
								Slot::Reconnecting(PendingReconnect { attempt, task }),
							);
							Outcome::Retry {
								attempt,
								conn: session.conn,
							}
						}
					}
					_ => Outcome::Ignore,
				}
			}
		};

		match outcome {
			Outcome::Ignore => false,
			Outcome::Retry { attempt, conn } => {
				warn!(
					"Stream for guild {} went idle, scheduling reconnect attempt {}",
					guild, attempt
				);
				conn.stop();
				conn.disconnect().await;
				self.publish(StatusEvent::StreamInterrupted { attempt }).await;
				true
			}
			Outcome::GiveUp { conn } => {
				error!(
					"Giving up on guild {} after {} consecutive stream failures",
					guild, self.inner.timeouts.retry_limit
				);
				conn.stop();
				conn.disconnect().await;
				self.publish(StatusEvent::RetriesExhausted).await;
				true
			}
		}
	}

	/// A scheduled reconnect attempt: swap the placeholder for a fresh
	/// start, and either install the new session, schedule the next
	/// attempt, or give up.
	async fn try_reconnect(&self, guild: GuildId, attempt: u32, started: Instant) {
		let reserved = self.pending().insert(guild);
		if !reserved {
			// An operator start is already in flight.
			return;
		}
		let scheduled = {
			let mut sessions = self.sessions();
			match sessions.get(&guild) {
				Some(Slot::Reconnecting(_)) => {
					sessions.remove(&guild);
					true
				}
				_ => false,
			}
		};
		if !scheduled {
			self.pending().remove(&guild);
			return;
		}

		info!("Reconnect attempt {} for guild {}", attempt, guild);
		match self.run_start(guild, attempt, started).await {
			Ok(()) => {
				self.pending().remove(&guild);
			}
			Err(e) => {
				warn!("Reconnect attempt {} failed: {}", attempt, e);
				let failures = attempt + 1;
				if failures >= self.inner.timeouts.retry_limit {
					self.pending().remove(&guild);
					self.publish(StatusEvent::RetriesExhausted).await;
				} else {
					let task = self.schedule_reconnect(guild, failures, started);
					self.sessions().insert(
						guild,
						Slot::Reconnecting(PendingReconnect {
							attempt: failures,
							task,
						}),
					);
					self.pending().remove(&guild);
					self.publish(StatusEvent::ReconnectFailed { attempt }).await;
				}
			}
		}
	}

	fn schedule_reconnect(&self, guild: GuildId, attempt: u32, started: Instant) -> JoinHandle<()> {
		let radio = self.clone();
		tokio::spawn(async move {
			sleep(radio.inner.timeouts.retry_delay).await;
			radio.reconnect_boxed(guild, attempt, started).await;
		})
	}

	// Boxed so the reconnect cycle does not recurse at the type level.
	fn reconnect_boxed(
		&self,
		guild: GuildId,
		attempt: u32,
		started: Instant,
	) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
		Box::pin(self.try_reconnect(guild, attempt, started))
	}

	async fn expire(&self, guild: GuildId) {
		if let Some(conn) = self.remove_active(guild) {
			conn.stop();
			conn.disconnect().await;
			info!("Session for guild {} reached its expiry", guild);
			self.publish(StatusEvent::Expired).await;
		}
	}

	async fn connection_lost(&self, guild: GuildId) {
		if let Some(conn) = self.remove_active(guild) {
			conn.stop();
			conn.disconnect().await;
			warn!("Voice connection for guild {} could not recover", guild);
			self.publish(StatusEvent::ConnectionLost).await;
		}
	}

	/// Removes the guild's session if it is active, yielding the transport.
	fn remove_active(&self, guild: GuildId) -> Option<Box<dyn VoiceConn>> {
		let mut sessions = self.sessions();
		match sessions.remove(&guild) {
			Some(Slot::Active(session)) => Some(session.conn),
			Some(other) => {
				sessions.insert(guild, other);
				None
			}
			None => None,
		}
	}

	fn reset_retries(&self, guild: GuildId) {
		if let Some(Slot::Active(session)) = self.sessions().get_mut(&guild) {
			session.retry_count = 0;
		}
	}

	fn sessions(&self) -> MutexGuard<'_, HashMap<GuildId, Slot>> {
		self.inner.sessions.lock().expect("session registry poisoned")
	}

	fn pending(&self) -> MutexGuard<'_, HashSet<GuildId>> {
		self.inner.pending.lock().expect("pending set poisoned")
	}

	#[cfg(test)]
	fn retry_count(&self, guild: GuildId) -> Option<u32> {
		match self.sessions().get(&guild) {
			Some(Slot::Active(session)) => Some(session.retry_count),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
		time::Duration,
	};

	use serenity::{
		async_trait,
		model::id::{ChannelId, RoleId},
	};
	use tokio::sync::mpsc::UnboundedSender;

	use super::*;
	use crate::{
		session::ConnectError,
		verify::{StreamError, VerifiedStream},
	};

	const GUILD: GuildId = GuildId(10);

	fn test_config() -> Arc<Config> {
		Arc::new(Config {
			discord_token: "token".into(),
			client_id: 1,
			guild: GUILD,
			user_role: RoleId(20),
			admin_role: RoleId(21),
			voice_channel: ChannelId(30),
			text_channel: ChannelId(31),
			stream_url: "http://radio.example/listen".into(),
			testing_mode: true,
		})
	}

	fn fast_timeouts() -> Timeouts {
		Timeouts {
			first_byte: Duration::from_millis(50),
			voice_ready: Duration::from_millis(50),
			disconnect_grace: Duration::from_millis(40),
			retry_delay: Duration::from_millis(10),
			settle: Duration::from_millis(10),
			session_ttl: Duration::from_secs(60),
			retry_limit: 5,
		}
	}

	#[derive(Default)]
	struct StubVerifier {
		fail: AtomicBool,
		delay_ms: AtomicU64,
	}

	#[async_trait]
	impl StreamVerifier for StubVerifier {
		async fn verify(&self, url: &str) -> Result<VerifiedStream, StreamError> {
			let delay = self.delay_ms.load(Ordering::SeqCst);
			if delay > 0 {
				sleep(Duration::from_millis(delay)).await;
			}
			if self.fail.load(Ordering::SeqCst) {
				Err(StreamError::EndedEarly)
			} else {
				Ok(VerifiedStream {
					url: url.to_string(),
					content_type: None,
				})
			}
		}
	}

	#[derive(Default)]
	struct ConnStats {
		pauses: AtomicUsize,
		resumes: AtomicUsize,
		stops: AtomicUsize,
		disconnects: AtomicUsize,
	}

	struct StubConn {
		stats: Arc<ConnStats>,
	}

	#[async_trait]
	impl VoiceConn for StubConn {
		fn pause(&self) {
			self.stats.pauses.fetch_add(1, Ordering::SeqCst);
		}

		fn resume(&self) {
			self.stats.resumes.fetch_add(1, Ordering::SeqCst);
		}

		fn stop(&self) {
			self.stats.stops.fetch_add(1, Ordering::SeqCst);
		}

		async fn disconnect(&self) {
			self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
		}
	}

	#[derive(Default)]
	struct StubBackend {
		connects: AtomicUsize,
		/// Fail this many upcoming connect attempts.
		fail_next: AtomicUsize,
		taps: Mutex<Vec<UnboundedSender<SessionEvent>>>,
		stats: Mutex<Vec<Arc<ConnStats>>>,
	}

	impl StubBackend {
		fn last_tap(&self) -> UnboundedSender<SessionEvent> {
			self.taps.lock().unwrap().last().unwrap().clone()
		}

		fn conn_stats(&self, index: usize) -> Arc<ConnStats> {
			self.stats.lock().unwrap()[index].clone()
		}
	}

	#[async_trait]
	impl VoiceBackend for StubBackend {
		async fn connect_and_play(
			&self,
			_guild: GuildId,
			_channel: ChannelId,
			_stream: &VerifiedStream,
			events: UnboundedSender<SessionEvent>,
		) -> Result<Box<dyn VoiceConn>, ConnectError> {
			self.connects.fetch_add(1, Ordering::SeqCst);
			if self.fail_next.load(Ordering::SeqCst) > 0 {
				self.fail_next.fetch_sub(1, Ordering::SeqCst);
				return Err(ConnectError::ReadyTimeout(Duration::from_millis(1)));
			}

			let stats = Arc::new(ConnStats::default());
			self.stats.lock().unwrap().push(stats.clone());
			self.taps.lock().unwrap().push(events);
			Ok(Box::new(StubConn { stats }))
		}
	}

	#[derive(Default)]
	struct RecordingNotifier {
		events: Mutex<Vec<StatusEvent>>,
	}

	impl RecordingNotifier {
		fn seen(&self) -> Vec<StatusEvent> {
			self.events.lock().unwrap().clone()
		}

		fn saw(&self, wanted: &StatusEvent) -> bool {
			self.seen().iter().any(|event| event == wanted)
		}

		fn count(&self, wanted: &StatusEvent) -> usize {
			self.seen().iter().filter(|event| *event == wanted).count()
		}
	}

	#[async_trait]
	impl Notifier for RecordingNotifier {
		async fn publish(&self, event: StatusEvent) {
			self.events.lock().unwrap().push(event);
		}
	}

	struct Harness {
		radio: Radio,
		verifier: Arc<StubVerifier>,
		backend: Arc<StubBackend>,
		notifier: Arc<RecordingNotifier>,
	}

	fn harness(timeouts: Timeouts) -> Harness {
		let verifier = Arc::new(StubVerifier::default());
		let backend = Arc::new(StubBackend::default());
		let notifier = Arc::new(RecordingNotifier::default());
		let radio = Radio::new(
			test_config(),
			timeouts,
			verifier.clone(),
			backend.clone(),
			notifier.clone(),
		);

		Harness {
			radio,
			verifier,
			backend,
			notifier,
		}
	}

	#[tokio::test]
	async fn second_play_is_rejected_while_first_verifies() {
		let h = harness(fast_timeouts());
		h.verifier.delay_ms.store(50, Ordering::SeqCst);

		let radio = h.radio.clone();
		let first = tokio::spawn(async move { radio.start(GUILD).await });
		sleep(Duration::from_millis(10)).await;

		assert!(matches!(
			h.radio.start(GUILD).await,
			Err(RadioError::AlreadyActive)
		));
		assert!(first.await.unwrap().is_ok());
		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn verification_failure_leaves_registry_empty() {
		let h = harness(fast_timeouts());
		h.verifier.fail.store(true, Ordering::SeqCst);

		assert!(matches!(
			h.radio.start(GUILD).await,
			Err(RadioError::Verification(_))
		));
		assert!(!h.radio.is_busy(GUILD));
		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 0);
		assert!(h
			.notifier
			.seen()
			.iter()
			.any(|event| matches!(event, StatusEvent::StartFailed(_))));
	}

	#[tokio::test]
	async fn join_failure_leaves_registry_empty() {
		let h = harness(fast_timeouts());
		h.backend.fail_next.store(1, Ordering::SeqCst);

		assert!(matches!(
			h.radio.start(GUILD).await,
			Err(RadioError::Connect(_))
		));
		assert!(!h.radio.is_busy(GUILD));
	}

	#[tokio::test]
	async fn end_is_idempotent() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		assert!(h.radio.is_busy(GUILD));

		h.radio.stop(GUILD).await.unwrap();
		assert!(!h.radio.is_busy(GUILD));
		assert!(matches!(
			h.radio.stop(GUILD).await,
			Err(RadioError::NotActive)
		));
		assert_eq!(h.backend.conn_stats(0).disconnects.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn idle_after_stop_never_reconnects() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		let tap = h.backend.last_tap();

		h.radio.stop(GUILD).await.unwrap();
		let _ = tap.send(SessionEvent::Idle);
		sleep(Duration::from_millis(50)).await;

		assert!(!h.radio.is_busy(GUILD));
		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn stream_drop_reconnects_and_resets_budget() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		h.backend.last_tap().send(SessionEvent::Playing).unwrap();
		sleep(Duration::from_millis(10)).await;

		h.backend.last_tap().send(SessionEvent::Idle).unwrap();
		sleep(Duration::from_millis(80)).await;

		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 2);
		assert!(h.radio.has_session(GUILD));
		assert!(h
			.notifier
			.saw(&StatusEvent::StreamInterrupted { attempt: 1 }));

		h.backend.last_tap().send(SessionEvent::Playing).unwrap();
		sleep(Duration::from_millis(20)).await;

		assert_eq!(h.radio.retry_count(GUILD), Some(0));
		assert!(h.notifier.saw(&StatusEvent::Reconnected));
		assert_eq!(h.backend.conn_stats(0).disconnects.load(Ordering::SeqCst), 1);
		assert_eq!(h.backend.conn_stats(1).disconnects.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn five_consecutive_failures_exhaust_the_budget() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();

		// Every reconnect attempt fails, so the budget drains completely.
		h.backend.fail_next.store(4, Ordering::SeqCst);
		h.backend.last_tap().send(SessionEvent::Idle).unwrap();
		sleep(Duration::from_millis(300)).await;

		assert!(!h.radio.is_busy(GUILD));
		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 5);
		assert!(h.notifier.saw(&StatusEvent::RetriesExhausted));
	}

	#[tokio::test]
	async fn recovery_before_the_ceiling_keeps_the_session() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();

		// Three failed attempts, then the fourth connects again.
		h.backend.fail_next.store(3, Ordering::SeqCst);
		h.backend.last_tap().send(SessionEvent::Idle).unwrap();
		sleep(Duration::from_millis(300)).await;

		assert!(h.radio.has_session(GUILD));
		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 5);

		h.backend.last_tap().send(SessionEvent::Playing).unwrap();
		sleep(Duration::from_millis(20)).await;

		assert_eq!(h.radio.retry_count(GUILD), Some(0));
		assert!(!h.notifier.saw(&StatusEvent::RetriesExhausted));
	}

	#[tokio::test]
	async fn restart_replaces_the_session() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		let old_tap = h.backend.last_tap();

		h.radio.restart(GUILD).await.unwrap();
		sleep(Duration::from_millis(30)).await;

		assert!(h.radio.has_session(GUILD));
		assert_eq!(h.backend.connects.load(Ordering::SeqCst), 2);
		assert_eq!(h.backend.conn_stats(0).disconnects.load(Ordering::SeqCst), 1);
		// The old session's monitor is gone; its events fall on the floor.
		assert!(old_tap.send(SessionEvent::Idle).is_err());
	}

	#[tokio::test]
	async fn restart_without_session_is_rejected() {
		let h = harness(fast_timeouts());
		assert!(matches!(
			h.radio.restart(GUILD).await,
			Err(RadioError::NotActive)
		));
	}

	#[tokio::test]
	async fn session_expires_at_the_horizon() {
		let mut timeouts = fast_timeouts();
		timeouts.session_ttl = Duration::from_millis(60);
		let h = harness(timeouts);
		h.radio.start(GUILD).await.unwrap();

		sleep(Duration::from_millis(150)).await;

		assert!(!h.radio.is_busy(GUILD));
		assert!(h.notifier.saw(&StatusEvent::Expired));
		assert_eq!(h.backend.conn_stats(0).disconnects.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn transport_self_heal_within_grace_keeps_the_session() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		let tap = h.backend.last_tap();

		tap.send(SessionEvent::Disconnected).unwrap();
		sleep(Duration::from_millis(10)).await;
		tap.send(SessionEvent::Reconnected).unwrap();
		sleep(Duration::from_millis(80)).await;

		assert!(h.radio.has_session(GUILD));
		assert!(!h.notifier.saw(&StatusEvent::ConnectionLost));
		assert!(h.notifier.saw(&StatusEvent::Reconnected));
	}

	#[tokio::test]
	async fn unrecovered_disconnect_tears_down() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();

		h.backend.last_tap().send(SessionEvent::Disconnected).unwrap();
		sleep(Duration::from_millis(120)).await;

		assert!(!h.radio.is_busy(GUILD));
		assert!(h.notifier.saw(&StatusEvent::ConnectionLost));
		assert_eq!(h.backend.conn_stats(0).disconnects.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn empty_channel_pauses_and_listeners_resume() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		let stats = h.backend.conn_stats(0);

		h.radio.occupancy_changed(GUILD, 0).await;
		assert_eq!(stats.pauses.load(Ordering::SeqCst), 1);
		assert!(h.notifier.saw(&StatusEvent::AutoPaused));

		// Already paused: a second empty report changes nothing.
		h.radio.occupancy_changed(GUILD, 0).await;
		assert_eq!(stats.pauses.load(Ordering::SeqCst), 1);

		h.radio.occupancy_changed(GUILD, 3).await;
		assert_eq!(stats.resumes.load(Ordering::SeqCst), 1);
		assert!(h.notifier.saw(&StatusEvent::Resumed));
	}

	#[tokio::test]
	async fn playing_is_announced_once() {
		let h = harness(fast_timeouts());
		h.radio.start(GUILD).await.unwrap();
		let tap = h.backend.last_tap();

		tap.send(SessionEvent::Playing).unwrap();
		tap.send(SessionEvent::Playing).unwrap();
		sleep(Duration::from_millis(30)).await;

		assert_eq!(h.notifier.count(&StatusEvent::NowPlaying), 1);
	}
}
