mod commands;
mod config;
mod events;
mod notify;
mod radio;
mod session;
mod utils;
mod verify;
mod voice;

use std::sync::Arc;

use serenity::{
	async_trait,
	framework::{standard::macros::group, StandardFramework},
	http::Http,
	model::{gateway::Ready, id::GuildId, voice::VoiceState},
	prelude::*,
};

use songbird::{serenity::SerenityInit, Songbird};

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{end::*, play::*, restart::*};
use config::Config;
use notify::{ChannelNotifier, LogNotifier, Notifier};
use radio::{Radio, RadioKey};
use session::Timeouts;
use verify::HttpVerifier;
use voice::SongbirdBackend;

struct Handler;

#[async_trait]
impl EventHandler for Handler {
	async fn ready(&self, _: Context, ready: Ready) {
		info!("Connected as : {}", ready.user.name);
	}

	async fn voice_state_update(
		&self,
		ctx: Context,
		guild_id: Option<GuildId>,
		_old: Option<VoiceState>,
		_new: VoiceState,
	) {
		let radio = utils::radio(&ctx).await;
		let guild = radio.config().guild;
		if guild_id != Some(guild) {
			return;
		}

		let channel = radio.config().voice_channel;
		if let Some(humans) = utils::human_count(&ctx, guild, channel).await {
			radio.occupancy_changed(guild, humans).await;
		}
	}
}

#[group]
#[commands(end, play, restart)]
struct General;

#[tokio::main]
async fn main() {
	// The .env file is optional; variables may come straight from the
	// host environment.
	let _ = dotenv::dotenv();

	let subscriber = FmtSubscriber::builder()
		.with_env_filter(EnvFilter::from_default_env())
		.finish();

	tracing::subscriber::set_global_default(subscriber).expect("Failed to start logger.");

	let config = match Config::from_env() {
		Ok(config) => Arc::new(config),
		Err(e) => {
			error!("Cannot start: {}", e);
			std::process::exit(1);
		}
	};
	config.log_redacted();

	let http = Http::new_with_token(&config.discord_token);
	match http.get_current_application_info().await {
		Ok(info) => {
			if info.id.0 != config.client_id {
				warn!(
					"CLIENT_ID {} does not match the application this token belongs to ({})",
					config.client_id, info.id
				);
			}
		}
		Err(e) => panic!("Cannot access application info: {:?}", e),
	}

	let framework = StandardFramework::new()
		.configure(|c| c.prefix("~"))
		.group(&GENERAL_GROUP);

	let manager = Songbird::serenity();

	let mut client = Client::builder(&config.discord_token)
		.framework(framework)
		.event_handler(Handler)
		.register_songbird_with(manager.clone())
		.await
		.expect("Error creating client");

	let timeouts = Timeouts::default();
	let verifier = Arc::new(
		HttpVerifier::new(timeouts.first_byte).expect("Failed to build the stream verifier."),
	);
	let notifier: Arc<dyn Notifier> = if config.testing_mode {
		info!("Testing mode: status notices go to the log only");
		Arc::new(LogNotifier)
	} else {
		Arc::new(ChannelNotifier::new(
			client.cache_and_http.http.clone(),
			config.text_channel,
		))
	};
	let backend = Arc::new(SongbirdBackend::new(manager, timeouts.voice_ready));
	let radio = Radio::new(config, timeouts, verifier, backend, notifier);

	{
		let mut data = client.data.write().await;
		data.insert::<RadioKey>(radio);
	}

	let shard_manager = client.shard_manager.clone();
	tokio::spawn(async move {
		tokio::signal::ctrl_c()
			.await
			.expect("Could not register ctrl+c handler");
		shard_manager.lock().await.shutdown_all().await;
	});

	if let Err(e) = client.start().await {
		error!("Client error: {:?}", e);
	}
}
