use std::env;

use serenity::model::id::{ChannelId, GuildId, RoleId};
use tracing::info;
use url::Url;

/// Everything the bot needs, resolved once at startup.
#[derive(Debug, Clone)]
pub(crate) struct Config {
	pub discord_token: String,
	pub client_id: u64,
	pub guild: GuildId,
	pub user_role: RoleId,
	pub admin_role: RoleId,
	pub voice_channel: ChannelId,
	pub text_channel: ChannelId,
	pub stream_url: String,
	/// Status notices only reach the log, not the text channel.
	pub testing_mode: bool,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
	#[error("missing required environment variables: {}", .0.join(", "))]
	Missing(Vec<String>),
	#[error("{name} is not a valid identifier: {value}")]
	BadId { name: &'static str, value: String },
	#[error("STREAM_URL is not a valid http(s) URL: {0}")]
	BadStreamUrl(String),
}

const REQUIRED: [&str; 8] = [
	"DISCORD_TOKEN",
	"CLIENT_ID",
	"GUILD_ID",
	"USER_ROLE_ID",
	"ADMIN_ROLE_ID",
	"VOICE_CHANNEL_ID",
	"TEXT_CHANNEL_ID",
	"STREAM_URL",
];

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Builds the config from any name → value lookup. Every missing
	/// variable is reported at once so the operator fixes them in one go.
	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let missing: Vec<String> = REQUIRED
			.iter()
			.filter(|name| lookup(name).map_or(true, |value| value.is_empty()))
			.map(|name| name.to_string())
			.collect();
		if !missing.is_empty() {
			return Err(ConfigError::Missing(missing));
		}

		let take = |name: &str| lookup(name).expect("presence checked above");

		let stream_url = take("STREAM_URL");
		match Url::parse(&stream_url) {
			Ok(url) if matches!(url.scheme(), "http" | "https") => {}
			_ => return Err(ConfigError::BadStreamUrl(stream_url)),
		}

		Ok(Self {
			discord_token: take("DISCORD_TOKEN"),
			client_id: parse_id("CLIENT_ID", &take("CLIENT_ID"))?,
			guild: GuildId(parse_id("GUILD_ID", &take("GUILD_ID"))?),
			user_role: RoleId(parse_id("USER_ROLE_ID", &take("USER_ROLE_ID"))?),
			admin_role: RoleId(parse_id("ADMIN_ROLE_ID", &take("ADMIN_ROLE_ID"))?),
			voice_channel: ChannelId(parse_id("VOICE_CHANNEL_ID", &take("VOICE_CHANNEL_ID"))?),
			text_channel: ChannelId(parse_id("TEXT_CHANNEL_ID", &take("TEXT_CHANNEL_ID"))?),
			stream_url,
			testing_mode: lookup("TESTING_MODE").map_or(false, |value| value == "true"),
		})
	}

	/// Logs the loaded settings with the token redacted.
	pub fn log_redacted(&self) {
		info!(
			"Configuration loaded: client_id={} guild={} voice_channel={} text_channel={} stream_url={} testing_mode={}",
			self.client_id,
			self.guild,
			self.voice_channel,
			self.text_channel,
			self.stream_url,
			self.testing_mode
		);
	}
}

fn parse_id(name: &'static str, value: &str) -> Result<u64, ConfigError> {
	value.parse().map_err(|_| ConfigError::BadId {
		name,
		value: value.to_string(),
	})
}
