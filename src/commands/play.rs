use serenity::{
	client::Context,
	framework::standard::{macros::command, CommandResult},
	model::channel::Message,
};

use tracing::{info, warn};

use crate::utils::radio;

#[command]
#[only_in(guilds)]
#[num_args(0)]
/// Starts streaming the radio into the configured voice channel
async fn play(ctx: &Context, msg: &Message) -> CommandResult {
	let radio = radio(ctx).await;
	let guild = radio.config().guild;
	if msg.guild_id != Some(guild) {
		return Ok(());
	}

	let allowed = msg
		.member
		.as_ref()
		.map_or(false, |member| member.roles.contains(&radio.config().user_role));
	if !allowed {
		msg.reply(
			&ctx.http,
			"❌ You do not have the required role to use this command.",
		)
		.await?;
		return Ok(());
	}

	if radio.is_busy(guild) {
		msg.reply(&ctx.http, "🎵 The bot is already playing!").await?;
		return Ok(());
	}

	msg.reply(&ctx.http, "🔄 Starting wTed Radio...").await?;
	info!("Radio start requested by {}", msg.author.tag());

	// Verification and the voice join take a while; status updates reach
	// the text channel through the notifier.
	tokio::spawn(async move {
		if let Err(e) = radio.start(guild).await {
			warn!("Could not start radio session: {}", e);
		}
	});

	Ok(())
}
