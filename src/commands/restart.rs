use serenity::{
	client::Context,
	framework::standard::{macros::command, CommandResult},
	model::channel::Message,
};

use tracing::{info, warn};

use crate::{notify::StatusEvent, utils::radio};

#[command]
#[only_in(guilds)]
#[num_args(0)]
/// Tears the current session down and starts a fresh one
async fn restart(ctx: &Context, msg: &Message) -> CommandResult {
	let radio = radio(ctx).await;
	let guild = radio.config().guild;
	if msg.guild_id != Some(guild) {
		return Ok(());
	}

	let allowed = msg
		.member
		.as_ref()
		.map_or(false, |member| member.roles.contains(&radio.config().admin_role));
	if !allowed {
		msg.reply(
			&ctx.http,
			"❌ You do not have the required role to use this command.",
		)
		.await?;
		return Ok(());
	}

	if !radio.has_session(guild) {
		msg.reply(&ctx.http, "❌ The bot is not currently playing.")
			.await?;
		return Ok(());
	}

	msg.reply(&ctx.http, "🔄 Restarting wTed Radio...").await?;
	info!("Radio restart requested by {}", msg.author.tag());
	radio.publish(StatusEvent::Restarting).await;

	tokio::spawn(async move {
		if let Err(e) = radio.restart(guild).await {
			warn!("Could not restart radio session: {}", e);
		}
	});

	Ok(())
}
