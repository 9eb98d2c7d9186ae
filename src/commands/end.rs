use serenity::{
	client::Context,
	framework::standard::{macros::command, CommandResult},
	model::channel::Message,
};

use tracing::info;

use crate::{notify::StatusEvent, session::RadioError, utils::radio};

#[command]
#[only_in(guilds)]
#[num_args(0)]
/// Stops the radio and leaves the voice channel
async fn end(ctx: &Context, msg: &Message) -> CommandResult {
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

	match radio.stop(guild).await {
		Ok(()) => {
			info!("Radio stopped by {}", msg.author.tag());
			msg.reply(&ctx.http, "🛑 Stopping wTed Radio...").await?;
			radio.publish(StatusEvent::Stopped).await;
		}
		Err(RadioError::NotActive) => {
			msg.reply(&ctx.http, "❌ The bot is not currently playing.")
				.await?;
		}
		Err(e) => {
			msg.reply(&ctx.http, format!("❌ Could not stop the bot: {}", e))
				.await?;
		}
	}

	Ok(())
}
