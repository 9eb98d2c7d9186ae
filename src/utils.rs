use serenity::{
	client::Context,
	model::id::{ChannelId, GuildId},
};

use crate::radio::{Radio, RadioKey};

pub(crate) async fn radio(ctx: &Context) -> Radio {
	ctx.data
		.read()
		.await
		.get::<RadioKey>()
		.expect("Radio controller placed in at initialisation.")
		.clone()
}

/// Humans (bots excluded) currently in the given voice channel.
pub(crate) async fn human_count(
	ctx: &Context,
	guild_id: GuildId,
	channel: ChannelId,
) -> Option<usize> {
	let guild = ctx.cache.guild(guild_id).await?;

	Some(
		guild
			.voice_states
			.values()
			.filter(|state| state.channel_id == Some(channel))
			.filter(|state| {
				guild
					.members
					.get(&state.user_id)
					.map_or(true, |member| !member.user.bot)
			})
			.count(),
	)
}
