use async_trait::async_trait;

use teloxide::{prelude::*, types::ChatMemberKind, types::Recipient};

use ssb_core::{domain::UserId, errors::Error, ports::MembershipGate, Result};

/// Channel-membership gate backed by `getChatMember`.
///
/// The bot must be an administrator of the required channel for the lookup
/// to succeed; lookup failures propagate so the caller can decide (the
/// handlers treat them as "not a member" and show the join prompt).
pub struct TelegramMembershipGate {
    bot: Bot,
    channel: Option<String>,
}

impl TelegramMembershipGate {
    /// `channel` is the public channel username without the `@`. `None`
    /// leaves the gate open.
    pub fn new(bot: Bot, channel: Option<String>) -> Self {
        Self { bot, channel }
    }
}

#[async_trait]
impl MembershipGate for TelegramMembershipGate {
    async fn is_member(&self, user_id: UserId) -> Result<bool> {
        let Some(channel) = &self.channel else {
            return Ok(true);
        };

        let member = self
            .bot
            .get_chat_member(
                Recipient::ChannelUsername(format!("@{channel}")),
                teloxide::types::UserId(user_id.0 as u64),
            )
            .await
            .map_err(|e| Error::External(format!("membership lookup failed: {e}")))?;

        Ok(!matches!(
            member.kind,
            ChatMemberKind::Left | ChatMemberKind::Banned(_)
        ))
    }
}
