//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - serializes events per user
//! - consults the membership gate
//! - hands the event to the `ssb-core` auth flow and renders its reply

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use ssb_core::{
    domain::{ChatId, UserId, UserProfile},
    flow::Reply,
    keyboards,
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let profile = profile_of(user);
    let chat_id = ChatId(msg.chat.id.0);

    // One event per user at a time.
    let _guard = state.user_locks.lock_user(profile.user_id.0).await;

    if !ensure_member(&state, profile.user_id, chat_id).await {
        return Ok(());
    }

    let Some(text) = msg.text().map(|s| s.to_string()) else {
        // Phone numbers and passwords arrive as plain text; anything else
        // has no meaning for the flow.
        return Ok(());
    };

    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state, profile, &text).await;
    }

    text::handle_text(bot, msg, state, profile, &text).await
}

pub(crate) fn profile_of(user: &teloxide::types::User) -> UserProfile {
    UserProfile {
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        first_name: user.first_name.clone(),
    }
}

/// Render a flow reply into the chat. Send failures are logged only; the
/// flow has already committed its state transition.
pub(crate) async fn send_reply(state: &Arc<AppState>, chat_id: ChatId, reply: &Reply) {
    let res = match &reply.keyboard {
        Some(kb) => state
            .messenger
            .send_inline_keyboard(chat_id, &reply.text, kb.clone())
            .await
            .map(|_| ()),
        None => state.messenger.send_html(chat_id, &reply.text).await.map(|_| ()),
    };
    if let Err(e) = res {
        eprintln!("[SEND] could not deliver reply to chat {}: {e}", chat_id.0);
    }
}

/// Gate every state-machine event behind channel membership. Shows the join
/// prompt (and returns false) for non-members; lookup failures count as
/// non-membership.
pub(crate) async fn ensure_member(state: &Arc<AppState>, user_id: UserId, chat_id: ChatId) -> bool {
    match state.gate.is_member(user_id).await {
        Ok(true) => true,
        Ok(false) => {
            send_join_prompt(state, chat_id).await;
            false
        }
        Err(e) => {
            eprintln!("[GATE] membership check failed for user {}: {e}", user_id.0);
            send_join_prompt(state, chat_id).await;
            false
        }
    }
}

pub(crate) async fn send_join_prompt(state: &Arc<AppState>, chat_id: ChatId) {
    let Some(channel) = &state.cfg.must_join_channel else {
        return;
    };
    let text = "👋 To use this bot, you first need to join our channel.\n\n\
                Click the button below to join, then press <b>✅ Joined</b>.";
    if let Err(e) = state
        .messenger
        .send_inline_keyboard(chat_id, text, keyboards::join_prompt(channel))
        .await
    {
        eprintln!("[SEND] could not deliver join prompt to chat {}: {e}", chat_id.0);
    }
}
