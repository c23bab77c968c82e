use std::sync::Arc;

use teloxide::prelude::*;

use ssb_core::domain::{ChatId, UserProfile};

use crate::handlers::send_reply;
use crate::router::AppState;

pub async fn handle_command(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    profile: UserProfile,
    text: &str,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    let command = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .split('@')
        .next()
        .unwrap_or("");

    match command {
        "/start" => {
            let reply = state.flow.start(&profile).await;
            send_reply(&state, chat_id, &reply).await;
        }
        "/cancel" => {
            let reply = state.flow.cancel(profile.user_id).await;
            send_reply(&state, chat_id, &reply).await;
        }
        "/help" => {
            let _ = state
                .messenger
                .send_html(
                    chat_id,
                    "ℹ️ Send /start to generate a session string, or /cancel \
                     to discard an attempt in progress.",
                )
                .await;
        }
        _ => {
            let _ = state
                .messenger
                .send_html(chat_id, "Unknown command. Send /start to begin.")
                .await;
        }
    }

    Ok(())
}
