use std::sync::Arc;

use teloxide::prelude::*;

use ssb_core::domain::{ChatId, MessageId, MessageRef, UserProfile};

use crate::handlers::send_reply;
use crate::router::AppState;

pub async fn handle_text(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    profile: UserProfile,
    text: &str,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    let Some(outcome) = state.flow.handle_text(profile.user_id, text).await else {
        return Ok(());
    };

    // Take the phone number out of the chat scrollback once it served its
    // purpose (best-effort; the bot may lack delete rights).
    if outcome.redact_input {
        let _ = state
            .messenger
            .delete_message(MessageRef {
                chat_id,
                message_id: MessageId(msg.id.0),
            })
            .await;
    }

    send_reply(&state, chat_id, &outcome.reply).await;
    Ok(())
}
