use std::sync::Arc;

use teloxide::prelude::*;

use ssb_core::{
    backend::BackendKind,
    domain::{ChatId, MessageId, MessageRef, UserId},
    flow::KeypadEvent,
    keyboards::{CALLBACK_BACKEND_PREFIX, CALLBACK_JOINED, CALLBACK_OTP_PREFIX},
};

use crate::handlers::{profile_of, send_join_prompt, send_reply};
use crate::router::AppState;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let profile = profile_of(&q.from);
    let data = q.data.clone().unwrap_or_default();

    let Some(message) = q.message.as_ref() else {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };
    if data.is_empty() {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    }

    let chat_id = ChatId(message.chat.id.0);
    let msg_ref = MessageRef {
        chat_id,
        message_id: MessageId(message.id.0),
    };
    let user_id = profile.user_id;

    // One event per user at a time.
    let _guard = state.user_locks.lock_user(user_id.0).await;

    // "Joined" re-check is the one callback allowed through the gate.
    if data == CALLBACK_JOINED {
        if is_member(&state, user_id).await {
            let _ = state
                .messenger
                .answer_callback_query(&cb_id, Some("Thanks for joining!"))
                .await;
            let _ = state.messenger.delete_message(msg_ref).await;
            let reply = state.flow.start(&profile).await;
            send_reply(&state, chat_id, &reply).await;
        } else {
            let _ = state
                .messenger
                .answer_callback_query(
                    &cb_id,
                    Some("You haven't joined the channel yet. Please join and try again."),
                )
                .await;
        }
        return Ok(());
    }

    if !is_member(&state, user_id).await {
        let _ = state
            .messenger
            .answer_callback_query(&cb_id, Some("You must join our channel to use the bot."))
            .await;
        send_join_prompt(&state, chat_id).await;
        return Ok(());
    }

    if let Some(value) = data.strip_prefix(CALLBACK_BACKEND_PREFIX) {
        let Some(kind) = BackendKind::parse(value) else {
            let _ = state
                .messenger
                .answer_callback_query(&cb_id, Some("Unknown backend."))
                .await;
            return Ok(());
        };

        let reply = state.flow.select_backend(&profile, kind).await;
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        // Replace the selection keyboard with the phone prompt in place.
        if state.messenger.edit_html(msg_ref, &reply.text).await.is_err() {
            send_reply(&state, chat_id, &reply).await;
        }
        return Ok(());
    }

    if let Some(value) = data.strip_prefix(CALLBACK_OTP_PREFIX) {
        let Some(event) = KeypadEvent::parse(value) else {
            let _ = state
                .messenger
                .answer_callback_query(&cb_id, Some("Invalid keypad event."))
                .await;
            return Ok(());
        };

        let reply = state.flow.keypad(user_id, event).await;
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;

        match event {
            KeypadEvent::Digit(_) | KeypadEvent::Backspace => match &reply.keyboard {
                Some(kb) => {
                    // Edits fail when the rendered content is unchanged
                    // (backspace on an empty buffer); that is fine.
                    if let Err(e) = state
                        .messenger
                        .edit_inline_keyboard(msg_ref, &reply.text, kb.clone())
                        .await
                    {
                        eprintln!("[EDIT] could not update keypad in chat {}: {e}", chat_id.0);
                    }
                }
                None => send_reply(&state, chat_id, &reply).await,
            },
            // Confirm outcomes (success, 2FA prompt, fresh keypad, abort)
            // arrive as new messages below the keypad.
            KeypadEvent::Confirm => send_reply(&state, chat_id, &reply).await,
        }
        return Ok(());
    }

    let _ = state.messenger.answer_callback_query(&cb_id, None).await;
    Ok(())
}

async fn is_member(state: &Arc<AppState>, user_id: UserId) -> bool {
    match state.gate.is_member(user_id).await {
        Ok(ok) => ok,
        Err(e) => {
            eprintln!("[GATE] membership check failed for user {}: {e}", user_id.0);
            false
        }
    }
}
