//! Inline keyboards used by the flow: backend selection, the OTP keypad and
//! the join prompt.
//!
//! Callback data uses the `prefix:value` scheme parsed by the Telegram
//! adapter (`backend:*`, `otp:*`, `joined`).

use crate::{
    backend::BackendKind,
    messaging::types::{InlineButton, InlineKeyboard},
};

pub const CALLBACK_JOINED: &str = "joined";
pub const CALLBACK_BACKEND_PREFIX: &str = "backend:";
pub const CALLBACK_OTP_PREFIX: &str = "otp:";
pub const OTP_BACKSPACE: &str = "back";
pub const OTP_CONFIRM: &str = "done";

/// One labeled row per available backend.
pub fn backend_selection(kinds: &[BackendKind]) -> InlineKeyboard {
    let buttons = kinds
        .iter()
        .map(|kind| {
            let emoji = match kind {
                BackendKind::Legacy => "🗝",
                BackendKind::Modern => "⚡",
            };
            InlineButton::callback(
                format!("{emoji} {}", kind.title()),
                format!("{CALLBACK_BACKEND_PREFIX}{kind}"),
            )
        })
        .collect();
    InlineKeyboard::one_per_row(buttons)
}

/// The interactive OTP keypad: digits 1-9 in a 3x3 grid, then a bottom row
/// of backspace / 0 / confirm.
pub fn otp_keypad() -> InlineKeyboard {
    let digit = |d: u8| {
        InlineButton::callback(d.to_string(), format!("{CALLBACK_OTP_PREFIX}{d}"))
    };

    let mut rows: Vec<Vec<InlineButton>> = (0..3)
        .map(|r| (1..=3).map(|c| digit(r * 3 + c)).collect())
        .collect();
    rows.push(vec![
        InlineButton::callback("⬅️", format!("{CALLBACK_OTP_PREFIX}{OTP_BACKSPACE}")),
        digit(0),
        InlineButton::callback("✅", format!("{CALLBACK_OTP_PREFIX}{OTP_CONFIRM}")),
    ]);
    InlineKeyboard::new(rows)
}

/// Join prompt: a link to the required channel plus a re-check button.
pub fn join_prompt(channel: &str) -> InlineKeyboard {
    InlineKeyboard::new(vec![
        vec![InlineButton::url(
            "🔗 Join Channel",
            format!("https://t.me/{channel}"),
        )],
        vec![InlineButton::callback("✅ Joined", CALLBACK_JOINED)],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypad_layout() {
        let kb = otp_keypad();
        assert_eq!(kb.rows.len(), 4);
        for row in &kb.rows[..3] {
            assert_eq!(row.len(), 3);
        }

        let data_of = |b: &InlineButton| match b {
            InlineButton::Callback { data, .. } => data.clone(),
            InlineButton::Url { .. } => panic!("keypad has no url buttons"),
        };

        assert_eq!(data_of(&kb.rows[0][0]), "otp:1");
        assert_eq!(data_of(&kb.rows[2][2]), "otp:9");
        assert_eq!(data_of(&kb.rows[3][0]), "otp:back");
        assert_eq!(data_of(&kb.rows[3][1]), "otp:0");
        assert_eq!(data_of(&kb.rows[3][2]), "otp:done");
    }

    #[test]
    fn selection_lists_each_backend_once() {
        let kb = backend_selection(&[BackendKind::Legacy, BackendKind::Modern]);
        assert_eq!(kb.rows.len(), 2);
        assert!(matches!(
            &kb.rows[0][0],
            InlineButton::Callback { data, .. } if data == "backend:legacy"
        ));
        assert!(matches!(
            &kb.rows[1][0],
            InlineButton::Callback { data, .. } if data == "backend:modern"
        ));
    }

    #[test]
    fn join_prompt_links_the_channel() {
        let kb = join_prompt("my_channel");
        assert!(matches!(
            &kb.rows[0][0],
            InlineButton::Url { url, .. } if url == "https://t.me/my_channel"
        ));
        assert!(matches!(
            &kb.rows[1][0],
            InlineButton::Callback { data, .. } if data == "joined"
        ));
    }
}
