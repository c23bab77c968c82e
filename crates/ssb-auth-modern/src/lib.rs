//! "Modern" account-API client (JSON dialect).
//!
//! Speaks the JSON endpoints under `/v2/auth/` and keeps no local state:
//! the exported credential is the only artifact (string-session style), so
//! the working area is left untouched. Wire errors arrive as kebab-case
//! codes and are normalized into the core taxonomy here.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use ssb_core::{
    backend::{AuthClient, AuthError, BackendKind, CredentialBackend, HandshakeToken},
    domain::UserId,
};

#[derive(Clone, Debug)]
pub struct ModernConfig {
    pub api_base: String,
    pub api_id: i64,
    pub api_hash: String,
    pub timeout: Duration,
}

pub struct ModernBackend {
    cfg: ModernConfig,
}

impl ModernBackend {
    pub fn new(cfg: ModernConfig) -> Self {
        Self { cfg }
    }
}

impl CredentialBackend for ModernBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn create_client(
        &self,
        _user_id: UserId,
        _workdir: &Path,
    ) -> Result<Box<dyn AuthClient>, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(self.cfg.timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("http client: {e}")))?;

        Ok(Box::new(ModernClient {
            http,
            cfg: self.cfg.clone(),
            pending_token: None,
            authorization: None,
        }))
    }
}

#[derive(Clone, Debug, Deserialize)]
struct Authorization {
    account_id: i64,
    datacenter: u8,
    /// Base64 (standard alphabet) key material.
    key: String,
}

struct ModernClient {
    http: reqwest::Client,
    cfg: ModernConfig,
    /// Verification token held across the second-factor branch; this
    /// dialect threads it through every auth call instead of a connection.
    pending_token: Option<String>,
    authorization: Option<Authorization>,
}

impl ModernClient {
    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, AuthError> {
        let resp = self
            .http
            .post(format!("{}{path}", self.cfg.api_base))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(map_api_error(status.as_u16(), &text))
    }
}

#[async_trait]
impl AuthClient for ModernClient {
    async fn send_code(&mut self, phone_number: &str) -> Result<HandshakeToken, AuthError> {
        #[derive(Deserialize)]
        struct CodeRequested {
            verification_token: String,
        }

        let body: CodeRequested = self
            .post_json(
                "/v2/auth/request-code",
                json!({
                    "app_id": self.cfg.api_id,
                    "app_hash": self.cfg.api_hash,
                    "phone": phone_number,
                }),
            )
            .await?
            .json()
            .await
            .map_err(transport)?;

        Ok(HandshakeToken(body.verification_token))
    }

    async fn sign_in(
        &mut self,
        phone_number: &str,
        token: &HandshakeToken,
        code: &str,
    ) -> Result<(), AuthError> {
        #[derive(Deserialize)]
        struct SignedIn {
            authorization: Authorization,
        }

        let result = self
            .post_json(
                "/v2/auth/verify",
                json!({
                    "verification_token": token.0,
                    "phone": phone_number,
                    "code": code,
                }),
            )
            .await;

        match result {
            Ok(resp) => {
                let body: SignedIn = resp.json().await.map_err(transport)?;
                self.authorization = Some(body.authorization);
                self.pending_token = None;
                Ok(())
            }
            Err(AuthError::SecondFactorRequired) => {
                // The token stays valid for the password call.
                self.pending_token = Some(token.0.clone());
                Err(AuthError::SecondFactorRequired)
            }
            Err(e) => Err(e),
        }
    }

    async fn check_password(&mut self, password: &str) -> Result<(), AuthError> {
        let Some(token) = self.pending_token.clone() else {
            return Err(AuthError::Transport(
                "no pending verification for password check".to_string(),
            ));
        };

        #[derive(Deserialize)]
        struct SignedIn {
            authorization: Authorization,
        }

        let body: SignedIn = self
            .post_json(
                "/v2/auth/password",
                json!({
                    "verification_token": token,
                    "password": password,
                }),
            )
            .await?
            .json()
            .await
            .map_err(transport)?;

        self.authorization = Some(body.authorization);
        self.pending_token = None;
        Ok(())
    }

    async fn export_session(&mut self) -> Result<String, AuthError> {
        let Some(auth) = self.authorization.clone() else {
            return Err(AuthError::Unavailable(
                "no authorized account to export".to_string(),
            ));
        };
        Ok(encode_credential(self.cfg.api_id, &auth))
    }

    async fn disconnect(&mut self) -> Result<(), AuthError> {
        // Connectionless dialect; nothing to tear down server-side.
        self.pending_token = None;
        Ok(())
    }
}

/// The modern credential format: a JSON envelope (`v: 2`), base64 with the
/// standard alphabet.
fn encode_credential(app_id: i64, auth: &Authorization) -> String {
    let envelope = json!({
        "v": 2,
        "app_id": app_id,
        "account": auth.account_id,
        "dc": auth.datacenter,
        "key": auth.key,
    });
    STANDARD.encode(envelope.to_string())
}

fn transport(e: reqwest::Error) -> AuthError {
    AuthError::Transport(e.to_string())
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    error: String,
}

/// Normalize the dialect's kebab-case error vocabulary into the core
/// taxonomy before it reaches the state machine.
fn map_api_error(status: u16, body: &str) -> AuthError {
    let code = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_default();

    match code.as_str() {
        "phone-invalid" | "phone-banned" => AuthError::InvalidPhoneNumber,
        "app-credentials-invalid" => AuthError::InvalidApiCredentials,
        "code-invalid" | "code-expired" => AuthError::InvalidCode,
        "password-required" => AuthError::SecondFactorRequired,
        "password-invalid" => AuthError::InvalidPassword,
        "too-many-requests" => {
            AuthError::Transport("platform flood control, try again later".to_string())
        }
        _ if status >= 500 => AuthError::Transport(format!("server error {status}")),
        _ => AuthError::Transport(format!(
            "unexpected response {status}: {}",
            body.chars().take(200).collect::<String>()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_are_normalized() {
        let cases = [
            ("phone-invalid", AuthError::InvalidPhoneNumber),
            ("phone-banned", AuthError::InvalidPhoneNumber),
            ("app-credentials-invalid", AuthError::InvalidApiCredentials),
            ("code-invalid", AuthError::InvalidCode),
            ("code-expired", AuthError::InvalidCode),
            ("password-required", AuthError::SecondFactorRequired),
            ("password-invalid", AuthError::InvalidPassword),
        ];
        for (code, expected) in cases {
            let body = format!(r#"{{"error":"{code}"}}"#);
            let got = map_api_error(401, &body);
            assert_eq!(
                std::mem::discriminant(&got),
                std::mem::discriminant(&expected),
                "code {code} mapped to {got:?}"
            );
        }
    }

    #[test]
    fn unknown_errors_become_transport_failures() {
        assert!(matches!(
            map_api_error(503, "upstream down"),
            AuthError::Transport(_)
        ));
        assert!(matches!(
            map_api_error(400, r#"{"error":"weird-new-code"}"#),
            AuthError::Transport(_)
        ));
    }

    #[test]
    fn credential_envelope_round_trips() {
        let auth = Authorization {
            account_id: 777_000,
            datacenter: 2,
            key: STANDARD.encode([9u8; 32]),
        };
        let encoded = encode_credential(424242, &auth);

        let decoded = STANDARD.decode(encoded).unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&decoded).unwrap();

        assert_eq!(envelope["v"], 2);
        assert_eq!(envelope["app_id"], 424242);
        assert_eq!(envelope["account"], 777_000);
        assert_eq!(envelope["dc"], 2);
        assert_eq!(envelope["key"], auth.key);
    }
}
