//! "Legacy" account-API client (first-generation dialect).
//!
//! Speaks the form-encoded endpoints under `/legacy/` and keeps its client
//! state in the attempt's working area. The dialect's quirks stay inside
//! this crate: an explicit connect step, `UPPER_SNAKE` wire error codes,
//! salted-digest password submission, and a packed-binary credential format.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use ssb_core::{
    backend::{AuthClient, AuthError, BackendKind, CredentialBackend, HandshakeToken},
    domain::UserId,
};

#[derive(Clone, Debug)]
pub struct LegacyConfig {
    pub api_base: String,
    pub api_id: i64,
    pub api_hash: String,
    pub timeout: Duration,
}

pub struct LegacyBackend {
    cfg: LegacyConfig,
}

impl LegacyBackend {
    pub fn new(cfg: LegacyConfig) -> Self {
        Self { cfg }
    }
}

impl CredentialBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn create_client(
        &self,
        user_id: UserId,
        workdir: &Path,
    ) -> Result<Box<dyn AuthClient>, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(self.cfg.timeout)
            .build()
            .map_err(|e| AuthError::Unavailable(format!("http client: {e}")))?;

        let client = LegacyClient {
            http,
            cfg: self.cfg.clone(),
            user_id: user_id.0,
            state_file: workdir.join("client.json"),
            conn: None,
            password_salt: None,
            grant: None,
        };
        client
            .persist_state()
            .map_err(|e| AuthError::Unavailable(format!("workdir not writable: {e}")))?;

        Ok(Box::new(client))
    }
}

/// Local client state, persisted into the working area the way this dialect
/// expects to find it on reconnect.
#[derive(Debug, Serialize, Deserialize)]
struct ClientState {
    dialect: String,
    api_id: i64,
    user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grant: Option<AuthGrant>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct AuthGrant {
    /// Base64 (standard alphabet) key material issued at sign-in.
    auth_key: String,
    dc_id: u8,
    account_id: i64,
}

struct LegacyClient {
    http: reqwest::Client,
    cfg: LegacyConfig,
    user_id: i64,
    state_file: PathBuf,
    conn: Option<String>,
    password_salt: Option<String>,
    grant: Option<AuthGrant>,
}

impl LegacyClient {
    fn persist_state(&self) -> std::io::Result<()> {
        let state = ClientState {
            dialect: "legacy".to_string(),
            api_id: self.cfg.api_id,
            user_id: self.user_id,
            grant: self.grant.clone(),
        };
        let json = serde_json::to_vec_pretty(&state)?;
        std::fs::write(&self.state_file, json)
    }

    async fn connect(&mut self) -> Result<(), AuthError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let resp = self
            .http
            .post(format!("{}/legacy/connect", self.cfg.api_base))
            .form(&[
                ("api_id", self.cfg.api_id.to_string()),
                ("api_hash", self.cfg.api_hash.clone()),
            ])
            .send()
            .await
            .map_err(transport)?;

        #[derive(Deserialize)]
        struct Connected {
            session: String,
        }

        let body: Connected = read_ok(resp).await?.json().await.map_err(transport)?;
        self.conn = Some(body.session);
        Ok(())
    }

    fn conn_token(&self) -> Result<String, AuthError> {
        self.conn
            .clone()
            .ok_or_else(|| AuthError::Transport("not connected".to_string()))
    }

    fn store_grant(&mut self, grant: AuthGrant) {
        self.grant = Some(grant);
        if let Err(e) = self.persist_state() {
            eprintln!(
                "[STATE] could not persist legacy client state for user {}: {e}",
                self.user_id
            );
        }
    }
}

#[async_trait]
impl AuthClient for LegacyClient {
    async fn send_code(&mut self, phone_number: &str) -> Result<HandshakeToken, AuthError> {
        self.connect().await?;
        let session = self.conn_token()?;

        let resp = self
            .http
            .post(format!("{}/legacy/sendCode", self.cfg.api_base))
            .form(&[("session", session), ("phone_number", phone_number.to_string())])
            .send()
            .await
            .map_err(transport)?;

        #[derive(Deserialize)]
        struct SentCode {
            phone_code_hash: String,
        }

        let body: SentCode = read_ok(resp).await?.json().await.map_err(transport)?;
        Ok(HandshakeToken(body.phone_code_hash))
    }

    async fn sign_in(
        &mut self,
        phone_number: &str,
        token: &HandshakeToken,
        code: &str,
    ) -> Result<(), AuthError> {
        let session = self.conn_token()?;

        let resp = self
            .http
            .post(format!("{}/legacy/signIn", self.cfg.api_base))
            .form(&[
                ("session", session),
                ("phone_number", phone_number.to_string()),
                ("phone_code_hash", token.0.clone()),
                ("phone_code", code.to_string()),
            ])
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = map_wire_error(status.as_u16(), &body);
            if matches!(err, AuthError::SecondFactorRequired) {
                // The second-factor challenge carries the digest salt.
                self.password_salt = extract_salt(&body);
            }
            return Err(err);
        }

        let grant: AuthGrant = resp.json().await.map_err(transport)?;
        self.store_grant(grant);
        Ok(())
    }

    async fn check_password(&mut self, password: &str) -> Result<(), AuthError> {
        let session = self.conn_token()?;
        let salt = self.password_salt.clone().unwrap_or_default();

        let resp = self
            .http
            .post(format!("{}/legacy/checkPassword", self.cfg.api_base))
            .form(&[
                ("session", session),
                ("password_hash", hash_password(&salt, password)),
            ])
            .send()
            .await
            .map_err(transport)?;

        let grant: AuthGrant = read_ok(resp).await?.json().await.map_err(transport)?;
        self.store_grant(grant);
        Ok(())
    }

    async fn export_session(&mut self) -> Result<String, AuthError> {
        let Some(grant) = self.grant.clone() else {
            return Err(AuthError::Unavailable(
                "no authorized account to export".to_string(),
            ));
        };
        pack_credential(self.cfg.api_id, &grant)
    }

    async fn disconnect(&mut self) -> Result<(), AuthError> {
        let Some(session) = self.conn.take() else {
            return Ok(());
        };

        self.http
            .post(format!("{}/legacy/disconnect", self.cfg.api_base))
            .form(&[("session", session)])
            .send()
            .await
            .map_err(transport)?;
        Ok(())
    }
}

/// Digest the second-factor password the way this dialect expects:
/// sha256 over `salt:password`, base64url without padding.
fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// The legacy credential format: `[version=1, dc_id, api_id BE, account_id
/// BE, auth_key...]`, base64url without padding.
fn pack_credential(api_id: i64, grant: &AuthGrant) -> Result<String, AuthError> {
    let key = STANDARD
        .decode(&grant.auth_key)
        .map_err(|e| AuthError::Transport(format!("malformed auth key: {e}")))?;

    let mut packed = Vec::with_capacity(18 + key.len());
    packed.push(1u8);
    packed.push(grant.dc_id);
    packed.extend_from_slice(&api_id.to_be_bytes());
    packed.extend_from_slice(&grant.account_id.to_be_bytes());
    packed.extend_from_slice(&key);
    Ok(URL_SAFE_NO_PAD.encode(packed))
}

fn transport(e: reqwest::Error) -> AuthError {
    AuthError::Transport(e.to_string())
}

async fn read_ok(resp: reqwest::Response) -> Result<reqwest::Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(map_wire_error(status.as_u16(), &body))
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    password_salt: Option<String>,
}

/// Normalize the dialect's `UPPER_SNAKE` error vocabulary into the core
/// taxonomy before it reaches the state machine.
fn map_wire_error(status: u16, body: &str) -> AuthError {
    let code = serde_json::from_str::<WireError>(body)
        .map(|w| w.error)
        .unwrap_or_default();

    match code.as_str() {
        "PHONE_NUMBER_INVALID" | "PHONE_NUMBER_BANNED" => AuthError::InvalidPhoneNumber,
        "API_ID_INVALID" | "API_HASH_INVALID" => AuthError::InvalidApiCredentials,
        "PHONE_CODE_INVALID" | "PHONE_CODE_EXPIRED" => AuthError::InvalidCode,
        "SESSION_PASSWORD_NEEDED" => AuthError::SecondFactorRequired,
        "PASSWORD_HASH_INVALID" => AuthError::InvalidPassword,
        "FLOOD_WAIT" => AuthError::Transport("platform flood control, try again later".to_string()),
        _ if status >= 500 => AuthError::Transport(format!("server error {status}")),
        _ => AuthError::Transport(format!(
            "unexpected response {status}: {}",
            body.chars().take(200).collect::<String>()
        )),
    }
}

fn extract_salt(body: &str) -> Option<String> {
    serde_json::from_str::<WireError>(body).ok()?.password_salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_are_normalized() {
        let cases = [
            ("PHONE_NUMBER_INVALID", AuthError::InvalidPhoneNumber),
            ("PHONE_NUMBER_BANNED", AuthError::InvalidPhoneNumber),
            ("API_ID_INVALID", AuthError::InvalidApiCredentials),
            ("API_HASH_INVALID", AuthError::InvalidApiCredentials),
            ("PHONE_CODE_INVALID", AuthError::InvalidCode),
            ("PHONE_CODE_EXPIRED", AuthError::InvalidCode),
            ("SESSION_PASSWORD_NEEDED", AuthError::SecondFactorRequired),
            ("PASSWORD_HASH_INVALID", AuthError::InvalidPassword),
        ];
        for (code, expected) in cases {
            let body = format!(r#"{{"error":"{code}"}}"#);
            let got = map_wire_error(400, &body);
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
            map_wire_error(500, "gateway exploded"),
            AuthError::Transport(_)
        ));
        assert!(matches!(
            map_wire_error(418, r#"{"error":"TEAPOT"}"#),
            AuthError::Transport(_)
        ));
        assert!(matches!(
            map_wire_error(400, "not even json"),
            AuthError::Transport(_)
        ));
    }

    #[test]
    fn salt_travels_with_the_second_factor_challenge() {
        let body = r#"{"error":"SESSION_PASSWORD_NEEDED","password_salt":"s4lt"}"#;
        assert!(matches!(
            map_wire_error(401, body),
            AuthError::SecondFactorRequired
        ));
        assert_eq!(extract_salt(body).as_deref(), Some("s4lt"));
        assert_eq!(extract_salt(r#"{"error":"SESSION_PASSWORD_NEEDED"}"#), None);
    }

    #[test]
    fn password_digest_is_salted_and_stable() {
        let a = hash_password("s1", "hunter2");
        let b = hash_password("s1", "hunter2");
        let c = hash_password("s2", "hunter2");
        let d = hash_password("s1", "hunter3");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        // base64url, no padding
        assert!(!a.contains('='));
        assert!(!a.contains('+'));
        assert!(!a.contains('/'));
    }

    #[test]
    fn credential_packing_round_trips() {
        let grant = AuthGrant {
            auth_key: STANDARD.encode([7u8; 32]),
            dc_id: 4,
            account_id: 777_000,
        };
        let packed = pack_credential(424242, &grant).unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(packed).unwrap();

        assert_eq!(bytes[0], 1); // format version
        assert_eq!(bytes[1], 4);
        assert_eq!(i64::from_be_bytes(bytes[2..10].try_into().unwrap()), 424242);
        assert_eq!(
            i64::from_be_bytes(bytes[10..18].try_into().unwrap()),
            777_000
        );
        assert_eq!(&bytes[18..], &[7u8; 32]);
    }

    #[test]
    fn malformed_key_material_is_rejected() {
        let grant = AuthGrant {
            auth_key: "***not base64***".to_string(),
            dc_id: 1,
            account_id: 1,
        };
        assert!(matches!(
            pack_credential(1, &grant),
            Err(AuthError::Transport(_))
        ));
    }

    #[test]
    fn create_client_seeds_the_working_area() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LegacyBackend::new(LegacyConfig {
            api_base: "http://localhost:0".to_string(),
            api_id: 99,
            api_hash: "h".to_string(),
            timeout: Duration::from_secs(1),
        });

        backend
            .create_client(UserId(55), dir.path())
            .expect("client created");

        let state: ClientState = serde_json::from_slice(
            &std::fs::read(dir.path().join("client.json")).expect("state file written"),
        )
        .expect("state file parses");
        assert_eq!(state.dialect, "legacy");
        assert_eq!(state.api_id, 99);
        assert_eq!(state.user_id, 55);
        assert!(state.grant.is_none());
    }
}
