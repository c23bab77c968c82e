use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{backend::BackendKind, errors::Error, Result};

/// Typed configuration for the bot.
///
/// Everything comes from the environment (with optional `.env` loading), so
/// deployments stay container-friendly.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,

    // Platform app identity used by both auth backends.
    pub api_id: i64,
    pub api_hash: String,

    // Deployment's account-API gateway (both backend dialects live under it).
    pub auth_api_base: String,

    // Membership gate: channel users must join before using the bot.
    pub must_join_channel: Option<String>,

    // Export-event delivery target. Notifications are skipped when unset.
    pub admin_chat_id: Option<i64>,

    // Per-attempt working areas are created under this directory.
    pub workdir_root: PathBuf,

    // Runtime constants
    pub request_timeout: Duration,
    pub otp_max_len: usize,

    // Which backend implementations this deployment offers.
    pub enabled_backends: Vec<BackendKind>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let api_id = env_i64("API_ID").ok_or_else(|| {
            Error::Config("API_ID environment variable is required".to_string())
        })?;
        let api_hash = env_str("API_HASH").and_then(non_empty).ok_or_else(|| {
            Error::Config("API_HASH environment variable is required".to_string())
        })?;

        let auth_api_base = env_str("AUTH_API_BASE")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::Config("AUTH_API_BASE environment variable is required".to_string())
            })?;

        let must_join_channel = env_str("MUST_JOIN_CHANNEL")
            .and_then(non_empty)
            .map(|s| s.trim_start_matches('@').to_string());

        let admin_chat_id = env_i64("ADMIN_CHAT_ID");

        let workdir_root =
            PathBuf::from(env_str("WORKDIR_ROOT").unwrap_or("/tmp/session-bot".to_string()));
        fs::create_dir_all(&workdir_root)?;

        let request_timeout =
            Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS").unwrap_or(30_000));
        let otp_max_len = env_usize("OTP_MAX_LEN").unwrap_or(10);

        // Backend availability (parity with the deployment knob of only some
        // client libraries being installed).
        let enabled_backends = parse_backends(env_str("ENABLED_BACKENDS"))?;

        Ok(Self {
            telegram_bot_token,
            api_id,
            api_hash,
            auth_api_base,
            must_join_channel,
            admin_chat_id,
            workdir_root,
            request_timeout,
            otp_max_len,
            enabled_backends,
        })
    }
}

fn parse_backends(v: Option<String>) -> Result<Vec<BackendKind>> {
    let Some(raw) = v.and_then(non_empty) else {
        return Ok(vec![BackendKind::Legacy, BackendKind::Modern]);
    };

    let mut out = Vec::new();
    for part in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let kind = BackendKind::parse(part).ok_or_else(|| {
            Error::Config(format!("ENABLED_BACKENDS contains unknown backend: {part}"))
        })?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    if out.is_empty() {
        return Err(Error::Config(
            "ENABLED_BACKENDS must name at least one backend".to_string(),
        ));
    }
    Ok(out)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_csv_parsing() {
        assert_eq!(
            parse_backends(None).unwrap(),
            vec![BackendKind::Legacy, BackendKind::Modern]
        );
        assert_eq!(
            parse_backends(Some("modern".to_string())).unwrap(),
            vec![BackendKind::Modern]
        );
        assert_eq!(
            parse_backends(Some("legacy, legacy , modern".to_string())).unwrap(),
            vec![BackendKind::Legacy, BackendKind::Modern]
        );
        assert!(parse_backends(Some("carrier-pigeon".to_string())).is_err());
        assert!(parse_backends(Some(" , ".to_string())).is_err());
    }
}
