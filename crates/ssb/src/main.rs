use std::sync::Arc;

use ssb_auth_legacy::{LegacyBackend, LegacyConfig};
use ssb_auth_modern::{ModernBackend, ModernConfig};

use ssb_core::{
    backend::{BackendKind, BackendRegistry},
    config::Config,
};

#[tokio::main]
async fn main() -> Result<(), ssb_core::Error> {
    ssb_core::logging::init("ssb")?;

    let cfg = Arc::new(Config::load()?);

    let mut registry = BackendRegistry::new();
    for kind in &cfg.enabled_backends {
        match kind {
            BackendKind::Legacy => registry.register(Arc::new(LegacyBackend::new(LegacyConfig {
                api_base: cfg.auth_api_base.clone(),
                api_id: cfg.api_id,
                api_hash: cfg.api_hash.clone(),
                timeout: cfg.request_timeout,
            }))),
            BackendKind::Modern => registry.register(Arc::new(ModernBackend::new(ModernConfig {
                api_base: cfg.auth_api_base.clone(),
                api_id: cfg.api_id,
                api_hash: cfg.api_hash.clone(),
                timeout: cfg.request_timeout,
            }))),
        }
    }

    ssb_telegram::router::run_polling(cfg, registry)
        .await
        .map_err(|e| ssb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
