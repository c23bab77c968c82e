use crate::Result;

/// Initialize tracing for the bot.
///
/// Compiled to a no-op when the `tracing` feature is off so the public API
/// stays stable in minimal builds; runtime diagnostics in the adapters use
/// prefixed stderr lines (`[CLEANUP]`, `[GATE]`, `[NOTIFY]`) either way.
pub fn init(service_name: &str) -> Result<()> {
    let _ = service_name;

    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::{fmt, EnvFilter};

        // `RUST_LOG` wins; otherwise info for our crates, warn elsewhere.
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("warn,ssb=info,ssb_core=info,{service_name}=info"))
        });

        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(true)
            .init();
    }

    Ok(())
}
