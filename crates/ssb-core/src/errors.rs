/// Core error type for process-level failures.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can handle failures consistently. Authentication outcomes have their
/// own taxonomy (`backend::AuthError`) and never travel through this enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
