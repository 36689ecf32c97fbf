//! Command implementations.

use std::path::{Path, PathBuf};

use board_coupon_client::services::RegistrationError;
use board_coupon_client::{
    ClientConfig, FileStore, GatewayError, Navigator, Redirect, Session, StorageError,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

pub mod account;
pub mod board;
pub mod coupon;

/// Session type used by every command: persistent state plus a sibling file
/// for session flags.
pub type CliSession = Session<FileStore, FileStore>;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Local state file could not be used.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP client could not be created.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Registration was rejected locally.
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Argument is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// URL has no login parameters.
    #[error("URL has no lineUserId parameter")]
    NoLoginParameters,

    /// No shop with the given name.
    #[error("Shop not found: {0}")]
    ShopNotFound(String),

    /// Command requires a stored profile.
    #[error("No profile stored; register first")]
    NoProfile,
}

/// Open the session over the state file at `path`.
///
/// Session flags live next to it (`<name>.session.json`) so they carry over
/// from one invocation to the next, the way a browser tab keeps its session
/// storage across page loads. `reset` clears both.
///
/// # Errors
///
/// Returns `CommandError` if a state file is unreadable or the HTTP client
/// fails to build.
pub fn open_session(config: ClientConfig, path: &Path) -> Result<CliSession, CommandError> {
    let store = FileStore::open(path)?;
    let flags_path = session_flags_path(path);
    let flags = FileStore::open(&flags_path)?;
    debug!(
        path = %path.display(),
        flags = %flags_path.display(),
        "Using state files"
    );
    Ok(Session::with_flags(config, store, flags)?)
}

fn session_flags_path(path: &Path) -> PathBuf {
    path.with_extension("session.json")
}

/// Navigator that reports page changes on the terminal.
#[derive(Debug, Default)]
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, target: &Redirect) {
        match target {
            Redirect::Login(location) => info!("Login required: open {location}"),
            Redirect::Registration(location) => {
                info!("Registration required: open {location} or run `bc-cli register`");
            }
        }
    }

    fn replace_location(&self, url: &Url) {
        debug!(url = %url, "Address rewritten");
    }

    fn alert(&self, message: &str) {
        error!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_flags_sit_next_to_state_file() {
        assert_eq!(
            session_flags_path(Path::new("data/board-coupon.json")),
            PathBuf::from("data/board-coupon.session.json")
        );
        assert_eq!(
            session_flags_path(Path::new("state")),
            PathBuf::from("state.session.json")
        );
    }
}
