use thiserror::Error;

use crate::anchor_store::StoreError;
use crate::config::ConfigError;
use crate::gui::GhostGuiError;

/// Any failure the `ghosts` binaries can report.
#[derive(Debug, Error)]
pub enum GhostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("terminal ui failed: {0}")]
    Gui(#[from] GhostGuiError),
    #[error("no anchor ids to resolve")]
    NoAnchorIds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_message() {
        let store: GhostError = StoreError::Delimiter("a;b".into()).into();
        assert!(matches!(store, GhostError::Store(_)));
        assert_eq!(store.to_string(), "\"a;b\" contains the list delimiter ';'");

        let config: GhostError = ConfigError::Invalid("ttl_days must be in [1, 365]").into();
        assert_eq!(
            config.to_string(),
            "invalid config: ttl_days must be in [1, 365]"
        );

        assert_eq!(GhostError::NoAnchorIds.to_string(), "no anchor ids to resolve");
    }
}
