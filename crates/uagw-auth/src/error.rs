//! Authentication and PKI errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors building the authentication configuration
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Duplicate user in credential table: {0}")]
    DuplicateUser(String),

    #[error("Empty username in credential table")]
    EmptyUsername,
}

/// Errors touching the PKI directory
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("PKI I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid certificate thumbprint: {0:?}")]
    InvalidThumbprint(String),
}
