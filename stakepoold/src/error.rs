//! Stakepoold error module

use std::path::PathBuf;

use ticket_sync::error::ClassifyError;
use ticket_sync::pool::hash::HashParseError;

use crate::rpc_connector::ConnectError;

#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum StakepooldError {
    #[error("connection error. {0}")]
    ConnectError(#[from] ConnectError),
    #[error("ticket refresh failed. {0}")]
    ClassifyError(#[from] ClassifyError),
    #[error("failed to read {path}. {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}. {source}")]
    ParseFile {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid low fee ticket hash '{hash}' in {path}. {source}")]
    InvalidTicketHash {
        path: PathBuf,
        hash: String,
        source: HashParseError,
    },
    #[error("file error. {0}")]
    FileError(#[from] std::io::Error),
}
