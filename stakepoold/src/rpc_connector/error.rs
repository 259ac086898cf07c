//! Errors establishing a session with an RPC peer.

use std::path::PathBuf;

use rpc_version::Semver;

use crate::rpc_client::RpcError;

#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to read certificate file at {path}. {source}")]
    Certificate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no certificate found in {0}.")]
    NoCertificate(PathBuf),
    #[error("invalid host '{0}'. expected host:port.")]
    InvalidHost(String),
    #[error("tls error. {0}")]
    Tls(#[from] rustls::Error),
    #[error("failed to connect to {host}. {source}")]
    Connection { host: String, source: RpcError },
    #[error("unable to get {peer} RPC version. {source}")]
    VersionQuery { peer: String, source: RpcError },
    #[error("{peer} did not advertise a {api} version.")]
    MissingVersion { peer: String, api: &'static str },
    #[error(
        "{peer} JSON-RPC server does not have a compatible API version. advertises {advertised} but require {required}"
    )]
    IncompatibleVersion {
        peer: String,
        advertised: Semver,
        required: Semver,
    },
}
