//! Establishes version gated sessions with the chain node and the wallet.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use http::{HeaderValue, header::AUTHORIZATION};
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::{debug, error, info, warn};

use rpc_version::{CompatibilityPolicy, Semver};

use crate::config::{PeerConfig, StakepooldConfig};
use crate::notifications::NotificationHandler;
use crate::rpc_client::{RpcClient, RpcError};

pub mod error;

pub use error::ConnectError;

/// Websocket endpoint of the node and wallet RPC servers.
pub const WEBSOCKET_ENDPOINT: &str = "ws";

/// The two RPC peers of a stake pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    /// Chain full node. Serving an incompatible API is fatal.
    Node,
    /// Voting wallet. Serving an incompatible API is only logged.
    Wallet,
}

impl PeerKind {
    /// Key of the peer's own API in its `version` result.
    #[must_use]
    pub fn version_key(self) -> &'static str {
        match self {
            PeerKind::Node => "bitumdjsonrpcapi",
            PeerKind::Wallet => "bitumwalletjsonrpcapi",
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerKind::Node => "bitumd",
            PeerKind::Wallet => "bitumwallet",
        };
        write!(f, "{name}")
    }
}

/// Connects to the node and checks that it serves a compatible JSON-RPC API.
///
/// `handler` receives the node's notifications. An incompatible node fails with
/// [`ConnectError::IncompatibleVersion`] and its session is closed.
pub async fn connect_node_rpc(
    config: &StakepooldConfig,
    handler: Arc<dyn NotificationHandler>,
) -> Result<(RpcClient, Semver), ConnectError> {
    connect_peer(
        PeerKind::Node,
        &config.node,
        config.compatibility_policy,
        handler,
    )
    .await
}

/// Connects to the wallet. An incompatible wallet API is logged as a warning and the session is returned.
pub async fn connect_wallet_rpc(
    config: &StakepooldConfig,
    handler: Arc<dyn NotificationHandler>,
) -> Result<(RpcClient, Semver), ConnectError> {
    connect_peer(
        PeerKind::Wallet,
        &config.wallet,
        config.compatibility_policy,
        handler,
    )
    .await
}

async fn connect_peer(
    kind: PeerKind,
    peer: &PeerConfig,
    policy: CompatibilityPolicy,
    handler: Arc<dyn NotificationHandler>,
) -> Result<(RpcClient, Semver), ConnectError> {
    let client = open_session(kind, peer, handler).await?;
    let version = negotiate_version(&client, kind, &peer.required_version, policy).await?;

    Ok((client, version))
}

/// Opens an authenticated websocket session with `peer`, trusting only the certificate at `peer.cert_path`.
pub async fn open_session(
    kind: PeerKind,
    peer: &PeerConfig,
    handler: Arc<dyn NotificationHandler>,
) -> Result<RpcClient, ConnectError> {
    let certificates = load_certificates(&peer.cert_path).inspect_err(|e| {
        error!(
            "Failed to read {kind} cert file at {}: {e}",
            peer.cert_path.display()
        );
    })?;
    let server_name = server_name(&peer.host)?;

    debug!(
        "Attempting to connect to {kind} RPC {} as user {} using certificate located in {}",
        peer.host,
        peer.user,
        peer.cert_path.display()
    );

    let tls_config = tls_client_config(certificates)?;
    let ws_stream = connect_websocket(peer, server_name, tls_config)
        .await
        .map_err(|source| {
            error!("Failed to start {kind} RPC client: {source}");
            if let Some(hint) = connection_hint(kind, &peer.cert_path) {
                error!("{hint}");
            }
            ConnectError::Connection {
                host: peer.host.clone(),
                source,
            }
        })?;
    info!("Connected to {kind} RPC {}", peer.host);

    Ok(RpcClient::from_stream(kind.to_string(), ws_stream, handler))
}

/// Queries the API version of `kind` from `client` and checks it against `required`.
///
/// Returns the advertised version. Only a node may fail the check.
pub async fn negotiate_version(
    client: &RpcClient,
    kind: PeerKind,
    required: &Semver,
    policy: CompatibilityPolicy,
) -> Result<Semver, ConnectError> {
    let versions = client.version().await.map_err(|source| {
        error!("Unable to get {kind} RPC version: {source}");
        ConnectError::VersionQuery {
            peer: kind.to_string(),
            source,
        }
    })?;
    let advertised = *versions
        .get(kind.version_key())
        .ok_or(ConnectError::MissingVersion {
            peer: kind.to_string(),
            api: kind.version_key(),
        })?;

    if policy.is_compatible(required, &advertised) {
        info!("{kind} advertises JSON-RPC API {advertised}, require {required}");
        return Ok(advertised);
    }

    match kind {
        PeerKind::Node => Err(ConnectError::IncompatibleVersion {
            peer: kind.to_string(),
            advertised,
            required: *required,
        }),
        PeerKind::Wallet => {
            warn!(
                "{kind} JSON-RPC server {} does not have a compatible API version. Advertises {advertised} but require {required}",
                client.peer()
            );
            Ok(advertised)
        }
    }
}

/// Builds the websocket upgrade request for `host`, authenticating with HTTP basic auth.
pub fn websocket_request(
    scheme: &str,
    host: &str,
    user: &str,
    password: &str,
) -> Result<Request, RpcError> {
    let mut request = format!("{scheme}://{host}/{WEBSOCKET_ENDPOINT}").into_client_request()?;
    let credentials = BASE64_STANDARD.encode(format!("{user}:{password}"));
    request.headers_mut().insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {credentials}"))?,
    );

    Ok(request)
}

async fn connect_websocket(
    peer: &PeerConfig,
    server_name: ServerName<'static>,
    tls_config: ClientConfig,
) -> Result<WebSocketStream<TlsStream<TcpStream>>, RpcError> {
    let request = websocket_request("wss", &peer.host, &peer.user, &peer.password)?;
    let tcp_stream = TcpStream::connect(peer.host.as_str()).await?;
    let tls_stream = TlsConnector::from(Arc::new(tls_config))
        .connect(server_name, tcp_stream)
        .await?;
    let (ws_stream, _response) = tokio_tungstenite::client_async(request, tls_stream).await?;

    Ok(ws_stream)
}

fn connection_hint(kind: PeerKind, cert_path: &Path) -> Option<String> {
    match kind {
        PeerKind::Node => None,
        PeerKind::Wallet => Some(format!(
            "Verify that username and password is correct and that rpc.cert is for your wallet: {}",
            cert_path.display()
        )),
    }
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConnectError> {
    let bytes = std::fs::read(path).map_err(|source| ConnectError::Certificate {
        path: path.to_path_buf(),
        source,
    })?;
    let certificates = rustls_pemfile::certs(&mut bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConnectError::Certificate {
            path: path.to_path_buf(),
            source,
        })?;
    if certificates.is_empty() {
        return Err(ConnectError::NoCertificate(path.to_path_buf()));
    }

    Ok(certificates)
}

fn server_name(host: &str) -> Result<ServerName<'static>, ConnectError> {
    let authority = host
        .parse::<http::uri::Authority>()
        .map_err(|_| ConnectError::InvalidHost(host.to_string()))?;
    if authority.port_u16().is_none() {
        return Err(ConnectError::InvalidHost(host.to_string()));
    }
    let hostname = authority.host().trim_start_matches('[').trim_end_matches(']');

    ServerName::try_from(hostname.to_string()).map_err(|_| ConnectError::InvalidHost(host.to_string()))
}

fn tls_client_config(
    certificates: Vec<CertificateDer<'static>>,
) -> Result<ClientConfig, ConnectError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PinnedCertVerifier {
        certificates,
        provider: Arc::clone(&provider),
    };

    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth())
}

/// Accepts exactly the certificates read from the peer's certificate file.
///
/// Node and wallet certificates are self-signed and act as their own root, which web PKI validation rejects for
/// an end-entity certificate.
#[derive(Debug)]
struct PinnedCertVerifier {
    certificates: Vec<CertificateDer<'static>>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self
            .certificates
            .iter()
            .any(|certificate| certificate.as_ref() == end_entity.as_ref())
        {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
