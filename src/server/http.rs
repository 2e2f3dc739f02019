//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo. Every request except the service-to-service
//! routes passes through `SecurityConfig::protect` before it is dispatched.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::SecuritySettings;
use crate::routes;
use crate::security::SecurityConfig;
use crate::store::CredentialStore;
use crate::types::Result;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const TIMING_EQUALIZER_PASSWORD: &str = "warden-unknown-user";

/// Shared application state
pub struct AppState {
    pub service_name: String,
    pub dev_mode: bool,
    pub security: SecurityConfig,
    pub store: Arc<dyn CredentialStore>,
    /// Verified against when the email is unknown, so a miss costs as much
    /// as a wrong password
    pub(crate) dummy_hash: String,
}

impl AppState {
    pub fn new(settings: &SecuritySettings, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let security = SecurityConfig::from_settings(settings)?;
        Self::with_security(settings, security, store)
    }

    pub fn with_security(
        settings: &SecuritySettings,
        security: SecurityConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let dummy_hash = security.passwords().hash(TIMING_EQUALIZER_PASSWORD)?;
        Ok(Self {
            service_name: settings.service_name.clone(),
            dev_mode: settings.dev_mode,
            security,
            store,
            dummy_hash,
        })
    }
}

/// Bind `listen` and serve until the process exits
pub async fn run(listen: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    serve(listener, state).await
}

/// Serve connections from an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    info!(
        "Warden listening on {} as {}",
        listener.local_addr()?,
        state.service_name
    );

    if state.dev_mode {
        warn!("Development mode enabled - do not expose this instance");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    debug!("[{}] {} {}", addr, req.method(), req.uri().path());

    // Machine-to-machine routes authenticate by API key and skip the token gate
    if req.uri().path().starts_with(routes::SERVICE_PREFIX) {
        return Ok(to_boxed(routes::handle_service_request(&state, req).await));
    }

    let response = state
        .security
        .protect(req, |req| routes::dispatch(Arc::clone(&state), req))
        .await;
    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}
