//! OAuth2 flows for installed (desktop) applications.
//!
//! [`AuthFlow`] is the seam the credential cache talks to: one method to
//! refresh an expired credential, one to run the interactive consent flow.
//! [`InstalledFlow`] implements both against Google's OAuth2 endpoints.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};
use url::Url;

use crate::credential::Credential;
use crate::error::{DriveError, Result};
use crate::models::{ApplicationSecret, ClientSecretFile, TokenErrorResponse, TokenResponse};

/// Google Drive API scope with full access.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Read-only access to file metadata.
pub const DRIVE_METADATA_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/drive.metadata.readonly";

const SUCCESS_PAGE: &str =
    "The authentication flow has completed. You may close this window.";

/// Refreshes or acquires credentials on behalf of the credential cache.
#[async_trait]
pub trait AuthFlow: Send + Sync {
    /// Refresh an expired credential in place using its refresh token.
    async fn refresh(&self, credential: &mut Credential) -> Result<()>;

    /// Run the interactive consent flow and return a new credential.
    async fn authorize(&self, scopes: &[String]) -> Result<Credential>;
}

type UrlHandler = Box<dyn Fn(&Url) + Send + Sync>;

/// Installed-app flow: consent in the user's browser, redirect to a
/// listener on the loopback interface.
pub struct InstalledFlow {
    client_secret_path: PathBuf,
    http: Client,
    on_url: UrlHandler,
}

impl InstalledFlow {
    /// Create a flow reading the client secret from `client_secret_path`.
    ///
    /// The file is only read when consent is actually needed.
    pub fn new(client_secret_path: impl Into<PathBuf>) -> Self {
        Self {
            client_secret_path: client_secret_path.into(),
            http: Client::new(),
            on_url: Box::new(|url| {
                eprintln!("Please visit this URL to authorize this application: {}", url);
            }),
        }
    }

    /// Replace how the consent URL is shown to the user.
    pub fn on_authorization_url<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Url) + Send + Sync + 'static,
    {
        self.on_url = Box::new(handler);
        self
    }

    fn load_secret(&self) -> Result<ApplicationSecret> {
        let invalid = |message: String| DriveError::InvalidClientSecret {
            path: self.client_secret_path.clone(),
            message,
        };

        let content = fs::read_to_string(&self.client_secret_path)
            .map_err(|e| invalid(e.to_string()))?;
        let file: ClientSecretFile =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        file.into_secret()
            .ok_or_else(|| invalid("expected an \"installed\" or \"web\" client".to_string()))
    }
}

#[async_trait]
impl AuthFlow for InstalledFlow {
    async fn refresh(&self, credential: &mut Credential) -> Result<()> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or_else(|| DriveError::Authorization("no refresh token available".to_string()))?;

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", credential.client_id.as_str()),
        ];
        if let Some(secret) = credential.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        debug!(token_uri = %credential.token_uri, "refreshing access token");
        let response = request_token(&self.http, &credential.token_uri, &params).await?;
        credential.apply_token_response(response);
        Ok(())
    }

    async fn authorize(&self, scopes: &[String]) -> Result<Credential> {
        let secret = self.load_secret()?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());

        let state = random_token();
        let verifier = random_token();
        let url = authorization_url(
            &secret,
            &redirect_uri,
            scopes,
            &state,
            &code_challenge(&verifier),
        )?;

        info!(redirect_uri = %redirect_uri, "waiting for authorization callback");
        (self.on_url)(&url);

        let code = wait_for_code(listener, &state).await?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        if let Some(client_secret) = secret.client_secret.as_deref() {
            params.push(("client_secret", client_secret));
        }
        let response = request_token(&self.http, &secret.token_uri, &params).await?;

        let mut credential = Credential {
            access_token: String::new(),
            refresh_token: None,
            expiry: None,
            token_uri: secret.token_uri,
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            scopes: scopes.to_vec(),
        };
        credential.apply_token_response(response);
        Ok(credential)
    }
}

/// POST a grant to the token endpoint.
async fn request_token(
    http: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = http.post(token_uri).form(params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) => match err.error_description {
                Some(description) => format!("{}: {}", err.error, description),
                None => err.error,
            },
            Err(_) => format!("Status {}: {}", status, body),
        };
        return Err(DriveError::Authorization(message));
    }

    Ok(response.json().await?)
}

/// Build the consent URL the user opens in a browser.
pub(crate) fn authorization_url(
    secret: &ApplicationSecret,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    challenge: &str,
) -> Result<Url> {
    let mut url = Url::parse(&secret.auth_uri)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &secret.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &scopes.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("access_type", "offline")
        .append_pair("include_granted_scopes", "true")
        .append_pair("prompt", "consent");
    Ok(url)
}

/// How long the callback server may keep flushing its last response.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Shared between the callback handler and [`wait_for_code`].
#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

/// Serve the redirect URI until the browser delivers the authorization code.
///
/// Each connection is served on its own, so an idle connection (browser
/// preconnects) does not hold up the callback.
async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String> {
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let state = CallbackState {
        expected_state: Arc::from(expected_state),
        outcome: Arc::new(Mutex::new(Some(outcome_tx))),
    };
    let app = Router::new()
        .route("/", get(handle_callback))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .with_state(state);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = outcome_rx.await.unwrap_or_else(|_| {
        Err(DriveError::Authorization(
            "callback server stopped before authorization completed".to_string(),
        ))
    });

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
        debug!("callback server still draining connections, leaving it behind");
    }

    outcome
}

async fn handle_callback(
    State(state): State<CallbackState>,
    uri: Uri,
) -> (StatusCode, String) {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    debug!(request = target, "callback request");

    let (status, body, outcome) = match parse_callback(target, &state.expected_state) {
        Ok(Some(code)) => (StatusCode::OK, SUCCESS_PAGE.to_string(), Ok(code)),
        Ok(None) => return (StatusCode::NOT_FOUND, "Not found".to_string()),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string(), Err(e)),
    };

    let sender = state
        .outcome
        .lock()
        .map(|mut slot| slot.take())
        .unwrap_or_default();
    match sender {
        Some(sender) => {
            let _ = sender.send(outcome);
            (status, body)
        }
        // a second callback after the flow already finished
        None => (StatusCode::GONE, "Authorization already completed".to_string()),
    }
}

/// Extract the authorization code from a callback request target.
///
/// Returns `Ok(None)` for requests that carry neither a code nor an error.
pub(crate) fn parse_callback(target: &str, expected_state: &str) -> Result<Option<String>> {
    let url = Url::parse("http://127.0.0.1")?.join(target)?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        return Err(DriveError::Authorization(format!(
            "consent was not granted: {}",
            error
        )));
    }

    let Some(code) = params.get("code") else {
        return Ok(None);
    };

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(DriveError::Authorization(
            "state mismatch in authorization callback".to_string(),
        ));
    }

    Ok(Some(code.clone()))
}

/// 32 random bytes, URL-safe base64. Used for `state` and the PKCE verifier.
fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE S256 challenge for a verifier.
fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
