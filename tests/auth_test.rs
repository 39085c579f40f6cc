//! Tests for the installed-app consent flow against a mocked token endpoint.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use drive_ops::error::DriveError;
use drive_ops::{AuthFlow, InstalledFlow, DRIVE_SCOPE};
use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use url::Url;

fn write_client_secret(dir: &Path, token_uri: &str) -> PathBuf {
    let path = dir.join("credentials.json");
    let secret = json!({
        "installed": {
            "client_id": "desktop-client",
            "client_secret": "desktop-secret",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": token_uri,
            "redirect_uris": ["http://localhost"]
        }
    });
    fs::write(&path, secret.to_string()).unwrap();
    path
}

/// Flow whose "browser" immediately follows the redirect with `reply`
/// appended to the query string. `{state}` in `reply` is replaced by the
/// state from the consent URL.
fn flow_with_browser(secret: PathBuf, reply: &'static str) -> InstalledFlow {
    InstalledFlow::new(secret).on_authorization_url(move |url: &Url| {
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let callback = format!(
            "{}?{}",
            params["redirect_uri"],
            reply.replace("{state}", &params["state"])
        );
        tokio::spawn(async move {
            let browser = reqwest::Client::builder().no_proxy().build().unwrap();
            let _ = browser.get(callback).send().await;
        });
    })
}

async fn token_server() -> (mockito::ServerGuard, TempDir, PathBuf) {
    let server = Server::new_async().await;
    let dir = tempdir().unwrap();
    let secret = write_client_secret(dir.path(), &format!("{}/token", server.url()));
    (server, dir, secret)
}

#[tokio::test]
async fn consent_exchanges_code_for_credential() {
    let (mut server, _dir, secret) = token_server().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "4/auth-code".into()),
            Matcher::UrlEncoded("client_id".into(), "desktop-client".into()),
            Matcher::UrlEncoded("client_secret".into(), "desktop-secret".into()),
            Matcher::Regex("code_verifier=".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": "ya29.granted",
                "refresh_token": "1//granted",
                "expires_in": 3599,
                "scope": DRIVE_SCOPE,
                "token_type": "Bearer"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let flow = flow_with_browser(secret, "state={state}&code=4%2Fauth-code&scope=drive");
    let cred = flow.authorize(&[DRIVE_SCOPE.to_string()]).await.unwrap();

    mock.assert_async().await;
    assert_eq!(cred.access_token, "ya29.granted");
    assert_eq!(cred.refresh_token.as_deref(), Some("1//granted"));
    assert_eq!(cred.client_id, "desktop-client");
    assert_eq!(cred.token_uri, format!("{}/token", server.url()));
    assert!(cred.is_valid());
}

#[tokio::test]
async fn idle_connection_does_not_block_the_callback() {
    let (mut server, _dir, secret) = token_server().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::UrlEncoded("code".into(), "4/auth-code".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": "ya29.granted",
                "refresh_token": "1//granted",
                "expires_in": 3599,
                "scope": DRIVE_SCOPE
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let (page_tx, page_rx) = oneshot::channel::<(u16, String)>();
    let page_tx = Arc::new(Mutex::new(Some(page_tx)));

    // Browsers open speculative connections and may never send a request on them.
    let flow = InstalledFlow::new(secret).on_authorization_url(move |url: &Url| {
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let port = Url::parse(&params["redirect_uri"]).unwrap().port().unwrap();
        let callback = format!(
            "{}?state={}&code=4%2Fauth-code",
            params["redirect_uri"], params["state"]
        );
        let page_tx = page_tx.lock().unwrap().take();
        tokio::spawn(async move {
            let idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

            let browser = reqwest::Client::builder().no_proxy().build().unwrap();
            let response = browser.get(callback).send().await.unwrap();
            let status = response.status().as_u16();
            let body = response.text().await.unwrap();
            if let Some(tx) = page_tx {
                let _ = tx.send((status, body));
            }
            drop(idle);
        });
    });

    let cred = tokio::time::timeout(
        Duration::from_secs(10),
        flow.authorize(&[DRIVE_SCOPE.to_string()]),
    )
    .await
    .expect("consent flow stalled behind an idle connection")
    .unwrap();

    mock.assert_async().await;
    assert_eq!(cred.access_token, "ya29.granted");

    let (status, body) = page_rx.await.unwrap();
    assert_eq!(status, 200);
    assert!(body.contains("authentication flow has completed"));
}

#[tokio::test]
async fn denied_consent_is_an_authorization_error() {
    let (mut server, _dir, secret) = token_server().await;
    let mock = server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;

    let flow = flow_with_browser(secret, "error=access_denied&state={state}");
    let err = flow.authorize(&[DRIVE_SCOPE.to_string()]).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, DriveError::Authorization(_)));
    assert!(err.to_string().contains("access_denied"));
}

#[tokio::test]
async fn forged_state_is_rejected() {
    let (mut server, _dir, secret) = token_server().await;
    let mock = server
        .mock("POST", "/token")
        .expect(0)
        .create_async()
        .await;

    let flow = flow_with_browser(secret, "state=forged&code=4%2Fauth-code");
    let err = flow.authorize(&[DRIVE_SCOPE.to_string()]).await.unwrap_err();

    mock.assert_async().await;
    assert!(err.to_string().contains("state mismatch"));
}

#[tokio::test]
async fn missing_client_secret_file() {
    let dir = tempdir().unwrap();
    let flow = InstalledFlow::new(dir.path().join("credentials.json"));

    let err = flow.authorize(&[DRIVE_SCOPE.to_string()]).await.unwrap_err();

    assert!(matches!(err, DriveError::InvalidClientSecret { .. }));
}

#[tokio::test]
async fn client_secret_without_client_section() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    fs::write(&path, r#"{"type": "service_account"}"#).unwrap();

    let err = InstalledFlow::new(&path)
        .authorize(&[DRIVE_SCOPE.to_string()])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("installed"));
}
