//! The persisted OAuth2 credential.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TokenResponse;

/// Treat a token as expired this long before its real expiry.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Access token, optional refresh token and the client identity needed to
/// refresh it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// `None` means the token does not expire.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS) >= expiry,
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Whether every requested scope was granted to this credential.
    pub fn has_scopes<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        requested
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope.as_ref()))
    }

    /// Update this credential in place from a token endpoint response.
    ///
    /// The refresh token and scopes are only replaced when the server sent
    /// new ones; Google omits both on a refresh grant.
    pub fn apply_token_response(&mut self, response: TokenResponse) {
        self.access_token = response.access_token;
        self.expiry = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = response.scope {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expiry: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "ya29.token".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: Some("secret".to_string()),
            scopes: vec!["https://www.googleapis.com/auth/drive".to_string()],
        }
    }

    #[test]
    fn test_future_expiry_is_valid() {
        let cred = credential(Some(Utc::now() + Duration::hours(1)));
        assert!(!cred.is_expired());
        assert!(cred.is_valid());
    }

    #[test]
    fn test_expiry_within_skew_is_expired() {
        let cred = credential(Some(Utc::now() + Duration::seconds(30)));
        assert!(cred.is_expired());
        assert!(!cred.is_valid());
    }

    #[test]
    fn test_no_expiry_never_expires() {
        assert!(credential(None).is_valid());
    }

    #[test]
    fn test_empty_access_token_is_invalid() {
        let mut cred = credential(None);
        cred.access_token.clear();
        assert!(!cred.is_valid());
    }

    #[test]
    fn test_has_scopes() {
        let cred = credential(None);
        assert!(cred.has_scopes(&["https://www.googleapis.com/auth/drive"]));
        assert!(cred.has_scopes::<&str>(&[]));
        assert!(!cred.has_scopes(&["https://www.googleapis.com/auth/drive.file"]));
    }

    #[test]
    fn test_apply_token_response_keeps_refresh_token() {
        let mut cred = credential(Some(Utc::now() - Duration::hours(1)));
        cred.apply_token_response(TokenResponse {
            access_token: "ya29.fresh".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3599),
            refresh_token: None,
            scope: None,
        });

        assert_eq!(cred.access_token, "ya29.fresh");
        assert_eq!(cred.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(cred.scopes.len(), 1);
        assert!(cred.is_valid());
    }

    #[test]
    fn test_apply_token_response_replaces_scopes() {
        let mut cred = credential(None);
        cred.apply_token_response(TokenResponse {
            access_token: "ya29.fresh".to_string(),
            token_type: None,
            expires_in: None,
            refresh_token: Some("1//rotated".to_string()),
            scope: Some("scope.a scope.b".to_string()),
        });

        assert_eq!(cred.refresh_token.as_deref(), Some("1//rotated"));
        assert_eq!(cred.scopes, vec!["scope.a", "scope.b"]);
        assert!(cred.expiry.is_none());
    }

    #[test]
    fn test_json_round_trip_preserves_expiry() {
        let cred = credential(Some(Utc::now() + Duration::hours(1)));
        let json = serde_json::to_string(&cred).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cred);
    }
}
