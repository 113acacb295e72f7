use std::fmt;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use url::form_urlencoded;

use crate::transport::TransportSettings;
use crate::{AuthError, Token};

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub realm: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("realm", &self.realm)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of fresh tokens: a full login with the stored credentials, or a
/// refresh with the refresh credential of the current token.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self) -> Result<Token, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_expires_in: u64,
}

/// OpenID Connect token endpoint of a Keycloak realm.
#[derive(Debug, Clone)]
pub struct KeycloakProvider {
    client: reqwest::Client,
    token_url: String,
    credentials: Credentials,
}

impl KeycloakProvider {
    /// `auth_url` is the server base; the token endpoint is
    /// `{auth_url}/realms/{realm}/protocol/openid-connect/token`.
    pub fn new(
        auth_url: &str,
        credentials: Credentials,
        settings: &TransportSettings,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| AuthError::Network(err.to_string()))?;
        let token_url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            auth_url.trim_end_matches('/'),
            credentials.realm
        );
        Ok(Self {
            client,
            token_url,
            credentials,
        })
    }

    async fn request_token(&self, form: String) -> Result<Token, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::Network(err.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(|err| AuthError::Decode(err.to_string()))?;
        Ok(Token {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_in: Duration::from_secs(parsed.expires_in),
            refresh_expires_in: Duration::from_secs(parsed.refresh_expires_in),
            issued_at: Instant::now(),
        })
    }
}

#[async_trait::async_trait]
impl AuthProvider for KeycloakProvider {
    async fn login(&self) -> Result<Token, AuthError> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "password")
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("username", &self.credentials.username)
            .append_pair("password", &self.credentials.password)
            .finish();
        self.request_token(form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token, AuthError> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("refresh_token", refresh_token)
            .finish();
        self.request_token(form).await
    }
}
