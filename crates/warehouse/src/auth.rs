use crate::Error;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Request header through which an app proxy forwards the access token of
/// the user on whose behalf a request is made.
pub const DELEGATED_TOKEN_HEADER: &str = "X-Forwarded-Access-Token";

// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Credential is an identity with which statements are executed.
#[derive(Clone)]
pub enum Credential {
    /// A static personal access token.
    Static(String),
    /// OAuth client credentials of a service principal, which are
    /// exchanged for short-lived access tokens.
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    /// An access token delegated by the requesting user.
    Delegated(String),
}

impl Credential {
    /// Resolve the privileged identity of the app from its configured parts.
    /// Exactly one of a static token or a complete client id and secret is required.
    pub fn app(
        token: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Self, Error> {
        let nonempty = |v: Option<String>| v.filter(|v| !v.trim().is_empty());

        match (nonempty(token), nonempty(client_id), nonempty(client_secret)) {
            (Some(token), None, None) => Ok(Self::Static(token)),
            (None, Some(client_id), Some(client_secret)) => Ok(Self::ClientCredentials {
                client_id,
                client_secret,
            }),
            (None, None, None) => Err(Error::Config(
                "an access token, or a client id and secret, is required".to_string(),
            )),
            (Some(_), _, _) => Err(Error::Config(
                "an access token and client credentials are mutually exclusive".to_string(),
            )),
            (None, Some(_), None) => Err(Error::Config(
                "client id was provided without a client secret".to_string(),
            )),
            (None, None, Some(_)) => Err(Error::Config(
                "client secret was provided without a client id".to_string(),
            )),
        }
    }

    /// Resolve a delegated identity from the value of the `DELEGATED_TOKEN_HEADER`.
    pub fn delegated(header: Option<&str>) -> Result<Self, Error> {
        match header.map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Self::Delegated(token.to_string())),
            _ => Err(Error::Authorization(format!(
                "request is missing the {DELEGATED_TOKEN_HEADER} header"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Static(_) => "static",
            Credential::ClientCredentials { .. } => "client-credentials",
            Credential::Delegated(_) => "delegated",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            other => write!(f, "{}(<redacted>)", other.kind()),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    // Seconds to expiry of access_token.
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// TokenSource produces bearer tokens for a Credential,
/// exchanging and caching them as required.
pub(crate) struct TokenSource {
    credential: Credential,
    cached: tokio::sync::Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.credential.kind()
    }

    pub async fn token(&self, http: &reqwest::Client, host: &url::Url) -> Result<String, Error> {
        let (client_id, client_secret) = match &self.credential {
            Credential::Static(token) | Credential::Delegated(token) => return Ok(token.clone()),
            Credential::ClientCredentials {
                client_id,
                client_secret,
            } => (client_id, client_secret),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }
        tracing::debug!(%client_id, "exchanging client credentials for an access token");

        let response = http
            .post(host.join("/oidc/v1/token")?)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authorization(format!(
                "token exchange failed: {status}: {body}"
            )));
        }
        let TokenResponse {
            access_token,
            expires_in,
        } = response.json().await?;

        let refresh_at = Instant::now()
            + Duration::from_secs(expires_in).saturating_sub(REFRESH_MARGIN);
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            refresh_at,
        });

        Ok(access_token)
    }
}
