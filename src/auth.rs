//! OAuth2 token acquisition for the Microsoft identity platform.
//!
//! Two mutually exclusive grants against Azure AD's
//! `/oauth2/v2.0/{devicecode,token}` endpoints:
//!
//! - [`TokenProvider::client_credentials`] — application mode: exchanges
//!   app id + secret directly for a token, no user interaction.
//! - [`TokenProvider::device_code`] — delegated mode: requests a device
//!   code, hands the user code and verification URL to a [`DevicePrompt`]
//!   collaborator (terminal UI by default), then redeems the device code
//!   once the operator has signed in.
//!
//! Both return an [`AccessToken`] that is embedded verbatim into Graph
//! request headers. There is no refresh logic: once a token expires, a new
//! provider call is required (Azure AD issues one-hour tokens by default).

use std::time::Instant;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GraphError, Result};

/// Azure AD authority host. `TokenProvider::with_authority` overrides this
/// in tests to point at a mock server.
const AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope requested by the client-credentials grant when the credential set
/// carries no explicit scopes. Application permissions are consented on the
/// app registration, so `.default` is the only scope that makes sense there.
const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// AADSTS error code Azure AD returns when the app registration has
/// "Allow public client flows" disabled and a device-code redemption is
/// attempted anyway.
const PUBLIC_CLIENT_DISALLOWED: i64 = 7000218;

/// Safety buffer subtracted from `expires_in` so `is_expired` reports true
/// before the token actually lapses. Prevents requests from racing the
/// expiry boundary.
const EXPIRY_BUFFER_SECS: u64 = 60;

/// Timeout for token-endpoint requests. Token exchanges are small and fast;
/// Graph API calls get their own, longer policy in `client`.
const TOKEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

// ── Credential set ─────────────────────────────────────────────────────

/// Immutable credential set used to obtain a token.
///
/// `secret` is only required for the client-credentials grant; `scopes` is
/// only meaningful for the device-code grant (the application grant always
/// uses `.default` unless scopes are supplied explicitly).
#[derive(Debug, Clone)]
pub struct Credentials {
    /// The application (client) id of the app registration.
    pub app_id: String,
    /// The UUID of the Azure/Entra tenant.
    pub tenant_id: String,
    /// The application secret. `None` for public-client (device-code) use.
    pub secret: Option<String>,
    /// Requested scopes. Device-code sign-in needs `openid` and `profile`
    /// on top of the resource scopes if an ID token is wanted.
    pub scopes: Vec<String>,
}

impl Credentials {
    /// Credentials for the client-credentials (application) grant.
    pub fn application(app_id: &str, tenant_id: &str, secret: &str) -> Self {
        Credentials {
            app_id: app_id.to_string(),
            tenant_id: tenant_id.to_string(),
            secret: Some(secret.to_string()),
            scopes: Vec::new(),
        }
    }

    /// Credentials for the device-code (delegated) grant.
    pub fn delegated(app_id: &str, tenant_id: &str, scopes: &[&str]) -> Self {
        Credentials {
            app_id: app_id.to_string(),
            tenant_id: tenant_id.to_string(),
            secret: None,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The space-joined scope string for token requests, falling back to
    /// the Graph `.default` scope when none were supplied.
    fn scope_string(&self) -> String {
        if self.scopes.is_empty() {
            GRAPH_DEFAULT_SCOPE.to_string()
        } else {
            self.scopes.join(" ")
        }
    }
}

// ── Wire types ─────────────────────────────────────────────────────────

/// Form body for the client-credentials grant.
/// Serialized as `application/x-www-form-urlencoded` by reqwest's `.form()`.
#[derive(Serialize)]
struct ClientCredentialsRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

/// Form body for the device-code issuance request.
#[derive(Serialize)]
struct DeviceCodeRequest<'a> {
    client_id: &'a str,
    scope: &'a str,
}

/// Form body for redeeming a device code for an access token.
#[derive(Serialize)]
struct DeviceCodeRedeemRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    device_code: &'a str,
}

/// Subset of the Azure AD token response that we need.
/// The endpoint returns additional fields (e.g. `ext_expires_in`) which are
/// silently ignored by serde because the struct is not `deny_unknown_fields`.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Azure AD's device-code issuance response.
#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
}

/// Azure AD error body returned with non-2xx token responses.
/// `error_codes` carries the numeric AADSTS codes; 7000218 is the
/// public-client-flows-disallowed condition we classify specially.
#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error_codes: Vec<i64>,
}

// ── Access token ───────────────────────────────────────────────────────

/// An opaque bearer token with expiry tracking.
///
/// Held in memory only, never persisted. Lifecycle is one session of the
/// directory client: there is no refresh, so an expired token means a new
/// [`TokenProvider`] call.
#[derive(Debug)]
pub struct AccessToken {
    secret: String,
    expires_in: u64,
    acquired_at: Instant,
}

impl AccessToken {
    /// Creates a token with a fixed value, bypassing Azure AD.
    /// Used by tests to avoid real HTTP calls during token acquisition.
    /// The token is treated as freshly acquired (expires_in = 3600s).
    pub fn fixed(token: &str) -> Self {
        AccessToken {
            secret: token.to_string(),
            expires_in: 3600,
            acquired_at: Instant::now(),
        }
    }

    /// The raw bearer string, exactly as issued.
    pub fn as_str(&self) -> &str {
        &self.secret
    }

    /// Returns `true` once the token has exceeded its lifetime (minus a
    /// 60-second safety buffer). Expired tokens are not refreshed; the
    /// caller must acquire a new one.
    pub fn is_expired(&self) -> bool {
        let lifetime = self.expires_in.saturating_sub(EXPIRY_BUFFER_SECS);
        self.acquired_at.elapsed().as_secs() >= lifetime
    }
}

// ── Operator interaction ───────────────────────────────────────────────

/// What the operator needs in order to complete a device-code sign-in.
pub struct DeviceCodeGrant {
    /// The short code the operator types into the verification page.
    pub user_code: String,
    /// The sign-in page to open.
    pub verification_uri: String,
    /// Local wall-clock time at which the user code stops working.
    pub valid_until: chrono::DateTime<Local>,
}

/// Collaborator that walks the operator through the device-code sign-in.
///
/// `authorize` must block until the operator has completed the sign-in;
/// the provider redeems the device code as soon as it returns. The default
/// [`TerminalPrompt`] talks to stdin/stdout; replace it with any other UI.
pub trait DevicePrompt {
    /// Present the grant to the operator and block until they confirm
    /// having signed in.
    fn authorize(&self, grant: &DeviceCodeGrant);
}

/// Terminal implementation of [`DevicePrompt`]: prints the user code and
/// its validity window, opens a browser at the verification URL, and waits
/// on Enter twice (once to launch the browser, once after sign-in).
pub struct TerminalPrompt;

impl DevicePrompt for TerminalPrompt {
    fn authorize(&self, grant: &DeviceCodeGrant) {
        println!("Please enter the following code in your web browser:");
        println!("{}", grant.user_code);
        println!(
            "This code is valid until {}",
            grant.valid_until.format("%Y-%m-%d %H:%M:%S")
        );
        println!("The browser will open automatically once you press enter.");
        wait_for_enter("Press Enter to open a browser window");

        if let Err(e) = open::that(&grant.verification_uri) {
            eprintln!(
                "Could not open a browser ({e}); browse to {} manually",
                grant.verification_uri
            );
        }

        wait_for_enter("Press Enter once you have logged in with your device code");
    }
}

fn wait_for_enter(prompt: &str) {
    println!("{prompt}");
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);
}

// ── Token provider ─────────────────────────────────────────────────────

/// Exchanges a [`Credentials`] set for an [`AccessToken`] via one of the
/// two supported OAuth2 grants.
///
/// The provider is stateless apart from its HTTP client: every call is a
/// fresh exchange against the token endpoint. Callers hold on to the
/// returned token for the lifetime of their `GraphClient`.
pub struct TokenProvider {
    client: reqwest::Client,
    authority: String,
    credentials: Credentials,
}

impl TokenProvider {
    /// Provider against the production Azure AD authority.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_authority(credentials, AUTHORITY)
    }

    /// Constructor that accepts a custom authority URL, used by tests to
    /// point at a local mock server instead of Azure AD.
    pub fn with_authority(credentials: Credentials, authority: &str) -> Self {
        TokenProvider {
            client: reqwest::Client::builder()
                .timeout(TOKEN_TIMEOUT)
                .build()
                .expect("failed to build HTTP client for the token endpoint"),
            authority: authority.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, self.credentials.tenant_id
        )
    }

    fn device_code_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/devicecode",
            self.authority, self.credentials.tenant_id
        )
    }

    /// Acquires a token via the client-credentials (application) grant.
    ///
    /// # Errors
    ///
    /// - `GraphError::Auth` — missing secret, unreachable token endpoint,
    ///   non-2xx response (body preserved, including AADSTS codes), or a
    ///   malformed token response.
    pub async fn client_credentials(&self) -> Result<AccessToken> {
        let secret = self.credentials.secret.as_deref().ok_or_else(|| GraphError::Auth {
            message: "a client secret is required for the client-credentials grant".to_string(),
            source: None,
        })?;

        let scope = self.credentials.scope_string();
        let body = ClientCredentialsRequest {
            client_id: &self.credentials.app_id,
            scope: &scope,
            client_secret: secret,
            grant_type: "client_credentials",
        };

        debug!(tenant_id = %self.credentials.tenant_id, "requesting client-credentials token");
        let response = self
            .client
            .post(self.token_url())
            .form(&body)
            .send()
            .await
            .map_err(|e| auth_transport_error("token endpoint unreachable", e))?;

        self.read_token_response(response).await
    }

    /// Acquires a token via the device-code (delegated) grant.
    ///
    /// Requests a device code with the configured scopes, hands the user
    /// code and verification URL to `prompt` (which blocks until the
    /// operator confirms having signed in), then redeems the device code.
    ///
    /// # Errors
    ///
    /// - `GraphError::PublicClientDisallowed` — Azure AD rejected the
    ///   redemption with AADSTS 7000218; the app registration must allow
    ///   public client flows. Terminal, no retry.
    /// - `GraphError::Auth` — any other token-endpoint failure; the raw
    ///   error body is surfaced verbatim.
    pub async fn device_code(&self, prompt: &dyn DevicePrompt) -> Result<AccessToken> {
        let scope = self.credentials.scope_string();
        let body = DeviceCodeRequest {
            client_id: &self.credentials.app_id,
            scope: &scope,
        };

        debug!(tenant_id = %self.credentials.tenant_id, "requesting device code");
        let response = self
            .client
            .post(self.device_code_url())
            .form(&body)
            .send()
            .await
            .map_err(|e| auth_transport_error("device-code endpoint unreachable", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| auth_transport_error("failed to read device-code response", e))?;
        if !status.is_success() {
            return Err(GraphError::Auth {
                message: format!("device-code request failed ({status}): {text}"),
                source: None,
            });
        }
        let issued: DeviceCodeResponse = serde_json::from_str(&text).map_err(|e| GraphError::Auth {
            message: "failed to parse device-code response".to_string(),
            source: Some(Box::new(e)),
        })?;

        // Block on the operator; the device code stays valid for the
        // window Azure AD reported (15 minutes by default).
        let grant = DeviceCodeGrant {
            user_code: issued.user_code,
            verification_uri: issued.verification_uri,
            valid_until: Local::now() + chrono::Duration::seconds(issued.expires_in as i64),
        };
        prompt.authorize(&grant);

        let redeem = DeviceCodeRedeemRequest {
            grant_type: "urn:ietf:params:oauth:grant-type:device_code",
            client_id: &self.credentials.app_id,
            device_code: &issued.device_code,
        };

        let response = self
            .client
            .post(self.token_url())
            .form(&redeem)
            .send()
            .await
            .map_err(|e| auth_transport_error("token endpoint unreachable", e))?;

        self.read_token_response(response).await
    }

    /// Reads a token-endpoint response, classifying failures.
    ///
    /// The body is read as text first so that on failure the raw AADSTS
    /// error message is preserved in the error — `error_for_status()` would
    /// discard this diagnostic information.
    async fn read_token_response(&self, response: reqwest::Response) -> Result<AccessToken> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| auth_transport_error("failed to read token response", e))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<TokenErrorResponse>(&body) {
                if err.error_codes.contains(&PUBLIC_CLIENT_DISALLOWED) {
                    return Err(GraphError::PublicClientDisallowed);
                }
            }
            return Err(GraphError::Auth {
                message: format!("token request failed ({status}): {body}"),
                source: None,
            });
        }

        let resp: TokenResponse = serde_json::from_str(&body).map_err(|e| GraphError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(e)),
        })?;

        debug!(expires_in = resp.expires_in, "token acquired");
        Ok(AccessToken {
            secret: resp.access_token,
            expires_in: resp.expires_in,
            acquired_at: Instant::now(),
        })
    }
}

fn auth_transport_error(context: &str, e: reqwest::Error) -> GraphError {
    GraphError::Auth {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_url_interpolation() {
        let creds = Credentials::application("app", "abc-123", "secret");
        let tp = TokenProvider::new(creds);
        assert_eq!(
            tp.token_url(),
            "https://login.microsoftonline.com/abc-123/oauth2/v2.0/token"
        );
        assert_eq!(
            tp.device_code_url(),
            "https://login.microsoftonline.com/abc-123/oauth2/v2.0/devicecode"
        );
    }

    #[test]
    fn custom_authority_strips_trailing_slash() {
        let creds = Credentials::application("app", "t", "s");
        let tp = TokenProvider::with_authority(creds, "http://127.0.0.1:9999/");
        assert_eq!(tp.token_url(), "http://127.0.0.1:9999/t/oauth2/v2.0/token");
    }

    #[test]
    fn application_credentials_default_to_graph_scope() {
        let creds = Credentials::application("app", "tenant", "secret");
        assert_eq!(creds.scope_string(), "https://graph.microsoft.com/.default");
    }

    #[test]
    fn delegated_credentials_join_scopes_with_spaces() {
        let creds =
            Credentials::delegated("app", "tenant", &["openid", "profile", "User.Read.All"]);
        assert_eq!(creds.scope_string(), "openid profile User.Read.All");
    }

    #[test]
    fn client_credentials_request_serializes_as_form() {
        let req = ClientCredentialsRequest {
            client_id: "cid",
            scope: "https://graph.microsoft.com/.default",
            client_secret: "secret~value",
            grant_type: "client_credentials",
        };
        let encoded = serde_urlencoded::to_string(&req).unwrap();
        assert!(encoded.contains("client_id=cid"));
        assert!(encoded.contains("grant_type=client_credentials"));
        // Scope URL should be percent-encoded in form data
        assert!(encoded.contains("scope=https"));
    }

    #[test]
    fn redeem_request_uses_device_code_grant_type() {
        let req = DeviceCodeRedeemRequest {
            grant_type: "urn:ietf:params:oauth:grant-type:device_code",
            client_id: "cid",
            device_code: "GAQABAA...",
        };
        let encoded = serde_urlencoded::to_string(&req).unwrap();
        assert!(encoded.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code"));
        assert!(encoded.contains("device_code=GAQABAA"));
    }

    #[test]
    fn token_response_deserializes_from_azure_format() {
        let json = r#"{
            "token_type": "Bearer",
            "expires_in": 3599,
            "ext_expires_in": 3599,
            "access_token": "eyJ0eXAi.test.token"
        }"#;
        let resp: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.access_token, "eyJ0eXAi.test.token");
        assert_eq!(resp.expires_in, 3599);
    }

    #[test]
    fn device_code_response_deserializes() {
        // Shape documented at learn.microsoft.com/entra/identity-platform/v2-oauth2-device-code.
        let json = r#"{
            "user_code": "FJJA23BZL",
            "device_code": "GAQABAAEAAAD...",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 900,
            "interval": 5,
            "message": "To sign in, use a web browser..."
        }"#;
        let resp: DeviceCodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.user_code, "FJJA23BZL");
        assert_eq!(resp.verification_uri, "https://microsoft.com/devicelogin");
        assert_eq!(resp.expires_in, 900);
    }

    #[test]
    fn error_response_carries_aadsts_codes() {
        let json = r#"{
            "error": "invalid_client",
            "error_description": "AADSTS7000218: The request body must contain...",
            "error_codes": [7000218],
            "timestamp": "2025-01-01 00:00:00Z"
        }"#;
        let resp: TokenErrorResponse = serde_json::from_str(json).unwrap();
        assert!(resp.error_codes.contains(&PUBLIC_CLIENT_DISALLOWED));
    }

    #[test]
    fn fixed_token_is_not_expired() {
        let token = AccessToken::fixed("test-token");
        assert_eq!(token.as_str(), "test-token");
        assert!(!token.is_expired(), "fresh token must not be expired");
    }

    #[test]
    fn token_past_lifetime_is_expired() {
        let mut token = AccessToken::fixed("test-token");
        token.acquired_at = Instant::now() - std::time::Duration::from_secs(7200);
        assert!(token.is_expired(), "token must be expired after its lifetime");
    }

    #[test]
    fn token_within_buffer_is_expired() {
        // A token with expires_in=90 and a 60s buffer has an effective
        // lifetime of 30s. After 31s it should appear expired.
        let mut token = AccessToken::fixed("test-token");
        token.expires_in = 90;
        token.acquired_at = Instant::now() - std::time::Duration::from_secs(31);
        assert!(
            token.is_expired(),
            "token must be expired within the safety buffer"
        );
    }

    #[test]
    fn token_before_buffer_is_valid() {
        // Same setup as above but only 10s elapsed — well within the 30s
        // effective lifetime.
        let mut token = AccessToken::fixed("test-token");
        token.expires_in = 90;
        token.acquired_at = Instant::now() - std::time::Duration::from_secs(10);
        assert!(
            !token.is_expired(),
            "token must still be valid before the buffer boundary"
        );
    }
}
