//! Typed error hierarchy for the b2c-users crate.
//!
//! `GraphError` is a structured enum that preserves diagnostic context at
//! each failure boundary. Every variant carries enough information for
//! callers to:
//! - Distinguish the failure category (auth, API, argument validation,
//!   parse, network).
//! - Inspect the original cause via `source()` (thiserror derives this
//!   automatically from `#[source]` fields).
//! - Display a human-readable message that includes the relevant context
//!   (status code, attribute name, allowed set, etc.).
//!
//! Design rationale:
//! - Variants map to real system boundaries. `Auth` covers the Azure AD
//!   token endpoints; `Api` covers the Graph REST API; `UnknownAttribute`
//!   and `PageSize` cover pre-flight argument validation that must fail
//!   before any request is sent.
//! - `Api` preserves the response body — `error_for_status()` would discard
//!   Graph's diagnostic error messages.
//! - `PublicClientDisallowed` is its own variant because the AADSTS 7000218
//!   condition requires app-registration reconfiguration, not a retry or a
//!   credential fix; callers need to tell it apart from ordinary auth
//!   failures.

use reqwest::StatusCode;

/// Unified error type for all b2c-users library operations.
///
/// Each variant corresponds to a distinct failure boundary in the system.
/// The `#[source]` attribute on inner errors enables `Error::source()`
/// chaining so callers (and logging frameworks) can traverse the full
/// cause chain.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Authentication failure at an Azure AD token endpoint.
    ///
    /// This covers:
    /// - Non-2xx responses from `/oauth2/v2.0/token` or
    ///   `/oauth2/v2.0/devicecode` (invalid credentials, expired secrets,
    ///   missing admin consent). The `message` field contains Azure AD's
    ///   AADSTS error codes and human-readable description.
    /// - Network failures reaching the token endpoint.
    /// - A token response that parses but carries no access token.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description of the authentication failure,
        /// including HTTP status and Azure AD error body when available.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Device-code redemption was rejected with AADSTS error code 7000218.
    ///
    /// Azure AD refuses the device-code grant when the app registration has
    /// "Allow public client flows" disabled. This is terminal: no retry and
    /// no credential change will help; the app registration itself must be
    /// reconfigured (Azure Portal > App registrations > Authentication >
    /// Allow public client flows).
    #[error(
        "public client flows are not allowed for this app registration \
         (AADSTS7000218); enable 'Allow public client flows' in the app \
         registration and try again"
    )]
    PublicClientDisallowed,

    /// The Graph API returned a non-success HTTP status code.
    ///
    /// The full response body is preserved. Graph error responses contain
    /// an `error.code` / `error.message` object that is essential for
    /// debugging permission issues, invalid request shapes, and malformed
    /// OData queries.
    #[error("Graph API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by the Graph API.
        status: StatusCode,
        /// The raw response body text. May contain a JSON error object
        /// from Graph, or an empty string if the body could not be read.
        body: String,
    },

    /// An attribute name was supplied that is not a key of the attribute
    /// mapping table.
    ///
    /// Raised before any network call. The display message names the full
    /// allowed set so the caller can see exactly which names the tenant's
    /// user flows define.
    #[error("{name} is not a known attribute. Only {} are allowed", .allowed.join(","))]
    UnknownAttribute {
        /// The attribute name that failed the lookup.
        name: String,
        /// Every key of the attribute mapping table, in sorted order.
        allowed: Vec<String>,
    },

    /// `list` was called with a page size outside `[0, 999]`.
    ///
    /// Graph caps `$top` at 999; anything larger is a caller error and is
    /// rejected before any request is sent.
    #[error("max value should be between 0 and 999, got {max}")]
    PageSize {
        /// The out-of-range value the caller supplied.
        max: u32,
    },

    /// JSON deserialization failed when parsing an API response body.
    ///
    /// This can occur if the Graph API returns an unexpected response
    /// shape for a schema entry, user record, or collection wrapper.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A network-level failure occurred (DNS resolution, TCP connection,
    /// TLS handshake, request timeout, etc.).
    ///
    /// No HTTP status code is available because the request did not
    /// complete. This wraps the underlying `reqwest::Error` which carries
    /// detailed transport diagnostics.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Convenience alias used throughout the library.
/// Keeps function signatures concise while providing the full typed error.
pub type Result<T> = std::result::Result<T, GraphError>;
