//! Async Rust client library for managing user identities in an Azure AD
//! B2C tenant via the Microsoft Graph API.
//!
//! Provides OAuth2 token acquisition (device-code or client-credentials
//! grant), a bearer-authenticated HTTP client with a TTL-boxed GET cache,
//! and user directory operations with attribute-name translation between
//! human display names and Graph extension-attribute identifiers.
//!
//! # Modules
//!
//! - [`attributes`] — User-flow schema discovery and name↔id mapping.
//! - [`auth`] — OAuth2 device-code and client-credentials token providers.
//! - [`client`] — Authenticated HTTP wrapper with GET-response caching.
//! - [`error`] — Typed error hierarchy (`GraphError`) for all operations.
//! - [`users`] — Search, list, profile, create, update, delete, password.
//!
//! # Quick Start
//!
//! ```ignore
//! use b2c_users::auth::{Credentials, TokenProvider};
//! use b2c_users::client::GraphClient;
//! use b2c_users::users::B2cUsers;
//!
//! let credentials = Credentials::application("app-id", "tenant-id", "secret");
//! let token = TokenProvider::new(credentials).client_credentials().await?;
//! let client = GraphClient::new(token);
//! let users = B2cUsers::connect(client, "mytenant.onmicrosoft.com").await?;
//! let hits = users.search("ada@example.com").await?;
//! ```

#![warn(missing_docs)]

pub mod attributes;
pub mod auth;
pub mod client;
pub mod error;
pub mod users;
