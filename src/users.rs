//! User directory operations for an Azure AD B2C tenant.
//!
//! [`B2cUsers`] covers the `/users` endpoint family:
//!
//! - [`B2cUsers::search`] — find users by sign-in email address.
//! - [`B2cUsers::list`] — bounded or exhaustively-paginated customer list.
//! - [`B2cUsers::profile`] — uniform-shape full profile for one user.
//! - [`B2cUsers::create`] — create a local-account customer.
//! - [`B2cUsers::update`] — partial attribute update.
//! - [`B2cUsers::delete`] — remove a user.
//! - [`B2cUsers::change_password`] — replace the password profile.
//!
//! Every operation translates between the public surface (records keyed by
//! human display names) and the wire (records keyed by Graph extension ids)
//! through the [`AttributeMap`] built once at [`B2cUsers::connect`].
//! Attribute names that the tenant schema does not define are rejected
//! before any request is sent.
//!
//! ## Customer accounts
//!
//! `list` filters on `creationType eq 'LocalAccount'`, which selects
//! customer accounts as opposed to staff or directory-federated accounts.
//! Customers who signed up through a social-login federation may not carry
//! that creation type and will be missing from the listing; their identity
//! lives in the `identities` attribute instead.
//!
//! ## Permissions
//!
//! The app registration needs `User.ReadWrite.All` application permission,
//! plus the *User Administrator* directory role for password changes
//! (Azure Portal > Roles and Administrators > User Administrator).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::attributes::{AttributeMap, BASE_USER_ATTRIBUTES, UNWANTED_PROFILE_ATTRIBUTES};
use crate::client::{GraphClient, ODataPage};
use crate::error::{GraphError, Result};

/// Graph caps `$top` at 999 for the `/users` endpoint; exhaustive listing
/// pages at this size.
const PAGE_LIMIT: u32 = 999;

/// OData filter selecting customer (local) accounts.
const LOCAL_ACCOUNT_FILTER: &str = "creationType eq 'LocalAccount'";

/// A user record: attribute name → value.
///
/// On the wire the keys are Graph identifiers; at the public surface they
/// are human display names (built-in field names pass through unchanged).
pub type UserRecord = Map<String, Value>;

// ── Wire types ─────────────────────────────────────────────────────────

/// One entry of a user's `identities` collection.
///
/// For B2C local accounts the sign-in identity has
/// `signInType = "emailAddress"`, `issuer = <tenant name>`, and
/// `issuerAssignedId = <email>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// `"emailAddress"`, `"userName"`, `"federated"`, or
    /// `"userPrincipalName"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_type: Option<String>,

    /// The identity issuer, e.g. `"mytenant.onmicrosoft.com"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// The identifier the issuer assigned — the email address for local
    /// email sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_assigned_id: Option<String>,
}

impl Identity {
    /// The local email sign-in identity attached to created users.
    fn local_email(tenant_name: &str, email: &str) -> Self {
        Identity {
            sign_in_type: Some("emailAddress".to_string()),
            issuer: Some(tenant_name.to_string()),
            issuer_assigned_id: Some(email.to_string()),
        }
    }
}

/// A search match: the user id plus the identities that matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// The Azure/Entra object id of the user.
    pub id: String,

    /// The user's sign-in identities.
    #[serde(default)]
    pub identities: Vec<Identity>,
}

/// Graph `passwordProfile` object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordProfile {
    /// The password value.
    pub password: String,

    /// Whether the user must change the password at next sign-in. Always
    /// `false` here: B2C customers manage passwords through user flows,
    /// not interactive AD prompts.
    pub force_change_password_next_sign_in: bool,
}

impl PasswordProfile {
    fn new(password: &str) -> Self {
        PasswordProfile {
            password: password.to_string(),
            force_change_password_next_sign_in: false,
        }
    }
}

/// PATCH body for a password change: the password profile and nothing else.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    password_profile: PasswordProfile,
}

// ── Input types ────────────────────────────────────────────────────────

/// Input for [`B2cUsers::create`].
///
/// `attributes` holds any further fields keyed by human display name —
/// built-in names like `givenName`/`surname` as well as custom user-flow
/// attribute names. Unknown names are silently skipped, matching partial
/// update semantics; pre-validate with [`AttributeMap::resolve`] if a
/// strict check is wanted.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Sign-in email address; becomes `mail` and the local identity.
    pub email: String,
    /// Initial password.
    pub password: String,
    /// Display name; defaults to `"<givenName> <surname>"` from
    /// `attributes` when absent.
    pub display_name: Option<String>,
    /// Remaining fields, keyed by human display name.
    pub attributes: UserRecord,
}

// ── Directory client ───────────────────────────────────────────────────

/// User-directory client for one B2C tenant.
///
/// Construction performs the one-time user-flow schema discovery; the
/// resulting [`AttributeMap`] is immutable for the client's lifetime.
pub struct B2cUsers {
    client: GraphClient,
    attributes: AttributeMap,
    tenant_name: String,
}

impl B2cUsers {
    /// Discovers the tenant's attribute schema and returns a ready client.
    ///
    /// `tenant_name` is the issuer name of the tenant, e.g.
    /// `"mytenant.onmicrosoft.com"`; it is used in identity filters and in
    /// the identities entry of created users.
    pub async fn connect(client: GraphClient, tenant_name: &str) -> Result<Self> {
        let attributes = AttributeMap::discover(&client).await?;
        Ok(B2cUsers {
            client,
            attributes,
            tenant_name: tenant_name.to_string(),
        })
    }

    /// The attribute mapping table discovered at construction.
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Searches for users whose local sign-in identity matches `email`.
    ///
    /// Returns the matching list, empty if none. The email is URL-encoded
    /// into an `identities/any(...)` filter on issuer + issuerAssignedId,
    /// selecting only `id` and `identities`.
    pub async fn search(&self, email: &str) -> Result<Vec<SearchHit>> {
        let email = urlencoding::encode(email);
        let path = format!(
            "/users?$filter=(identities/any(i:i/issuer eq '{}' and i/issuerAssignedId eq '{}'))&$select=id,identities",
            self.tenant_name, email
        );
        let page: ODataPage<SearchHit> = self.client.get(&path).await?;
        Ok(page.value)
    }

    /// Lists customer accounts, optionally fetching extra attributes on
    /// top of the base set.
    ///
    /// - `max == 0`: pages through every result (page size 999), following
    ///   the server's continuation link until exhausted.
    /// - `0 < max ≤ 999`: one bounded request.
    /// - `max > 999`: rejected before any request.
    ///
    /// Each name in `include_attributes` must exist in the attribute
    /// mapping table. Returned records have custom-attribute keys remapped
    /// back to their display names.
    ///
    /// # Errors
    ///
    /// - `GraphError::PageSize` — `max > 999`; no request is sent.
    /// - `GraphError::UnknownAttribute` — an extra attribute is not in the
    ///   mapping table; no request is sent.
    /// - `GraphError::Api` / `Network` / `Parse` — the usual HTTP-layer
    ///   failures, propagated as-is.
    pub async fn list(&self, max: u32, include_attributes: &[&str]) -> Result<Vec<UserRecord>> {
        if max > PAGE_LIMIT {
            return Err(GraphError::PageSize { max });
        }

        // BTreeSet both dedups (the base set already contains any built-in
        // extra the caller names) and keeps the $select ordering stable.
        let mut select: BTreeSet<&str> = BASE_USER_ATTRIBUTES.iter().copied().collect();
        for name in include_attributes {
            select.insert(self.attributes.resolve(name)?);
        }
        let select = select.into_iter().collect::<Vec<_>>().join(",");

        let top = if max == 0 { PAGE_LIMIT } else { max };
        let path = format!(
            "/users?$select={select}&$top={top}&$filter={}",
            urlencoding::encode(LOCAL_ACCOUNT_FILTER)
        );

        let mut page: ODataPage<UserRecord> = self.client.get(&path).await?;
        let mut users = page.value;

        // Exhaustive mode follows continuation links strictly
        // sequentially; bounded mode is a single request even when the
        // server offers a next page.
        if max == 0 {
            while let Some(next) = page.next_link.take() {
                page = self.client.get_url(&next).await?;
                users.append(&mut page.value);
            }
        }

        debug!(count = users.len(), "listed customer accounts");
        Ok(users
            .into_iter()
            .map(|user| self.attributes.remap_to_display(user))
            .collect())
    }

    /// Fetches one user's profile with a stable, uniform shape.
    ///
    /// Graph omits unset fields instead of returning them as null, so the
    /// result is rebuilt from the mapping table: every mapped attribute
    /// name is present, `Null` where the server omitted the field, and
    /// denylisted fields are stripped. `attributes` overrides the
    /// `$select` set (default: all known attributes).
    pub async fn profile(
        &self,
        user_id: &str,
        attributes: Option<&[String]>,
    ) -> Result<UserRecord> {
        let select = match attributes {
            Some(attrs) => attrs.join(","),
            None => self.attributes.all_attributes().join(","),
        };
        let raw: UserRecord = self
            .client
            .get(&format!("/users/{user_id}?$select={select}"))
            .await?;
        Ok(self.shape_profile(raw))
    }

    /// Realizes the uniform profile shape from a sparse wire record.
    fn shape_profile(&self, raw: UserRecord) -> UserRecord {
        let mut profile = UserRecord::new();
        for (name, id) in self.attributes.iter() {
            profile.insert(
                name.to_string(),
                raw.get(id).cloned().unwrap_or(Value::Null),
            );
        }
        for unwanted in UNWANTED_PROFILE_ATTRIBUTES {
            profile.remove(*unwanted);
        }
        profile
    }

    /// Creates a local-account customer and returns the server's
    /// representation of the created user.
    ///
    /// Known human-named fields in `user.attributes` are translated to
    /// their Graph identifiers; on top of those the payload always
    /// carries `displayName`, `mail`, `accountEnabled = true`,
    /// `passwordPolicies = "DisablePasswordExpiration"`, the password
    /// profile, and a single local email sign-in identity issued by the
    /// tenant.
    pub async fn create(&self, user: &NewUser) -> Result<UserRecord> {
        let payload = self.create_payload(user)?;
        debug!(mail = %user.email, "creating user");
        self.client.post("/users", &payload).await
    }

    /// Composes the POST body for [`B2cUsers::create`].
    fn create_payload(&self, user: &NewUser) -> Result<UserRecord> {
        let mut payload = UserRecord::new();

        for (name, id) in self.attributes.iter() {
            if let Some(value) = user.attributes.get(name) {
                payload.insert(id.to_string(), value.clone());
            }
        }

        let display_name = user.display_name.clone().unwrap_or_else(|| {
            format!(
                "{} {}",
                user.attributes
                    .get("givenName")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                user.attributes
                    .get("surname")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            )
        });

        payload.insert("displayName".to_string(), Value::String(display_name));
        payload.insert("mail".to_string(), Value::String(user.email.clone()));
        payload.insert("accountEnabled".to_string(), Value::Bool(true));
        payload.insert(
            "passwordPolicies".to_string(),
            Value::String("DisablePasswordExpiration".to_string()),
        );
        payload.insert(
            "passwordProfile".to_string(),
            serde_json::to_value(PasswordProfile::new(&user.password))?,
        );
        payload.insert(
            "identities".to_string(),
            serde_json::to_value(vec![Identity::local_email(&self.tenant_name, &user.email)])?,
        );

        Ok(payload)
    }

    /// Applies a partial update.
    ///
    /// Only the human-named fields present in `fields` are translated and
    /// sent; everything else is left untouched server-side.
    ///
    /// Returns whether the server acknowledged the update — Graph answers
    /// PATCH with `204 No Content` and no body (the
    /// `Prefer: return=representation` header is not honored reliably), so
    /// observing the new state requires a follow-up [`B2cUsers::profile`].
    pub async fn update(&self, user_id: &str, fields: &UserRecord) -> Result<bool> {
        let mut payload = UserRecord::new();
        for (name, id) in self.attributes.iter() {
            if let Some(value) = fields.get(name) {
                payload.insert(id.to_string(), value.clone());
            }
        }

        self.client
            .patch(&format!("/users/{user_id}"), &payload)
            .await?;
        Ok(true)
    }

    /// Deletes a user. Returns whether the server acknowledged it.
    pub async fn delete(&self, user_id: &str) -> Result<bool> {
        self.client.delete(&format!("/users/{user_id}")).await?;
        Ok(true)
    }

    /// Replaces the user's password, leaving every other field untouched.
    /// The force-change flag stays off. Returns whether the server
    /// acknowledged the change.
    pub async fn change_password(&self, user_id: &str, password: &str) -> Result<bool> {
        let body = ChangePasswordRequest {
            password_profile: PasswordProfile::new(password),
        };
        self.client
            .patch(&format!("/users/{user_id}"), &body)
            .await?;
        Ok(true)
    }
}
