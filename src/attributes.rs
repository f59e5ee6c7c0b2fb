//! Attribute-name translation between human display names and Graph
//! extension-attribute identifiers.
//!
//! Azure B2C stores custom user fields as extension attributes named
//! `extension_<b2c app id>_<name>`, where the app id is that of the built-in
//! `b2c-extensions-app. Do not modify. Used by AADB2C for storing user data.`
//! application. [`AttributeMap`] fetches the tenant's user-flow attribute
//! schema once and builds a bidirectional mapping between lower-cased
//! display names and those identifiers, so callers never handle the opaque
//! ids directly:
//!
//! - builtIn schema entries map `id → id` (identity mapping);
//! - every other entry maps its lower-cased display name to the extension
//!   id, and the id joins the custom-attribute set.
//!
//! The map is built fresh per instance at construction and is immutable
//! thereafter; nothing leaks across client instances.
//!
//! An overview of all Azure B2C user-profile attributes:
//! <https://learn.microsoft.com/en-us/azure/active-directory-b2c/user-profile-attributes>

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::client::{GraphClient, ODataPage};
use crate::error::{GraphError, Result};

/// User fields selected by every `list` call and included in the combined
/// attribute set.
pub const BASE_USER_ATTRIBUTES: &[&str] = &[
    "id",
    "givenName",
    "surname",
    "jobTitle",
    "mail",
    "creationType",
    "identities",
    "accountEnabled",
];

/// Additional built-in fields included in the combined attribute set used
/// for full-profile `$select` queries.
pub const EXTENDED_USER_ATTRIBUTES: &[&str] = &["id", "ageGroup", "createdDateTime", "userType"];

/// Irrelevant or duplicate fields stripped from `profile` results.
/// `emails` duplicates the identities entry, `ObjectId` is a legacy alias
/// of `id`, and the rest are not meaningful for B2C customer accounts.
pub const UNWANTED_PROFILE_ATTRIBUTES: &[&str] = &[
    "emails",
    "jobTitle",
    "legalAgeGroupClassification",
    "newUser",
    "ObjectId",
];

/// One entry of the tenant's user-flow attribute schema, as returned by
/// GET `/identity/userFlowAttributes`.
///
/// Field names use camelCase to match the Graph API contract.
///
/// Reference: <https://learn.microsoft.com/en-us/graph/api/identityuserflowattribute-list>
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFlowAttribute {
    /// The attribute identifier. Built-in attributes use their own name
    /// (e.g. `"givenName"`); custom attributes use the opaque
    /// `extension_<appid>_<name>` form.
    pub id: String,

    /// Human-readable display name configured in the user flow.
    pub display_name: String,

    /// `"builtIn"`, `"custom"`, or `"required"`. Anything other than
    /// `"builtIn"` is treated as a custom attribute.
    pub user_flow_attribute_type: String,
}

/// Bidirectional mapping between human attribute names and Graph
/// identifiers, built once per client from the tenant schema.
#[derive(Debug)]
pub struct AttributeMap {
    /// Human name → Graph identifier. Built-in ids self-map, so built-in
    /// field names pass through unchanged.
    forward: BTreeMap<String, String>,
    /// Graph identifier → human name (inverse of `forward`).
    reverse: BTreeMap<String, String>,
    /// Graph identifiers of custom (non-built-in) attributes.
    custom: BTreeSet<String>,
    /// Every schema id, in discovery order, for `$select` composition.
    userflow_ids: Vec<String>,
}

impl AttributeMap {
    /// Fetches the tenant's user-flow attribute schema and builds the map.
    /// Issued once per client lifetime; the schema GET goes through the
    /// client's response cache like any other read.
    pub async fn discover(client: &GraphClient) -> Result<Self> {
        let page: ODataPage<UserFlowAttribute> =
            client.get("/identity/userFlowAttributes").await?;
        let map = Self::from_schema(page.value);
        info!(
            attributes = map.userflow_ids.len(),
            custom = map.custom.len(),
            "discovered user-flow attribute schema"
        );
        Ok(map)
    }

    /// Builds the map from already-fetched schema entries.
    pub fn from_schema(entries: Vec<UserFlowAttribute>) -> Self {
        let mut forward = BTreeMap::new();
        let mut reverse = BTreeMap::new();
        let mut custom = BTreeSet::new();
        let mut userflow_ids = Vec::with_capacity(entries.len());

        for entry in entries {
            userflow_ids.push(entry.id.clone());

            if entry.user_flow_attribute_type == "builtIn" {
                forward.insert(entry.id.clone(), entry.id.clone());
                reverse.insert(entry.id.clone(), entry.id);
            } else {
                let name = entry.display_name.to_lowercase();
                custom.insert(entry.id.clone());
                reverse.insert(entry.id.clone(), name.clone());
                forward.insert(name, entry.id);
            }
        }

        AttributeMap {
            forward,
            reverse,
            custom,
            userflow_ids,
        }
    }

    /// Translates a human attribute name to its Graph identifier.
    ///
    /// # Errors
    ///
    /// `GraphError::UnknownAttribute` naming the full allowed set when the
    /// name is not a key of the mapping table. Callers rely on this firing
    /// before any request is sent.
    pub fn resolve(&self, name: &str) -> Result<&str> {
        self.forward
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| GraphError::UnknownAttribute {
                name: name.to_string(),
                allowed: self.allowed_names(),
            })
    }

    /// The human name for a Graph identifier, if the schema defines one.
    pub fn display_name(&self, id: &str) -> Option<&str> {
        self.reverse.get(id).map(String::as_str)
    }

    /// Whether `id` is a custom (extension) attribute.
    pub fn is_custom(&self, id: &str) -> bool {
        self.custom.contains(id)
    }

    /// Every key of the mapping table, in sorted order. Used to name the
    /// allowed set in `UnknownAttribute` failures.
    pub fn allowed_names(&self) -> Vec<String> {
        self.forward.keys().cloned().collect()
    }

    /// Iterates `(human name, graph id)` pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forward.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The combined attribute list used for `$select` in full-profile
    /// queries: base fields, extended fields, and every discovered
    /// user-flow attribute id.
    pub fn all_attributes(&self) -> Vec<String> {
        BASE_USER_ATTRIBUTES
            .iter()
            .chain(EXTENDED_USER_ATTRIBUTES.iter())
            .map(|s| s.to_string())
            .chain(self.userflow_ids.iter().cloned())
            .collect()
    }

    /// Rewrites a wire record's custom-attribute keys back to their human
    /// display names. Built-in keys pass through unchanged.
    pub fn remap_to_display(&self, record: Map<String, Value>) -> Map<String, Value> {
        record
            .into_iter()
            .map(|(key, value)| {
                if self.custom.contains(&key) {
                    // Every custom id was inserted into `reverse` at
                    // construction, so the lookup cannot miss.
                    let name = self.reverse.get(&key).cloned().unwrap_or(key);
                    (name, value)
                } else {
                    (key, value)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EXT_CITY: &str = "extension_abc123_City";
    const EXT_LOYALTY: &str = "extension_abc123_LoyaltyNumber";

    fn sample_schema() -> Vec<UserFlowAttribute> {
        serde_json::from_value(json!([
            {
                "id": "givenName",
                "displayName": "Given Name",
                "userFlowAttributeType": "builtIn"
            },
            {
                "id": "surname",
                "displayName": "Surname",
                "userFlowAttributeType": "builtIn"
            },
            {
                "id": EXT_CITY,
                "displayName": "City",
                "userFlowAttributeType": "custom"
            },
            {
                "id": EXT_LOYALTY,
                "displayName": "LoyaltyNumber",
                "userFlowAttributeType": "custom"
            }
        ]))
        .unwrap()
    }

    #[test]
    fn schema_entry_deserializes_from_graph_shape() {
        let json = r#"{
            "id": "extension_abc123_City",
            "displayName": "City",
            "dataType": "string",
            "description": "Your city",
            "userFlowAttributeType": "custom"
        }"#;
        let entry: UserFlowAttribute = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "extension_abc123_City");
        assert_eq!(entry.display_name, "City");
        assert_eq!(entry.user_flow_attribute_type, "custom");
    }

    #[test]
    fn builtin_entries_self_map_and_stay_out_of_custom_set() {
        let map = AttributeMap::from_schema(sample_schema());
        assert_eq!(map.resolve("givenName").unwrap(), "givenName");
        assert_eq!(map.resolve("surname").unwrap(), "surname");
        assert!(!map.is_custom("givenName"));
        assert!(!map.is_custom("surname"));
    }

    #[test]
    fn custom_entries_map_lowercased_display_name_to_id() {
        let map = AttributeMap::from_schema(sample_schema());
        assert_eq!(map.resolve("city").unwrap(), EXT_CITY);
        assert_eq!(map.resolve("loyaltynumber").unwrap(), EXT_LOYALTY);
        assert!(map.is_custom(EXT_CITY));
        assert!(map.is_custom(EXT_LOYALTY));
        // The original display-name casing is not a key.
        assert!(map.resolve("City").is_err());
    }

    #[test]
    fn unknown_name_fails_naming_the_allowed_set() {
        let map = AttributeMap::from_schema(sample_schema());
        let err = map.resolve("shoesize").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("shoesize is not a known attribute"));
        for allowed in ["city", "givenName", "loyaltynumber", "surname"] {
            assert!(msg.contains(allowed), "allowed set should include {allowed}");
        }
    }

    #[test]
    fn reverse_lookup_returns_display_names() {
        let map = AttributeMap::from_schema(sample_schema());
        assert_eq!(map.display_name(EXT_CITY), Some("city"));
        assert_eq!(map.display_name("givenName"), Some("givenName"));
        assert_eq!(map.display_name("extension_abc123_Unknown"), None);
    }

    #[test]
    fn all_attributes_combines_base_extended_and_schema_ids() {
        let map = AttributeMap::from_schema(sample_schema());
        let all = map.all_attributes();
        assert!(all.iter().any(|a| a == "mail"), "base fields present");
        assert!(all.iter().any(|a| a == "ageGroup"), "extended fields present");
        assert!(
            all.iter().any(|a| a == EXT_CITY),
            "discovered schema ids present"
        );
    }

    #[test]
    fn remap_rewrites_custom_keys_and_passes_builtins_through() {
        let map = AttributeMap::from_schema(sample_schema());
        let record: Map<String, Value> = serde_json::from_value(json!({
            "id": "user-1",
            "givenName": "Ada",
            EXT_CITY: "Utrecht",
            EXT_LOYALTY: "L-42"
        }))
        .unwrap();

        let remapped = map.remap_to_display(record);
        assert_eq!(remapped["id"], "user-1");
        assert_eq!(remapped["givenName"], "Ada");
        assert_eq!(remapped["city"], "Utrecht");
        assert_eq!(remapped["loyaltynumber"], "L-42");
        assert!(
            !remapped.contains_key(EXT_CITY),
            "extension ids should not survive remapping"
        );
    }

    #[test]
    fn remap_round_trips_through_forward_mapping() {
        // A record keyed only by custom ids, remapped to display names and
        // then mapped back through the forward table, reproduces the
        // original record.
        let map = AttributeMap::from_schema(sample_schema());
        let original: Map<String, Value> = serde_json::from_value(json!({
            EXT_CITY: "Utrecht",
            EXT_LOYALTY: "L-42"
        }))
        .unwrap();

        let by_name = map.remap_to_display(original.clone());
        let restored: Map<String, Value> = by_name
            .into_iter()
            .map(|(k, v)| (map.resolve(&k).unwrap().to_string(), v))
            .collect();
        assert_eq!(restored, original);
    }
}
