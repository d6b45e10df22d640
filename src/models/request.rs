//! Team request model shared by the backend and the offline-first client.
//!
//! Wire bodies use camelCase; snake_case spellings are accepted on input so
//! that both casings collapse into one internal field set at deserialization.

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A collaborator descriptor embedded in a [`TeamRequest`].
///
/// Members have no identity of their own and are replaced wholesale with
/// their parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub skills: Vec<String>,
    #[serde(
        default,
        alias = "gender_preference",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender_preference: Option<String>,
    /// Fields this crate does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One posted team-formation listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Device token of the author. Set once at creation.
    #[serde(default, alias = "owner_fingerprint")]
    pub owner_fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updated_at", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(
        default,
        alias = "team_members",
        alias = "teamMembers",
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub members: Vec<TeamMember>,
    /// Profile fields this crate does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TeamRequest {
    /// Minimal record naming a target by id and owner; the delete payload shape.
    pub fn reference(id: impl Into<String>, owner_fingerprint: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            owner_fingerprint: owner_fingerprint.into(),
            ..Self::default()
        }
    }

    /// The id, if present and non-empty.
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Overlay `self` onto `stored`.
    ///
    /// Present fields of `self` win, absent ones keep the stored value. Members
    /// are replaced wholesale. `id`, `created_at` and `owner_fingerprint` always
    /// come from `stored`.
    pub fn merged_over(self, stored: &TeamRequest) -> TeamRequest {
        let mut extra = stored.extra.clone();
        extra.extend(self.extra);

        TeamRequest {
            id: stored.id.clone(),
            owner_fingerprint: stored.owner_fingerprint.clone(),
            name: self.name.or_else(|| stored.name.clone()),
            gender: self.gender.or_else(|| stored.gender.clone()),
            phone: self.phone.or_else(|| stored.phone.clone()),
            bio: self.bio.or_else(|| stored.bio.clone()),
            created_at: stored.created_at.clone(),
            updated_at: self.updated_at.or_else(|| stored.updated_at.clone()),
            members: self.members,
            extra,
        }
    }

    /// WhatsApp deep link to the poster, prefilled with `message`.
    ///
    /// Returns `None` when the phone field holds no digits.
    pub fn whatsapp_link(&self, message: &str) -> Option<String> {
        let digits: String = self
            .phone
            .as_deref()?
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if digits.is_empty() {
            return None;
        }

        let base = format!("https://wa.me/{}", digits);
        if message.is_empty() {
            return Some(base);
        }
        Url::parse_with_params(&base, &[("text", message)])
            .ok()
            .map(String::from)
    }
}

/// Body of `DELETE /api/requests/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequestBody {
    #[serde(alias = "owner_fingerprint")]
    pub owner_fingerprint: String,
}

/// Treat an explicit JSON `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
