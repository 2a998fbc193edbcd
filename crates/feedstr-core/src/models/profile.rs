use serde::{Deserialize, Serialize};

use super::RawEvent;
use crate::constants::{kinds, SHORT_PUBKEY_LEN};
use crate::error::{FeedError, Result};

/// Best-effort author metadata from a kind:0 event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nip05: Option<String>,
}

impl Profile {
    /// Parse kind:0 content. Unknown keys and non-string values are ignored;
    /// anything that is not a JSON object is rejected.
    pub fn from_content(content: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(FeedError::MalformedProfile)?;
        let Some(object) = value.as_object() else {
            return Err(FeedError::MalformedProfile(
                <serde_json::Error as serde::de::Error>::custom("profile content is not an object"),
            ));
        };

        let field = |key: &str| {
            object
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Ok(Self {
            name: field("name"),
            display_name: field("display_name").or_else(|| field("displayName")),
            picture: field("picture"),
            nip05: field("nip05"),
        })
    }

    pub fn from_event(event: &RawEvent) -> Result<Self> {
        if event.kind != kinds::METADATA {
            return Err(FeedError::MalformedProfile(
                <serde_json::Error as serde::de::Error>::custom(format!(
                    "expected kind {} but got {}",
                    kinds::METADATA,
                    event.kind
                )),
            ));
        }
        Self::from_content(&event.content)
    }

    /// Preferred human-readable name, if the profile has one
    pub fn best_name(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.name.as_deref())
    }
}

/// Resolution state of a pubkey's profile within one store generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "profile", rename_all = "lowercase")]
pub enum ProfileState {
    /// Not fetched yet or fetch in flight
    Pending,
    Resolved(Profile),
    /// Fetch failed or timed out; not retried this session
    Unknown,
}

impl ProfileState {
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Resolved(p) => Some(p),
            _ => None,
        }
    }
}

/// Truncated pubkey shown when no profile name is available
pub fn short_pubkey(pubkey: &str) -> String {
    let cut = pubkey
        .char_indices()
        .nth(SHORT_PUBKEY_LEN)
        .map(|(i, _)| i)
        .unwrap_or(pubkey.len());
    format!("{}...", &pubkey[..cut])
}

/// Display name for a pubkey given whatever profile is known
pub fn display_name(pubkey: &str, profile: Option<&Profile>) -> String {
    profile
        .and_then(Profile::best_name)
        .map(String::from)
        .unwrap_or_else(|| short_pubkey(pubkey))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_content() {
        let profile = Profile::from_content(
            r#"{"name":"alice","display_name":"Alice","picture":"https://x/a.png","nip05":"alice@x","about":"hi","lud16":42}"#,
        )
        .unwrap();
        assert_eq!(profile.name.as_deref(), Some("alice"));
        assert_eq!(profile.best_name(), Some("Alice"));
        assert_eq!(profile.picture.as_deref(), Some("https://x/a.png"));
        assert_eq!(profile.nip05.as_deref(), Some("alice@x"));
    }

    #[test]
    fn test_malformed_profile_is_an_error() {
        assert!(matches!(
            Profile::from_content("{not json"),
            Err(FeedError::MalformedProfile(_))
        ));
        assert!(Profile::from_content("[1,2,3]").is_err());
    }

    #[test]
    fn test_from_event_checks_kind() {
        let event = RawEvent::new("p1", 1, "A", 1).with_content(r#"{"name":"a"}"#);
        assert!(Profile::from_event(&event).is_err());
        let event = RawEvent::new("p1", 0, "A", 1).with_content(r#"{"name":"a"}"#);
        assert_eq!(Profile::from_event(&event).unwrap().name.as_deref(), Some("a"));
    }

    #[test]
    fn test_display_name_falls_back_to_short_pubkey() {
        let pubkey = "0123456789abcdef";
        assert_eq!(display_name(pubkey, None), "01234567...");
        assert_eq!(short_pubkey("abc"), "abc...");

        let named = Profile {
            name: Some("bob".into()),
            ..Default::default()
        };
        assert_eq!(display_name(pubkey, Some(&named)), "bob");
        assert_eq!(display_name(pubkey, Some(&Profile::default())), "01234567...");
    }
}
