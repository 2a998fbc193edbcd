use serde::{Deserialize, Serialize};

use super::FeedRule;
use crate::constants::FEED_DEF_VERSION;
use crate::error::{FeedError, Result};

/// A named, ordered set of rules. Owned by the persistence layer; the engine
/// only reads its rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub name: String,
    pub rules: Vec<FeedRule>,
}

impl Feed {
    pub fn new(name: impl Into<String>, rules: Vec<FeedRule>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            rules,
        }
    }

    /// Rule weights of a feed must add up to exactly 100.
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(FeedError::MalformedFeed {
                message: "feed has no rules".to_string(),
            });
        }
        let total: u32 = self.rules.iter().map(|r| r.weight as u32).sum();
        if total != 100 {
            return Err(FeedError::MalformedFeed {
                message: format!("rule weights sum to {}, expected 100", total),
            });
        }
        Ok(())
    }

    pub fn definition(&self) -> FeedDefinition {
        FeedDefinition {
            version: FEED_DEF_VERSION,
            name: self.name.clone(),
            rules: self.rules.clone(),
        }
    }
}

/// Serialized feed record: `{version: 1, name, rules}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDefinition {
    pub version: u32,
    pub name: String,
    pub rules: Vec<FeedRule>,
}

impl FeedDefinition {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FeedError::MalformedFeed {
            message: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let definition: FeedDefinition =
            serde_json::from_str(json).map_err(|e| FeedError::MalformedFeed {
                message: e.to_string(),
            })?;
        if definition.version != FEED_DEF_VERSION {
            return Err(FeedError::MalformedFeed {
                message: format!("unsupported feed version {}", definition.version),
            });
        }
        Ok(definition)
    }

    pub fn into_feed(self, id: impl Into<String>) -> Feed {
        Feed {
            id: id.into(),
            name: self.name,
            rules: self.rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Predicate, Subject, TimeRange, Verb};

    fn rule(weight: u8) -> FeedRule {
        FeedRule::new(Subject::Post, Verb::Posted, Predicate::Follows, TimeRange::TwentyFourHours, weight)
    }

    #[test]
    fn test_validate_weights() {
        assert!(Feed::new("ok", vec![rule(60), rule(40)]).validate().is_ok());
        assert!(Feed::new("short", vec![rule(60), rule(30)]).validate().is_err());
        assert!(Feed::new("empty", vec![]).validate().is_err());
    }

    #[test]
    fn test_definition_json_shape() {
        let feed = Feed::new("Morning", vec![rule(100)]);
        let json = feed.definition().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["name"], "Morning");
        assert_eq!(value["rules"][0]["timeRange"], "24hr");
        assert_eq!(value["rules"][0]["subject"], "Posts");
    }

    #[test]
    fn test_from_json_rejects_unknown_version() {
        let json = r#"{"version": 2, "name": "x", "rules": []}"#;
        assert!(matches!(
            FeedDefinition::from_json(json),
            Err(FeedError::MalformedFeed { .. })
        ));
        assert!(FeedDefinition::from_json("{").is_err());
    }
}
