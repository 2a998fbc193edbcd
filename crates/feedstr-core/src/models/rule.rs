use serde::{Deserialize, Serialize};

use super::TimeRange;

/// What kind of note a rule selects
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    #[serde(rename = "Posts")]
    Post,
    #[serde(rename = "Replies")]
    Reply,
    #[serde(rename = "Pictures")]
    Picture,
}

/// How the selected authors relate to the notes shown
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Posted,
    Liked,
    Commented,
    Reposted,
    Trending,
    Interacted,
}

/// Whose activity a rule looks at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predicate {
    #[serde(rename = "follows", alias = "followers")]
    Follows,
    #[serde(rename = "nostr")]
    NetworkWide,
    #[serde(rename = "tribe")]
    Group,
}

/// One declarative line of a feed: "<subject> <verb> by <predicate> within <time_range>"
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRule {
    pub id: String,
    pub subject: Subject,
    pub verb: Verb,
    pub predicate: Predicate,
    pub time_range: TimeRange,
    /// Share of the feed, 0..=100
    pub weight: u8,
}

impl FeedRule {
    pub fn new(
        subject: Subject,
        verb: Verb,
        predicate: Predicate,
        time_range: TimeRange,
        weight: u8,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            subject,
            verb,
            predicate,
            time_range,
            weight: weight.min(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_persisted_rule() {
        let json = r#"{
            "id": "r1",
            "subject": "Replies",
            "verb": "liked",
            "predicate": "tribe",
            "timeRange": "12hr",
            "weight": 40
        }"#;
        let rule: FeedRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.subject, Subject::Reply);
        assert_eq!(rule.verb, Verb::Liked);
        assert_eq!(rule.predicate, Predicate::Group);
        assert_eq!(rule.time_range, TimeRange::TwelveHours);
    }

    #[test]
    fn test_legacy_followers_predicate_is_follows() {
        let predicate: Predicate = serde_json::from_str("\"followers\"").unwrap();
        assert_eq!(predicate, Predicate::Follows);
        assert_eq!(serde_json::to_string(&predicate).unwrap(), "\"follows\"");
    }

    #[test]
    fn test_new_rule_gets_unique_id_and_clamped_weight() {
        let a = FeedRule::new(Subject::Post, Verb::Posted, Predicate::Follows, TimeRange::OneHour, 150);
        let b = FeedRule::new(Subject::Post, Verb::Posted, Predicate::Follows, TimeRange::OneHour, 50);
        assert_ne!(a.id, b.id);
        assert_eq!(a.weight, 100);
    }
}
