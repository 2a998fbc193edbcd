//! Saved feeds as kind:1808 events tagged `["d", "feedstr"]` whose content
//! is the JSON feed definition. 1808 is a regular kind, so every save adds a
//! new event and relays keep all of them.

use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::{FEED_DEF_KIND, FEED_D_TAG};
use crate::error::{FeedError, Result};
use crate::models::tag_utils::first_tag_value;
use crate::models::{Feed, FeedDefinition, RawEvent};
use crate::nostr::{EventDraft, QueryFilter, RelayPool};

pub fn feed_event_draft(feed: &Feed) -> Result<EventDraft> {
    Ok(EventDraft {
        kind: FEED_DEF_KIND,
        content: feed.definition().to_json()?,
        tags: vec![vec!["d".to_string(), FEED_D_TAG.to_string()]],
    })
}

/// Publish a feed definition; returns the new event id
pub async fn save_feed(pool: &dyn RelayPool, feed: &Feed) -> Result<String> {
    feed.validate()?;
    let id = pool.publish(feed_event_draft(feed)?).await?;
    debug!(feed = %feed.name, id = %id, "Saved feed");
    Ok(id)
}

/// Decode a stored feed event. The feed takes the event id as its id.
pub fn parse_feed_event(event: &RawEvent) -> Result<Feed> {
    if event.kind != FEED_DEF_KIND {
        return Err(FeedError::MalformedFeed {
            message: format!("expected kind {} but got {}", FEED_DEF_KIND, event.kind),
        });
    }
    if first_tag_value(&event.tags, "d") != Some(FEED_D_TAG) {
        return Err(FeedError::MalformedFeed {
            message: "missing feed d tag".to_string(),
        });
    }
    Ok(FeedDefinition::from_json(&event.content)?.into_feed(event.id.clone()))
}

/// Every feed `pubkey` has saved, newest first. Malformed events are skipped.
pub async fn load_feeds(pool: &dyn RelayPool, pubkey: &str, timeout: Duration) -> Result<Vec<Feed>> {
    let filter = QueryFilter::new()
        .kinds([FEED_DEF_KIND])
        .authors(Some(vec![pubkey.to_string()]))
        .tag('d', vec![FEED_D_TAG.to_string()]);

    let mut events = pool.fetch_many(filter, timeout).await?;
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    let feeds = events
        .iter()
        .filter_map(|event| match parse_feed_event(event) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!(id = %event.id, "Skipping saved feed: {}", e);
                None
            }
        })
        .collect();
    Ok(feeds)
}
