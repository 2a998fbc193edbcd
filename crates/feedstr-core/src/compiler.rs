//! Translation of declarative feed rules into relay queries.
//!
//! Relay-side filters narrow by kind, author and time window. Anything the
//! relays cannot express (post vs reply shape, "liked by") is carried on the
//! descriptor as a client-side post-filter or a chained dereference step.

use serde::Serialize;

use crate::classifier::{like_target, repost_target, PostFilter};
use crate::constants::{kinds, PICTURE_TAG};
use crate::models::{FeedRule, Predicate, RawEvent, Subject, Verb};
use crate::nostr::QueryFilter;

/// Inputs that vary per compile call
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub followed_pubkeys: &'a [String],
    pub group_members: Option<&'a [String]>,
    pub limit: usize,
    pub until: Option<u64>,
    /// Extra lower bound; the later of this and the rule's window wins
    pub since: Option<u64>,
}

/// Second step of a chained rule: fetch the notes that engagement events
/// collected in the first step point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dereference {
    LikedNotes,
    RepostedNotes,
}

impl Dereference {
    /// Note id an event from the first step contributes, if any
    pub fn target<'a>(&self, event: &'a RawEvent) -> Option<&'a str> {
        match self {
            Self::LikedNotes => like_target(event),
            Self::RepostedNotes => repost_target(event),
        }
    }

    pub fn filter(&self, ids: Vec<String>, subject: Subject) -> QueryFilter {
        let filter = QueryFilter::new().kinds([kinds::TEXT_NOTE]).ids(ids);
        if subject == Subject::Picture {
            filter.tag('t', vec![PICTURE_TAG.to_string()])
        } else {
            filter
        }
    }
}

/// One relay query derived from a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    /// Short human-readable name for logs ("notes", "reactions", ...)
    pub label: &'static str,
    pub filter: QueryFilter,
    #[serde(skip)]
    pub post_filter: PostFilter,
    pub dereference: Option<Dereference>,
}

impl QueryDescriptor {
    fn direct(label: &'static str, filter: QueryFilter, post_filter: PostFilter) -> Self {
        Self {
            label,
            filter,
            post_filter,
            dereference: None,
        }
    }
}

pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compile against the current wall clock. The time window is recomputed on
/// every call.
pub fn compile(rule: &FeedRule, ctx: &CompileContext<'_>) -> Vec<QueryDescriptor> {
    compile_at(rule, ctx, unix_now())
}

pub fn compile_at(rule: &FeedRule, ctx: &CompileContext<'_>, now: u64) -> Vec<QueryDescriptor> {
    let window_start = rule.time_range.since(now);
    let since = Some(ctx.since.map_or(window_start, |s| s.max(window_start)));

    let authors: Option<Vec<String>> = match rule.predicate {
        Predicate::Follows => Some(ctx.followed_pubkeys.to_vec()),
        Predicate::Group => Some(
            ctx.group_members
                .unwrap_or(ctx.followed_pubkeys)
                .to_vec(),
        ),
        Predicate::NetworkWide => None,
    };

    let base = QueryFilter::new()
        .kinds([kinds::TEXT_NOTE])
        .authors(authors.clone())
        .since(since)
        .until(ctx.until)
        .limit(Some(ctx.limit));

    let subject_notes = if rule.subject == Subject::Picture {
        base.clone().tag('t', vec![PICTURE_TAG.to_string()])
    } else {
        base.clone()
    };
    let by_subject = PostFilter::Subject(rule.subject);

    match rule.verb {
        Verb::Posted => vec![QueryDescriptor::direct("notes", subject_notes, by_subject)],
        Verb::Trending => vec![QueryDescriptor::direct(
            "trending",
            subject_notes
                .kinds([kinds::TEXT_NOTE, kinds::REACTION, kinds::REPOST])
                .limit(Some(ctx.limit * 3)),
            by_subject,
        )],
        Verb::Liked => vec![QueryDescriptor {
            label: "reactions",
            filter: base
                .kinds([kinds::REACTION])
                .limit(Some(ctx.limit * 2)),
            post_filter: by_subject,
            dereference: Some(Dereference::LikedNotes),
        }],
        Verb::Reposted => vec![QueryDescriptor {
            label: "reposts",
            filter: base.kinds([kinds::REPOST]).limit(Some(ctx.limit * 2)),
            post_filter: by_subject,
            dereference: Some(Dereference::RepostedNotes),
        }],
        Verb::Commented => {
            let mut descriptors = vec![QueryDescriptor::direct(
                "replies",
                base.clone(),
                PostFilter::RepliesOnly,
            )];
            // Replies addressed to the author set, wherever they come from
            if let Some(authors) = authors {
                descriptors.push(QueryDescriptor::direct(
                    "mentions",
                    base.authors(None).tag('p', authors),
                    PostFilter::RepliesOnly,
                ));
            }
            descriptors
        }
        Verb::Interacted => vec![
            QueryDescriptor::direct("reactions", base.clone().kinds([kinds::REACTION]), PostFilter::None),
            QueryDescriptor::direct("notes", subject_notes, by_subject),
            QueryDescriptor::direct("reposts", base.kinds([kinds::REPOST]), PostFilter::None),
        ],
    }
}

/// Engagement score with time decay: reposts weigh most, replies in
/// between, likes least.
pub fn calculate_trending_score(likes: usize, reposts: usize, replies: usize, age_hours: f64) -> f64 {
    let decay = 1.0 / (age_hours.max(0.0) + 2.0).powf(1.8);
    (likes as f64 + reposts as f64 * 2.0 + replies as f64 * 1.5) * decay
}
