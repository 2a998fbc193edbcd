use chrono::{TimeZone, Utc};
use feedstr_core::models::{Feed, Note};
use feedstr_core::note_detail::NoteDetail;
use feedstr_core::store::FeedItem;
use feedstr_core::thread::ThreadView;

const PREVIEW_LEN: usize = 280;

/// `YYYY-MM-DD HH:MM` in UTC
pub fn format_timestamp(created_at: u64) -> String {
    Utc.timestamp_opt(created_at as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| created_at.to_string())
}

/// Content collapsed to one line and cut at a char boundary
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn stats_line(note: &Note) -> String {
    format!(
        "♥ {}  ↻ {}  💬 {}",
        note.stats.reaction_count, note.stats.repost_count, note.stats.reply_count
    )
}

pub fn render_item(item: &FeedItem) -> String {
    let mut out = format!(
        "{}  {}  [{}]\n  {}\n  {}",
        format_timestamp(item.note.created_at()),
        item.author_name(),
        item.id(),
        preview(item.note.content(), PREVIEW_LEN),
        stats_line(&item.note),
    );
    if !item.likers.is_empty() {
        let names: Vec<String> = item.likers.iter().map(|l| l.name()).collect();
        out.push_str(&format!("\n  liked by {}", names.join(", ")));
    }
    out
}

pub fn render_feed(items: &[FeedItem]) -> String {
    if items.is_empty() {
        return "(no notes)".to_string();
    }
    items.iter().map(render_item).collect::<Vec<_>>().join("\n\n")
}

pub fn render_feed_list(feeds: &[Feed]) -> String {
    if feeds.is_empty() {
        return "(no saved feeds)".to_string();
    }
    feeds
        .iter()
        .map(|feed| {
            let rules: Vec<String> = feed
                .rules
                .iter()
                .map(|r| {
                    format!(
                        "    {:?} {:?} by {:?} in the last {} ({}%)",
                        r.subject,
                        r.verb,
                        r.predicate,
                        r.time_range.label(),
                        r.weight
                    )
                })
                .collect();
            format!("{}  [{}]\n{}", feed.name, feed.id, rules.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_thread(view: &ThreadView, note: Option<&Note>) -> String {
    if let Some(error) = &view.error {
        return format!("error: {}", error);
    }
    let mut lines: Vec<String> = view
        .chain()
        .into_iter()
        .map(|n| format!("{}  [{}]  {}", format_timestamp(n.created_at()), n.id, preview(n.content(), 120)))
        .collect();
    if let Some(note) = note {
        lines.push(format!(
            "{}  [{}]  {}  <- this note",
            format_timestamp(note.created_at()),
            note.id,
            preview(note.content(), 120)
        ));
    }
    if view.truncated {
        lines.insert(0, "(thread truncated)".to_string());
    }
    lines.join("\n")
}

pub fn render_detail(detail: &NoteDetail) -> String {
    let note = &detail.note;
    let mut out = format!(
        "{}  {}  [{}]\n{}\n{}",
        format_timestamp(note.created_at()),
        detail.name_of(&note.author_pubkey),
        note.id,
        note.content(),
        stats_line(note),
    );
    if !note.liked_by.is_empty() {
        let names: Vec<String> = note.liked_by.iter().map(|l| detail.name_of(&l.pubkey)).collect();
        out.push_str(&format!("\nliked by {}", names.join(", ")));
    }
    for reply in detail.replies() {
        out.push_str(&format!(
            "\n  ↳ {}  {}: {}",
            format_timestamp(reply.created_at()),
            detail.name_of(&reply.author_pubkey),
            preview(reply.content(), 120)
        ));
    }
    out
}
