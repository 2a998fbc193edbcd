//! Tag extraction utilities for raw relay events
//!
//! Tags are ordered string lists: `["e", <id>, <relay>, <marker>]`,
//! `["p", <pubkey>]`, `["t", <hashtag>]` and so on.

/// Extract the value of the first tag with the given name.
pub fn first_tag_value<'a>(tags: &'a [Vec<String>], tag_name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.first().map(String::as_str) == Some(tag_name))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

/// Extract the value of the last tag with the given name.
pub fn last_tag_value<'a>(tags: &'a [Vec<String>], tag_name: &str) -> Option<&'a str> {
    tags.iter()
        .rev()
        .find(|t| t.first().map(String::as_str) == Some(tag_name))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

/// Extract all values for a given tag name, in tag order.
/// Useful for tags that appear multiple times (e.g., "p", "e", "t").
pub fn all_tag_values<'a>(tags: &'a [Vec<String>], tag_name: &str) -> Vec<&'a str> {
    tags.iter()
        .filter(|t| t.first().map(String::as_str) == Some(tag_name))
        .filter_map(|t| t.get(1))
        .map(String::as_str)
        .collect()
}

/// Check if the tag list contains a tag with this name (regardless of value).
pub fn has_tag(tags: &[Vec<String>], tag_name: &str) -> bool {
    tags.iter()
        .any(|t| t.first().map(String::as_str) == Some(tag_name))
}

/// Find the event id of the `e` tag carrying a relation marker.
///
/// NIP-10 format: `["e", id, relay, marker]` puts the marker at index 3.
/// Some clients omit the relay (`["e", id, marker]`), so index 2 is accepted
/// as well when it is not a relay URL.
pub fn marked_reference<'a>(tags: &'a [Vec<String>], marker: &str) -> Option<&'a str> {
    tags.iter()
        .filter(|t| t.first().map(String::as_str) == Some("e"))
        .find(|t| {
            let at_3 = t.get(3).map(String::as_str);
            let at_2 = t.get(2).map(String::as_str);
            at_3 == Some(marker) || (at_3.is_none() && at_2 == Some(marker))
        })
        .and_then(|t| t.get(1))
        .map(String::as_str)
}
