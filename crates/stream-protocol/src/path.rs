//! Path helpers used for routing.
//!
//! Paths are `/`-separated; empty segments are ignored. A segment that is a
//! canonical hyphenated UUID is an identifier, anything else is a name.

use uuid::Uuid;

/// Length of a canonical 8-4-4-4-12 UUID.
const CANONICAL_UUID_LEN: usize = 36;

/// Whether `segment` is a canonical hyphenated UUID (case-insensitive).
#[must_use]
pub fn is_uuid(segment: &str) -> bool {
    segment.len() == CANONICAL_UUID_LEN && Uuid::try_parse(segment).is_ok()
}

/// Non-empty segments of a path.
#[must_use]
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn tail(segments: &[&str], n: usize) -> String {
    segments[segments.len().saturating_sub(n)..].join("/")
}

/// Candidate model keys for an event path.
///
/// Always the last two segments; additionally the last three when the final
/// segment is not a UUID.
#[must_use]
pub fn routing_keys(path: &str) -> Vec<String> {
    let segs = segments(path);
    let Some(last) = segs.last() else {
        return Vec::new();
    };

    let mut keys = vec![tail(&segs, 2)];
    if !is_uuid(last) && segs.len() >= 3 {
        keys.push(tail(&segs, 3));
    }
    keys
}

/// The key a model registers under, given its own path.
///
/// Matches one of the [`routing_keys`] of any event published for that model.
#[must_use]
pub fn model_key(path: &str) -> Option<String> {
    let segs = segments(path);
    let last = segs.last()?;
    let n = if is_uuid(last) { 2 } else { 3 };
    Some(tail(&segs, n))
}

/// Channel candidates for an event path: each non-UUID segment as `/segment`.
#[must_use]
pub fn channel_keys(path: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for seg in segments(path) {
        if is_uuid(seg) {
            continue;
        }
        let key = format!("/{}", seg);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Ensure a channel name begins with `/`.
#[must_use]
pub fn normalize_channel(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}
