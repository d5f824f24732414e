pub const MAX_HISTORY: usize = 20;

/// Put `entry` at the front, replacing any case-insensitive duplicate.
/// Returns whether the list changed.
pub(crate) fn push(list: &mut Vec<String>, entry: &str) -> bool {
    let entry = entry.trim();
    if entry.is_empty() {
        return false;
    }
    if list.first().is_some_and(|first| first == entry) {
        return false;
    }

    let folded = entry.to_lowercase();
    list.retain(|existing| existing.to_lowercase() != folded);
    list.insert(0, entry.to_string());
    list.truncate(MAX_HISTORY);
    true
}
