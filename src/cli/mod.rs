pub mod search;
pub mod stats;

/// Shorten `text` to at most `max` characters, appending `...` when cut.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max) {
        Some((byte, _)) => format!("{}...", &flat[..byte]),
        None => flat,
    }
}
