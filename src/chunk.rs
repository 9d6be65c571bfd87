//! Fixed-size word-window chunker.
//!
//! Page text is first normalized with [`clean_text`], then split into
//! windows of `size` words where consecutive windows share `overlap` words.

/// Collapse every whitespace run to a single space and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into overlapping word windows.
///
/// Window `i` starts at word `i * (size - overlap)` and holds up to `size`
/// words, so the last window may be shorter. Empty text yields no windows.
/// `overlap >= size` is rejected by config validation; here the stride is
/// clamped to one word so the loop always terminates.
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = size.max(1);
    let stride = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += stride;
    }
    chunks
}
