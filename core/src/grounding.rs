//! Renders ranked hits into the context block placed ahead of an assistant turn.

use crate::engine::SearchHit;

/// Build a numbered context block from `hits`, capping each entry at
/// `max_chars` characters. `None` means there is nothing to ground on and the
/// assistant should answer without retrieved context.
pub fn build_context<M>(hits: &[SearchHit<'_, M>], max_chars: usize) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let mut out = String::from("Relevant knowledge base entries:\n");
    for (rank, hit) in hits.iter().enumerate() {
        let text = truncate_chars(hit.document.text.trim(), max_chars);
        out.push_str(&format!("{}. [{}] {}\n", rank + 1, hit.document.id, text));
    }
    Some(out)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
