//! Whitespace-boundary text splitter.
//!
//! Notion rejects rich-text objects longer than 2000 characters, so long
//! spans are cut into pieces of at most [`MAX_TEXT_CHUNK`] characters,
//! preferring to break between words. Concatenating the pieces gives back
//! the input exactly.

/// Characters per rich-text segment, leaving headroom under Notion's 2000.
pub const MAX_TEXT_CHUNK: usize = 1800;

/// Split `text` into pieces of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut count = 0usize;

    for part in split_keeping_whitespace(text) {
        let len = part.chars().count();
        if count + len > max_chars && !buf.is_empty() {
            chunks.push(std::mem::take(&mut buf));
            count = 0;
        }
        if len > max_chars {
            // A single word longer than the limit: hard split
            let chars: Vec<char> = part.chars().collect();
            for piece in chars.chunks(max_chars) {
                let piece: String = piece.iter().collect();
                if piece.chars().count() == max_chars {
                    chunks.push(piece);
                } else {
                    count = piece.chars().count();
                    buf = piece;
                }
            }
            continue;
        }
        buf.push_str(part);
        count += len;
    }

    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// Alternating runs of non-whitespace and whitespace.
fn split_keeping_whitespace(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_ws: Option<bool> = None;
    for (i, c) in text.char_indices() {
        let ws = c.is_whitespace();
        match in_ws {
            Some(prev) if prev != ws => {
                parts.push(&text[start..i]);
                start = i;
            }
            _ => {}
        }
        in_ws = Some(ws);
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_chunk() {
        assert_eq!(chunk_text("Hello, world!", 1800), vec!["Hello, world!"]);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("", 1800).is_empty());
    }

    #[test]
    fn splits_between_words() {
        let chunks = chunk_text("alpha beta gamma delta", 11);
        assert!(chunks.iter().all(|c| c.chars().count() <= 11));
        assert_eq!(chunks.concat(), "alpha beta gamma delta");
        assert_eq!(chunks[0], "alpha beta ");
    }

    #[test]
    fn long_word_is_hard_split() {
        let word = "x".repeat(25);
        let chunks = chunk_text(&format!("{} end", word), 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), format!("{} end", word));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(20);
        let chunks = chunk_text(&text, 20);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn deterministic() {
        let text = (0..500)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(chunk_text(&text, 100), chunk_text(&text, 100));
    }
}
