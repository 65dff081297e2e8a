//! Article chunking for refinement
//!
//! Splits raw article text into bounded-size chunks along paragraph and
//! sentence boundaries. Deterministic and synchronous; the chunk list
//! preserves the reading order of the article and no chunk is empty.

/// Default maximum characters per chunk
pub const DEFAULT_MAX_CHARS: usize = 500;

/// Default minimum characters per chunk
pub const DEFAULT_MIN_CHARS: usize = 100;

/// Split article text into refinement chunks.
///
/// Paragraphs are taken at blank-line boundaries with internal single
/// newlines collapsed to spaces. A paragraph longer than `max_chars` is
/// split into sentences at `.`/`!`/`?` followed by whitespace. Pieces are
/// then greedily packed (joined by newline) while the running length
/// stays within `max_chars`; a single piece longer than the limit becomes
/// its own chunk and is never force-split.
///
/// `min_chars` is a tuning hint carried through the configuration
/// surface; chunks below the minimum are allowed and no merging beyond
/// the greedy rule is performed.
pub fn split(text: &str, max_chars: usize, _min_chars: usize) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();

    for paragraph in paragraphs(text) {
        if paragraph.chars().count() <= max_chars {
            pieces.push(paragraph);
        } else {
            pieces.extend(sentences(&paragraph));
        }
    }

    pack(pieces, max_chars)
}

/// Split with the default limits
pub fn split_default(text: &str) -> Vec<String> {
    split(text, DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS)
}

/// Paragraphs at blank-line boundaries, single newlines collapsed to spaces
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }

    out
}

/// Sentence pieces of one paragraph, split at terminal punctuation
/// followed by whitespace
fn sentences(paragraph: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = paragraph.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            let piece = current.trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }
            current.clear();
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        pieces.push(tail.to_string());
    }

    pieces
}

/// Greedily pack pieces into chunks joined by newline
fn pack(pieces: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for piece in pieces {
        let piece_len = piece.chars().count();
        if current.is_empty() {
            current = piece;
            current_len = piece_len;
        } else if current_len + 1 + piece_len <= max_chars {
            current.push('\n');
            current.push_str(&piece);
            current_len += 1 + piece_len;
        } else {
            chunks.push(current);
            current = piece;
            current_len = piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_paragraphs_packed_together() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let chunks = split(text, 500, 100);
        assert_eq!(chunks, vec!["First paragraph.\nSecond paragraph."]);
    }

    #[test]
    fn test_internal_newlines_collapsed() {
        let text = "Line one\nline two\nline three.";
        let chunks = split_default(text);
        assert_eq!(chunks, vec!["Line one line two line three."]);
    }

    #[test]
    fn test_long_paragraph_split_at_sentences() {
        let sentence = "This sentence is repeated to exceed the limit.";
        let paragraph = vec![sentence; 5].join(" ");
        let chunks = split(&paragraph, 100, 10);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            for piece in chunk.split('\n') {
                assert_eq!(piece, sentence);
            }
        }
    }

    #[test]
    fn test_oversize_piece_becomes_own_chunk() {
        let giant = "word ".repeat(100).trim().to_string(); // no terminal punctuation
        let chunks = split(&giant, 50, 10);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], giant);
    }

    #[test]
    fn test_content_order_preserved() {
        let text = "Alpha one. Alpha two.\n\nBeta one! Beta two?\n\nGamma.";
        let chunks = split(text, 20, 5);
        let joined = chunks.join("\n");
        let words: Vec<&str> = joined.split_whitespace().collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(words, original);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn test_blank_input_yields_no_chunks() {
        assert!(split_default("").is_empty());
        assert!(split_default("\n\n   \n").is_empty());
    }

    #[test]
    fn test_deterministic() {
        let text = "One. Two. Three.\n\nFour. Five.";
        assert_eq!(split(text, 12, 4), split(text, 12, 4));
    }
}
