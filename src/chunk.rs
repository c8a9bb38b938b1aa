//! Line-boundary source splitter.
//!
//! Files longer than the provider's per-request limit are analyzed piece by
//! piece and their facts merged afterwards. Splitting occurs on line
//! boundaries so no statement is cut mid-line; a single line longer than the
//! limit is hard-split as a last resort.

/// Split source text into pieces of at most `max_chars` characters.
/// Always returns at least one piece; pieces concatenate back to the input
/// minus nothing (every byte lands in exactly one piece).
pub fn split_source(text: &str, max_chars: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if !current.is_empty() && current.len() + line.len() > max_chars {
            pieces.push(std::mem::take(&mut current));
        }

        if line.len() > max_chars {
            // Oversized single line: hard split at char boundaries.
            let mut remaining = line;
            while remaining.len() > max_chars {
                let mut split_at = max_chars;
                while !remaining.is_char_boundary(split_at) {
                    split_at -= 1;
                }
                if split_at == 0 {
                    // A limit smaller than one character: take that character
                    // whole rather than stalling.
                    split_at = remaining
                        .chars()
                        .next()
                        .map_or(remaining.len(), char::len_utf8);
                }
                pieces.push(remaining[..split_at].to_string());
                remaining = &remaining[split_at..];
            }
            current.push_str(remaining);
        } else {
            current.push_str(line);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    if pieces.is_empty() {
        pieces.push(String::new());
    }

    pieces
}
