//! Split long replies to fit a platform's message-length limit.
//!
//! Prefers paragraph boundaries, then line boundaries, then a hard split by
//! character count. Limits are in characters, not bytes — Telegram counts
//! characters.

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for ch in text.chars() {
        if current_len == max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(ch);
        current_len += 1;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn pack(pieces: Vec<String>, separator: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if current.is_empty() {
            current = piece;
            continue;
        }
        if char_count(&current) + char_count(separator) + char_count(&piece) <= max_chars {
            current.push_str(separator);
            current.push_str(&piece);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = piece;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return Vec::new();
    }
    if char_count(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    for paragraph in text.split("\n\n") {
        if char_count(paragraph) <= max_chars {
            pieces.push(paragraph.to_string());
            continue;
        }
        for line in paragraph.split('\n') {
            if char_count(line) <= max_chars {
                pieces.push(line.to_string());
            } else {
                pieces.extend(hard_split(line, max_chars));
            }
        }
    }

    pack(pieces, "\n\n", max_chars)
}
