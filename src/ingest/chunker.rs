/// Split a transcript into chunks of roughly `approx_chars` characters on line
/// boundaries.
///
/// Every chunk starts with a `Title: {title}\nBody:\n` header so the episode
/// name travels with the text into keyword indexes. A line that pushes the
/// running count to the budget starts the next chunk. A single line longer
/// than the budget becomes its own chunk rather than being split.
pub fn split_by_lines(title: &str, text: &str, approx_chars: usize) -> Vec<String> {
    let header = format!("Title: {}\nBody:\n", title);
    let mut chunks = Vec::new();
    let mut body = String::new();
    let mut count = 0;

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        count += line_chars;

        if count >= approx_chars && !body.is_empty() {
            chunks.push(format!("{}{}", header, body));
            body.clear();
            count = line_chars;
        }

        body.push_str(line);
    }

    if !body.trim().is_empty() {
        chunks.push(format!("{}{}", header, body));
    }

    chunks
}

/// Split text into overlapping windows of about `window_tokens` tokens on
/// word boundaries.
///
/// Consecutive windows share up to `overlap_tokens` tokens of trailing words.
/// Every window holds at least one word, so oversized words never stall the
/// loop.
pub fn chunk_words(text: &str, window_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start;
        let mut tokens = 0;
        while end < words.len() {
            let word_tokens = estimate_tokens(words[end]);
            if end > start && tokens + word_tokens > window_tokens {
                break;
            }
            tokens += word_tokens;
            end += 1;
        }

        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        // Walk back from the window end to seed the overlap, always advancing
        // by at least one word.
        let mut next = end;
        let mut overlap = 0;
        while next > start + 1 {
            let word_tokens = estimate_tokens(words[next - 1]);
            if overlap + word_tokens > overlap_tokens {
                break;
            }
            overlap += word_tokens;
            next -= 1;
        }
        start = next;
    }

    chunks
}

/// Estimate token count from text
///
/// Uses approximation: 1 token ≈ 4 characters
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}
