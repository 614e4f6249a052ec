//! Excerpt extraction
//!
//! Citations carry a bounded excerpt: the window of the content that mentions
//! the most query keywords, or a sentence-aware prefix when no window does.
//! All lengths are in characters, never bytes.

const ELLIPSIS: &str = "...";
/// A period this close to the cut point ends the excerpt
const SENTENCE_SLACK: usize = 50;
/// A space this close to the cut point ends the excerpt
const WORD_SLACK: usize = 30;

/// Build an excerpt of at most `limit` characters (plus ellipses)
pub fn build_excerpt(text: &str, keywords: &[String], limit: usize) -> String {
    let text = text.trim();
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }

    match best_window(&chars, keywords, limit) {
        Some(start) if start > 0 => window_excerpt(&chars, start, limit),
        _ => truncate_prefix(text, limit),
    }
}

/// Cut `text` to `limit` characters, preferring a sentence end, then a word
/// boundary, then a hard cut. Appends an ellipsis whenever text was dropped.
pub fn truncate_prefix(text: &str, limit: usize) -> String {
    let text = text.trim();
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return text.to_string();
    }

    let truncated = &chars[..limit];
    let last_period = truncated.iter().rposition(|&c| c == '.');
    let last_space = truncated.iter().rposition(|&c| c == ' ');

    let kept: String = match (last_period, last_space) {
        (Some(p), _) if p + SENTENCE_SLACK > limit => truncated[..=p].iter().collect(),
        (_, Some(s)) if s + WORD_SLACK > limit => truncated[..s].iter().collect(),
        _ => truncated.iter().collect(),
    };

    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

/// Start of the word-aligned window containing the most distinct keywords.
/// Earliest wins ties; `None` when no window contains any keyword.
fn best_window(chars: &[char], keywords: &[String], limit: usize) -> Option<usize> {
    if keywords.is_empty() || limit == 0 {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;
    for start in word_starts(chars) {
        let end = (start + limit).min(chars.len());
        let window: String = chars[start..end].iter().collect::<String>().to_lowercase();
        let hits = keywords.iter().filter(|k| window.contains(k.as_str())).count();

        if hits > 0 && best.map_or(true, |(_, best_hits)| hits > best_hits) {
            best = Some((start, hits));
        }
        if end == chars.len() {
            break;
        }
    }

    best.map(|(start, _)| start)
}

fn word_starts(chars: &[char]) -> impl Iterator<Item = usize> + '_ {
    (0..chars.len()).filter(move |&i| {
        !chars[i].is_whitespace() && (i == 0 || chars[i - 1].is_whitespace())
    })
}

fn window_excerpt(chars: &[char], start: usize, limit: usize) -> String {
    let mut end = (start + limit).min(chars.len());
    if end < chars.len() && !chars[end].is_whitespace() {
        // Do not split the final word
        if let Some(space) = chars[start..end].iter().rposition(|c| c.is_whitespace()) {
            if space > 0 {
                end = start + space;
            }
        }
    }

    let body: String = chars[start..end].iter().collect();
    let mut excerpt = String::with_capacity(body.len() + 2 * ELLIPSIS.len());
    if start > 0 {
        excerpt.push_str(ELLIPSIS);
    }
    excerpt.push_str(body.trim());
    if end < chars.len() {
        excerpt.push_str(ELLIPSIS);
    }
    excerpt
}
