/// Grammar keywords that survive lowercasing outside of quoted regions.
const KEYWORDS: &[&str] = &["AND", "OR", "NOT", "TO"];

/// Hand-normalize a query string that bypasses the analyzer (native grammar,
/// wildcard, prefix and fuzzy values).
///
/// Single quotes become double quotes, every whitespace-separated token is
/// lowercased except the bare keywords `AND`, `OR`, `NOT` and `TO` outside of
/// a quoted region, and a fixed set of German characters is folded to ASCII.
/// Whitespace is kept as it was.
pub fn fix_query(raw: &str) -> String {
    let raw = raw.replace('\'', "\"");
    let mut fixed = String::with_capacity(raw.len());
    let mut in_quotes = false;

    for token in split_keep_whitespace(&raw) {
        if !in_quotes && KEYWORDS.contains(&token) {
            fixed.push_str(token);
        } else {
            fixed.push_str(&token.to_lowercase());
        }
        if unescaped_quotes(token) % 2 == 1 {
            in_quotes = !in_quotes;
        }
    }

    fold_umlauts(&fixed)
}

/// Splits into alternating runs of whitespace and non-whitespace.
fn split_keep_whitespace(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;
    for (pos, c) in s.char_indices() {
        let space = c.is_whitespace();
        match in_space {
            Some(prev) if prev != space => {
                tokens.push(&s[start..pos]);
                start = pos;
            }
            _ => {}
        }
        in_space = Some(space);
    }
    if start < s.len() {
        tokens.push(&s[start..]);
    }
    tokens
}

fn unescaped_quotes(token: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in token.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => count += 1,
            _ => {}
        }
    }
    count
}

fn fold_umlauts(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'ä' => out.push('a'),
            'ö' => out.push('o'),
            'ü' => out.push('u'),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}
