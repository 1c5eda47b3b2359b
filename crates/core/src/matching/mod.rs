//! Fuzzy title matching.
//!
//! Announcement titles and the job names the download client reports are
//! usually identical, but clients may rewrite names (sanitized characters,
//! dropped brackets). Matching tolerates that with a normalized
//! Levenshtein similarity.

/// Default threshold for general similarity checks.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Threshold used when correlating a feed title with a download job name.
pub const TITLE_MATCH_THRESHOLD: f64 = 0.6;

/// Edit distance (insertions, deletions, substitutions, unit cost) between
/// two strings, counted in chars.
///
/// Uses a single rolling row sized on the shorter input.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut row: Vec<usize> = (0..=short.len()).collect();
    for (i, lc) in long.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = diagonal + usize::from(lc != sc);
            let insertion = row[j + 1] + 1;
            let deletion = row[j] + 1;
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(insertion).min(deletion);
        }
    }
    row[short.len()]
}

/// Similarity in `[0, 1]`: `1 - distance / max_len`. Two empty strings are
/// fully similar.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Whether two strings are at least `threshold` similar.
pub fn is_similar(a: &str, b: &str, threshold: f64) -> bool {
    similarity(a, b) >= threshold
}

/// [`is_similar`] with [`DEFAULT_SIMILARITY_THRESHOLD`].
pub fn is_similar_default(a: &str, b: &str) -> bool {
    is_similar(a, b, DEFAULT_SIMILARITY_THRESHOLD)
}

/// Whether a job name corresponds to an announcement title: exact equality,
/// or similar above `threshold`.
pub fn title_matches(title: &str, job_name: &str, threshold: f64) -> bool {
    title == job_name || is_similar(title, job_name, threshold)
}
