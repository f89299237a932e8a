/*!
 * Text similarity for fuzzy cache lookups.
 *
 * Similarity is the normalized Levenshtein distance over Unicode scalar
 * values after lowercasing and trimming both inputs:
 * `1 - distance / max(len(a), len(b))`.
 */

/// Normalize text the way fuzzy comparison sees it
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Calculate similarity between two strings (0.0-1.0)
///
/// Both empty yields 1.0; exactly one empty yields 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_normalized(&normalize(a), &normalize(b))
}

/// Similarity for inputs that are already normalized
pub fn similarity_normalized(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() || b_chars.is_empty() {
        return 0.0;
    }

    let distance = levenshtein_distance(&a_chars, &b_chars);
    let max_len = a_chars.len().max(b_chars.len());

    1.0 - (distance as f64 / max_len as f64)
}

/// Bounds on a candidate's length for it to possibly reach `threshold`
///
/// Returns `(min, max)` in chars, i.e. `[threshold * len, len / threshold]`.
pub fn length_bounds(len: usize, threshold: f64) -> (i64, i64) {
    if threshold <= 0.0 {
        return (0, i64::MAX);
    }
    let len = len as f64;
    let min = (len * threshold).floor() as i64;
    let max = (len / threshold).ceil() as i64;
    (min, max)
}

/// Calculate Levenshtein distance between two char sequences
fn levenshtein_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row dynamic programming
    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr_row[0] = i;

        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };

            curr_row[j] = (prev_row[j] + 1)
                .min(curr_row[j - 1] + 1)
                .min(prev_row[j - 1] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b.len()]
}
