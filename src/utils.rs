use std::collections::HashSet;
use std::hash::Hash;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

pub static MONTH_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}$").unwrap());
pub static DATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Generate a random 6-digit verification code.
pub fn generate_random_code() -> String {
    let mut rng = rand::thread_rng();

    (0..6).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

pub fn split_array_in_chunks<T: Clone>(array: &[T], chunk_length: usize) -> Vec<Vec<T>> {
    array.chunks(chunk_length).map(|chunk| chunk.to_vec()).collect()
}

/// Keep the first item for each key, preserving input order.
pub fn unique_by<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

pub fn validate_email(email: &str) -> bool {
    let trimmed_email = email.trim().to_lowercase();

    if trimmed_email.is_empty() {
        return false;
    }

    // Intentionally loose: an "@" and a "." anywhere but the edges.
    ['@', '.'].iter().all(|&ch| {
        trimmed_email.contains(ch) && !trimmed_email.starts_with(ch) && !trimmed_email.ends_with(ch)
    })
}
