//! Filename normalization for derived assets.
//!
//! Every encoded file is named after a slug of its raw source's stem, so the
//! same rule must be applied by the encoder (which writes the file) and by the
//! focus resolver (which predicts the manifest key before the file exists).
//! Both go through [`normalize`].
//!
//! ## Rules
//!
//! 1. Lowercase.
//! 2. Underscores become hyphens.
//! 3. Every character outside `[a-z0-9-]` becomes a hyphen.
//! 4. Runs of hyphens collapse to one.
//! 5. Leading and trailing hyphens are trimmed.
//!
//! - `My Photo_2024` → `my-photo-2024`
//! - `Café Noir!!` → `caf-noir`
//! - `---` → `` (empty)
//!
//! The function is total and idempotent: `normalize(normalize(s)) == normalize(s)`.

use std::path::Path;

/// Slug a filename (without directory).
pub fn normalize(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let mapped = match c {
            'a'..='z' | '0'..='9' => c,
            _ => '-',
        };
        if mapped == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(mapped);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Slug the stem of a path: `photos/My Photo_2024.JPG` → `my-photo-2024`.
///
/// The extension is dropped before normalizing; a path with no stem yields
/// an empty slug.
pub fn normalize_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| normalize(&s.to_string_lossy()))
        .unwrap_or_default()
}
