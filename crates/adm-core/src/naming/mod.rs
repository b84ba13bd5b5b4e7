//! Target filename derivation.
//!
//! Renders a template over message metadata, sanitizes the result for the
//! local filesystem, and resolves collisions by appending `_N`.

mod sanitize;
mod template;

pub use sanitize::sanitize_filename;
pub use template::{render_template, TemplateValues};

/// Fallback stem when the template renders to nothing usable.
const DEFAULT_STEM: &str = "audio";

/// Derive a sanitized target filename (without collision resolution).
///
/// `extension` includes the leading dot (e.g. `.mp3`).
pub fn derive_target_name(template: &str, values: &TemplateValues, extension: &str) -> String {
    let stem = render_template(template, values);
    let candidate = format!("{}{}", stem, extension);
    let sanitized = sanitize_filename(&candidate);

    // A template over sparse metadata can collapse to just the extension.
    let stem_empty = sanitized.is_empty()
        || sanitized == extension.trim_start_matches('.')
        || sanitized
            .strip_suffix(extension.trim_start_matches('.'))
            .map(|s| s.trim_matches(|c: char| c == '.' || c == '-' || c == '_' || c == ' ').is_empty())
            .unwrap_or(false);
    if stem_empty {
        return sanitize_filename(&format!("{}_{}{}", DEFAULT_STEM, values.file_id, extension));
    }
    sanitized
}

/// Resolve a collision-free name: if `taken` reports the candidate in use,
/// append `_N` before the extension for the smallest free `N >= 1`.
pub fn unique_target_name(candidate: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(candidate) {
        return candidate.to_string();
    }
    let (stem, ext) = match candidate.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), format!(".{}", e)),
        _ => (candidate.to_string(), String::new()),
    };
    let mut n = 1u32;
    loop {
        let next = format!("{}_{}{}", stem, n, ext);
        if !taken(&next) {
            return next;
        }
        n += 1;
    }
}
