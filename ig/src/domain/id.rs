//! Job ID generation
//!
//! IDs use the format: `{type}-{slug}-{8-char-hex}`
//! Example: `job-nightly-crm-sync-4f9a0c1e`

use tracing::debug;

/// Generate a domain ID from a type prefix and a human title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    debug!(%domain_type, %title, "generate_id: called");
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    // v7 leads with the timestamp; the tail is random
    let suffix = &uuid[uuid.len() - 8..];
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{}-{}", domain_type, suffix)
    } else {
        format!("{}-{}-{}", domain_type, slug, suffix)
    }
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
