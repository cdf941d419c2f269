//! Deterministic naming of columns and tables.

/// Base table name of assets.
pub const ASSET_TABLE_BASE: &str = "_asset";

/// Name of the global index table.
pub const INDEX_TABLE: &str = "_entries";

/// Suffix of the published table variant.
pub const PUBLISH_SUFFIX: &str = "_publish";

/// Convert an identifier to snake case.
///
/// `blogPost` → `blog_post`, `HTTPServer` → `http_server`,
/// `field-name` → `field_name`. Leading underscores are kept.
pub fn snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Normalize a locale code for use in table names: `en-US` → `en_us`.
pub fn format_locale(locale: &str) -> String {
    locale.to_lowercase().replace('-', "_")
}

/// Draft table for a content type (or `_asset`) in a locale.
pub fn table_name(base: &str, locale: &str) -> String {
    format!("{}_{}", snake_case(base), format_locale(locale))
}

/// Published table for a content type (or `_asset`) in a locale.
pub fn publish_table_name(base: &str, locale: &str) -> String {
    format!("{}{PUBLISH_SUFFIX}", table_name(base, locale))
}

/// Reference table holding list-of-link rows from `base` to `target`.
pub fn reference_table_name(base: &str, target: &str, locale: &str) -> String {
    format!(
        "{}__{}_{}",
        snake_case(base),
        snake_case(target),
        format_locale(locale)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("title"), "title");
        assert_eq!(snake_case("blogPost"), "blog_post");
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("fileName"), "file_name");
        assert_eq!(snake_case("HTTPServer"), "http_server");
        assert_eq!(snake_case("image2Url"), "image2_url");
        assert_eq!(snake_case("some-field"), "some_field");
        assert_eq!(snake_case("_asset"), "_asset");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(table_name("blogPost", "en-US"), "blog_post_en_us");
        assert_eq!(publish_table_name("blogPost", "en"), "blog_post_en_publish");
        assert_eq!(table_name(ASSET_TABLE_BASE, "de"), "_asset_de");
        assert_eq!(
            reference_table_name("blogPost", "author", "en"),
            "blog_post__author_en"
        );
    }
}
