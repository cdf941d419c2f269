//! Sample content shared by integration tests

use anyhow::Result;
use content_core::{ContentItem, ContentType, Locale};
use serde_json::json;

/// `blogPost` and `person` content types in their canonical JSON form.
pub fn sample_content_types() -> Result<Vec<ContentType>> {
    let types = json!([
        {
            "id": "blogPost",
            "fields": [
                { "id": "title", "type": "text" },
                { "id": "rating", "type": "int" },
                { "id": "tags", "type": "list" },
                { "id": "author", "type": "link", "linkTargetType": "person" },
                { "id": "relatedPosts", "type": "list", "linkTargetType": "blogPost" },
                { "id": "internalNotes", "type": "text", "omitted": true }
            ]
        },
        {
            "id": "person",
            "fields": [
                { "id": "name", "type": "text" }
            ]
        }
    ]);
    Ok(serde_json::from_value(types)?)
}

/// Locales of the sample space.
pub fn sample_locales() -> Vec<Locale> {
    vec![Locale {
        code: "en".to_string(),
        default: true,
    }]
}

/// One blog post by one person, linking one related post.
pub fn sample_items() -> Result<Vec<ContentItem>> {
    let payloads = vec![
        json!({
            "sys": { "id": "person1", "type": "Entry", "version": 1,
                     "createdAt": "2024-03-01T10:00:00Z",
                     "contentType": { "sys": { "type": "Link", "linkType": "ContentType", "id": "person" } } },
            "fields": { "name": { "en": "Ada" } }
        }),
        json!({
            "sys": { "id": "post1", "type": "Entry", "version": 3,
                     "createdAt": "2024-03-01T10:00:00Z",
                     "updatedAt": "2024-03-02T10:00:00Z",
                     "contentType": { "sys": { "type": "Link", "linkType": "ContentType", "id": "blogPost" } } },
            "fields": {
                "title": { "en": "Hello foo world" },
                "rating": { "en": 5 },
                "tags": { "en": ["rust", "sync"] },
                "author": { "en": { "sys": { "type": "Link", "linkType": "Entry", "id": "person1" } } },
                "relatedPosts": { "en": [
                    { "sys": { "type": "Link", "linkType": "Entry", "id": "post2" } }
                ] },
                "internalNotes": { "en": "draft" }
            }
        }),
    ];

    payloads
        .into_iter()
        .map(|p| Ok(ContentItem::from_json(p)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_content_parses() {
        let types = sample_content_types().unwrap();
        assert_eq!(types.len(), 2);
        assert!(types[0].field("relatedPosts").unwrap().is_reference_list());

        let items = sample_items().unwrap();
        assert_eq!(items[1].content_type_id, "blogPost");
        assert_eq!(items[1].sys.effective_version(), 3);
    }
}
