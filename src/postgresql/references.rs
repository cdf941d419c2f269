//! Reference table and constraint rebuild
//!
//! Re-creates the objects backing list-of-link fields: the global index
//! table, one join table per (source type, target type, locale) with its
//! target index, and a cascading foreign key from each join table to its
//! source draft table. The rendered SQL is idempotent.

use super::client::set_search_path;
use super::incremental_sync::dollar_quote;
use super::schema::{SyncSchema, INDEX_TABLE_COLUMN, SYS_ID_COLUMN};
use crate::error::Result;
use content_core::naming::{format_locale, reference_table_name, table_name, INDEX_TABLE};
use content_core::{ContentType, Locale};
use postgresql_types::{quote_ident, quote_literal};
use std::collections::BTreeMap;
use tokio_postgres::Client;
use tracing::info;

/// One reference table and the draft table its rows point from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDefinition {
    pub table_name: String,
    pub source_table: String,
    pub target_type: String,
    pub locale: String,
}

/// The reference objects of one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSchema {
    pub schema_name: String,
    /// Keyed and ordered by reference table name
    pub references: BTreeMap<String, ReferenceDefinition>,
}

impl ReferenceSchema {
    /// Every reference table implied by the reference-list fields of `types`
    /// in every locale.
    pub fn from_content_types(
        schema_name: impl Into<String>,
        types: &[ContentType],
        locales: &[Locale],
    ) -> Self {
        let mut references = BTreeMap::new();
        for content_type in types {
            for def in content_type.active_fields().filter(|f| f.is_reference_list()) {
                let target = def.link_target_type.as_deref().unwrap_or_default();
                for locale in locales {
                    let locale = format_locale(&locale.code);
                    let name = reference_table_name(&content_type.id, target, &locale);
                    references.insert(
                        name.clone(),
                        ReferenceDefinition {
                            table_name: name,
                            source_table: table_name(&content_type.id, &locale),
                            target_type: target.to_string(),
                            locale,
                        },
                    );
                }
            }
        }

        Self {
            schema_name: schema_name.into(),
            references,
        }
    }

    /// The reference tables a sync run wrote into.
    pub fn from_sync_schema(schema: &SyncSchema) -> Self {
        let references = schema
            .references
            .values()
            .map(|refs| {
                (
                    refs.name.clone(),
                    ReferenceDefinition {
                        table_name: refs.name.clone(),
                        source_table: refs.source_table.clone(),
                        target_type: refs.target_type.clone(),
                        locale: refs.locale.clone(),
                    },
                )
            })
            .collect();

        Self {
            schema_name: schema.schema_name.clone(),
            references,
        }
    }

    /// Render the rebuild script.
    pub fn render(&self) -> String {
        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {SYS_ID_COLUMN} text NOT NULL,\n    {INDEX_TABLE_COLUMN} text NOT NULL,\n    PRIMARY KEY ({SYS_ID_COLUMN}, {INDEX_TABLE_COLUMN})\n);",
            quote_ident(INDEX_TABLE)
        )];

        for reference in self.references.values() {
            render_reference(reference, &mut statements);
        }

        statements.join("\n")
    }
}

fn render_reference(reference: &ReferenceDefinition, statements: &mut Vec<String>) {
    let table = quote_ident(&reference.table_name);
    let index = quote_ident(&format!("{}_target_sysid_idx", reference.table_name));
    let constraint = quote_ident(&format!("{}_source_sysid_fkey", reference.table_name));
    let source = quote_ident(&reference.source_table);

    statements.push(format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    source_sysid text NOT NULL,\n    target_sysid text NOT NULL,\n    locale text NOT NULL,\n    PRIMARY KEY (source_sysid, target_sysid, locale)\n);"
    ));
    statements.push(format!(
        "CREATE INDEX IF NOT EXISTS {index} ON {table} (target_sysid);"
    ));
    statements.push(format!(
        "ALTER TABLE {table} DROP CONSTRAINT IF EXISTS {constraint};"
    ));

    let body = format!(
        "
BEGIN
    IF to_regclass({}) IS NOT NULL THEN
        ALTER TABLE {table} ADD CONSTRAINT {constraint}
            FOREIGN KEY (source_sysid) REFERENCES {source} ({SYS_ID_COLUMN})
            ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED;
    END IF;
END
",
        quote_literal(&source)
    );
    statements.push(format!("DO {};", dollar_quote(&body)));
}

/// Re-create the reference objects of `references` in one transaction.
pub async fn rebuild(client: &mut Client, references: &ReferenceSchema) -> Result<()> {
    set_search_path(client, &references.schema_name).await?;

    let sql = references.render();
    info!(
        "Rebuilding {} reference tables in schema {}",
        references.references.len(),
        references.schema_name
    );

    let tx = client.transaction().await?;
    tx.batch_execute(&sql).await?;
    tx.commit().await?;

    info!("Reference rebuild complete for schema {}", references.schema_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgresql::mapper::build_schema;
    use content_core::{ContentItem, FieldDef, FieldType, FieldValue, Link};

    fn types() -> Vec<ContentType> {
        vec![
            ContentType::new(
                "blogPost",
                vec![
                    FieldDef::new("title", FieldType::Text),
                    FieldDef::link_list("relatedPosts", "blogPost"),
                    FieldDef::link_list("authors", "person").omitted(),
                ],
            ),
            ContentType::new("person", vec![FieldDef::new("name", FieldType::Text)]),
        ]
    }

    #[test]
    fn test_from_content_types() {
        let locales = vec![Locale::new("en-US"), Locale::new("de")];
        let refs = ReferenceSchema::from_content_types("content", &types(), &locales);

        let names: Vec<&str> = refs.references.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["blog_post__blog_post_de", "blog_post__blog_post_en_us"]);
        assert_eq!(
            refs.references["blog_post__blog_post_de"].source_table,
            "blog_post_de"
        );
    }

    #[test]
    fn test_from_sync_schema() {
        let item = ContentItem::entry("a", "blogPost").with_field(
            "relatedPosts",
            "en",
            FieldValue::LinkList(vec![Link::new("b", "Entry")]),
        );
        let schema = build_schema("content", &types(), &[item]).unwrap();
        let refs = ReferenceSchema::from_sync_schema(&schema);

        assert_eq!(refs.schema_name, "content");
        let def = &refs.references["blog_post__blog_post_en"];
        assert_eq!(def.source_table, "blog_post_en");
        assert_eq!(def.target_type, "blogPost");
        assert_eq!(def.locale, "en");
    }

    #[test]
    fn test_render() {
        let refs = ReferenceSchema::from_content_types("content", &types(), &[Locale::new("en")]);
        let sql = refs.render();

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"_entries\" ("));
        assert!(sql.contains("PRIMARY KEY (sysid, table_name)"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"blog_post__blog_post_en\" ("));
        assert!(sql.contains("PRIMARY KEY (source_sysid, target_sysid, locale)"));
        assert!(sql.contains(
            "CREATE INDEX IF NOT EXISTS \"blog_post__blog_post_en_target_sysid_idx\" ON \"blog_post__blog_post_en\" (target_sysid);"
        ));
        assert!(sql.contains(
            "ALTER TABLE \"blog_post__blog_post_en\" DROP CONSTRAINT IF EXISTS \"blog_post__blog_post_en_source_sysid_fkey\";"
        ));
        assert!(sql.contains("IF to_regclass('\"blog_post_en\"') IS NOT NULL THEN"));
        assert!(sql.contains("REFERENCES \"blog_post_en\" (sysid)"));
        assert!(sql.contains("ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED;"));
    }

    #[test]
    fn test_render_without_references() {
        let refs = ReferenceSchema::from_content_types("content", &[], &[Locale::new("en")]);
        let sql = refs.render();
        assert!(sql.contains("\"_entries\""));
        assert!(!sql.contains("ALTER TABLE"));
    }
}
