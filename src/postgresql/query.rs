//! Translation of REST-style query parameters into a stored query call
//!
//! Parameters arrive as a flat `key → values` map, the shape of URL query
//! parameters. Control keys select the table, locale, paging and sort
//! order; every other key becomes one [`Filter`]. Execution calls the
//! per-table `<table>_query` procedure which returns the match count and a
//! pre-serialized JSON array of rows.

use super::client::set_search_path;
use crate::error::Result;
use content_core::naming::{format_locale, snake_case};
use postgresql_types::{quote_ident, quote_literal};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::Client;
use tracing::debug;

/// Parameters consumed by the translator rather than turned into filters.
pub const CONTENT_TYPE_PARAM: &str = "content_type";
pub const LOCALE_PARAM: &str = "locale";
pub const SKIP_PARAM: &str = "skip";
pub const LIMIT_PARAM: &str = "limit";
pub const ORDER_PARAM: &str = "order";
/// Accepted and ignored
pub const INCLUDE_PARAM: &str = "include";
/// Accepted and ignored
pub const SELECT_PARAM: &str = "select";

/// Filter comparator, written as a `[op]` suffix on the parameter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Exists,
    Lt,
    Lte,
    Gt,
    Gte,
    Match,
    In,
    Nin,
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Comparator::Eq),
            "ne" => Ok(Comparator::Ne),
            "exists" => Ok(Comparator::Exists),
            "lt" => Ok(Comparator::Lt),
            "lte" => Ok(Comparator::Lte),
            "gt" => Ok(Comparator::Gt),
            "gte" => Ok(Comparator::Gte),
            "match" => Ok(Comparator::Match),
            "in" => Ok(Comparator::In),
            "nin" => Ok(Comparator::Nin),
            other => Err(other.to_string()),
        }
    }
}

/// One predicate on a column.
///
/// `values` holds the comma-split raw parameter values. `in`/`nin` use each
/// value as a list element; every other comparator takes them rejoined as
/// one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub comparator: Comparator,
    pub values: Vec<String>,
}

impl Filter {
    /// Parse a filter from a parameter key such as `fields.rating[gte]`.
    /// Returns `None` for unknown comparators and for field paths that are
    /// empty or not plain identifiers.
    pub fn parse(key: &str, values: Vec<String>) -> Option<Self> {
        let (path, op) = match key.find('[') {
            Some(i) if key.ends_with(']') => (&key[..i], &key[i + 1..key.len() - 1]),
            _ => (key, ""),
        };

        let comparator = match op.parse::<Comparator>() {
            Ok(comparator) => comparator,
            Err(op) => {
                debug!("Ignoring filter {key} with unknown comparator {op}");
                return None;
            }
        };

        let column = filter_column(path)?;

        Some(Self {
            column,
            comparator,
            values,
        })
    }

    /// Readable form, values unquoted: `title ILIKE %foo%`.
    pub fn predicate(&self) -> String {
        self.render(|v| v.to_string())
    }

    /// Executable form handed to the query procedure, every value quoted:
    /// `title ILIKE '%foo%'`.
    pub fn to_sql(&self) -> String {
        self.render(quote_literal)
    }

    fn render(&self, quote: impl Fn(&str) -> String) -> String {
        let col = &self.column;
        let value = self.values.join(",");
        let list = || {
            self.values
                .iter()
                .map(|v| quote(v))
                .collect::<Vec<_>>()
                .join(",")
        };

        match self.comparator {
            Comparator::Eq => format!("{col} = {}", quote(&value)),
            Comparator::Ne => format!("{col} IS DISTINCT FROM {}", quote(&value)),
            Comparator::Exists => format!("{col} IS NOT NULL"),
            Comparator::Lt => format!("{col} < {}", quote(&value)),
            Comparator::Lte => format!("{col} <= {}", quote(&value)),
            Comparator::Gt => format!("{col} > {}", quote(&value)),
            Comparator::Gte => format!("{col} >= {}", quote(&value)),
            Comparator::Match => format!("{col} ILIKE {}", quote(&format!("%{value}%"))),
            Comparator::In => format!("{col} = ANY(ARRAY[{}])", list()),
            Comparator::Nin => format!("{col} != ALL(ARRAY[{}])", list()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.predicate())
    }
}

/// Column addressed by a filter path.
fn filter_column(path: &str) -> Option<String> {
    if !is_identifier_path(path) {
        debug!("Ignoring filter on invalid path {path:?}");
        return None;
    }
    if path == "sys.id" {
        return Some("_sys_id".to_string());
    }
    let field = path.strip_prefix("fields.").unwrap_or(path);
    let field = field.strip_prefix("sys.").unwrap_or(field);
    Some(snake_case(field))
}

/// Paths end up as SQL identifiers: only ASCII alphanumerics, `_` and `.`.
fn is_identifier_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// A translated query against one content table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Search path applied before execution, if any
    pub schema_name: Option<String>,
    pub table_name: String,
    pub locale: String,
    pub filters: Vec<Filter>,
    /// Rendered `ORDER BY` clause body; empty for none
    pub order: String,
    pub skip: i32,
    /// Zero means unbounded
    pub limit: i32,
}

/// Result of a query call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub count: i64,
    /// JSON array of matching rows
    pub items: String,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            count: 0,
            items: "[]".to_string(),
        }
    }
}

/// Translate request parameters. Control keys are consumed; all remaining
/// keys become filters, in key order.
pub fn parse_query(default_locale: &str, mut params: BTreeMap<String, Vec<String>>) -> Query {
    let mut take = |key: &str| -> Option<String> {
        params
            .remove(key)
            .and_then(|values| values.into_iter().next())
            .filter(|v| !v.trim().is_empty())
    };

    let content_type = take(CONTENT_TYPE_PARAM).unwrap_or_default();
    let locale = take(LOCALE_PARAM).unwrap_or_else(|| default_locale.to_string());
    let skip = parse_count(take(SKIP_PARAM));
    let limit = parse_count(take(LIMIT_PARAM));
    let order = take(ORDER_PARAM).unwrap_or_default();
    take(INCLUDE_PARAM);
    take(SELECT_PARAM);

    let table_name = if content_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        snake_case(&content_type)
    } else {
        debug!("Ignoring invalid content type {content_type:?}");
        String::new()
    };
    let order = format_order(&order, &table_name);

    let filters = params
        .into_iter()
        .filter_map(|(key, values)| {
            let values: Vec<String> = values
                .iter()
                .flat_map(|v| v.split(','))
                .map(str::to_string)
                .collect();
            Filter::parse(&key, values)
        })
        .collect();

    Query {
        schema_name: None,
        table_name,
        locale: format_locale(&locale),
        filters,
        order,
        skip,
        limit,
    }
}

/// Unparseable or negative counts fall back to zero.
fn parse_count(value: Option<String>) -> i32 {
    value
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|n| *n >= 0)
        .unwrap_or(0)
}

/// Render a sort specification such as `-sys.id,fields.title` against
/// `table`. Every clause sorts nulls last; clauses naming anything other
/// than a plain field path are dropped.
pub fn format_order(order: &str, table: &str) -> String {
    order
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| {
            let (field, direction) = match o.strip_prefix('-') {
                Some(field) => (field, " DESC"),
                None => (o, ""),
            };
            if !is_identifier_path(field) {
                debug!("Ignoring sort on invalid path {field:?}");
                return None;
            }
            let column = if field == "sys.id" {
                "_sys_id".to_string()
            } else if let Some(sys_field) = field.strip_prefix("sys.") {
                format!("_{}", snake_case(sys_field))
            } else {
                snake_case(field.strip_prefix("fields.").unwrap_or(field))
            };
            Some(format!("{table}.{column}{direction} NULLS LAST"))
        })
        .collect::<Vec<_>>()
        .join(",")
}

impl Query {
    /// Set the search path applied before execution.
    pub fn with_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = Some(schema_name.into());
        self
    }

    /// Filters in the executable form bound as the procedure's `text[]`
    /// argument; `None` binds NULL.
    pub fn filter_array(&self) -> Option<Vec<String>> {
        if self.filters.is_empty() {
            None
        } else {
            Some(self.filters.iter().map(Filter::to_sql).collect())
        }
    }

    /// Statement calling the table's query procedure.
    pub fn statement(&self) -> String {
        format!(
            "SELECT * FROM {}($1, $2, $3, $4, $5)",
            quote_ident(&format!("{}_query", self.table_name))
        )
    }

    /// Execute the query. No matching row yields [`QueryResult::empty`].
    pub async fn execute(&self, client: &Client) -> Result<QueryResult> {
        if let Some(schema_name) = &self.schema_name {
            set_search_path(client, schema_name).await?;
        }

        let filters = self.filter_array();
        debug!(
            "Querying {} (locale {}, {} filters, order '{}', skip {}, limit {})",
            self.table_name,
            self.locale,
            self.filters.len(),
            self.order,
            self.skip,
            self.limit
        );

        let row = client
            .query_opt(
                &self.statement(),
                &[&self.locale, &filters, &self.order, &self.skip, &self.limit],
            )
            .await?;

        let Some(row) = row else {
            return Ok(QueryResult::empty());
        };

        let count: Option<i64> = row.try_get(0)?;
        let items: Option<String> = row.try_get(1)?;
        Ok(QueryResult {
            count: count.unwrap_or(0),
            items: items.unwrap_or_else(|| "[]".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in pairs {
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        map
    }

    #[test]
    fn test_match_filter() {
        let query = parse_query("en", params(&[("fields.title[match]", "foo")]));
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].predicate(), "title ILIKE %foo%");
        assert_eq!(query.filters[0].to_sql(), "title ILIKE '%foo%'");
    }

    #[test]
    fn test_comparators() {
        let query = parse_query("en", params(&[("fields.rating[gte]", "5")]));
        assert_eq!(query.filters[0].predicate(), "rating >= 5");
        assert_eq!(query.filters[0].to_sql(), "rating >= '5'");

        let cases = [
            ("fields.slug", "a", "slug = a"),
            ("fields.slug[ne]", "a", "slug IS DISTINCT FROM a"),
            ("fields.slug[exists]", "true", "slug IS NOT NULL"),
            ("fields.rating[lt]", "3", "rating < 3"),
            ("fields.rating[lte]", "3", "rating <= 3"),
            ("fields.rating[gt]", "3", "rating > 3"),
        ];
        for (key, value, expected) in cases {
            let query = parse_query("en", params(&[(key, value)]));
            assert_eq!(query.filters[0].predicate(), expected, "{key}");
        }
    }

    #[test]
    fn test_list_comparators() {
        let query = parse_query(
            "en",
            params(&[("fields.tags[in]", "a,b"), ("fields.tags[nin]", "c")]),
        );
        let sql: Vec<String> = query.filters.iter().map(Filter::to_sql).collect();
        assert_eq!(sql, vec!["tags = ANY(ARRAY['a','b'])", "tags != ALL(ARRAY['c'])"]);
    }

    #[test]
    fn test_repeated_values_are_combined() {
        let query = parse_query("en", params(&[("fields.tags[in]", "a"), ("fields.tags[in]", "b,c")]));
        assert_eq!(query.filters[0].values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_values_are_escaped() {
        let query = parse_query("en", params(&[("fields.name", "O'Neil")]));
        assert_eq!(query.filters[0].to_sql(), "name = 'O''Neil'");
    }

    #[test]
    fn test_filter_columns() {
        let query = parse_query(
            "en",
            params(&[("sys.id", "x"), ("sys.updatedAt[gt]", "2024"), ("fields.heroImage", "i")]),
        );
        let columns: Vec<&str> = query.filters.iter().map(|f| f.column.as_str()).collect();
        assert_eq!(columns, vec!["hero_image", "_sys_id", "updated_at"]);
    }

    #[test]
    fn test_unknown_comparator_is_dropped() {
        let query = parse_query(
            "en",
            params(&[("fields.title[near]", "x"), ("fields.slug", "a")]),
        );
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].column, "slug");
    }

    #[test]
    fn test_control_params() {
        let query = parse_query(
            "en-US",
            params(&[
                ("content_type", "blogPost"),
                ("skip", "20"),
                ("limit", "10"),
                ("include", "2"),
                ("select", "fields.title"),
            ]),
        );
        assert_eq!(query.table_name, "blog_post");
        assert_eq!(query.locale, "en_us");
        assert_eq!(query.skip, 20);
        assert_eq!(query.limit, 10);
        assert!(query.filters.is_empty());
        assert_eq!(query.filter_array(), None);
        assert_eq!(query.statement(), "SELECT * FROM \"blog_post_query\"($1, $2, $3, $4, $5)");
    }

    #[test]
    fn test_locale_and_paging_defaults() {
        let query = parse_query(
            "de",
            params(&[("content_type", "article"), ("locale", " "), ("skip", "abc"), ("limit", "-1")]),
        );
        assert_eq!(query.locale, "de");
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, 0);
        assert_eq!(query.order, "");
    }

    #[test]
    fn test_order() {
        assert_eq!(format_order("-sys.id", "article"), "article._sys_id DESC NULLS LAST");
        assert_eq!(
            format_order("sys.updatedAt,-fields.title", "article"),
            "article._updated_at NULLS LAST,article.title DESC NULLS LAST"
        );
        assert_eq!(format_order("", "article"), "");

        let query = parse_query("en", params(&[("content_type", "article"), ("order", "-sys.id")]));
        assert_eq!(query.order, "article._sys_id DESC NULLS LAST");
    }

    #[test]
    fn test_filter_paths_must_be_identifiers() {
        let query = parse_query(
            "en",
            params(&[
                ("fields.(select(1)from(pg_sleep(5)))is(null)or(title)", "x"),
                ("fields.title;drop table blog_post_en", "x"),
                ("fields.title/**/", "x"),
                ("fields.rating=1 or 1[gte]", "5"),
                ("sys.updatedAt[gt]", "2024"),
            ]),
        );
        let sql: Vec<String> = query.filters.iter().map(Filter::to_sql).collect();
        assert_eq!(sql, vec!["updated_at > '2024'"]);
    }

    #[test]
    fn test_sort_fields_must_be_identifiers() {
        assert_eq!(format_order("fields.(select(pg_sleep(5)))", "article"), "");
        assert_eq!(
            format_order("-fields.title desc,fields.publishDate", "article"),
            "article.publish_date NULLS LAST"
        );
        assert_eq!(format_order("sys.id;select 1", "article"), "");
    }

    #[test]
    fn test_content_type_must_be_identifier() {
        let query = parse_query("en", params(&[("content_type", "x(1)")]));
        assert_eq!(query.table_name, "");

        let query = parse_query("en", params(&[("content_type", "blog-post")]));
        assert_eq!(query.table_name, "blog_post");
    }

    #[test]
    fn test_filter_array() {
        let query = parse_query("en", params(&[("fields.title[match]", "foo")])).with_schema("content");
        assert_eq!(query.schema_name.as_deref(), Some("content"));
        assert_eq!(query.filter_array(), Some(vec!["title ILIKE '%foo%'".to_string()]));
    }
}
