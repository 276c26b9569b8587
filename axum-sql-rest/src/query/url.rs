//! URL query grammar.
//!
//! The query string drives the generated SQL:
//!
//! - `select=col1,col2,MAX(a),obj->field->>leaf`: projection
//! - `order=col.asc,col2.desc`: ordering
//! - `<col>=<op>.<val>`: where predicates, AND-combined
//! - `page=N`, `page_size=M`: pagination
//! - `debug`, `count`, `singular`, `mine`: flags by key presence
//!
//! Function calls in `select` are checked against a closed whitelist, and any
//! of the characters `[ ;'"]` in `select` or `order` rejects the request.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::QueryError;
use crate::database::Dialect;

/// Operator token → SQL fragment. `in` and `is` get special treatment in
/// [`UrlQuery::where_query`]; the rest bind one argument.
static OPERATORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("eq", " = "),
        ("ne", " <> "),
        ("gt", " > "),
        ("lt", " < "),
        ("gte", " >= "),
        ("lte", " <= "),
        ("like", " like "),
        ("ilike", " ilike "),
        ("is", " is "),
        ("in", " in "),
        ("cs", " @> "),
        ("cd", " <@ "),
    ])
});

/// Functions allowed to appear in a `select` projection.
static ALLOWED_FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        // math
        "abs", "avg", "ceil", "div", "exp", "floor", "gcd", "lcm", "ln", "log", "mod", "power",
        "round", "sign", "sqrt", "trunc", "max", "min", "sum",
        // date
        "date", "date_format", "date_part", "date_trunc", "extract", "hour", "minute", "month",
        "second", "utctimestamp", "weekofday", "year",
        // string
        "bit_length", "chr", "char_length", "left", "length", "ord", "trim",
    ])
});

/// Keys that are part of the grammar and never become predicates.
const RESERVED_WORDS: [&str; 3] = ["select", "order", "count"];

static INVALID_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new("[ ;'\"]").unwrap());
static FUNCTION_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.*?)\(").unwrap());

/// Decoded query parameters plus the dialect the SQL targets.
///
/// Key order is preserved, and repeated keys each contribute their own
/// predicate, so `Id=gt.1&Id=lt.100` expresses a range.
pub struct UrlQuery {
    dialect: Dialect,
    pairs: Vec<(String, String)>,
    has_id: bool,
}

impl UrlQuery {
    pub fn new(dialect: Dialect, pairs: Vec<(String, String)>) -> Self {
        Self {
            dialect,
            pairs,
            has_id: false,
        }
    }

    /// Replaces every value of `key` with a single one.
    pub fn set(&mut self, key: &str, value: &str) {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.to_string()));
    }

    /// Injects the `/<table>/<id>` address as a primary-key equality
    /// predicate and flips the query into singular mode.
    pub fn set_primary_key(&mut self, primary_key: &str, id: &str) {
        self.set(primary_key, &format!("eq.{id}"));
        self.set("singular", "");
        self.has_id = true;
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Returns the SQL projection, `"*"` when no `select` is given.
    pub fn select_query(&self) -> Result<String, QueryError> {
        let Some(select) = self.first("select") else {
            return Ok("*".to_string());
        };
        if INVALID_IDENTIFIER.is_match(select) {
            return Err(QueryError::InvalidCharacter("select"));
        }

        let columns = select
            .split(',')
            .map(|column| self.build_column(column, true))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns.join(","))
    }

    /// Returns the ORDER BY body (`a.desc,b.asc` → `a desc,b asc`), empty
    /// when no `order` is given.
    pub fn order_query(&self) -> Result<String, QueryError> {
        let Some(order) = self.first("order") else {
            return Ok(String::new());
        };
        if INVALID_IDENTIFIER.is_match(order) {
            return Err(QueryError::InvalidCharacter("order"));
        }
        Ok(order.replace('.', " "))
    }

    /// Builds the WHERE body (without the leading `WHERE`) and its bound
    /// arguments, starting placeholder numbering at `index`.
    ///
    /// Predicates that do not parse (an unknown operator, an `is.` value
    /// other than true/false/null, a disallowed function in the column) are
    /// skipped with a warning rather than failing the request.
    pub fn where_query(&self, mut index: u32) -> (u32, String, Vec<Value>) {
        let mut fragments: Vec<String> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        for (key, value) in &self.pairs {
            if RESERVED_WORDS.contains(&key.as_str()) {
                continue;
            }
            let Some((op, val)) = value.split_once('.') else {
                // flags and pagination keys land here and are not predicates
                continue;
            };
            let Some(operator) = OPERATORS.get(op) else {
                warn!("unsupported op: {op}");
                continue;
            };
            let column = match self.build_column(key, false) {
                Ok(column) => column,
                Err(err) => {
                    warn!("skip predicate on column {key}: {err}");
                    continue;
                }
            };

            match op {
                "in" => {
                    let items: Vec<&str> = val
                        .trim_matches(')')
                        .trim_matches('(')
                        .split(',')
                        .collect();
                    let placeholders = vec!["?"; items.len()].join(",");
                    for item in items {
                        args.push(Value::String(item.to_string()));
                        index += 1;
                    }
                    fragments.push(format!("{column} IN ({placeholders})"));
                }
                "is" => {
                    if ["true", "false", "null"]
                        .iter()
                        .any(|lit| val.eq_ignore_ascii_case(lit))
                    {
                        fragments.push(format!("{column}{operator}{val}"));
                    } else {
                        warn!("unsupported is value: {val}");
                    }
                }
                _ => {
                    let bound = if op == "like" || op == "ilike" {
                        // glob-style wildcards become SQL wildcards
                        val.replace('*', "%")
                    } else {
                        val.to_string()
                    };
                    fragments.push(format!("{column}{operator}?"));
                    args.push(Value::String(bound));
                    index += 1;
                }
            }
        }

        (index, fragments.join(" AND "), args)
    }

    /// Returns `(page, page_size)`, defaulting to (1, 100).
    pub fn page(&self) -> (u64, u64) {
        let page = self
            .first("page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        let page_size = self
            .first("page_size")
            .and_then(|p| p.parse().ok())
            .unwrap_or(100);
        (page, page_size)
    }

    pub fn is_debug(&self) -> bool {
        self.has("debug")
    }

    pub fn is_count(&self) -> bool {
        self.has("count")
    }

    pub fn is_singular(&self) -> bool {
        self.has("singular")
    }

    pub fn is_mine(&self) -> bool {
        self.has("mine")
    }

    /// Whether the router injected a primary-key equality predicate.
    pub fn has_id(&self) -> bool {
        self.has_id
    }

    /// Resolves a column expression: JSON paths go through the dialect,
    /// function calls are validated against the whitelist, and in select
    /// position the expression is aliased to its JSON leaf or function name.
    fn build_column(&self, input: &str, with_alias: bool) -> Result<String, QueryError> {
        let mut column = input.to_string();
        let mut alias = String::new();

        if input.contains("->") {
            let (expr, leaf) = self.dialect.json_path(input);
            column = expr;
            alias = leaf;
        }

        if column.contains('(') {
            for captures in FUNCTION_NAME.captures_iter(&column) {
                let name = captures[1].to_lowercase();
                if !ALLOWED_FUNCTIONS.contains(name.as_str()) {
                    return Err(QueryError::FunctionNotAllowed(name));
                }
                if alias.is_empty() {
                    alias = name;
                }
            }
        }

        if with_alias && !alias.is_empty() {
            column.push_str(" AS ");
            column.push_str(&alias);
        }
        Ok(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(dialect: Dialect, pairs: &[(&str, &str)]) -> UrlQuery {
        UrlQuery::new(
            dialect,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn sqlite(pairs: &[(&str, &str)]) -> UrlQuery {
        query(Dialect::Sqlite, pairs)
    }

    #[test]
    fn test_select_query_default() {
        assert_eq!(sqlite(&[]).select_query().unwrap(), "*");
    }

    #[test]
    fn test_select_query_columns() {
        assert_eq!(sqlite(&[("select", "a,b")]).select_query().unwrap(), "a,b");
    }

    #[test]
    fn test_select_query_functions() {
        assert_eq!(
            sqlite(&[("select", "MAX(a)")]).select_query().unwrap(),
            "MAX(a) AS max"
        );
        assert_eq!(
            sqlite(&[("select", "a,min(b)")]).select_query().unwrap(),
            "a,min(b) AS min"
        );
    }

    #[test]
    fn test_select_query_rejects_unlisted_function() {
        let err = sqlite(&[("select", "load_extension(a)")])
            .select_query()
            .unwrap_err();
        assert!(matches!(err, QueryError::FunctionNotAllowed(_)));
        // substring of an allowed name is still rejected
        assert!(sqlite(&[("select", "maxx(a)")]).select_query().is_err());
    }

    #[test]
    fn test_select_query_rejects_invalid_characters() {
        for select in ["a;b", "a'b", "a\"b", "a b"] {
            assert!(
                matches!(
                    sqlite(&[("select", select)]).select_query(),
                    Err(QueryError::InvalidCharacter("select"))
                ),
                "{select}"
            );
        }
    }

    #[test]
    fn test_order_query() {
        assert_eq!(sqlite(&[]).order_query().unwrap(), "");
        assert_eq!(
            sqlite(&[("order", "a.desc,b.asc")]).order_query().unwrap(),
            "a desc,b asc"
        );
        assert!(matches!(
            sqlite(&[("order", "a desc")]).order_query(),
            Err(QueryError::InvalidCharacter("order"))
        ));
    }

    #[test]
    fn test_where_query_empty() {
        let (index, fragment, args) = sqlite(&[]).where_query(1);
        assert_eq!(index, 1);
        assert_eq!(fragment, "");
        assert!(args.is_empty());
    }

    #[test]
    fn test_where_query_skips_non_predicates() {
        let q = sqlite(&[
            ("select", "*"),
            ("count", ""),
            ("debug", ""),
            ("page", "2"),
            ("noop", "noop.1"),
        ]);
        let (index, fragment, args) = q.where_query(1);
        assert_eq!(index, 1);
        assert_eq!(fragment, "");
        assert!(args.is_empty());
    }

    #[test]
    fn test_where_query_operators() {
        for (op, operator) in [
            ("eq", " = "),
            ("ne", " <> "),
            ("gt", " > "),
            ("lt", " < "),
            ("gte", " >= "),
            ("lte", " <= "),
            ("cs", " @> "),
            ("cd", " <@ "),
        ] {
            let (index, fragment, args) = sqlite(&[("a", &format!("{op}.1"))]).where_query(1);
            assert_eq!(index, 2, "{op}");
            assert_eq!(fragment, format!("a{operator}?"));
            assert_eq!(args, vec![Value::String("1".to_string())]);
        }
    }

    #[test]
    fn test_where_query_in_list() {
        let (index, fragment, args) = sqlite(&[("a", "in.(1,2)")]).where_query(1);
        assert_eq!(index, 3);
        assert_eq!(fragment, "a IN (?,?)");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_where_query_is_literal() {
        let (index, fragment, args) = sqlite(&[("a", "is.null")]).where_query(1);
        assert_eq!(index, 1);
        assert_eq!(fragment, "a is null");
        assert!(args.is_empty());

        let (_, fragment, _) = sqlite(&[("a", "is.TRUE")]).where_query(1);
        assert_eq!(fragment, "a is TRUE");

        // anything else is skipped
        let (_, fragment, _) = sqlite(&[("a", "is.banana")]).where_query(1);
        assert_eq!(fragment, "");
    }

    #[test]
    fn test_where_query_like_translates_wildcards() {
        let (_, fragment, args) = sqlite(&[("name", "like.a*b")]).where_query(1);
        assert_eq!(fragment, "name like ?");
        assert_eq!(args, vec![Value::String("a%b".to_string())]);

        // other operators keep the value verbatim
        let (_, _, args) = sqlite(&[("name", "eq.a*b")]).where_query(1);
        assert_eq!(args, vec![Value::String("a*b".to_string())]);
    }

    #[test]
    fn test_where_query_value_may_contain_dots() {
        let (_, fragment, args) = sqlite(&[("price", "gt.1.5")]).where_query(1);
        assert_eq!(fragment, "price > ?");
        assert_eq!(args, vec![Value::String("1.5".to_string())]);
    }

    #[test]
    fn test_where_query_combines_with_and() {
        let (index, fragment, args) = sqlite(&[("a", "eq.1"), ("b", "eq.2")]).where_query(1);
        assert_eq!(index, 3);
        assert_eq!(fragment, "a = ? AND b = ?");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_where_query_repeated_key_is_a_range() {
        let (index, fragment, args) = sqlite(&[("Id", "gt.1"), ("Id", "lt.100")]).where_query(1);
        assert_eq!(index, 3);
        assert_eq!(fragment, "Id > ? AND Id < ?");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_where_query_placeholders_match_args() {
        let q = sqlite(&[("a", "eq.1"), ("b", "in.(1,2,3)"), ("c", "is.null")]);
        let (index, fragment, args) = q.where_query(1);
        let placeholders = fragment.matches('?').count();
        assert_eq!(placeholders, args.len());
        assert_eq!(index as usize, args.len() + 1);
    }

    #[test]
    fn test_json_path_queries() {
        for (dialect, select_query, where_query) in [
            (
                Dialect::Postgres,
                "object->1->'field1'->'field2'->>2 AS field2",
                "object->1->'field1'->'field2'->>2 = ?",
            ),
            (
                Dialect::MySql,
                "object->'$[1].field1.field2[2]' AS field2",
                "object->'$[1].field1.field2[2]' = ?",
            ),
            (
                Dialect::Sqlite,
                "object->1->'field1'->'field2'->>2 AS field2",
                "object->1->'field1'->'field2'->>2 = ?",
            ),
        ] {
            let path = "object->1->field1->field2->>2";
            let q = query(dialect, &[("select", path)]);
            assert_eq!(q.select_query().unwrap(), select_query);

            let q = query(dialect, &[(path, "eq.1")]);
            let (index, fragment, args) = q.where_query(1);
            assert_eq!(index, 2);
            assert_eq!(fragment, where_query);
            assert_eq!(args, vec![Value::String("1".to_string())]);
        }
    }

    #[test]
    fn test_page() {
        assert_eq!(sqlite(&[]).page(), (1, 100));
        assert_eq!(sqlite(&[("page", "2"), ("page_size", "20")]).page(), (2, 20));
        assert_eq!(sqlite(&[("page", "x")]).page(), (1, 100));
    }

    #[test]
    fn test_flags() {
        let q = sqlite(&[]);
        assert!(!q.is_debug());
        assert!(!q.is_count());
        assert!(!q.is_singular());
        assert!(!q.is_mine());
        assert!(!q.has_id());

        let q = sqlite(&[("debug", ""), ("count", "1"), ("singular", ""), ("mine", "")]);
        assert!(q.is_debug());
        assert!(q.is_count());
        assert!(q.is_singular());
        assert!(q.is_mine());
    }

    #[test]
    fn test_set_primary_key() {
        let mut q = sqlite(&[]);
        q.set_primary_key("Id", "100");
        assert!(q.has_id());
        assert!(q.is_singular());
        let (_, fragment, args) = q.where_query(1);
        assert_eq!(fragment, "Id = ?");
        assert_eq!(args, vec![Value::String("100".to_string())]);
    }

    #[test]
    fn test_set_replaces_existing_values() {
        let mut q = sqlite(&[("user_id", "eq.999")]);
        q.set("user_id", "eq.1");
        let (_, fragment, args) = q.where_query(1);
        assert_eq!(fragment, "user_id = ?");
        assert_eq!(args, vec![Value::String("1".to_string())]);
    }
}
