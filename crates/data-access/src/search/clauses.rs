//! Leaf clause builders.
//!
//! Every builder targets an explicit field name; callers decide whether that
//! is the analyzed field or its raw sub-field.

use serde_json::{Map, Value, json};

use crate::types::{FilterValue, LexicalOp, OperatorSet, nested_path};

/// Characters with a meaning in the Lucene regular-expression syntax.
const REGEXP_RESERVED: &[char] = &[
    '.', '?', '+', '*', '|', '{', '}', '[', ']', '(', ')', '"', '\\', '#', '@', '&', '<', '>',
    '~',
];

/// Lower-cases strings; other scalars pass through.
pub fn fold_case(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_lowercase()),
        other => other.clone(),
    }
}

/// Escapes `text` for use inside a `regexp` clause.
pub fn escape_regexp(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if REGEXP_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn with_boost(mut params: Map<String, Value>, boost: Option<i64>) -> Value {
    if let Some(weight) = boost {
        params.insert("boost".to_string(), json!(weight));
    }
    Value::Object(params)
}

fn single(kind: &str, field: &str, params: Value) -> Value {
    let mut inner = Map::new();
    inner.insert(field.to_string(), params);
    let mut outer = Map::new();
    outer.insert(kind.to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// `{"term": {field: {"value": v}}}`
pub fn term(field: &str, value: &Value, boost: Option<i64>) -> Value {
    let mut params = Map::new();
    params.insert("value".to_string(), value.clone());
    single("term", field, with_boost(params, boost))
}

/// `{"terms": {field: [v, ...]}}`
pub fn terms(field: &str, values: &[Value], boost: Option<i64>) -> Value {
    let mut params = Map::new();
    params.insert(field.to_string(), Value::Array(values.to_vec()));
    json!({ "terms": with_boost(params, boost) })
}

/// One `range` clause holding every bound of `ops`, or `None` when `ops`
/// carries no range operator.
pub fn range(field: &str, ops: &OperatorSet, boost: Option<i64>) -> Option<Value> {
    if !ops.has_range() {
        return None;
    }
    let mut params = Map::new();
    for (op, bound) in ops.range_bounds() {
        params.insert(op.es_key().to_string(), bound.clone());
    }
    Some(single("range", field, with_boost(params, boost)))
}

/// `prefix` for `startsWith`; a suffix-anchored `regexp` for `endsWith`.
pub fn lexical(field: &str, op: LexicalOp, text: &str, boost: Option<i64>) -> Value {
    let text = text.to_lowercase();
    let mut params = Map::new();
    match op {
        LexicalOp::StartsWith => {
            params.insert("value".to_string(), Value::String(text));
            single("prefix", field, with_boost(params, boost))
        }
        LexicalOp::EndsWith => {
            params.insert(
                "value".to_string(),
                Value::String(format!(".*{}", escape_regexp(&text))),
            );
            single("regexp", field, with_boost(params, boost))
        }
    }
}

/// `{"exists": {"field": f}}`
pub fn exists(field: &str, boost: Option<i64>) -> Value {
    let mut params = Map::new();
    params.insert("field".to_string(), Value::String(field.to_string()));
    let mut outer = Map::new();
    outer.insert("exists".to_string(), with_boost(params, boost));
    Value::Object(outer)
}

/// Wraps `query` in a nested scope that never contributes to the score.
pub fn nested(path: &str, query: Value) -> Value {
    json!({
        "nested": {
            "path": path,
            "query": query,
            "score_mode": "none"
        }
    })
}

/// A typo-tolerant `match` on an analyzed field.
pub fn fuzzy_match(field: &str, text: &str, boost: Option<i64>) -> Value {
    let mut params = Map::new();
    params.insert("query".to_string(), Value::String(text.to_string()));
    params.insert("fuzziness".to_string(), json!("AUTO"));
    params.insert("fuzzy_transpositions".to_string(), json!(true));
    single("match", field, with_boost(params, boost))
}

/// A bool `should` group satisfied by any one of `clauses`.
pub fn any_of(clauses: Vec<Value>) -> Value {
    json!({
        "bool": {
            "should": clauses,
            "minimum_should_match": 1
        }
    })
}

/// Combines several mandatory clauses into one, leaving a single clause as is.
pub fn all_of(mut clauses: Vec<Value>) -> Value {
    if clauses.len() == 1 {
        return clauses.remove(0);
    }
    json!({ "bool": { "must": clauses } })
}

/// Compiles one filter entry into its mandatory clauses.
///
/// Scalars and lists match the raw sub-field, string values lower-cased.
/// An operator set yields at most one range clause plus one clause per
/// lexical operator. A dotted field wraps every clause in a nested scope.
pub fn filter_entry(
    field: &str,
    value: &FilterValue,
    raw_suffix: &str,
    boost: Option<i64>,
) -> Vec<Value> {
    let raw = format!("{}{}", field, raw_suffix);
    let clauses = match value {
        FilterValue::Scalar(v) => vec![term(&raw, &fold_case(v), boost)],
        FilterValue::List(values) => {
            let folded: Vec<Value> = values.iter().map(fold_case).collect();
            vec![terms(&raw, &folded, boost)]
        }
        FilterValue::Ops(ops) => {
            let mut clauses: Vec<Value> = range(&raw, ops, boost).into_iter().collect();
            clauses.extend(
                ops.lexical_ops()
                    .iter()
                    .map(|(op, text)| lexical(&raw, *op, text, boost)),
            );
            clauses
        }
    };

    match nested_path(field) {
        Some(path) => clauses
            .into_iter()
            .map(|clause| nested(path, clause))
            .collect(),
        None => clauses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RangeOp;

    #[test]
    fn test_scalar_string_is_lowercased() {
        let clauses = filter_entry("status", &FilterValue::from("Active"), ".raw", None);
        assert_eq!(
            clauses,
            vec![json!({"term": {"status.raw": {"value": "active"}}})]
        );
    }

    #[test]
    fn test_scalar_number_unmodified_with_boost() {
        let clauses = filter_entry("age", &FilterValue::from(30), ".raw", Some(3));
        assert_eq!(
            clauses,
            vec![json!({"term": {"age.raw": {"value": 30, "boost": 3}}})]
        );
    }

    #[test]
    fn test_list_elementwise_lowercase() {
        let value = FilterValue::List(vec![json!("Pune"), json!(7)]);
        let clauses = filter_entry("city", &value, ".raw", None);
        assert_eq!(clauses, vec![json!({"terms": {"city.raw": ["pune", 7]}})]);
    }

    #[test]
    fn test_range_and_lexical_both_emitted() {
        let ops = OperatorSet::new()
            .range(RangeOp::Gt, "a")
            .lexical(LexicalOp::StartsWith, "An");
        let clauses = filter_entry("name", &FilterValue::Ops(ops), ".raw", None);
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0], json!({"range": {"name.raw": {"gt": "a"}}}));
        assert_eq!(clauses[1], json!({"prefix": {"name.raw": {"value": "an"}}}));
    }

    #[test]
    fn test_ends_with_is_anchored_regexp() {
        let clause = lexical("email.raw", LexicalOp::EndsWith, "@Example.com", None);
        assert_eq!(
            clause,
            json!({"regexp": {"email.raw": {"value": ".*\\@example\\.com"}}})
        );
    }

    #[test]
    fn test_nested_entry_disables_scoring() {
        let clauses = filter_entry("certs.level", &FilterValue::from("gold"), ".raw", None);
        assert_eq!(
            clauses,
            vec![json!({
                "nested": {
                    "path": "certs",
                    "query": {"term": {"certs.level.raw": {"value": "gold"}}},
                    "score_mode": "none"
                }
            })]
        );
    }

    #[test]
    fn test_exists_carries_boost() {
        assert_eq!(exists("email", None), json!({"exists": {"field": "email"}}));
        assert_eq!(
            exists("email", Some(4)),
            json!({"exists": {"field": "email", "boost": 4}})
        );
    }

    #[test]
    fn test_all_of_single_clause_unwrapped() {
        let clause = exists("email", None);
        assert_eq!(all_of(vec![clause.clone()]), clause);
        assert!(all_of(vec![clause.clone(), clause]).pointer("/bool/must").is_some());
    }
}
