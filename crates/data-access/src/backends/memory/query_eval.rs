//! Evaluation of the query DSL against JSON documents.
//!
//! Covers the subset produced by the search compiler: `bool`, `term`,
//! `terms`, `range`, `prefix`, `regexp`, `exists`, `nested`, `match`,
//! `multi_match` and `match_all`. Fields ending in the raw suffix read the
//! base field through a lower-casing keyword normalizer.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::DriverError;

use super::column_store::compare;

/// Matches documents against query clauses.
#[derive(Debug, Clone)]
pub(crate) struct Evaluator<'a> {
    raw_suffix: &'a str,
}

fn parse_error(message: impl Into<String>) -> DriverError {
    DriverError::rejected(format!("parsing_exception: {}", message.into()))
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(raw_suffix: &'a str) -> Self {
        Self { raw_suffix }
    }

    /// Returns the score of a matching document, `None` if it does not match.
    pub(crate) fn score(&self, query: &Value, doc: &Value) -> Result<Option<f64>, DriverError> {
        let (kind, params) = single_entry(query)?;
        match kind {
            "match_all" => Ok(Some(1.0)),
            "bool" => self.bool_query(params, doc),
            "term" => {
                let (field, spec) = field_entry(params)?;
                let expected = spec.get("value").unwrap_or(spec);
                let hit = self.values(doc, field).iter().any(|v| v == expected);
                Ok(hit.then(|| boost(spec)))
            }
            "terms" => {
                let obj = as_object(params)?;
                let (field, expected) = obj
                    .iter()
                    .find(|(k, _)| k.as_str() != "boost")
                    .ok_or_else(|| parse_error("[terms] requires a field"))?;
                let expected = expected
                    .as_array()
                    .ok_or_else(|| parse_error("[terms] values must be a list"))?;
                let hit = self
                    .values(doc, field)
                    .iter()
                    .any(|v| expected.contains(v));
                Ok(hit.then(|| boost(params)))
            }
            "range" => {
                let (field, spec) = field_entry(params)?;
                let bounds = as_object(spec)?;
                let hit = self.values(doc, field).iter().any(|v| in_range(v, bounds));
                Ok(hit.then(|| boost(spec)))
            }
            "prefix" => {
                let (field, spec) = field_entry(params)?;
                let prefix = text_param(spec)?;
                let hit = self
                    .values(doc, field)
                    .iter()
                    .any(|v| v.as_str().is_some_and(|s| s.starts_with(prefix)));
                Ok(hit.then(|| boost(spec)))
            }
            "regexp" => {
                let (field, spec) = field_entry(params)?;
                let pattern = lucene_regex(text_param(spec)?)?;
                let hit = self
                    .values(doc, field)
                    .iter()
                    .any(|v| v.as_str().is_some_and(|s| pattern.is_match(s)));
                Ok(hit.then(|| boost(spec)))
            }
            "exists" => {
                let field = params
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| parse_error("[exists] requires a field"))?;
                Ok((!self.values(doc, field).is_empty()).then(|| boost(params)))
            }
            "nested" => self.nested(params, doc),
            "match" => {
                let (field, spec) = field_entry(params)?;
                let (text, fuzziness, transpositions) = match spec {
                    Value::String(text) => (text.as_str(), None, true),
                    _ => (
                        text_param_named(spec, "query")?,
                        spec.get("fuzziness").cloned(),
                        spec.get("fuzzy_transpositions")
                            .and_then(Value::as_bool)
                            .unwrap_or(true),
                    ),
                };
                let matched = self.text_match(
                    &self.values(doc, field),
                    text,
                    fuzziness.as_ref(),
                    transpositions,
                );
                Ok((matched > 0).then(|| matched as f64 * boost(spec)))
            }
            "multi_match" => {
                let text = text_param_named(params, "query")?;
                let fields: Vec<&str> = params
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|f| f.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_else(|| vec!["*"]);
                let mut candidates = Vec::new();
                for field in fields {
                    if field == "*" {
                        collect_strings(doc, &mut candidates);
                    } else {
                        candidates.extend(self.values(doc, field));
                    }
                }
                let matched =
                    self.text_match(&candidates, text, params.get("fuzziness"), true);
                Ok((matched > 0).then(|| matched as f64 * boost(params)))
            }
            other => Err(parse_error(format!("unknown query [{}]", other))),
        }
    }

    fn bool_query(&self, params: &Value, doc: &Value) -> Result<Option<f64>, DriverError> {
        let clauses = |name: &str| clause_list(params, name);

        let mut score = 0.0;
        for clause in clauses("must") {
            match self.score(clause, doc)? {
                Some(s) => score += s,
                None => return Ok(None),
            }
        }
        for clause in clauses("filter") {
            if self.score(clause, doc)?.is_none() {
                return Ok(None);
            }
        }
        for clause in clauses("must_not") {
            if self.score(clause, doc)?.is_some() {
                return Ok(None);
            }
        }

        let should = clauses("should");
        let required = params
            .get("minimum_should_match")
            .and_then(Value::as_u64)
            .unwrap_or(
                if clauses("must").is_empty() && clauses("filter").is_empty() && !should.is_empty()
                {
                    1
                } else {
                    0
                },
            );
        let mut matched = 0;
        for clause in should {
            if let Some(s) = self.score(clause, doc)? {
                matched += 1;
                score += s;
            }
        }
        if matched < required {
            return Ok(None);
        }
        Ok(Some(score * boost(params)))
    }

    fn nested(&self, params: &Value, doc: &Value) -> Result<Option<f64>, DriverError> {
        let path = params
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_error("[nested] requires a path"))?;
        let query = params
            .get("query")
            .ok_or_else(|| parse_error("[nested] requires a query"))?;
        let score_none = params.get("score_mode").and_then(Value::as_str) == Some("none");

        let mut best: Option<f64> = None;
        for child in raw_values(doc, path) {
            if !child.is_object() {
                continue;
            }
            // Scope the inner query to this one child so every clause sees the
            // same sub-document.
            let scoped = wrap_at(path, child.clone());
            if let Some(s) = self.score(query, &scoped)? {
                best = Some(best.map_or(s, |b: f64| b.max(s)));
            }
        }
        Ok(best.map(|s| if score_none { 0.0 } else { s }))
    }

    /// Values of `field`, read through the keyword normalizer for raw fields.
    pub(crate) fn values(&self, doc: &Value, field: &str) -> Vec<Value> {
        match field.strip_suffix(self.raw_suffix).filter(|_| !self.raw_suffix.is_empty()) {
            Some(base) => raw_values(doc, base)
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other.clone(),
                })
                .collect(),
            None => raw_values(doc, field).into_iter().cloned().collect(),
        }
    }

    /// Values of `field` as stored, with any raw sub-field suffix dropped.
    pub(crate) fn source_values(&self, doc: &Value, field: &str) -> Vec<Value> {
        let base = match field.strip_suffix(self.raw_suffix) {
            Some(base) if !self.raw_suffix.is_empty() => base,
            _ => field,
        };
        raw_values(doc, base).into_iter().cloned().collect()
    }

    fn text_match(
        &self,
        candidates: &[Value],
        text: &str,
        fuzziness: Option<&Value>,
        transpositions: bool,
    ) -> usize {
        let doc_tokens: Vec<String> = candidates
            .iter()
            .filter_map(Value::as_str)
            .flat_map(tokenize)
            .collect();
        tokenize(text)
            .into_iter()
            .filter(|token| {
                let allowed = allowed_edits(token, fuzziness);
                doc_tokens
                    .iter()
                    .any(|candidate| edit_distance(token, candidate, transpositions) <= allowed)
            })
            .count()
    }
}

fn clause_list<'v>(params: &'v Value, name: &str) -> &'v [Value] {
    params
        .get(name)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn single_entry(query: &Value) -> Result<(&str, &Value), DriverError> {
    let obj = as_object(query)?;
    let mut entries = obj.iter();
    match (entries.next(), entries.next()) {
        (Some((kind, params)), None) => Ok((kind.as_str(), params)),
        _ => Err(parse_error("a query clause must hold exactly one query type")),
    }
}

fn field_entry(params: &Value) -> Result<(&str, &Value), DriverError> {
    let obj = as_object(params)?;
    obj.iter()
        .find(|(k, _)| k.as_str() != "boost")
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| parse_error("query requires a field"))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, DriverError> {
    value
        .as_object()
        .ok_or_else(|| parse_error("expected an object"))
}

fn text_param(spec: &Value) -> Result<&str, DriverError> {
    match spec {
        Value::String(s) => Ok(s),
        _ => text_param_named(spec, "value"),
    }
}

fn text_param_named<'v>(spec: &'v Value, name: &str) -> Result<&'v str, DriverError> {
    spec.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error(format!("missing [{}]", name)))
}

fn boost(spec: &Value) -> f64 {
    spec.get("boost").and_then(Value::as_f64).unwrap_or(1.0)
}

fn in_range(value: &Value, bounds: &Map<String, Value>) -> bool {
    bounds.iter().all(|(op, bound)| {
        let ordering = compare(value, bound);
        match op.as_str() {
            "gt" => ordering == Some(Ordering::Greater),
            "gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            "lt" => ordering == Some(Ordering::Less),
            "lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            _ => true,
        }
    })
}

/// Leaf values at a dotted path, flattening arrays on the way.
pub(crate) fn raw_values<'v>(doc: &'v Value, path: &str) -> Vec<&'v Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.get(segment) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            Value::Null => Vec::new(),
            other => vec![other],
        })
        .collect()
}

fn wrap_at(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}

fn collect_strings(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::String(_) => out.push(value.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `AUTO` allows no edit up to two characters, one up to five, two beyond.
fn allowed_edits(token: &str, fuzziness: Option<&Value>) -> usize {
    match fuzziness {
        Some(Value::String(s)) if s.eq_ignore_ascii_case("auto") => {
            match token.chars().count() {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            }
        }
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    }
}

/// Levenshtein distance, counting adjacent transpositions as one edit when
/// `transpositions` is set (optimal string alignment).
fn edit_distance(a: &str, b: &str, transpositions: bool) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        d[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            d[i][j] = (d[i - 1][j] + 1)
                .min(d[i][j - 1] + 1)
                .min(d[i - 1][j - 1] + cost);
            if transpositions && i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                d[i][j] = d[i][j].min(d[i - 2][j - 2] + 1);
            }
        }
    }
    d[a.len()][b.len()]
}

/// Compiles a Lucene regular expression, which always matches the whole value.
fn lucene_regex(pattern: &str) -> Result<Regex, DriverError> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                translated.push_str(&regex::escape(&escaped.to_string()));
            }
        } else {
            translated.push(c);
        }
    }
    Regex::new(&format!("^(?:{})$", translated))
        .map_err(|e| parse_error(format!("invalid regexp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matches(query: Value, doc: Value) -> bool {
        Evaluator::new(".raw").score(&query, &doc).unwrap().is_some()
    }

    #[test]
    fn test_raw_field_is_case_folded() {
        let doc = json!({"status": "Active"});
        assert!(matches(json!({"term": {"status.raw": {"value": "active"}}}), doc.clone()));
        assert!(!matches(json!({"term": {"status": {"value": "active"}}}), doc));
    }

    #[test]
    fn test_range_bounds() {
        let query = json!({"range": {"age.raw": {"gte": 18, "lt": 65}}});
        assert!(!matches(query.clone(), json!({"age": 17})));
        assert!(matches(query.clone(), json!({"age": 18})));
        assert!(matches(query.clone(), json!({"age": 64})));
        assert!(!matches(query, json!({"age": 65})));
    }

    #[test]
    fn test_nested_scopes_each_child() {
        let query = json!({"nested": {
            "path": "certs",
            "query": {"bool": {"must": [
                {"term": {"certs.level.raw": {"value": "gold"}}},
                {"term": {"certs.year.raw": {"value": 2024}}}
            ]}},
            "score_mode": "none"
        }});
        let split = json!({"certs": [{"level": "gold", "year": 2023}, {"level": "silver", "year": 2024}]});
        let together = json!({"certs": [{"level": "gold", "year": 2024}]});
        assert!(!matches(query.clone(), split));
        assert!(matches(query, together));
    }

    #[test]
    fn test_regexp_suffix() {
        let query = json!({"regexp": {"email.raw": {"value": ".*\\@example\\.com"}}});
        assert!(matches(query.clone(), json!({"email": "Ann@Example.com"})));
        assert!(!matches(query, json!({"email": "ann@example.org"})));
    }

    #[test]
    fn test_fuzzy_match_tolerates_typos() {
        let query = json!({"match": {"name": {"query": "jhon", "fuzziness": "AUTO", "fuzzy_transpositions": true}}});
        assert!(matches(query.clone(), json!({"name": "John Smith"})));
        assert!(!matches(query, json!({"name": "Mary"})));
    }

    #[test]
    fn test_should_group_minimum() {
        let query = json!({"bool": {"should": [
            {"term": {"city.raw": {"value": "pune"}}},
            {"term": {"city.raw": {"value": "goa"}}}
        ], "minimum_should_match": 1}});
        assert!(matches(query.clone(), json!({"city": "Goa"})));
        assert!(!matches(query, json!({"city": "Delhi"})));
    }

    #[test]
    fn test_must_not_exists() {
        let query = json!({"bool": {"must_not": [{"exists": {"field": "deletedAt"}}]}});
        assert!(matches(query.clone(), json!({"name": "a"})));
        assert!(matches(query.clone(), json!({"deletedAt": null})));
        assert!(!matches(query, json!({"deletedAt": "2024-01-01"})));
    }

    #[test]
    fn test_unknown_query_rejected() {
        let err = Evaluator::new(".raw")
            .score(&json!({"script": {}}), &json!({}))
            .unwrap_err();
        assert!(err.message.contains("unknown query [script]"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("jhon", "john", true), 1);
        assert_eq!(edit_distance("jhon", "john", false), 2);
        assert_eq!(edit_distance("kitten", "sitting", true), 3);
    }
}
