//! Search requests against the document index.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::ValidationError;

use super::filter::Filter;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending, also used for anything that is not `ASC`.
    #[default]
    Desc,
}

impl SortDirection {
    /// Maps `"ASC"` (any case) to ascending and everything else to descending.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    /// Returns the native order keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort on.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// Aggregation used for a facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    /// Bucket by distinct value.
    #[default]
    Terms,
    /// Bucket by calendar day.
    DateHistogram,
}

impl AggregationKind {
    /// `date_histogram`/`date-histogram` (any case) select the histogram;
    /// anything else, including `default` and an absent value, selects terms.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v)
                if v.eq_ignore_ascii_case("date_histogram")
                    || v.eq_ignore_ascii_case("date-histogram") =>
            {
                AggregationKind::DateHistogram
            }
            _ => AggregationKind::Terms,
        }
    }
}

/// A facet requested for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetRequest {
    /// Field to aggregate; also the facet name in the response.
    pub field: String,
    /// Aggregation kind.
    pub kind: AggregationKind,
}

/// A fully specified, stateless search request.
///
/// Every field is optional; an empty request matches every document and
/// returns the first page of the default size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Free-text query string.
    pub query: Option<String>,
    /// Fields the free-text query is matched against.
    pub query_fields: Vec<String>,
    /// Filter map. `Some` with no entries is invalid.
    pub filters: Option<Filter>,
    /// Fields that must be present.
    pub exists: Vec<String>,
    /// Fields that must be absent.
    pub not_exists: Vec<String>,
    /// Field to nested path; the field must be present inside the path.
    pub nested_exists: BTreeMap<String, String>,
    /// Field to nested path; the field must be absent inside the path.
    pub nested_not_exists: BTreeMap<String, String>,
    /// Facets, in response order.
    pub facets: Vec<FacetRequest>,
    /// Sort keys, in priority order.
    pub sort: Vec<SortSpec>,
    /// Field to boost weight applied to every clause on that field.
    pub soft_constraints: BTreeMap<String, i64>,
    /// Field to value matched with typo tolerance.
    pub fuzzy: BTreeMap<String, String>,
    /// Stored fields to return; empty returns whole documents.
    pub fields: Vec<String>,
    /// Number of hits to skip.
    pub offset: Option<i64>,
    /// Page size.
    pub limit: Option<i64>,
}

impl SearchRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the free-text query and its target fields.
    pub fn with_query(mut self, query: impl Into<String>, fields: &[&str]) -> Self {
        self.query = Some(query.into());
        self.query_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Sets the filter map.
    pub fn with_filters(mut self, filters: Filter) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Adds a facet. A field already faceted keeps one entry with the
    /// latest kind.
    pub fn with_facet(mut self, field: impl Into<String>, kind: AggregationKind) -> Self {
        add_facet(
            &mut self.facets,
            FacetRequest {
                field: field.into(),
                kind,
            },
        );
        self
    }

    /// Adds a sort key.
    pub fn with_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Adds a boost weight for a field.
    pub fn with_boost(mut self, field: impl Into<String>, weight: i64) -> Self {
        self.soft_constraints.insert(field.into(), weight);
        self
    }

    /// Sets the offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks pagination bounds and filter presence.
    pub fn validate(&self, max_limit: u64) -> Result<(), ValidationError> {
        if let Some(limit) = self.limit
            && (limit <= 0 || limit as u64 > max_limit)
        {
            return Err(ValidationError::InvalidLimit {
                limit,
                max: max_limit,
            });
        }
        if let Some(offset) = self.offset
            && offset < 0
        {
            return Err(ValidationError::InvalidOffset { offset });
        }
        if let Some(filters) = &self.filters
            && filters.is_empty()
        {
            return Err(ValidationError::EmptyFilter);
        }
        for (i, facet) in self.facets.iter().enumerate() {
            if self.facets[..i].iter().any(|f| f.field == facet.field) {
                return Err(ValidationError::DuplicateField {
                    field: facet.field.clone(),
                });
            }
        }
        if let Some(query) = &self.query
            && query.trim().is_empty()
        {
            return Err(ValidationError::InvalidRequest {
                field: "query".to_string(),
                message: "must not be blank".to_string(),
            });
        }
        Ok(())
    }

    /// Parses the loosely typed request envelope.
    ///
    /// Recognized keys: `query`, `queryFields`, `filters`, `exists`,
    /// `not_exists`, `nestedExists`, `nestedNotExists`, `facets`, `sort_by`,
    /// `softConstraints`, `fuzzy`, `fields`, `offset`, `limit`. Unknown keys
    /// are ignored.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let map = value
            .as_object()
            .ok_or_else(|| invalid("request", "expected a map"))?;

        let mut request = SearchRequest::new();
        if let Some(query) = map.get("query") {
            request.query = Some(
                query
                    .as_str()
                    .ok_or_else(|| invalid("query", "expected a string"))?
                    .to_string(),
            );
        }
        request.query_fields = string_list(map, "queryFields")?;
        if let Some(filters) = map.get("filters") {
            request.filters = Some(Filter::from_json(filters)?);
        }
        request.exists = string_list(map, "exists")?;
        request.not_exists = string_list(map, "not_exists")?;
        request.nested_exists = string_map(map, "nestedExists")?;
        request.nested_not_exists = string_map(map, "nestedNotExists")?;
        request.facets = facets(map)?;
        request.sort = sort(map)?;
        if let Some(constraints) = map.get("softConstraints") {
            let constraints = constraints
                .as_object()
                .ok_or_else(|| invalid("softConstraints", "expected a map"))?;
            for (field, weight) in constraints {
                let weight = weight
                    .as_i64()
                    .ok_or_else(|| invalid("softConstraints", "weights must be integers"))?;
                request.soft_constraints.insert(field.clone(), weight);
            }
        }
        request.fuzzy = string_map(map, "fuzzy")?;
        request.fields = string_list(map, "fields")?;
        request.offset = integer(map, "offset")?;
        request.limit = integer(map, "limit")?;
        Ok(request)
    }
}

fn invalid(field: &str, message: &str) -> ValidationError {
    ValidationError::InvalidRequest {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn string_list(map: &Map<String, Value>, key: &str) -> Result<Vec<String>, ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(key, "expected a list of strings"))
            })
            .collect(),
        Some(_) => Err(invalid(key, "expected a list of strings")),
    }
}

fn string_map(
    map: &Map<String, Value>,
    key: &str,
) -> Result<BTreeMap<String, String>, ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.clone(), s.to_string()))
                    .ok_or_else(|| invalid(key, "expected a map of strings"))
            })
            .collect(),
        Some(_) => Err(invalid(key, "expected a map of strings")),
    }
}

fn integer(map: &Map<String, Value>, key: &str) -> Result<Option<i64>, ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(key, "expected an integer")),
    }
}

fn add_facet(facets: &mut Vec<FacetRequest>, facet: FacetRequest) {
    match facets.iter_mut().find(|f| f.field == facet.field) {
        Some(existing) => existing.kind = facet.kind,
        None => facets.push(facet),
    }
}

/// Accepts either `[{"field": "kind"}, ...]` or `{"field": "kind"}`.
fn facets(map: &Map<String, Value>) -> Result<Vec<FacetRequest>, ValidationError> {
    let mut facets = Vec::new();
    let mut push_all = |entries: &Map<String, Value>| -> Result<(), ValidationError> {
        for (field, kind) in entries {
            let kind = match kind {
                Value::Null => None,
                Value::String(s) => Some(s.as_str()),
                _ => return Err(invalid("facets", "aggregation kind must be a string")),
            };
            add_facet(
                &mut facets,
                FacetRequest {
                    field: field.clone(),
                    kind: AggregationKind::parse(kind),
                },
            );
        }
        Ok(())
    };

    match map.get("facets") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => push_all(entries)?,
        Some(Value::Array(items)) => {
            for item in items {
                let entries = item
                    .as_object()
                    .ok_or_else(|| invalid("facets", "expected a list of maps"))?;
                push_all(entries)?;
            }
        }
        Some(_) => return Err(invalid("facets", "expected a map or a list of maps")),
    }
    Ok(facets)
}

fn sort(map: &Map<String, Value>) -> Result<Vec<SortSpec>, ValidationError> {
    match map.get("sort_by") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(entries)) => Ok(entries
            .iter()
            .map(|(field, direction)| SortSpec {
                field: field.clone(),
                direction: SortDirection::parse(direction.as_str()),
            })
            .collect()),
        Some(_) => Err(invalid("sort_by", "expected a map of field to direction")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sort_direction_defaults_to_desc() {
        assert_eq!(SortDirection::parse(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(Some("asc")), SortDirection::Asc);
        assert_eq!(SortDirection::parse(Some("ascending")), SortDirection::Desc);
        assert_eq!(SortDirection::parse(Some("DESC")), SortDirection::Desc);
        assert_eq!(SortDirection::parse(None), SortDirection::Desc);
    }

    #[test]
    fn test_aggregation_kind() {
        assert_eq!(
            AggregationKind::parse(Some("DATE_HISTOGRAM")),
            AggregationKind::DateHistogram
        );
        assert_eq!(AggregationKind::parse(Some("default")), AggregationKind::Terms);
        assert_eq!(AggregationKind::parse(None), AggregationKind::Terms);
    }

    #[test]
    fn test_limit_bounds() {
        assert!(SearchRequest::new().with_limit(0).validate(100).is_err());
        assert!(SearchRequest::new().with_limit(-3).validate(100).is_err());
        assert!(SearchRequest::new().with_limit(101).validate(100).is_err());
        assert!(SearchRequest::new().with_limit(100).validate(100).is_ok());
    }

    #[test]
    fn test_offset_zero_is_valid_and_distinct() {
        let explicit = SearchRequest::new().with_offset(0);
        assert!(explicit.validate(100).is_ok());
        assert_eq!(explicit.offset, Some(0));
        assert_eq!(SearchRequest::new().offset, None);
        assert!(SearchRequest::new().with_offset(-1).validate(100).is_err());
    }

    #[test]
    fn test_empty_filter_distinct_from_absent() {
        let absent = SearchRequest::from_json(&json!({})).unwrap();
        assert!(absent.validate(100).is_ok());

        let empty = SearchRequest::from_json(&json!({"filters": {}})).unwrap();
        assert_eq!(empty.validate(100), Err(ValidationError::EmptyFilter));
    }

    #[test]
    fn test_from_json_envelope() {
        let request = SearchRequest::from_json(&json!({
            "query": "ann",
            "queryFields": ["name"],
            "filters": {"status": "active"},
            "exists": ["email"],
            "nestedExists": {"certs.level": "certs"},
            "facets": [{"status": null, "createdDate": "date_histogram"}],
            "sort_by": {"name": "asc"},
            "softConstraints": {"status": 2},
            "fields": ["id", "name"],
            "offset": 0,
            "limit": 20
        }))
        .unwrap();

        assert_eq!(request.query.as_deref(), Some("ann"));
        assert_eq!(request.query_fields, vec!["name"]);
        assert_eq!(request.filters.as_ref().map(|f| f.entries().len()), Some(1));
        assert_eq!(request.nested_exists.get("certs.level").map(String::as_str), Some("certs"));
        assert_eq!(request.facets.len(), 2);
        assert_eq!(request.sort[0].direction, SortDirection::Asc);
        assert_eq!(request.soft_constraints.get("status"), Some(&2));
        assert_eq!(request.offset, Some(0));
        assert_eq!(request.limit, Some(20));
    }

    #[test]
    fn test_repeated_facet_field_kept_once() {
        let built = SearchRequest::new()
            .with_facet("createdDate", AggregationKind::Terms)
            .with_facet("createdDate", AggregationKind::DateHistogram);
        assert_eq!(built.facets.len(), 1);
        assert_eq!(built.facets[0].kind, AggregationKind::DateHistogram);

        let parsed = SearchRequest::from_json(&json!({
            "facets": [{"status": null}, {"status": "terms", "city": null}]
        }))
        .unwrap();
        let fields: Vec<&str> = parsed.facets.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "city"]);
    }

    #[test]
    fn test_duplicate_facet_rejected_by_validate() {
        let mut request = SearchRequest::new().with_facet("status", AggregationKind::Terms);
        request.facets.push(FacetRequest {
            field: "status".to_string(),
            kind: AggregationKind::Terms,
        });
        assert_eq!(
            request.validate(100),
            Err(ValidationError::DuplicateField {
                field: "status".to_string()
            })
        );
    }

    #[test]
    fn test_from_json_rejects_wrong_shapes() {
        assert!(SearchRequest::from_json(&json!({"limit": "ten"})).is_err());
        assert!(SearchRequest::from_json(&json!({"exists": "email"})).is_err());
        assert!(SearchRequest::from_json(&json!({"filters": []})).is_err());
    }
}
