//! Typed query language for the list endpoints.
//!
//! The raw `where`, `sort` and `select` parameters are JSON documents. They
//! are parsed into a small AST ([`Filter`], [`SortKey`], [`Projection`])
//! checked against the entity [`Schema`], and then evaluated against the
//! JSON form of stored documents. Nothing reaches the store unvalidated.
//!
//! Evaluation order is fixed: filter, sort, skip, limit, projection. In
//! count mode only the filter applies.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::Timestamp;
use crate::schema::{FieldKind, ID_FIELD, Schema};

/// Default cap on rows returned by `GET /tasks` when `limit` is absent.
pub const DEFAULT_TASK_LIMIT: usize = 100;

/// A JSON document in its wire form.
pub type Document = Map<String, Value>;

/// The query parameter an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParam {
    Where,
    Sort,
    Select,
    Skip,
    Limit,
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Where => "where",
            Self::Sort => "sort",
            Self::Select => "select",
            Self::Skip => "skip",
            Self::Limit => "limit",
        };
        f.write_str(name)
    }
}

/// A query parameter could not be parsed or failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid '{param}' parameter: {detail}")]
pub struct QueryError {
    pub param: QueryParam,
    /// What was wrong, suitable for returning to the caller.
    pub detail: String,
}

impl QueryError {
    fn new(param: QueryParam, detail: impl Into<String>) -> Self {
        Self {
            param,
            detail: detail.into(),
        }
    }
}

/// Raw query-string parameters recognized by list and retrieve endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    #[serde(rename = "where")]
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub select: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

// ---------------------------------------------------------------------------
// Filter AST
// ---------------------------------------------------------------------------

/// A single-field test.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

/// A boolean filter expression over document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every sub-filter must match. An empty list matches everything.
    All(Vec<Self>),
    /// At least one sub-filter must match.
    Any(Vec<Self>),
    Field {
        /// Canonical wire name of the field.
        field: &'static str,
        test: Comparison,
    },
}

impl Filter {
    /// Parses a `where` document against a schema.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first problem found:
    /// a non-object filter, an unknown field or operator, or a literal whose
    /// type does not fit the field.
    pub fn parse(value: &Value, schema: &Schema) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("filter must be a JSON object".to_string());
        };
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            match key.as_str() {
                "$and" => clauses.push(Self::All(parse_branches(key, value, schema)?)),
                "$or" => clauses.push(Self::Any(parse_branches(key, value, schema)?)),
                op if op.starts_with('$') => {
                    return Err(format!("unknown top-level operator '{op}'"));
                }
                name => {
                    let (field, kind) = schema
                        .field(name)
                        .ok_or_else(|| format!("unknown {} field '{name}'", schema.entity))?;
                    clauses.extend(parse_field(field, kind, value)?);
                }
            }
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::All(clauses)
        })
    }

    /// Tests a document against this filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Any(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Field { field, test } => test.matches(doc.get(*field)),
        }
    }
}

fn parse_branches(op: &str, value: &Value, schema: &Schema) -> Result<Vec<Filter>, String> {
    match value {
        Value::Array(items) if !items.is_empty() => {
            items.iter().map(|item| Filter::parse(item, schema)).collect()
        }
        _ => Err(format!("'{op}' expects a non-empty array of filters")),
    }
}

fn parse_field(
    field: &'static str,
    kind: FieldKind,
    value: &Value,
) -> Result<Vec<Filter>, String> {
    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().any(|k| k.starts_with('$')) => map,
        _ => {
            let literal = coerce_literal(field, kind, value)?;
            return Ok(vec![Filter::Field {
                field,
                test: Comparison::Eq(literal),
            }]);
        }
    };

    let mut tests = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let test = match op.as_str() {
            "$eq" => Comparison::Eq(coerce_literal(field, kind, operand)?),
            "$ne" => Comparison::Ne(coerce_literal(field, kind, operand)?),
            "$gt" => Comparison::Gt(coerce_literal(field, kind, operand)?),
            "$gte" => Comparison::Gte(coerce_literal(field, kind, operand)?),
            "$lt" => Comparison::Lt(coerce_literal(field, kind, operand)?),
            "$lte" => Comparison::Lte(coerce_literal(field, kind, operand)?),
            "$in" => Comparison::In(coerce_list(field, kind, op, operand)?),
            "$nin" => Comparison::Nin(coerce_list(field, kind, op, operand)?),
            "$exists" => match operand {
                Value::Bool(b) => Comparison::Exists(*b),
                _ => return Err(format!("'$exists' on '{field}' expects a boolean")),
            },
            other if other.starts_with('$') => {
                return Err(format!("unknown operator '{other}' on '{field}'"));
            }
            other => {
                return Err(format!(
                    "cannot mix operators and the plain key '{other}' on '{field}'"
                ));
            }
        };
        tests.push(Filter::Field { field, test });
    }
    Ok(tests)
}

fn coerce_list(
    field: &str,
    kind: FieldKind,
    op: &str,
    operand: &Value,
) -> Result<Vec<Value>, String> {
    let Value::Array(items) = operand else {
        return Err(format!("'{op}' on '{field}' expects an array"));
    };
    items
        .iter()
        .map(|item| coerce_literal(field, kind, item))
        .collect()
}

/// Checks a literal against the field kind, normalizing timestamps to their
/// canonical text so that comparisons against stored values are exact.
fn coerce_literal(field: &str, kind: FieldKind, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (kind, value) {
        (FieldKind::Id | FieldKind::Text, Value::String(_)) | (FieldKind::Bool, Value::Bool(_)) => {
            Ok(value.clone())
        }
        (FieldKind::Bool, Value::String(s)) if s == "true" || s == "false" => {
            Ok(Value::Bool(s == "true"))
        }
        (FieldKind::Timestamp, _) => Timestamp::from_json(value)
            .map(|ts| Value::String(ts.to_string()))
            .ok_or_else(|| format!("'{field}' expects a date, got {value}")),
        (FieldKind::IdList, Value::String(_)) => Ok(value.clone()),
        (FieldKind::IdList, Value::Array(items)) if items.iter().all(Value::is_string) => {
            Ok(value.clone())
        }
        (FieldKind::Bool, _) => Err(format!("'{field}' expects a boolean, got {value}")),
        _ => Err(format!("'{field}' expects a string, got {value}")),
    }
}

impl Comparison {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => equals(actual, expected),
            Self::Ne(expected) => !equals(actual, expected),
            Self::In(options) => options.iter().any(|o| equals(actual, o)),
            Self::Nin(options) => !options.iter().any(|o| equals(actual, o)),
            Self::Exists(wanted) => actual.is_some_and(|v| !v.is_null()) == *wanted,
            Self::Gt(bound) => ordered(actual, bound, Ordering::is_gt),
            Self::Gte(bound) => ordered(actual, bound, Ordering::is_ge),
            Self::Lt(bound) => ordered(actual, bound, Ordering::is_lt),
            Self::Lte(bound) => ordered(actual, bound, Ordering::is_le),
        }
    }
}

/// Equality with array-field semantics: an array matches a scalar it
/// contains, and matches an array it equals.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None | Some(Value::Null) => expected.is_null(),
        Some(Value::Array(items)) => {
            items.contains(expected) || matches!(expected, Value::Array(e) if e == items)
        }
        Some(value) => value == expected,
    }
}

/// Range comparison. Arrays match when any element satisfies the bound;
/// values of different JSON types never compare.
fn ordered(actual: Option<&Value>, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| same_type_cmp(item, bound).is_some_and(accept)),
        Some(value) => same_type_cmp(value, bound).is_some_and(accept),
        None => false,
    }
}

fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One key of a multi-key sort, applied in the order given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub direction: Direction,
}

/// Parses a `sort` document into ordered sort keys.
///
/// # Errors
///
/// Returns a description of the problem if the document is not an object,
/// names an unknown field, or uses a direction other than `1`, `-1`,
/// `"asc"` or `"desc"`.
pub fn parse_sort(value: &Value, schema: &Schema) -> Result<Vec<SortKey>, String> {
    let Value::Object(map) = value else {
        return Err("sort must be a JSON object".to_string());
    };
    map.iter()
        .map(|(name, dir)| {
            let (field, _) = schema
                .field(name)
                .ok_or_else(|| format!("unknown {} field '{name}'", schema.entity))?;
            let direction = match dir {
                Value::Number(n) if n.as_i64() == Some(1) => Direction::Ascending,
                Value::Number(n) if n.as_i64() == Some(-1) => Direction::Descending,
                Value::String(s) if s == "asc" || s == "ascending" => Direction::Ascending,
                Value::String(s) if s == "desc" || s == "descending" => Direction::Descending,
                other => return Err(format!("invalid sort direction for '{field}': {other}")),
            };
            Ok(SortKey { field, direction })
        })
        .collect()
}

/// Stable multi-key sort of wire documents.
pub fn sort_documents(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in keys {
            let ord = total_cmp(a.get(key.field), b.get(key.field));
            let ord = match key.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord.is_ne() {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Total order across JSON values: missing/null, numbers, strings, objects,
/// arrays, booleans.
fn total_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Array(x)), Some(Value::Array(y))) => x
            .iter()
            .zip(y)
            .map(|(p, q)| total_cmp(Some(p), Some(q)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Some(x), Some(y)) => same_type_cmp(x, y).unwrap_or_else(|| rank(a).cmp(&rank(b))),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Field projection applied to returned documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Keep only the listed fields, plus `_id` when `id` is true.
    Include {
        fields: Vec<&'static str>,
        id: bool,
    },
    /// Drop the listed fields.
    Exclude(Vec<&'static str>),
}

impl Projection {
    /// Parses a `select` document. Returns `Ok(None)` for an empty document.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the document is not an
    /// object, names an unknown field, uses a value other than `1`/`0`/
    /// `true`/`false`, or mixes inclusion with exclusion (excluding `_id`
    /// from an inclusion is the one allowed mix).
    pub fn parse(value: &Value, schema: &Schema) -> Result<Option<Self>, String> {
        let Value::Object(map) = value else {
            return Err("select must be a JSON object".to_string());
        };
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id = None;
        for (name, flag) in map {
            let (field, _) = schema
                .field(name)
                .ok_or_else(|| format!("unknown {} field '{name}'", schema.entity))?;
            let keep = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) if n.as_i64() == Some(1) => true,
                Value::Number(n) if n.as_i64() == Some(0) => false,
                other => return Err(format!("invalid projection flag for '{field}': {other}")),
            };
            if field == ID_FIELD {
                id = Some(keep);
            } else if keep {
                include.push(field);
            } else {
                exclude.push(field);
            }
        }

        match (include.is_empty(), exclude.is_empty(), id) {
            (false, false, _) | (true, false, Some(true)) => {
                Err("cannot mix inclusion and exclusion".to_string())
            }
            (false, true, _) | (true, true, Some(true)) => Ok(Some(Self::Include {
                fields: include,
                id: id.unwrap_or(true),
            })),
            (true, false, keep_id) => {
                if keep_id == Some(false) {
                    exclude.push(ID_FIELD);
                }
                Ok(Some(Self::Exclude(exclude)))
            }
            (true, true, Some(false)) => Ok(Some(Self::Exclude(vec![ID_FIELD]))),
            (true, true, None) => Ok(None),
        }
    }

    /// Applies the projection to a wire document.
    #[must_use]
    pub fn apply(&self, mut doc: Document) -> Document {
        match self {
            Self::Include { fields, id } => {
                doc.retain(|key, _| (*id && key == ID_FIELD) || fields.contains(&key.as_str()));
                doc
            }
            Self::Exclude(fields) => {
                doc.retain(|key, _| !fields.contains(&key.as_str()));
                doc
            }
        }
    }
}

/// Parses an optional `select` parameter, as accepted by the retrieve
/// endpoints.
///
/// # Errors
///
/// Returns [`QueryError`] if the parameter is not valid JSON or fails
/// [`Projection::parse`].
pub fn parse_select(raw: Option<&str>, schema: &Schema) -> Result<Option<Projection>, QueryError> {
    match raw {
        None => Ok(None),
        Some(text) => {
            let value = parse_json(QueryParam::Select, text)?;
            Projection::parse(&value, schema).map_err(|e| QueryError::new(QueryParam::Select, e))
        }
    }
}

// ---------------------------------------------------------------------------
// Complete list query
// ---------------------------------------------------------------------------

/// A fully validated list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub skip: usize,
    /// `None` means unlimited.
    pub limit: Option<usize>,
    /// Return the size of the filtered set instead of the rows.
    pub count: bool,
}

impl ListQuery {
    /// Builds a query from raw parameters.
    ///
    /// `default_limit` applies when `limit` is absent (tasks use
    /// [`DEFAULT_TASK_LIMIT`], users pass `None`).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] naming the first parameter that is not valid
    /// JSON, fails schema validation, or is not an acceptable integer.
    pub fn parse(
        params: &QueryParams,
        schema: &Schema,
        default_limit: Option<usize>,
    ) -> Result<Self, QueryError> {
        let filter = params
            .filter
            .as_deref()
            .map(|text| {
                let value = parse_json(QueryParam::Where, text)?;
                Filter::parse(&value, schema).map_err(|e| QueryError::new(QueryParam::Where, e))
            })
            .transpose()?;

        let sort = match params.sort.as_deref() {
            Some(text) => {
                let value = parse_json(QueryParam::Sort, text)?;
                parse_sort(&value, schema).map_err(|e| QueryError::new(QueryParam::Sort, e))?
            }
            None => Vec::new(),
        };

        let projection = parse_select(params.select.as_deref(), schema)?;

        let skip = match params.skip.as_deref() {
            Some(text) => text.trim().parse::<usize>().map_err(|_| {
                let detail = format!("expected a non-negative integer, got '{text}'");
                QueryError::new(QueryParam::Skip, detail)
            })?,
            None => 0,
        };

        let limit = match params.limit.as_deref() {
            Some(text) => match text.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(QueryError::new(
                        QueryParam::Limit,
                        format!("expected a positive integer, got '{text}'"),
                    ));
                }
            },
            None => default_limit,
        };

        Ok(Self {
            filter,
            sort,
            projection,
            skip,
            limit,
            count: params.count.as_deref() == Some("true"),
        })
    }

    /// Tests a document against the filter. No filter matches everything.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(doc))
    }

    /// Runs filter, sort, skip, limit and projection over documents in
    /// natural order.
    #[must_use]
    pub fn select_documents(&self, docs: impl IntoIterator<Item = Document>) -> Vec<Value> {
        let mut rows: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();
        sort_documents(&mut rows, &self.sort);
        rows.into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|doc| match &self.projection {
                Some(p) => Value::Object(p.apply(doc)),
                None => Value::Object(doc),
            })
            .collect()
    }

    /// Counts matching documents, ignoring sort, skip, limit and projection.
    #[must_use]
    pub fn count_documents<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> usize {
        docs.into_iter().filter(|d| self.matches(d)).count()
    }
}

fn parse_json(param: QueryParam, text: &str) -> Result<Value, QueryError> {
    serde_json::from_str(text)
        .map_err(|e| QueryError::new(param, format!("must be valid JSON ({e})")))
}
