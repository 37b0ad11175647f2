// Cofre — Whitelisted partial updates
//
// Callers hand in an arbitrary JSON object. Only keys listed in a static
// `FieldSpec` table are honoured; the SET clause is built from the table's
// column names, never from caller-supplied keys. Unknown keys are ignored.

use std::fmt;

use rusqlite::types::Value;
use serde_json::{Map, Value as JsonValue};
use zeroize::Zeroizing;

use super::db::sql_time;
use super::models::parse_expiry;
use super::StoreError;

/// How a whitelisted field's JSON value is checked and converted.
#[derive(Clone, Copy)]
pub enum FieldKind {
    /// Text that may not be blank.
    RequiredText,
    /// Text where `""` clears the column.
    OptionalText,
    /// Text run through a normaliser; `required` decides whether `""` clears.
    Normalized {
        required: bool,
        normalize: fn(&str) -> Result<String, StoreError>,
    },
    /// Id of a row in `table` that must be active.
    Reference { table: &'static str },
    /// Array of strings (or a comma-separated string) stored as JSON.
    Tags,
    Flag,
    /// RFC 3339 timestamp or `YYYY-MM-DD`; `""` clears.
    Timestamp,
    /// Plaintext that the caller seals before it is written.
    Secret,
}

pub struct FieldSpec {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind }
    }
}

/// One validated column change.
pub enum Assignment {
    Set { column: &'static str, value: Value },
    Reference { column: &'static str, table: &'static str, id: i64 },
    Secret { column: &'static str, plaintext: Zeroizing<String> },
}

impl Assignment {
    pub fn column(&self) -> &'static str {
        match self {
            Assignment::Set { column, .. }
            | Assignment::Reference { column, .. }
            | Assignment::Secret { column, .. } => column,
        }
    }

    /// The plain column change, for tables with no reference or secret fields.
    pub fn into_set(self) -> Option<(&'static str, Value)> {
        match self {
            Assignment::Set { column, value } => Some((column, value)),
            _ => None,
        }
    }
}

/// Never prints a secret's plaintext.
impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Set { column, value } => f
                .debug_struct("Set")
                .field("column", column)
                .field("value", value)
                .finish(),
            Assignment::Reference { column, table, id } => f
                .debug_struct("Reference")
                .field("column", column)
                .field("table", table)
                .field("id", id)
                .finish(),
            Assignment::Secret { column, .. } => f
                .debug_struct("Secret")
                .field("column", column)
                .field("plaintext", &"[REDACTED]")
                .finish(),
        }
    }
}

/// The kind `name` has in `specs`; `None` when it is not whitelisted.
pub fn kind_of(specs: &[FieldSpec], name: &str) -> Option<FieldKind> {
    specs.iter().find(|spec| spec.name == name).map(|spec| spec.kind)
}

/// Validate the whitelisted keys of `fields` in table order.
pub fn collect(specs: &[FieldSpec], fields: &Map<String, JsonValue>) -> Result<Vec<Assignment>, StoreError> {
    let mut assignments = Vec::new();
    for spec in specs {
        if let Some(raw) = fields.get(spec.name) {
            assignments.push(convert(spec, raw)?);
        }
    }
    Ok(assignments)
}

fn convert(spec: &FieldSpec, raw: &JsonValue) -> Result<Assignment, StoreError> {
    let column = spec.column;
    let set = |value| Ok(Assignment::Set { column, value });

    match spec.kind {
        FieldKind::RequiredText => {
            let text = expect_str(spec, raw)?.trim();
            if text.is_empty() {
                return Err(blank(spec));
            }
            set(Value::Text(text.to_string()))
        }
        FieldKind::OptionalText => set(optional_text(expect_str(spec, raw)?)),
        FieldKind::Normalized { required, normalize } => {
            let text = expect_str(spec, raw)?.trim();
            match (text.is_empty(), required) {
                (true, true) => Err(blank(spec)),
                (true, false) => set(Value::Null),
                (false, _) => set(Value::Text(normalize(text)?)),
            }
        }
        FieldKind::Reference { table } => {
            let id = raw
                .as_i64()
                .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| wrong_type(spec, "an id"))?;
            Ok(Assignment::Reference { column, table, id })
        }
        FieldKind::Tags => {
            let tags = parse_tags(spec, raw)?;
            set(Value::Text(serde_json::to_string(&tags)?))
        }
        FieldKind::Flag => {
            let flag = raw.as_bool().ok_or_else(|| wrong_type(spec, "true or false"))?;
            set(Value::Integer(flag as i64))
        }
        FieldKind::Timestamp => {
            let text = expect_str(spec, raw)?.trim();
            if text.is_empty() {
                return set(Value::Null);
            }
            let at = parse_expiry(text).ok_or_else(|| {
                StoreError::Validation(format!("{} must be a date (YYYY-MM-DD) or RFC 3339 timestamp", spec.name))
            })?;
            set(Value::Text(sql_time(&at)))
        }
        FieldKind::Secret => {
            let text = expect_str(spec, raw)?;
            if text.trim().is_empty() {
                return Err(blank(spec));
            }
            Ok(Assignment::Secret {
                column,
                plaintext: Zeroizing::new(text.to_string()),
            })
        }
    }
}

/// `col1 = ?, col2 = ?` plus the matching values, in order.
pub fn set_clause(columns: Vec<(&'static str, Value)>) -> (String, Vec<Value>) {
    let clause = columns
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");
    let values = columns.into_iter().map(|(_, value)| value).collect();
    (clause, values)
}

/// `""` (after trimming) becomes NULL.
pub fn optional_text(raw: &str) -> Value {
    let text = raw.trim();
    if text.is_empty() {
        Value::Null
    } else {
        Value::Text(text.to_string())
    }
}

fn parse_tags(spec: &FieldSpec, raw: &JsonValue) -> Result<Vec<String>, StoreError> {
    let items: Vec<String> = match raw {
        JsonValue::Array(values) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| wrong_type(spec, "a list of strings")))
            .collect::<Result<_, _>>()?,
        JsonValue::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return Err(wrong_type(spec, "a list of strings")),
    };
    Ok(normalize_tags(items))
}

/// Trim, drop empties and duplicates, keep first-seen order.
pub fn normalize_tags(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for item in items {
        let tag = item.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn expect_str<'v>(spec: &FieldSpec, raw: &'v JsonValue) -> Result<&'v str, StoreError> {
    raw.as_str().ok_or_else(|| wrong_type(spec, "a string"))
}

fn wrong_type(spec: &FieldSpec, expected: &str) -> StoreError {
    StoreError::Validation(format!("{} must be {}", spec.name, expected))
}

fn blank(spec: &FieldSpec) -> StoreError {
    StoreError::Validation(format!("{} is required", spec.name))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPECS: &[FieldSpec] = &[
        FieldSpec::new("title", "titulo", FieldKind::RequiredText),
        FieldSpec::new("notes", "observacoes", FieldKind::OptionalText),
        FieldSpec::new("tags", "tags", FieldKind::Tags),
        FieldSpec::new("favorite", "favorito", FieldKind::Flag),
        FieldSpec::new("expires_at", "expira_em", FieldKind::Timestamp),
        FieldSpec::new("location_id", "localidade_id", FieldKind::Reference { table: "localidades" }),
        FieldSpec::new("secret", "senha", FieldKind::Secret),
    ];

    fn fields(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let out = collect(SPECS, &fields(json!({"id": 9, "ativo": 0, "titulo; DROP TABLE x": "y"}))).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_assignments_follow_table_order() {
        let out = collect(SPECS, &fields(json!({"favorite": true, "title": " New "}))).unwrap();
        let columns: Vec<_> = out.iter().map(Assignment::column).collect();
        assert_eq!(columns, vec!["titulo", "favorito"]);
        assert!(matches!(&out[0], Assignment::Set { value: Value::Text(t), .. } if t == "New"));
    }

    #[test]
    fn test_empty_string_clears_optional_and_rejects_required() {
        let out = collect(SPECS, &fields(json!({"notes": "", "expires_at": ""}))).unwrap();
        assert!(out.iter().all(|a| matches!(a, Assignment::Set { value: Value::Null, .. })));

        let err = collect(SPECS, &fields(json!({"title": "  "}))).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(collect(SPECS, &fields(json!({"secret": ""}))).is_err());
    }

    #[test]
    fn test_wrong_json_type_is_validation_error() {
        assert!(matches!(
            collect(SPECS, &fields(json!({"favorite": "yes"}))),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            collect(SPECS, &fields(json!({"title": 5}))),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_tags_are_normalized() {
        let out = collect(SPECS, &fields(json!({"tags": [" core ", "vpn", "core", ""]}))).unwrap();
        assert!(matches!(&out[0], Assignment::Set { value: Value::Text(t), .. } if t == r#"["core","vpn"]"#));

        let out = collect(SPECS, &fields(json!({"tags": "a, b"}))).unwrap();
        assert!(matches!(&out[0], Assignment::Set { value: Value::Text(t), .. } if t == r#"["a","b"]"#));
    }

    #[test]
    fn test_reference_accepts_number_or_numeric_string() {
        let out = collect(SPECS, &fields(json!({"location_id": "7"}))).unwrap();
        assert!(matches!(out[0], Assignment::Reference { id: 7, table: "localidades", .. }));
    }

    #[test]
    fn test_debug_redacts_secret_plaintext() {
        let out = collect(SPECS, &fields(json!({"secret": "hunter2-plain", "title": "Router"}))).unwrap();
        let printed = format!("{:?}", out);
        assert!(!printed.contains("hunter2-plain"));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("Router"));
    }

    #[test]
    fn test_set_clause_pairs_columns_and_values() {
        let (clause, values) = set_clause(vec![
            ("titulo", Value::Text("x".into())),
            ("favorito", Value::Integer(1)),
        ]);
        assert_eq!(clause, "titulo = ?, favorito = ?");
        assert_eq!(values.len(), 2);
    }
}
