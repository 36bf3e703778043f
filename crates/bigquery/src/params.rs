//! Typed named query parameters and static query checks.
//!
//! Parameters are an explicit map of name to typed value, validated before
//! submission: quoting must balance and every `@name` reference must match a
//! declared parameter (and vice versa).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems found before a query is ever submitted.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("query text is empty")]
    EmptySql,

    #[error("unbalanced quoting: {0}")]
    UnbalancedQuote(String),

    #[error("parameter binding mismatch: {0}")]
    ParameterMismatch(String),

    #[error("invalid parameter name \"{0}\"")]
    InvalidParameterName(String),
}

/// A typed parameter value in the BigQuery standard-SQL type system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl ParameterValue {
    /// BigQuery type name for the wire encoding.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int64(_) => "INT64",
            Self::Float64(_) => "FLOAT64",
            Self::Bool(_) => "BOOL",
            Self::String(_) => "STRING",
            Self::Timestamp(_) => "TIMESTAMP",
        }
    }

    /// Parse a string value for a declared type name (as used in config).
    pub fn from_typed_str(type_name: &str, value: &str) -> Result<Self, String> {
        match type_name.to_uppercase().as_str() {
            "INT64" | "INTEGER" => value
                .parse::<i64>()
                .map(Self::Int64)
                .map_err(|_| format!("\"{}\" is not a valid INT64", value)),
            "FLOAT64" | "FLOAT" => value
                .parse::<f64>()
                .map(Self::Float64)
                .map_err(|_| format!("\"{}\" is not a valid FLOAT64", value)),
            "BOOL" | "BOOLEAN" => match value.to_lowercase().as_str() {
                "true" | "1" => Ok(Self::Bool(true)),
                "false" | "0" => Ok(Self::Bool(false)),
                _ => Err(format!("\"{}\" is not a valid BOOL", value)),
            },
            "STRING" => Ok(Self::String(value.to_string())),
            "TIMESTAMP" => DateTime::parse_from_rfc3339(value)
                .map(|dt| Self::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|_| format!("\"{}\" is not an RFC 3339 TIMESTAMP", value)),
            other => Err(format!("unsupported parameter type \"{}\"", other)),
        }
    }

    fn wire_value(&self) -> String {
        match self {
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Timestamp(v) => v.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string(),
        }
    }
}

/// A named parameter bound to a typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: ParameterValue,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Encode as a `queryParameters` entry.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "parameterType": { "type": self.value.type_name() },
            "parameterValue": { "value": self.value.wire_value() },
        })
    }
}

/// A query plus its parameter bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParameter>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<QueryParameter>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Run every static check. Nothing is sent to the warehouse on failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sql.trim().is_empty() {
            return Err(ValidationError::EmptySql);
        }

        let referenced = scan_parameter_refs(&self.sql)?;

        let mut declared = BTreeSet::new();
        for param in &self.params {
            if !is_valid_parameter_name(&param.name) {
                return Err(ValidationError::InvalidParameterName(param.name.clone()));
            }
            if !declared.insert(param.name.as_str()) {
                return Err(ValidationError::ParameterMismatch(format!(
                    "parameter \"{}\" is declared more than once",
                    param.name
                )));
            }
        }

        for name in &referenced {
            if !declared.contains(name.as_str()) {
                return Err(ValidationError::ParameterMismatch(format!(
                    "query references undeclared parameter @{}",
                    name
                )));
            }
        }
        for name in &declared {
            if !referenced.contains(*name) {
                return Err(ValidationError::ParameterMismatch(format!(
                    "parameter \"{}\" is declared but never referenced",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn is_valid_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Scan the SQL once, tracking quote and comment state.
///
/// Returns the set of `@name` references found outside quotes and comments,
/// or an error if a quote is left open at end of input.
fn scan_parameter_refs(sql: &str) -> Result<BTreeSet<String>, ValidationError> {
    #[derive(PartialEq)]
    enum State {
        Plain,
        Single,
        Double,
        Backtick,
        LineComment,
        BlockComment,
    }

    let mut state = State::Plain;
    let mut refs = BTreeSet::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Plain => match c {
                '\'' => state = State::Single,
                '"' => state = State::Double,
                '`' => state = State::Backtick,
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '#' => state = State::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                '@' => {
                    // `@@` introduces a system variable, not a parameter.
                    if chars.peek() == Some(&'@') {
                        chars.next();
                        while chars
                            .peek()
                            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
                        {
                            chars.next();
                        }
                        continue;
                    }
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if !next.is_ascii_alphanumeric() && next != '_' {
                            break;
                        }
                        name.push(next);
                        chars.next();
                    }
                    if !name.is_empty() {
                        refs.insert(name);
                    }
                }
                _ => {}
            },
            State::Single | State::Double => {
                let quote = if state == State::Single { '\'' } else { '"' };
                if c == '\\' {
                    // Escaped character inside a string literal.
                    chars.next();
                } else if c == quote {
                    state = State::Plain;
                }
            }
            State::Backtick => {
                if c == '`' {
                    state = State::Plain;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Plain;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Plain;
                }
            }
        }
    }

    match state {
        State::Plain | State::LineComment => Ok(refs),
        State::Single => Err(ValidationError::UnbalancedQuote(
            "unterminated ' string literal".into(),
        )),
        State::Double => Err(ValidationError::UnbalancedQuote(
            "unterminated \" string literal".into(),
        )),
        State::Backtick => Err(ValidationError::UnbalancedQuote(
            "unterminated ` identifier".into(),
        )),
        State::BlockComment => Err(ValidationError::UnbalancedQuote(
            "unterminated block comment".into(),
        )),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn valid_query_without_params() {
        let req = QueryRequest::new("SELECT * FROM `proj.test.book` LIMIT 10");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_sql_rejected() {
        let req = QueryRequest::new("   ");
        assert!(matches!(req.validate(), Err(ValidationError::EmptySql)));
    }

    #[test]
    fn unbalanced_backtick_rejected() {
        // The original form of this query shipped with a stray backtick.
        let req = QueryRequest::new("SELECT * FROM `proj.test.book LIMIT 1");
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ValidationError::UnbalancedQuote(_)));
        assert!(err.to_string().contains("`"));
    }

    #[test]
    fn unbalanced_single_quote_rejected() {
        let req = QueryRequest::new("SELECT * FROM t WHERE name = 'alice");
        assert!(matches!(
            req.validate(),
            Err(ValidationError::UnbalancedQuote(_))
        ));
    }

    #[test]
    fn escaped_quote_inside_literal_is_fine() {
        let req = QueryRequest::new("SELECT * FROM t WHERE name = 'o\\'brien'");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn quote_inside_comment_is_ignored() {
        let req = QueryRequest::new("SELECT 1 -- don't trip on this\nFROM t");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn undeclared_reference_is_a_binding_mismatch() {
        let req = QueryRequest::new("SELECT * FROM t WHERE office_code = @office_code");
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ValidationError::ParameterMismatch(_)));
        assert!(err.to_string().contains("office_code"));
    }

    #[test]
    fn unreferenced_declaration_is_a_binding_mismatch() {
        let req = QueryRequest::with_params(
            "SELECT * FROM t",
            vec![QueryParameter::new("office_code", ParameterValue::Int64(7))],
        );
        let err = req.validate().unwrap_err();
        assert!(matches!(err, ValidationError::ParameterMismatch(_)));
    }

    #[test]
    fn matched_declaration_and_reference_pass() {
        let req = QueryRequest::with_params(
            "SELECT * FROM t WHERE office_code = @office_code",
            vec![QueryParameter::new("office_code", ParameterValue::Int64(7))],
        );
        assert!(req.validate().is_ok());
    }

    #[test]
    fn at_sign_inside_string_is_not_a_reference() {
        let req = QueryRequest::new("SELECT * FROM t WHERE email = 'a@b.com'");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn system_variables_are_not_parameters() {
        let req = QueryRequest::new("SELECT @@project_id");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn duplicate_declaration_rejected() {
        let req = QueryRequest::with_params(
            "SELECT @x",
            vec![
                QueryParameter::new("x", ParameterValue::Int64(1)),
                QueryParameter::new("x", ParameterValue::Int64(2)),
            ],
        );
        assert!(matches!(
            req.validate(),
            Err(ValidationError::ParameterMismatch(_))
        ));
    }

    #[test]
    fn bad_parameter_name_rejected() {
        let req = QueryRequest::with_params(
            "SELECT 1",
            vec![QueryParameter::new("1bad", ParameterValue::Bool(true))],
        );
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidParameterName(_))
        ));
    }

    #[test]
    fn typed_values_parse_from_strings() {
        assert_eq!(
            ParameterValue::from_typed_str("INT64", "42").unwrap(),
            ParameterValue::Int64(42)
        );
        assert_eq!(
            ParameterValue::from_typed_str("bool", "true").unwrap(),
            ParameterValue::Bool(true)
        );
        assert!(ParameterValue::from_typed_str("INT64", "forty-two").is_err());
        assert!(ParameterValue::from_typed_str("GEOGRAPHY", "POINT(0 0)").is_err());
    }

    #[test]
    fn wire_encoding_shape() {
        let param = QueryParameter::new("office_code", ParameterValue::Int64(42));
        let wire = param.to_wire();
        assert_eq!(wire["name"], "office_code");
        assert_eq!(wire["parameterType"]["type"], "INT64");
        assert_eq!(wire["parameterValue"]["value"], "42");
    }

    #[test]
    fn timestamp_wire_format() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let param = QueryParameter::new("since", ParameterValue::Timestamp(ts));
        let wire = param.to_wire();
        assert_eq!(
            wire["parameterValue"]["value"],
            "2026-01-02 03:04:05.000000+00:00"
        );
    }
}
