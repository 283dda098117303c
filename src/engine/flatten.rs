//! Structured-output flattening: decomposing a JSON/CSV node result
//! into individually addressable variables. This is the only place
//! dotted/indexed variable names are produced.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use crate::graph::OutputFormat;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("JSON parse error: {0}")]
    Json(String),
    #[error("CSV parse error: {0}")]
    Csv(String),
    #[error("output format {0:?} is not structured")]
    NotStructured(OutputFormat),
}

/// Strip a single Markdown code fence (``` or ```lang) wrapping the
/// payload, which LLMs routinely add around structured output.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the opening fence line.
    match body.split_once('\n') {
        Some((first_line, remainder)) if !first_line.trim().contains(' ') => remainder.trim(),
        _ => body.trim(),
    }
}

/// Parse `raw` per the declared format and flatten it into variables
/// named `"<base>.<field>"` (objects) or `"<base>[<i>].<field>"`
/// (arrays of objects). Returns the parsed value for result metadata.
///
/// Scalar leaf values are stringified: strings verbatim, everything
/// else via JSON rendering (`1` → `"1"`). Nested containers are kept
/// as JSON text; the variable namespace is single-level.
pub fn flatten_structured(
    base: &str,
    format: OutputFormat,
    raw: &str,
    variables: &mut HashMap<String, String>,
) -> Result<Value, FlattenError> {
    let payload = strip_code_fences(raw);
    match format {
        OutputFormat::Json => {
            let value: Value =
                serde_json::from_str(payload).map_err(|e| FlattenError::Json(e.to_string()))?;
            flatten_value(base, &value, variables);
            Ok(value)
        }
        OutputFormat::Csv => {
            let value = parse_csv(payload)?;
            flatten_value(base, &value, variables);
            Ok(value)
        }
        OutputFormat::Text => Err(FlattenError::NotStructured(format)),
    }
}

fn flatten_value(base: &str, value: &Value, variables: &mut HashMap<String, String>) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                variables.insert(format!("{base}.{key}"), scalar_text(field));
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Object(fields) => {
                        for (key, field) in fields {
                            variables.insert(format!("{base}[{index}].{key}"), scalar_text(field));
                        }
                    }
                    other => {
                        variables.insert(format!("{base}[{index}]"), scalar_text(other));
                    }
                }
            }
        }
        _ => {}
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_csv(payload: &str) -> Result<Value, FlattenError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(payload.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| FlattenError::Csv(e.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| FlattenError::Csv(e.to_string()))?;
        let mut row = serde_json::Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(field.to_string()));
        }
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_flattens_to_dotted_variables() {
        let mut vars = HashMap::new();
        flatten_structured("x", OutputFormat::Json, r#"{"a":1,"b":"s"}"#, &mut vars).unwrap();
        assert_eq!(vars.get("x.a").map(String::as_str), Some("1"));
        assert_eq!(vars.get("x.b").map(String::as_str), Some("s"));
    }

    #[test]
    fn json_array_of_objects_flattens_with_indices() {
        let mut vars = HashMap::new();
        flatten_structured(
            "rows",
            OutputFormat::Json,
            r#"[{"name":"a"},{"name":"b"}]"#,
            &mut vars,
        )
        .unwrap();
        assert_eq!(vars.get("rows[0].name").map(String::as_str), Some("a"));
        assert_eq!(vars.get("rows[1].name").map(String::as_str), Some("b"));
    }

    #[test]
    fn fenced_json_is_unwrapped_first() {
        let mut vars = HashMap::new();
        let raw = "```json\n{\"a\": 2}\n```";
        flatten_structured("x", OutputFormat::Json, raw, &mut vars).unwrap();
        assert_eq!(vars.get("x.a").map(String::as_str), Some("2"));
    }

    #[test]
    fn csv_rows_flatten_by_header() {
        let mut vars = HashMap::new();
        flatten_structured(
            "t",
            OutputFormat::Csv,
            "name,age\nada,36\ngrace,44\n",
            &mut vars,
        )
        .unwrap();
        assert_eq!(vars.get("t[0].name").map(String::as_str), Some("ada"));
        assert_eq!(vars.get("t[1].age").map(String::as_str), Some("44"));
    }

    #[test]
    fn invalid_json_is_an_error_not_a_panic() {
        let mut vars = HashMap::new();
        let err = flatten_structured("x", OutputFormat::Json, "not json", &mut vars).unwrap_err();
        assert!(matches!(err, FlattenError::Json(_)));
        assert!(vars.is_empty());
    }

    #[test]
    fn strip_fences_handles_plain_and_tagged() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }
}
