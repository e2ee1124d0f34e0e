//! 학습 입력 읽기
//!
//! 두 형식을 받습니다.
//! - JSON 배열: `[{"packet_size": 60, ...}, ...]`
//! - JSON lines: 한 줄에 객체 하나
//!
//! 각 객체에서 숫자 값 열만 특성으로 취합니다. 열 순서는 의미가 없고
//! 빠진 열은 학습 시 `FeatureSchemaMismatch`로 거부됩니다.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use icsguard_core::types::FeatureVector;

use crate::error::DetectorError;

/// 학습 행 파일을 읽습니다.
pub async fn load_training_rows(
    path: impl AsRef<Path>,
) -> Result<Vec<FeatureVector>, DetectorError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let origin = path.display().to_string();
    let rows = parse_training_rows(&content, &origin)?;
    info!(path = %origin, rows = rows.len(), "loaded training rows");
    Ok(rows)
}

/// 문자열에서 학습 행을 파싱합니다. `origin`은 에러 위치 표시에 쓰입니다.
pub fn parse_training_rows(
    content: &str,
    origin: &str,
) -> Result<Vec<FeatureVector>, DetectorError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(trimmed).map_err(|e| DetectorError::Decode {
                location: format!("{origin}:{}", e.line()),
                reason: e.to_string(),
            })?;
        return values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| row_from_value(value, || format!("{origin}[{idx}]")))
            .collect();
    }

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let location = || format!("{origin}:{}", idx + 1);
        let value: Value = serde_json::from_str(line).map_err(|e| DetectorError::Decode {
            location: location(),
            reason: e.to_string(),
        })?;
        rows.push(row_from_value(value, location)?);
    }
    Ok(rows)
}

fn row_from_value(
    value: Value,
    location: impl Fn() -> String,
) -> Result<FeatureVector, DetectorError> {
    match value {
        Value::Object(object) => Ok(numeric_columns(object)),
        other => Err(DetectorError::Decode {
            location: location(),
            reason: format!("expected an object, found {}", kind(&other)),
        }),
    }
}

fn numeric_columns(object: Map<String, Value>) -> FeatureVector {
    object
        .into_iter()
        .filter_map(|(name, value)| value.as_f64().map(|v| (name, v)))
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let rows = parse_training_rows(
            r#"[{"packet_size": 60, "byte_count": 600.5}, {"packet_size": 64}]"#,
            "rows.json",
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("packet_size"), Some(60.0));
        assert_eq!(rows[0].get("byte_count"), Some(600.5));
    }

    #[test]
    fn parses_json_lines_and_ignores_non_numeric_columns() {
        let content = "{\"packet_size\": 60, \"label\": \"normal\"}\n\n{\"packet_size\": 70}\n";
        let rows = parse_training_rows(content, "rows.jsonl").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 1);
        assert!(rows[0].get("label").is_none());
    }

    #[test]
    fn bad_line_reports_location() {
        let err = parse_training_rows("{\"packet_size\": 1}\nnot json\n", "rows.jsonl").unwrap_err();
        match err {
            DetectorError::Decode { location, .. } => assert_eq!(location, "rows.jsonl:2"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_object_row_is_rejected() {
        let err = parse_training_rows("[1, 2]", "rows.json").unwrap_err();
        match err {
            DetectorError::Decode { location, reason } => {
                assert_eq!(location, "rows.json[0]");
                assert!(reason.contains("a number"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn loads_rows_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        tokio::fs::write(&path, r#"[{"packet_size": 1}]"#).await.unwrap();
        let rows = load_training_rows(&path).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
