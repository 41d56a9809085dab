use serde_yaml::Value as YamlValue;

use crate::error::ParseError;
use crate::models::{ValidationCheck, ValidationReport};
use crate::parsing::markdown::extract_code_blocks;

const EXPECTED_SHAPE: &str = "is_valid: bool, checks: [{rule_id, passed, comment}]";

/// 解析校验报告（YAML，也接受 JSON）
pub fn parse_validation_report(text: &str) -> Result<ValidationReport, ParseError> {
    let blocks = extract_code_blocks(text);
    let source = blocks
        .iter()
        .find(|b| matches!(b.language.as_str(), "yaml" | "yml" | "json" | ""))
        .or_else(|| blocks.first())
        .map(|b| b.code.clone())
        .unwrap_or_else(|| text.trim().to_string());

    let value: YamlValue = serde_yaml::from_str(&source).map_err(|e| {
        ParseError::new("validation report is not valid YAML")
            .expected([EXPECTED_SHAPE])
            .got(&source)
            .detail("yaml_error", e.to_string())
    })?;

    let YamlValue::Mapping(map) = value else {
        return Err(ParseError::new("validation report must be a mapping")
            .expected([EXPECTED_SHAPE])
            .got(&source));
    };

    let is_valid = map
        .get("is_valid")
        .and_then(YamlValue::as_bool)
        .ok_or_else(|| {
            ParseError::new("'is_valid' must be a boolean")
                .expected(["is_valid: true|false"])
                .got(&source)
        })?;

    let raw_checks = match map.get("checks") {
        Some(YamlValue::Sequence(items)) => items,
        _ => {
            return Err(ParseError::new("'checks' must be a list")
                .expected(["checks: [..]"])
                .got(&source))
        }
    };

    let checks = raw_checks
        .iter()
        .enumerate()
        .map(|(idx, item)| parse_check(idx, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidationReport { is_valid, checks })
}

fn parse_check(idx: usize, item: &YamlValue) -> Result<ValidationCheck, ParseError> {
    let invalid = |what: &str| {
        ParseError::new(format!("check at index {} {}", idx, what))
            .expected(["{rule_id: str, passed: bool, comment: str}"])
            .detail("index", idx.to_string())
    };

    let YamlValue::Mapping(map) = item else {
        return Err(invalid("is not a mapping"));
    };
    let rule_id = match map.get("rule_id") {
        Some(YamlValue::String(s)) => s.trim().to_string(),
        Some(YamlValue::Number(n)) => n.to_string(),
        _ => return Err(invalid("has no 'rule_id'")),
    };
    let passed = map
        .get("passed")
        .and_then(YamlValue::as_bool)
        .ok_or_else(|| invalid("has no boolean 'passed'"))?;
    let comment = match map.get("comment") {
        Some(YamlValue::String(s)) => s.trim().to_string(),
        Some(YamlValue::Null) | None => String::new(),
        Some(_) => return Err(invalid("has a non-string 'comment'")),
    };

    Ok(ValidationCheck {
        rule_id,
        passed,
        comment,
    })
}

/// 渲染为 YAML，供修正提示词使用
pub fn format_validation_report(report: &ValidationReport) -> String {
    serde_yaml::to_string(report).unwrap_or_else(|_| format!("{:?}", report))
}
