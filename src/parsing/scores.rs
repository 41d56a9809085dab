use serde_json::Value as JsonValue;

use crate::error::ParseError;
use crate::parsing::json::{balanced_span, decode_lenient};
use crate::parsing::markdown::extract_code_blocks;

const EXPECTED: &str = "JSON array of numbers in [0, 1]";

/// 解析排序分数
///
/// 空输入返回空列表；不检查数组长度，由调用方负责
pub fn parse_ranking_scores(text: &str) -> Result<Vec<f64>, ParseError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let source = select_array_source(text);
    let value = decode_lenient(&source).map_err(|e| {
        ParseError::new("ranking scores are not valid JSON")
            .expected([EXPECTED])
            .got(text)
            .detail("json_error", e.to_string())
    })?;

    let JsonValue::Array(items) = value else {
        return Err(ParseError::new("ranking scores must be a JSON array")
            .expected([EXPECTED])
            .got(value.to_string()));
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| match item.as_f64() {
            Some(score) if (0.0..=1.0).contains(&score) => Ok(score),
            Some(_) => Err(ParseError::new(format!("score at index {} is out of range", idx))
                .expected(["number in [0, 1]"])
                .got(item.to_string())
                .detail("index", idx.to_string())),
            None => Err(ParseError::new(format!("score at index {} is not a number", idx))
                .expected(["number in [0, 1]"])
                .got(item.to_string())
                .detail("index", idx.to_string())),
        })
        .collect()
}

fn select_array_source(text: &str) -> String {
    let blocks = extract_code_blocks(text);
    let preferred = blocks
        .iter()
        .find(|b| b.language == "json" || b.language.is_empty())
        .or_else(|| blocks.first());
    if let Some(block) = preferred {
        return block.code.clone();
    }
    if let Some(span) = balanced_span(text, '[', ']') {
        return span.to_string();
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_fenced_arrays() {
        assert_eq!(parse_ranking_scores("[1, 0, 0.5]").unwrap(), vec![1.0, 0.0, 0.5]);
        assert_eq!(parse_ranking_scores("```json\n[0.2]\n```").unwrap(), vec![0.2]);
        assert_eq!(parse_ranking_scores("```\n[0.3, 0.4]\n```").unwrap(), vec![0.3, 0.4]);
        assert_eq!(
            parse_ranking_scores("Here are the scores: [0.9, 0.1]").unwrap(),
            vec![0.9, 0.1]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_ranking_scores("").unwrap().is_empty());
        assert!(parse_ranking_scores("  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_arrays() {
        assert!(parse_ranking_scores("not json").is_err());
        assert!(parse_ranking_scores("{invalid json}").is_err());
        assert!(parse_ranking_scores(r#"{"scores": "not an array"}"#).is_err());
        assert!(parse_ranking_scores("0.8").is_err());
    }

    #[test]
    fn test_rejects_bad_elements_citing_index() {
        let err = parse_ranking_scores("[0.5, 1.2]").unwrap_err();
        assert_eq!(err.details.get("index").map(String::as_str), Some("1"));
        assert_eq!(err.got.as_deref(), Some("1.2"));

        let err = parse_ranking_scores("[-0.1]").unwrap_err();
        assert_eq!(err.details.get("index").map(String::as_str), Some("0"));

        let err = parse_ranking_scores("[0.5, 'invalid']").unwrap_err();
        assert!(err.message.contains("index 1"));

        let err = parse_ranking_scores("[0.1, 0.2, null]").unwrap_err();
        assert!(err.message.contains("index 2"));
    }
}
