use serde_yaml::Value as YamlValue;
use tracing::warn;

use crate::error::ParseError;
use crate::parsing::markdown::extract_code_block;

const YAML_LANGUAGES: [&str; 3] = ["yaml", "yml", ""];

/// 解析主题列表
///
/// 接受裸列表或带 `topics` 键的映射；结果去重、保序、去掉空白项。
/// 非字符串条目会被丢弃并记录警告
pub fn parse_topics(text: &str) -> Result<Vec<String>, ParseError> {
    let source = extract_code_block(text, &YAML_LANGUAGES)
        .map(|b| b.code)
        .unwrap_or_else(|| text.trim().to_string());

    let value: YamlValue = serde_yaml::from_str(&source).map_err(|e| {
        ParseError::new("invalid YAML")
            .expected(["YAML list of topics", "mapping with a 'topics' list"])
            .got(&source)
            .detail("yaml_error", e.to_string())
    })?;

    let items = match value {
        YamlValue::Sequence(items) => items,
        YamlValue::Mapping(map) => match map.get("topics") {
            Some(YamlValue::Sequence(items)) => items.clone(),
            Some(other) => {
                return Err(ParseError::new("'topics' must be a list")
                    .expected(["topics: [..]"])
                    .got(describe(other)))
            }
            None => {
                return Err(ParseError::new("mapping has no 'topics' key")
                    .expected(["topics"])
                    .detail("present_keys", mapping_keys(&map)))
            }
        },
        other => {
            return Err(ParseError::new("topic list must be a YAML list or mapping")
                .expected(["YAML list of topics", "mapping with a 'topics' list"])
                .got(describe(&other)))
        }
    };

    let mut topics: Vec<String> = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        match item {
            YamlValue::String(s) => {
                let topic = s.trim();
                if !topic.is_empty() && !topics.iter().any(|t| t == topic) {
                    topics.push(topic.to_string());
                }
            }
            other => warn!("⚠️ 丢弃非字符串主题 (索引 {}): {}", idx, describe(&other)),
        }
    }

    Ok(topics)
}

fn describe(value: &YamlValue) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

fn mapping_keys(map: &serde_yaml::Mapping) -> String {
    map.keys()
        .map(describe)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_mapping() {
        let text = "Here you go:\n```yaml\ntopics:\n  - off-by-one loop bound\n  - mutable default args\n```";
        assert_eq!(
            parse_topics(text).unwrap(),
            vec!["off-by-one loop bound", "mutable default args"]
        );
    }

    #[test]
    fn test_plain_list_dedup_and_trim() {
        let text = "- a\n- '  b  '\n- a\n- ''\n- 3\n- b";
        assert_eq!(parse_topics(text).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_topics() {
        assert!(parse_topics("topics: []").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(parse_topics("topics: [unclosed").is_err());
        assert!(parse_topics("just a sentence").is_err());
        let err = parse_topics("topics: {a: 1}").unwrap_err();
        assert_eq!(err.message, "'topics' must be a list");
        assert!(parse_topics("other: [x]").is_err());
    }
}
