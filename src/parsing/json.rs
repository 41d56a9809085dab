//! 宽松 JSON 提取
//!
//! 来源优先级：json（或无语言）代码块 → 第一个顶层 `{...}` → 全文。
//! 先严格解析，失败后修复常见问题再解析一次。

use serde_json::{Map, Value as JsonValue};

use crate::error::ParseError;
use crate::parsing::markdown::extract_code_blocks;

/// 模糊匹配的最低相似度
pub const SNAP_THRESHOLD: f64 = 0.6;

/// 需要吸附到允许集合的字段
#[derive(Debug, Clone)]
pub struct SnapRule {
    pub key: &'static str,
    pub allowed: &'static [&'static str],
    pub default: Option<&'static str>,
}

/// 期望的 JSON 对象形状
#[derive(Debug, Clone, Default)]
pub struct JsonShape {
    pub required: &'static [&'static str],
    pub snapped: Vec<SnapRule>,
}

/// 从模型输出中提取 JSON 值
pub fn parse_json(text: &str) -> Result<JsonValue, ParseError> {
    let source = select_object_source(text);
    decode_lenient(&source).map_err(|e| {
        ParseError::new("invalid JSON")
            .expected(["JSON object"])
            .got(text)
            .detail("json_error", e.to_string())
    })
}

/// 提取 JSON 对象并检查必填字段、吸附枚举字段
pub fn parse_and_check_json(
    text: &str,
    shape: &JsonShape,
) -> Result<Map<String, JsonValue>, ParseError> {
    let value = parse_json(text)?;
    let JsonValue::Object(mut fields) = value else {
        return Err(ParseError::new("expected a JSON object")
            .expected(["JSON object"])
            .got(text));
    };

    for key in shape.required {
        if !fields.contains_key(*key) {
            return Err(ParseError::new(format!("missing required key '{}'", key))
                .expected(shape.required.iter().copied())
                .detail("present_keys", join_keys(&fields)));
        }
    }

    for rule in &shape.snapped {
        let Some(raw) = fields.get(rule.key) else {
            if let Some(default) = rule.default {
                fields.insert(rule.key.to_string(), JsonValue::String(default.to_string()));
            }
            continue;
        };
        let snapped = snap_value(raw, rule.allowed).or(rule.default).ok_or_else(|| {
            ParseError::new(format!("value of '{}' is not an allowed choice", rule.key))
                .expected(rule.allowed.iter().copied())
                .got(raw.to_string())
        })?;
        fields.insert(rule.key.to_string(), JsonValue::String(snapped.to_string()));
    }

    Ok(fields)
}

/// 严格解析，失败后修复再试
pub fn decode_lenient(source: &str) -> Result<JsonValue, serde_json::Error> {
    match serde_json::from_str(source) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            let repaired = repair_json(source);
            if repaired == source {
                return Err(strict_err);
            }
            serde_json::from_str(&repaired)
        }
    }
}

fn select_object_source(text: &str) -> String {
    let blocks = extract_code_blocks(text);
    if let Some(block) = blocks
        .iter()
        .find(|b| b.language == "json" || b.language.is_empty())
    {
        return block.code.clone();
    }
    if let Some(span) = balanced_span(text, '{', '}') {
        return span.to_string();
    }
    text.trim().to_string()
}

/// 找到第一个顶层 `open ... close` 片段（忽略字符串中的括号）
pub(crate) fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 修复常见的不合法 JSON：
/// 结尾多余逗号、单引号字符串、Python 字面量 True/False/None
pub fn repair_json(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = copy_double_quoted(&chars, i, &mut out);
                i = end;
                continue;
            }
            '\'' => {
                i = convert_single_quoted(&chars, i, &mut out);
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    i += 1;
                    continue;
                }
                out.push(c);
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// 原样复制双引号字符串，返回结束后的位置
fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    let mut escaped = false;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            break;
        }
    }
    i
}

/// 把单引号字符串改写为双引号字符串，返回结束后的位置
fn convert_single_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' if i < chars.len() && chars[i] == '\'' => {
                out.push('\'');
                i += 1;
            }
            '\\' if i < chars.len() => {
                out.push('\\');
                out.push(chars[i]);
                i += 1;
            }
            '"' => out.push_str("\\\""),
            '\'' => break,
            _ => out.push(c),
        }
    }
    out.push('"');
    i
}

/// 将值吸附到允许集合中最相近的一项
fn snap_value<'a>(raw: &JsonValue, allowed: &[&'a str]) -> Option<&'a str> {
    let raw = match raw {
        JsonValue::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };
    let text = match raw {
        JsonValue::String(s) => s.trim().to_lowercase(),
        JsonValue::Null => return None,
        other => other.to_string().to_lowercase(),
    };

    allowed
        .iter()
        .map(|choice| (*choice, similarity_ratio(&text, &choice.to_lowercase())))
        .filter(|(_, ratio)| *ratio >= SNAP_THRESHOLD)
        .fold(None, |best: Option<(&str, f64)>, (choice, ratio)| match best {
            Some((_, best_ratio)) if best_ratio >= ratio => best,
            _ => Some((choice, ratio)),
        })
        .map(|(choice, _)| choice)
}

/// 归一化编辑距离相似度：1 - distance / max(len)
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    1.0 - prev[b.len()] as f64 / longest as f64
}

fn join_keys(fields: &Map<String, JsonValue>) -> String {
    fields.keys().cloned().collect::<Vec<_>>().join(", ")
}
