//! 练习文档解析
//!
//! 期望的文档形状：
//!
//! ```text
//! # Micro-project: <topic>
//! ## Goal
//! ## Description
//! ## Input
//! ## Expected output
//! ## Reference solution   (至少一个代码块)
//! ## Autotest             (至少一个 python 代码块)
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ParseError;
use crate::models::ExerciseDocument;
use crate::parsing::markdown::{
    extract_code_blocks, fence_closes, fence_open, is_fence_marker, parse_markdown_sections,
    scan_headers,
};

pub const TITLE_KEYWORD: &str = "Micro-project";

pub const REQUIRED_SECTIONS: [&str; 6] = [
    "Goal",
    "Description",
    "Input",
    "Expected output",
    "Reference solution",
    "Autotest",
];

pub const PYTHON_ALIASES: [&str; 4] = ["python", "py", "python3", "py3"];

fn title_regex() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| {
        Regex::new(r"(?i)^micro-project\s*:\s*(.+?)\s*$").expect("title pattern is valid")
    })
}

/// 解析练习文档
pub fn parse_exercise_document(text: &str) -> Result<ExerciseDocument, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::new("empty exercise document")
            .expected(REQUIRED_SECTIONS)
            .got("<empty>"));
    }

    let unwrapped = unwrap_outer_fence(text);
    let normalized = drop_prose_before_title(&unwrapped)?;

    let sections = parse_markdown_sections(&normalized);
    let Some((title, _)) = sections.first() else {
        return Err(missing_title());
    };
    let topic = extract_topic(title)?;

    let body_of = |name: &str| -> Option<&str> {
        let wanted = squash(name);
        sections
            .iter()
            .skip(1)
            .find(|(header, _)| squash(header).starts_with(&wanted))
            .map(|(_, body)| body.as_str())
    };

    let missing: Vec<&str> = REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|name| body_of(name).is_none())
        .collect();
    if !missing.is_empty() {
        let present: Vec<&str> = sections.iter().skip(1).map(|(h, _)| h.as_str()).collect();
        return Err(ParseError::new("missing required sections")
            .expected(missing)
            .detail("present_headers", present.join(", ")));
    }

    // 上面已确认全部存在
    let section = |name: &str| body_of(name).unwrap_or_default();

    let goal = non_empty(section("Goal"), "Goal")?;
    let description = non_empty(section("Description"), "Description")?;
    let input_spec = non_empty(section("Input"), "Input")?;
    let expected_output = non_empty(
        &extract_expected_output(section("Expected output")),
        "Expected output",
    )?;
    let reference_solution_code = extract_reference_solution(section("Reference solution"))?;
    let autotest_code = extract_autotest(section("Autotest"))?;

    Ok(ExerciseDocument {
        raw_source_text: normalized,
        topic,
        goal,
        description,
        input_spec,
        expected_output,
        reference_solution_code,
        autotest_code,
    })
}

/// 去掉包裹整篇文档的 markdown 代码块
fn unwrap_outer_fence(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return text.to_string();
    };
    if first >= last {
        return text.to_string();
    }

    let Some(open) = fence_open(lines[first]) else {
        return text.to_string();
    };
    if !matches!(open.language().as_str(), "" | "markdown" | "md") {
        return text.to_string();
    }
    if !fence_closes(lines[last], &open) {
        return text.to_string();
    }

    lines[first + 1..last].join("\n")
}

/// 去掉标题行之前的说明文字
fn drop_prose_before_title(text: &str) -> Result<String, ParseError> {
    let headers = scan_headers(text);
    let keyword = TITLE_KEYWORD.to_lowercase();
    let title = headers
        .iter()
        .filter(|h| h.level == 1)
        .find(|h| h.title.to_lowercase().starts_with(&keyword))
        .or_else(|| headers.iter().find(|h| h.level == 1))
        .ok_or_else(missing_title)?;

    let lines: Vec<&str> = text.lines().collect();
    Ok(lines[title.line..].join("\n").trim().to_string())
}

fn missing_title() -> ParseError {
    ParseError::new("document has no H1 title")
        .expected([format!("H1 title '# {}: <topic>'", TITLE_KEYWORD)])
}

fn extract_topic(title: &str) -> Result<String, ParseError> {
    let bad_title = || {
        ParseError::new("title does not name the topic")
            .expected([format!("{}: <topic>", TITLE_KEYWORD)])
            .got(title)
    };

    let captures = title_regex().captures(title.trim()).ok_or_else(bad_title)?;
    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let topic = raw
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(raw)
        .trim();

    if topic.is_empty() {
        return Err(bad_title());
    }
    Ok(topic.to_string())
}

/// 唯一代码块的内容，否则取原文；两种情况都去掉残留的代码块标记行
fn extract_expected_output(body: &str) -> String {
    let blocks = extract_code_blocks(body);
    let content = if blocks.len() == 1 {
        blocks[0].code.as_str()
    } else {
        body
    };
    content
        .lines()
        .filter(|line| !is_fence_marker(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn extract_reference_solution(body: &str) -> Result<String, ParseError> {
    let block = extract_code_blocks(body).into_iter().next().ok_or_else(|| {
        ParseError::new("reference solution has no fenced code block")
            .expected(["fenced code block"])
            .got(body)
            .detail("section", "Reference solution")
    })?;
    if block.code.trim().is_empty() {
        return Err(ParseError::new("reference solution code block is empty")
            .expected(["non-empty code block"])
            .detail("section", "Reference solution"));
    }
    Ok(block.code)
}

fn extract_autotest(body: &str) -> Result<String, ParseError> {
    let blocks = extract_code_blocks(body);
    if blocks.is_empty() {
        return Err(ParseError::new("autotest has no fenced code block")
            .expected(["```python code block"])
            .got(body)
            .detail("section", "Autotest"));
    }

    let Some(block) = blocks
        .iter()
        .find(|b| PYTHON_ALIASES.contains(&b.language.as_str()))
    else {
        let lang = match blocks[0].language.as_str() {
            "" => "none",
            other => other,
        };
        return Err(ParseError::new("autotest must be a python code block")
            .expected(PYTHON_ALIASES)
            .got(format!("lang={}", lang))
            .detail("section", "Autotest"));
    };

    if block.code.trim().is_empty() {
        return Err(ParseError::new("autotest code block is empty")
            .expected(["non-empty python code block"])
            .detail("section", "Autotest"));
    }
    Ok(block.code.clone())
}

fn non_empty(body: &str, section: &str) -> Result<String, ParseError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ParseError::new(format!("section '{}' is empty", section))
            .expected([format!("non-empty '{}' section", section)])
            .detail("section", section));
    }
    Ok(body.to_string())
}

/// 小写并去掉所有空白，用于章节名前缀匹配
fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Micro-project: off-by-one loop bound

## Goal
Practice inclusive and exclusive loop bounds.

## Description
Sum the numbers from 1 to n.

## Input
A single integer n.

## Expected output
```
15
```

## Reference solution
```python
n = int(input())
print(sum(range(1, n + 1)))
```

## Autotest
```python
import subprocess, sys
code = '''{STUDENT_SOLUTION}'''
out = subprocess.run([sys.executable, '-c', code], input='5', capture_output=True, text=True).stdout
assert out.strip() == '15'
```
";

    #[test]
    fn test_parses_full_document() {
        let doc = parse_exercise_document(DOC).unwrap();
        assert_eq!(doc.topic, "off-by-one loop bound");
        assert_eq!(doc.goal, "Practice inclusive and exclusive loop bounds.");
        assert_eq!(doc.expected_output, "15");
        assert!(doc.reference_solution_code.starts_with("n = int(input())"));
        assert!(doc.autotest_code.contains("{STUDENT_SOLUTION}"));
        assert!(doc.raw_source_text.starts_with("# Micro-project"));
    }

    #[test]
    fn test_reparse_is_identical() {
        let wrapped = format!("````markdown\nSure, here is the exercise:\n\n{}\n````\n", DOC);
        let first = parse_exercise_document(&wrapped).unwrap();
        let second = parse_exercise_document(&first.raw_source_text).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unwraps_outer_fences() {
        for open in ["```", "```markdown", "````markdown", "~~~md"] {
            let close: String = open.chars().take_while(|c| *c == '`' || *c == '~').collect();
            let wrapped = format!("{}\n{}\n{}", open, DOC, close);
            let doc = parse_exercise_document(&wrapped).unwrap();
            assert_eq!(doc.topic, "off-by-one loop bound", "open fence {}", open);
        }
    }

    #[test]
    fn test_prose_before_title_is_dropped() {
        let text = format!("Okay! I wrote this for you.\n\n{}", DOC);
        let doc = parse_exercise_document(&text).unwrap();
        assert!(!doc.raw_source_text.contains("Okay!"));
    }

    #[test]
    fn test_bracketed_topic() {
        let text = DOC.replace("off-by-one loop bound", "[off-by-one loop bound]");
        assert_eq!(parse_exercise_document(&text).unwrap().topic, "off-by-one loop bound");
    }

    #[test]
    fn test_empty_input() {
        let err = parse_exercise_document("  \n").unwrap_err();
        assert_eq!(err.got.as_deref(), Some("<empty>"));
        assert_eq!(err.expected.len(), 6);
    }

    #[test]
    fn test_no_h1_title() {
        let err = parse_exercise_document("## Goal\nx").unwrap_err();
        assert!(err.expected.iter().any(|e| e.contains("H1")));
    }

    #[test]
    fn test_title_without_topic() {
        let text = DOC.replace("# Micro-project: off-by-one loop bound", "# Micro-project");
        let err = parse_exercise_document(&text).unwrap_err();
        assert_eq!(err.got.as_deref(), Some("Micro-project"));
    }

    #[test]
    fn test_missing_autotest_lists_present_headers() {
        let cut = DOC.find("## Autotest").unwrap();
        let err = parse_exercise_document(&DOC[..cut]).unwrap_err();
        assert_eq!(err.expected, vec!["Autotest".to_string()]);
        let present = err.details.get("present_headers").unwrap();
        assert!(present.contains("Reference solution"));
    }

    #[test]
    fn test_unfenced_reference_solution() {
        let text = DOC.replace(
            "```python\nn = int(input())\nprint(sum(range(1, n + 1)))\n```",
            "n = int(input())",
        );
        let err = parse_exercise_document(&text).unwrap_err();
        assert_eq!(
            err.details.get("section").map(String::as_str),
            Some("Reference solution")
        );
    }

    #[test]
    fn test_autotest_in_other_language() {
        let cut = DOC.find("## Autotest").unwrap();
        let text = format!("{}## Autotest\n```javascript\nconsole.log(1)\n```\n", &DOC[..cut]);
        let err = parse_exercise_document(&text).unwrap_err();
        assert_eq!(err.got.as_deref(), Some("lang=javascript"));
        assert_eq!(err.details.get("section").map(String::as_str), Some("Autotest"));
    }

    #[test]
    fn test_headers_are_matched_by_loose_prefix() {
        let text = DOC
            .replace("## Expected output", "### expected   OUTPUT (stdout)")
            .replace("## Input", "## Input format");
        assert!(parse_exercise_document(&text).is_ok());
    }

    #[test]
    fn test_expected_output_without_block_uses_section_text() {
        let text = DOC.replace("```\n15\n```", "15");
        assert_eq!(parse_exercise_document(&text).unwrap().expected_output, "15");
    }

    #[test]
    fn test_expected_output_with_several_blocks_uses_section_text() {
        let text = DOC.replace("```\n15\n```", "Either\n```\n15\n```\nor\n```\n15.0\n```");
        assert_eq!(
            parse_exercise_document(&text).unwrap().expected_output,
            "Either\n15\nor\n15.0"
        );
    }
}
