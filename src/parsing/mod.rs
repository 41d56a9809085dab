//! 结构化输出解析
//!
//! 把模型返回的自由文本解析为强类型记录。失败时返回 [`ParseError`](crate::error::ParseError)，
//! 其文本会作为纠正上下文回传给模型。

pub mod exercise;
pub mod json;
pub mod markdown;
pub mod scores;
pub mod topics;
pub mod validation;

pub use exercise::{parse_exercise_document, PYTHON_ALIASES, REQUIRED_SECTIONS};
pub use json::{parse_and_check_json, parse_json, JsonShape, SnapRule};
pub use markdown::{extract_code_block, extract_code_blocks, parse_markdown_sections, CodeBlock};
pub use scores::parse_ranking_scores;
pub use topics::parse_topics;
pub use validation::{format_validation_report, parse_validation_report};
