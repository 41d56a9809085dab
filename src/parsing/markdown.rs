//! Markdown 扫描：代码块提取与章节切分
//!
//! 这里的所有函数都跟踪代码块（``` 或 ~~~）状态，
//! 代码块中的 `#` 行永远不会被当作标题。

/// 一个顶层代码块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// 信息串的第一个词（小写），没有时为空串
    pub language: String,
    pub code: String,
}

/// 代码块起始行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FenceOpen<'a> {
    pub ch: char,
    pub len: usize,
    pub info: &'a str,
}

impl FenceOpen<'_> {
    pub fn language(&self) -> String {
        self.info
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase()
    }
}

/// 一个 ATX 标题行
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderLine {
    /// 所在行号（从 0 开始）
    pub line: usize,
    pub level: usize,
    pub title: String,
}

/// 去掉不超过 3 个空格的缩进，缩进更深时返回 `None`
fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        None
    } else {
        Some(&line[indent..])
    }
}

/// 判断一行是否打开代码块
pub(crate) fn fence_open(line: &str) -> Option<FenceOpen<'_>> {
    let rest = strip_indent(line)?;
    let ch = rest.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = rest.chars().take_while(|&c| c == ch).count();
    if len < 3 {
        return None;
    }
    // 反引号代码块的信息串里不能再出现反引号
    let info = rest[len * ch.len_utf8()..].trim();
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some(FenceOpen { ch, len, info })
}

/// 判断一行是否关闭以 `open` 开始的代码块
pub(crate) fn fence_closes(line: &str, open: &FenceOpen<'_>) -> bool {
    let Some(rest) = strip_indent(line) else {
        return false;
    };
    let rest = rest.trim_end();
    rest.chars().count() >= open.len && rest.chars().all(|c| c == open.ch)
}

/// 是否为代码块标记行（打开或关闭）
pub(crate) fn is_fence_marker(line: &str) -> bool {
    fence_open(line).is_some()
}

/// 解析 ATX 标题，返回 (级别, 标题文本)
fn atx_header(line: &str) -> Option<(usize, String)> {
    let rest = strip_indent(line)?;
    let level = rest.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let after = &rest[level..];
    if !after.is_empty() && !after.starts_with(' ') && !after.starts_with('\t') {
        return None;
    }
    let mut title = after.trim();
    // 可选的结尾 # 序列
    let without_closing = title.trim_end_matches('#');
    if without_closing.is_empty() {
        title = "";
    } else if without_closing.len() != title.len() && without_closing.ends_with([' ', '\t']) {
        title = without_closing.trim_end();
    }
    Some((level, title.to_string()))
}

/// 扫描所有不在代码块中的标题
pub(crate) fn scan_headers(text: &str) -> Vec<HeaderLine> {
    let mut headers = Vec::new();
    let mut open: Option<FenceOpen<'_>> = None;

    for (idx, line) in text.lines().enumerate() {
        if let Some(fence) = &open {
            if fence_closes(line, fence) {
                open = None;
            }
            continue;
        }
        if let Some(fence) = fence_open(line) {
            open = Some(fence);
            continue;
        }
        if let Some((level, title)) = atx_header(line) {
            headers.push(HeaderLine {
                line: idx,
                level,
                title,
            });
        }
    }

    headers
}

/// 提取所有顶层代码块（按出现顺序）
///
/// 未关闭的代码块延续到文本结尾；代码末尾的换行会被去掉
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(FenceOpen<'_>, Vec<&str>)> = None;

    for line in text.lines() {
        match current.as_mut() {
            Some((fence, body)) => {
                if fence_closes(line, fence) {
                    if let Some((fence, body)) = current.take() {
                        blocks.push(finish_block(&fence, &body));
                    }
                } else {
                    body.push(line);
                }
            }
            None => {
                if let Some(fence) = fence_open(line) {
                    current = Some((fence, Vec::new()));
                }
            }
        }
    }

    if let Some((fence, body)) = current {
        blocks.push(finish_block(&fence, &body));
    }

    blocks
}

fn finish_block(fence: &FenceOpen<'_>, body: &[&str]) -> CodeBlock {
    CodeBlock {
        language: fence.language(),
        code: body.join("\n").trim_end_matches(['\n', '\r']).to_string(),
    }
}

/// 提取第一个代码块
///
/// 给出 `prefer_languages` 时，只返回语言在列表中的第一个代码块
pub fn extract_code_block(text: &str, prefer_languages: &[&str]) -> Option<CodeBlock> {
    let blocks = extract_code_blocks(text);
    if prefer_languages.is_empty() {
        return blocks.into_iter().next();
    }
    blocks
        .into_iter()
        .find(|b| prefer_languages.contains(&b.language.as_str()))
}

/// 按标题切分 Markdown
///
/// 返回有序的 (标题, 正文) 列表。第一个标题之前的文本被忽略；
/// 正文只去掉首尾空行和末尾空白，内容行的缩进保持不变
pub fn parse_markdown_sections(text: &str) -> Vec<(String, String)> {
    let lines: Vec<&str> = text.lines().collect();
    let headers = scan_headers(text);

    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let end = headers.get(i + 1).map(|h| h.line).unwrap_or(lines.len());
            let body_lines = &lines[header.line + 1..end];
            (header.title.clone(), trim_body(body_lines))
        })
        .collect()
}

fn trim_body(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    lines[start..].join("\n").trim_end().to_string()
}
