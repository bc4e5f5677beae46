//! 题目渲染数据 - 业务能力层
//!
//! 题干和选项里可以用 `code:`（不区分大小写）嵌入一段代码，
//! 标记之后的内容按原样作为代码块显示。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::quiz::Question;

/// 渲染后的题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedQuestion {
    pub number: u32,
    pub text: String,
    pub code: Option<String>,
    pub options: Vec<RenderedOption>,
}

/// 渲染后的选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedOption {
    /// a) b) c) d)
    pub label: char,
    /// 只取标记前文本的第一行
    pub text: String,
    pub code: Option<String>,
}

fn code_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"(?i)code:").ok()).as_ref()
}

fn no_code_needed() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"(?i)^#?\s*no code needed\s*$").ok())
        .as_ref()
}

/// 在第一个 `code:` 处拆开，返回 (正文, 代码)
///
/// 代码为空或只是 "no code needed" 占位时视为没有代码
pub fn split_code(raw: &str) -> (&str, Option<String>) {
    let Some(marker) = code_marker() else {
        return (raw, None);
    };
    let mut parts = marker.splitn(raw, 2);
    let text = parts.next().unwrap_or_default();
    let code = parts
        .next()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .filter(|code| !no_code_needed().is_some_and(|re| re.is_match(code)))
        .map(str::to_string);
    (text, code)
}

pub fn render_option(index: usize, raw: &str) -> RenderedOption {
    let (text, code) = split_code(raw);
    let first_line = text.lines().next().unwrap_or_default().trim().to_string();
    RenderedOption {
        label: option_label(index),
        text: first_line,
        code,
    }
}

pub fn render_question(index: usize, question: &Question) -> RenderedQuestion {
    let (text, code) = split_code(&question.text);
    RenderedQuestion {
        number: question.display_number(index),
        text: text.trim().to_string(),
        code,
        options: question
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| render_option(i, option))
            .collect(),
    }
}

/// 选项序号 a-z
pub fn option_label(index: usize) -> char {
    char::from(b'a' + (index % 26) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_question_at_case_insensitive_marker() {
        let question = Question::new(
            "What does this print?\nCODE:\nfn main() { println!(\"hi\"); }\n",
            ["hi", "nothing", "error", "panic"],
            "A",
        );
        let rendered = render_question(0, &question);
        assert_eq!(rendered.number, 1);
        assert_eq!(rendered.text, "What does this print?");
        assert_eq!(
            rendered.code.as_deref(),
            Some("fn main() { println!(\"hi\"); }")
        );
        assert_eq!(rendered.options[2].label, 'c');
    }

    #[test]
    fn no_code_needed_placeholder_is_hidden() {
        assert_eq!(split_code("Pick one code: # No code needed ").1, None);
        assert_eq!(split_code("Pick one code:   ").1, None);
        assert_eq!(split_code("Plain question").1, None);
    }

    #[test]
    fn option_shows_first_line_and_code_block() {
        let option = render_option(1, "Uses a loop\nextra detail\ncode: for i in 0..3 {}");
        assert_eq!(option.label, 'b');
        assert_eq!(option.text, "Uses a loop");
        assert_eq!(option.code.as_deref(), Some("for i in 0..3 {}"));
    }
}
