//! 判分服务 - 业务能力层
//!
//! 答案可以写成字母（A → 第 0 个选项）也可以直接写选项原文。
//! 比较一律使用精确字符串相等（区分大小写和空白）。

use serde::Serialize;

use crate::error::SessionError;
use crate::models::quiz::{Question, Quiz};
use crate::models::response::TakerResponse;
use crate::services::render::{render_question, RenderedQuestion};

/// 解析后的标准答案
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKey<'a> {
    /// 唯一匹配一个选项
    Unique { index: usize, text: &'a str },
    /// 匹配到 0 个或多个选项，不给分
    Ambiguous { text: &'a str, matches: usize },
    /// 字母超出选项范围，不给分
    Unresolvable,
}

impl<'a> AnswerKey<'a> {
    pub fn correct_text(&self) -> Option<&'a str> {
        match self {
            AnswerKey::Unique { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// 把答案映射到它所指的选项原文
///
/// 单个大写字母按 `letter - 'A'` 取选项；其余一律视为原文，不做模糊匹配
pub fn resolve(question: &Question) -> Option<&str> {
    let spec = question.answer_spec.as_str();
    match letter_index(spec) {
        Some(index) => question.options.get(index).map(String::as_str),
        None => Some(spec),
    }
}

fn letter_index(spec: &str) -> Option<usize> {
    match spec.as_bytes() {
        [letter @ b'A'..=b'Z'] => Some((letter - b'A') as usize),
        _ => None,
    }
}

/// 解析答案并检查它是否恰好对应一个选项
pub fn answer_key(question: &Question) -> AnswerKey<'_> {
    let Some(text) = resolve(question) else {
        return AnswerKey::Unresolvable;
    };
    let positions: Vec<usize> = question
        .options
        .iter()
        .enumerate()
        .filter(|(_, option)| option.as_str() == text)
        .map(|(i, _)| i)
        .collect();
    match positions.as_slice() {
        [index] => AnswerKey::Unique {
            index: *index,
            text,
        },
        _ => AnswerKey::Ambiguous {
            text,
            matches: positions.len(),
        },
    }
}

/// 得分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    pub correct: usize,
    pub total: usize,
}

impl std::fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.correct, self.total)
    }
}

/// 计算得分；有未作答题目时返回 `IncompleteSubmission`
///
/// 纯函数，可以为答案回顾重复调用
pub fn score(quiz: &Quiz, responses: &TakerResponse) -> Result<ScoreReport, SessionError> {
    let unanswered = responses.unanswered(quiz.len());
    if !unanswered.is_empty() {
        return Err(SessionError::IncompleteSubmission {
            unanswered: unanswered.into_iter().map(|i| i + 1).collect(),
        });
    }

    let correct = quiz
        .questions
        .iter()
        .enumerate()
        .filter(|(i, question)| is_correct(question, responses.get(*i)))
        .count();

    Ok(ScoreReport {
        correct,
        total: quiz.len(),
    })
}

fn is_correct(question: &Question, answer: Option<&str>) -> bool {
    match (answer_key(question).correct_text(), answer) {
        (Some(correct), Some(answer)) => correct == answer,
        _ => false,
    }
}

/// 单题判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Correct,
    Incorrect,
    /// 标准答案有歧义，不计分
    Unscorable,
}

/// 回顾视图中的一个选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionReview {
    pub is_correct: bool,
    pub is_your_answer: bool,
}

/// 回顾视图中的一道题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionReview {
    pub question: RenderedQuestion,
    pub your_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub verdict: Verdict,
    pub options: Vec<OptionReview>,
}

/// 生成答案回顾（每题标注正确答案和考生答案）
pub fn review(quiz: &Quiz, responses: &TakerResponse) -> Vec<QuestionReview> {
    quiz.questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let key = answer_key(question);
            let correct = key.correct_text();
            let yours = responses.get(i);
            let verdict = match correct {
                None => Verdict::Unscorable,
                Some(_) if is_correct(question, yours) => Verdict::Correct,
                Some(_) => Verdict::Incorrect,
            };
            QuestionReview {
                question: render_question(i, question),
                your_answer: yours.map(str::to_string),
                correct_answer: correct.map(str::to_string),
                verdict,
                options: question
                    .options
                    .iter()
                    .map(|option| OptionReview {
                        is_correct: Some(option.as_str()) == correct,
                        is_your_answer: Some(option.as_str()) == yours,
                    })
                    .collect(),
            }
        })
        .collect()
}
