//! 会话上下文
//!
//! 封装"我正在监考哪一场考试"这一信息，用于日志前缀

use std::fmt::Display;

/// 会话上下文
#[derive(Debug, Clone)]
pub struct SessionCtx {
    /// 考试码
    pub quiz_code: String,

    /// 题目数量
    pub question_count: usize,
}

impl SessionCtx {
    pub fn new(quiz_code: impl Into<String>, question_count: usize) -> Self {
        Self {
            quiz_code: quiz_code.into(),
            question_count,
        }
    }
}

impl Display for SessionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 {}]", self.quiz_code)
    }
}
