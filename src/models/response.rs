use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// 考生作答记录
///
/// 每题至多一个选中值（单选语义），只能通过 `select` 修改。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TakerResponse {
    answers: Vec<Option<String>>,
}

impl TakerResponse {
    /// 为 `len` 道题创建全部未作答的记录
    pub fn new(len: usize) -> Self {
        Self {
            answers: vec![None; len],
        }
    }

    /// 直接由答案列表构造（测试和回放用）
    pub fn from_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(|a| a.map(Into::into)).collect(),
        }
    }

    /// 选择某题的答案，覆盖旧值
    pub fn select(&mut self, index: usize, option: impl Into<String>) -> Result<(), SessionError> {
        let len = self.answers.len();
        let slot = self
            .answers
            .get_mut(index)
            .ok_or(SessionError::QuestionOutOfRange { index, len })?;
        *slot = Some(option.into());
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.answers.get(index).and_then(|a| a.as_deref())
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    /// 未作答题目的下标（从 0 开始）；`expected` 超出记录长度的部分也算未作答
    pub fn unanswered(&self, expected: usize) -> Vec<usize> {
        (0..expected).filter(|&i| self.get(i).is_none()).collect()
    }
}
