use crate::error::PayloadError;
use crate::models::quiz::{Quiz, OPTIONS_PER_QUESTION};
use std::path::Path;
use tokio::fs;

/// 从准入环节导出的 JSON 文件加载试卷
pub async fn load_quiz_payload(path: &Path) -> Result<Quiz, PayloadError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| PayloadError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

    let quiz = parse_quiz_payload(&content)?;
    tracing::info!(
        "成功加载试卷 {}: {} 个题目",
        quiz.quiz_code,
        quiz.questions.len()
    );
    Ok(quiz)
}

/// 解析试卷 JSON 并检查结构
pub fn parse_quiz_payload(content: &str) -> Result<Quiz, PayloadError> {
    let quiz: Quiz = serde_json::from_str(content)?;

    if quiz.questions.is_empty() {
        return Err(PayloadError::EmptyQuiz {
            quiz_code: quiz.quiz_code,
        });
    }

    for (index, question) in quiz.questions.iter().enumerate() {
        if question.options.len() != OPTIONS_PER_QUESTION {
            return Err(PayloadError::WrongOptionCount {
                number: question.display_number(index) as usize,
                count: question.options.len(),
            });
        }
    }

    Ok(quiz)
}
