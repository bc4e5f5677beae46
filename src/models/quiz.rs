use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// 每道题固定的选项个数
pub const OPTIONS_PER_QUESTION: usize = 4;

/// 单道选择题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 题干，可能以 `code:` 标记嵌入一段代码
    #[serde(rename = "question")]
    pub text: String,
    /// 四个选项原文
    pub options: Vec<String>,
    /// 答案：单个大写字母 A-D，或与某个选项完全一致的原文
    #[serde(rename = "answer")]
    pub answer_spec: String,
    /// 出题方给的题号，缺省时按位置编号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_number: Option<u32>,
}

impl Question {
    pub fn new(
        text: impl Into<String>,
        options: [&str; OPTIONS_PER_QUESTION],
        answer_spec: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
            answer_spec: answer_spec.into(),
            question_number: None,
        }
    }

    /// 显示用题号；缺失或为 0 时按位置编号
    pub fn display_number(&self, index: usize) -> u32 {
        self.question_number
            .filter(|n| *n > 0)
            .unwrap_or(index as u32 + 1)
    }
}

/// 试卷（由准入环节校验过访问码和时间窗口后交给会话，只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub quiz_code: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub end_time: String,
    /// 考试时长（分钟）
    #[serde(default, deserialize_with = "deserialize_minutes")]
    pub quiz_duration: Option<u32>,
    pub questions: Vec<Question>,
}

impl Quiz {
    pub fn new(quiz_code: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            quiz_code: quiz_code.into(),
            access_key: String::new(),
            subject: String::new(),
            topic: String::new(),
            start_date: String::new(),
            start_time: String::new(),
            end_date: String::new(),
            end_time: String::new(),
            quiz_duration: None,
            questions,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// 开放时间窗口 `(startAt, endAt)`，任一端无法解析时返回 None
    pub fn activation_window(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = combine(&self.start_date, &self.start_time)?;
        let end = combine(&self.end_date, &self.end_time)?;
        Some((start, end))
    }
}

fn combine(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .ok()?;
    Some(NaiveDateTime::new(date, time))
}

// 表单里时长可能存成字符串也可能是数字
fn deserialize_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct MinutesVisitor;

    impl<'de> Visitor<'de> for MinutesVisitor {
        type Value = Option<u32>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer number of minutes")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed.parse().map(Some).map_err(E::custom)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u32::try_from(value).map(Some).map_err(E::custom)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            u32::try_from(value).map(Some).map_err(E::custom)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(MinutesVisitor)
}
