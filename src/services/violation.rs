//! 违规累计服务 - 业务能力层
//!
//! 只负责"计数并在达到阈值时取消资格"，不关心违规来自哪个检测器

use serde::Serialize;
use tracing::{error, warn};

/// 违规类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    HeadTurnedLeft,
    HeadTurnedRight,
    TabOrWindowSwitch,
}

impl ViolationKind {
    /// 界面上显示的提示
    pub fn message(self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face detected. Please stay in front of the camera.",
            ViolationKind::MultipleFaces => "Multiple faces detected! This is a violation.",
            ViolationKind::HeadTurnedLeft => "Head turned left.",
            ViolationKind::HeadTurnedRight => "Head turned right.",
            ViolationKind::TabOrWindowSwitch => {
                "You have switched the tab. Please return to the quiz."
            }
        }
    }
}

/// 一次违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

impl From<ViolationKind> for Violation {
    fn from(kind: ViolationKind) -> Self {
        Violation::new(kind)
    }
}

/// 违规记录：计数只增不减，取消资格后不可恢复
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ViolationRecord {
    pub count: u32,
    pub disqualified: bool,
    pub reason: Option<String>,
}

/// 一次记录的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationOutcome {
    /// 计入，尚未达到阈值
    Counted { count: u32 },
    /// 本次记录触发取消资格（只会出现一次）
    Disqualified { count: u32 },
    /// 已取消资格，忽略
    Ignored,
}

/// 违规累计器
#[derive(Debug, Clone)]
pub struct ViolationAccumulator {
    record: ViolationRecord,
    threshold: u32,
}

impl ViolationAccumulator {
    pub fn new(threshold: u32) -> Self {
        Self {
            record: ViolationRecord::default(),
            threshold: threshold.max(1),
        }
    }

    pub fn record(&self) -> &ViolationRecord {
        &self.record
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_disqualified(&self) -> bool {
        self.record.disqualified
    }

    /// 记录一次违规（每轮检测最多调用一次）
    pub fn record_violation(&mut self, reason: impl Into<String>) -> ViolationOutcome {
        if self.record.disqualified {
            return ViolationOutcome::Ignored;
        }

        self.record.count += 1;
        self.record.reason = Some(reason.into());
        let count = self.record.count;

        if count >= self.threshold {
            self.record.disqualified = true;
            error!("🚫 违规 {}/{}，取消考试资格", count, self.threshold);
            ViolationOutcome::Disqualified { count }
        } else {
            warn!(
                "⚠️ 监考违规 {}/{}: {}",
                count,
                self.threshold,
                self.record.reason.as_deref().unwrap_or_default()
            );
            ViolationOutcome::Counted { count }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_violations_do_not_disqualify() {
        let mut acc = ViolationAccumulator::new(3);
        assert_eq!(acc.record_violation("a"), ViolationOutcome::Counted { count: 1 });
        assert_eq!(acc.record_violation("b"), ViolationOutcome::Counted { count: 2 });
        assert!(!acc.is_disqualified());
    }

    #[test]
    fn third_violation_disqualifies_exactly_once() {
        let mut acc = ViolationAccumulator::new(3);
        acc.record_violation("a");
        acc.record_violation("b");
        assert_eq!(
            acc.record_violation("Head turned left."),
            ViolationOutcome::Disqualified { count: 3 }
        );
        assert_eq!(acc.record_violation("d"), ViolationOutcome::Ignored);
        assert_eq!(acc.record().count, 3);
        assert!(acc.record().disqualified);
        assert_eq!(acc.record().reason.as_deref(), Some("Head turned left."));
    }

    #[test]
    fn violation_carries_ui_message() {
        let violation = Violation::new(ViolationKind::MultipleFaces);
        assert_eq!(violation.message, "Multiple faces detected! This is a violation.");
    }
}
