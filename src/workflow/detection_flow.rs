//! 单轮检测流程 - 流程层
//!
//! 流程顺序：
//! 1. 人脸数量判断（0 张 / 多张直接判违规）
//! 2. 恰好一张时做头部姿态判断
//! 3. 汇总成本轮结果，多个违规也只算一轮

use crate::error::CaptureError;
use crate::infrastructure::face_api::FaceObservation;
use crate::services::pose::{check_pose, PoseThresholds};
use crate::services::presence::{check_presence, Presence};
use crate::services::violation::Violation;

/// 一轮检测的结论
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// 没有违规
    Clean,
    /// 至少一个违规
    Violations(Vec<Violation>),
    /// 推理失败，按无违规处理
    Failed(CaptureError),
}

impl TickOutcome {
    /// 用于界面显示和违规原因的第一条消息
    pub fn headline(&self) -> Option<&str> {
        match self {
            TickOutcome::Violations(violations) => violations.first().map(|v| v.message.as_str()),
            _ => None,
        }
    }
}

/// 检测流程
///
/// - 只编排检测器，不持有摄像头
/// - 不计数，不改变会话状态
#[derive(Debug, Clone, Copy)]
pub struct DetectionFlow {
    thresholds: PoseThresholds,
}

impl DetectionFlow {
    pub fn new(thresholds: PoseThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, observed: &Result<Vec<FaceObservation>, CaptureError>) -> TickOutcome {
        let faces = match observed {
            Ok(faces) => faces,
            Err(e) => return TickOutcome::Failed(e.clone()),
        };

        let mut violations = Vec::new();
        match check_presence(faces) {
            Presence::Violation(violation) => violations.push(violation),
            Presence::Single(face) => {
                if let Some(violation) = check_pose(&face.landmarks, self.thresholds) {
                    violations.push(violation);
                }
            }
        }

        if violations.is_empty() {
            TickOutcome::Clean
        } else {
            TickOutcome::Violations(violations)
        }
    }
}
