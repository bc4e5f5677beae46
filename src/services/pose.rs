//! 头部姿态检测 - 业务能力层
//!
//! 用鼻尖相对两外眼角的水平位置估计是否转头：
//!
//! ```text
//! eye_span    = right_eye_x - left_eye_x
//! nose_offset = nose_x - left_eye_x
//! r           = nose_offset / eye_span
//! ```
//!
//! `r > left_ratio` 判为向左转头，`r < right_ratio` 判为向右转头。

use crate::config::ProctorConfig;
use crate::infrastructure::face_api::FaceLandmarks;
use crate::services::violation::{Violation, ViolationKind};

/// 姿态阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseThresholds {
    pub left_ratio: f64,
    pub right_ratio: f64,
}

impl Default for PoseThresholds {
    fn default() -> Self {
        Self {
            left_ratio: 0.6,
            right_ratio: 0.4,
        }
    }
}

impl From<&ProctorConfig> for PoseThresholds {
    fn from(config: &ProctorConfig) -> Self {
        Self {
            left_ratio: config.pose_left_ratio,
            right_ratio: config.pose_right_ratio,
        }
    }
}

/// 鼻尖偏移比例；眼距不为正时无法计算
pub fn offset_ratio(nose_x: f64, left_eye_x: f64, right_eye_x: f64) -> Option<f64> {
    let eye_span = right_eye_x - left_eye_x;
    if eye_span <= 0.0 || !eye_span.is_finite() {
        return None;
    }
    let ratio = (nose_x - left_eye_x) / eye_span;
    ratio.is_finite().then_some(ratio)
}

/// 对比例套用阈值
pub fn classify_ratio(ratio: f64, thresholds: PoseThresholds) -> Option<ViolationKind> {
    if ratio > thresholds.left_ratio {
        Some(ViolationKind::HeadTurnedLeft)
    } else if ratio < thresholds.right_ratio {
        Some(ViolationKind::HeadTurnedRight)
    } else {
        None
    }
}

/// 对一张脸的关键点做姿态判断；关键点不完整时不判违规
pub fn check_pose(landmarks: &FaceLandmarks, thresholds: PoseThresholds) -> Option<Violation> {
    let nose = landmarks.nose_tip()?;
    let left = landmarks.left_eye_outer()?;
    let right = landmarks.right_eye_outer()?;
    let ratio = offset_ratio(nose.x, left.x, right.x)?;
    classify_ratio(ratio, thresholds).map(Violation::new)
}
