//! 人脸在场检测 - 业务能力层

use crate::infrastructure::face_api::FaceObservation;
use crate::services::violation::{Violation, ViolationKind};

/// 在场判断结果
#[derive(Debug, PartialEq)]
pub enum Presence<'a> {
    /// 恰好一张脸，继续做姿态判断
    Single(&'a FaceObservation),
    /// 没有脸或多张脸
    Violation(Violation),
}

/// 根据人脸框数量判断：0 张 → NoFace，多于 1 张 → MultipleFaces
pub fn check_presence(faces: &[FaceObservation]) -> Presence<'_> {
    match faces {
        [] => Presence::Violation(ViolationKind::NoFace.into()),
        [single] => Presence::Single(single),
        _ => Presence::Violation(ViolationKind::MultipleFaces.into()),
    }
}
