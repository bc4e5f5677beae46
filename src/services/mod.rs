//! 业务能力层
//!
//! 每个模块只描述"我能做什么"，不持有资源，不关心流程顺序

pub mod pose;
pub mod presence;
pub mod render;
pub mod scoring;
pub mod violation;
pub mod visibility;
pub mod warning;

pub use pose::{check_pose, PoseThresholds};
pub use presence::{check_presence, Presence};
pub use render::{render_question, RenderedOption, RenderedQuestion};
pub use scoring::{answer_key, resolve, review, score, AnswerKey, QuestionReview, ScoreReport, Verdict};
pub use violation::{Violation, ViolationAccumulator, ViolationKind, ViolationOutcome, ViolationRecord};
pub use visibility::{FocusSignal, VisibilityWatcher};
pub use warning::{Warning, WarningBoard, WarningChannel};
