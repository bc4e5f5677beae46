//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 管理应用生命周期，装配设备并把考生输入交给会话。
//!
//! ## 层次关系
//!
//! ```text
//! quiz_runner (App：浏览器、设备、终端交互)
//!     ↓
//! workflow::session (状态机：一场会话)
//!     ↓
//! workflow::detection_flow (单轮检测结果判定)
//!     ↓
//! services (能力层：presence / pose / visibility / warning / violation / scoring)
//!     ↓
//! infrastructure (基础设施：JsExecutor、摄像头、采集管理)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有 Browser
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和显示，不做监考判断

pub mod quiz_runner;

pub use quiz_runner::{parse_command, App, TakerCommand};
