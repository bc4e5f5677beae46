//! # Quiz Proctor
//!
//! 带摄像头监考的限时答题会话引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page、视频流、检测定时器），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `CaptureManager` - 唯一的视频流和定时器 owner，保证释放
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，都是纯逻辑
//! - `presence` / `pose` - 人脸数量与头部姿态判定
//! - `visibility` / `warning` - 切屏监控与警告去抖
//! - `violation` / `scoring` - 违规累计与判分
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一场会话"的完整状态机
//! - `SessionCtx` - 上下文封装（quiz_code + 题目数）
//! - `DetectionFlow` - 单轮检测（presence → pose → violation）
//! - `session` - 状态机 actor（Initializing → Active → 终止状态）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/quiz_runner` - 连接浏览器、装配设备、终端交互
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use config::{Config, ProctorConfig};
pub use error::{AppError, AppResult, CaptureError, SessionError};
pub use infrastructure::JsExecutor;
pub use models::{Question, Quiz, TakerResponse};
pub use orchestrator::App;
pub use workflow::{start_session, ProctorDevices, SessionHandle, SessionSnapshot, SessionState};
