use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 摄像头 / 检测相关错误
    #[error("采集错误: {0}")]
    Capture(#[from] CaptureError),
    /// 会话操作错误
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 试卷数据错误
    #[error("试卷数据错误: {0}")]
    Payload(#[from] PayloadError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 摄像头与检测错误
///
/// 两者都不会中断答题：前者让监考降级为只看切屏，后者按"本轮无违规"处理。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// 权限被拒绝或没有硬件
    #[error("摄像头不可用: {reason}")]
    CameraUnavailable { reason: String },
    /// 单轮推理失败
    #[error("人脸检测失败: {reason}")]
    DetectionFailure { reason: String },
    /// 视频流已经结束
    #[error("视频流已结束")]
    StreamEnded,
}

/// 会话操作错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// 提交时仍有未作答的题目（题号从 1 开始）
    #[error("请先完成所有题目再提交，未作答: {unanswered:?}")]
    IncompleteSubmission { unanswered: Vec<usize> },
    /// 当前状态不允许该操作
    #[error("状态 {state} 下不允许操作: {action}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
    /// 题目索引越界
    #[error("题目索引 {index} 超出范围 [0, {len})")]
    QuestionOutOfRange { index: usize, len: usize },
    /// 选项索引越界
    #[error("选项索引 {index} 超出范围 [0, {len})")]
    OptionOutOfRange { index: usize, len: usize },
    /// 尚未打开结束确认就直接确认结束
    #[error("尚未请求结束考试")]
    EndNotRequested,
    /// 会话任务已退出
    #[error("会话已关闭")]
    SessionClosed,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    TomlParseFailed(#[from] toml::de::Error),
    /// 校准参数不合法
    #[error("监考参数不合法: {0}")]
    InvalidCalibration(String),
}

/// 试卷数据错误
#[derive(Debug, Error)]
pub enum PayloadError {
    /// 读取试卷文件失败
    #[error("读取试卷文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    JsonParseFailed(#[from] serde_json::Error),
    /// 选项数量不是 4 个
    #[error("第 {number} 题应有 4 个选项，实际为 {count} 个")]
    WrongOptionCount { number: usize, count: usize },
    /// 没有题目
    #[error("试卷 {quiz_code} 没有任何题目")]
    EmptyQuiz { quiz_code: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(Box::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Payload(PayloadError::JsonParseFailed(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl CaptureError {
    /// 创建摄像头不可用错误
    pub fn camera_unavailable(reason: impl Into<String>) -> Self {
        CaptureError::CameraUnavailable {
            reason: reason.into(),
        }
    }

    /// 创建检测失败错误
    pub fn detection_failure(reason: impl Into<String>) -> Self {
        CaptureError::DetectionFailure {
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
