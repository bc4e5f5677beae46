use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 承载摄像头预览和 face-api.js 的考试页面
    pub target_url: String,
    /// 考试页面中 <video> 元素的 id
    pub video_element_id: String,
    /// 准入环节交给我们的试卷 JSON 文件
    pub quiz_file: String,
    /// 监考参数 TOML 文件（可选，不存在时使用默认值）
    pub proctor_config_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 2001,
            target_url: "http://localhost:3000/quiz-access".to_string(),
            video_element_id: "proctor-video".to_string(),
            quiz_file: "quiz.json".to_string(),
            proctor_config_file: None,
            verbose_logging: false,
            output_log_file: "session.log".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.browser_debug_port),
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            video_element_id: std::env::var("VIDEO_ELEMENT_ID").unwrap_or(default.video_element_id),
            quiz_file: std::env::var("QUIZ_FILE").unwrap_or(default.quiz_file),
            proctor_config_file: std::env::var("PROCTOR_CONFIG_FILE").ok().or(default.proctor_config_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 严格版本：环境变量存在但无法解析时报错，而不是静默回退
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_env();
        if let Ok(value) = std::env::var("BROWSER_DEBUG_PORT") {
            config.browser_debug_port = parse_env("BROWSER_DEBUG_PORT", &value, "u16")?;
        }
        if let Ok(value) = std::env::var("VERBOSE_LOGGING") {
            config.verbose_logging = parse_env("VERBOSE_LOGGING", &value, "bool")?;
        }
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(
    var_name: &str,
    value: &str,
    expected_type: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::EnvVarParseFailed {
        var_name: var_name.to_string(),
        value: value.to_string(),
        expected_type: expected_type.to_string(),
    })
}

/// 监考校准参数
///
/// 所有阈值和节奏都是经验值，没有标定依据，所以全部做成可配置项。
/// TOML 中时间字段以毫秒书写。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    /// 人脸 / 头部姿态检测周期
    #[serde(rename = "detection_period_ms", with = "millis")]
    pub detection_period: Duration,
    /// 警告自动消失的延迟
    #[serde(rename = "warning_clear_delay_ms", with = "millis")]
    pub warning_clear_delay: Duration,
    /// 达到该违规次数即取消考试资格
    pub violation_threshold: u32,
    /// 鼻尖偏移比例高于该值判为向左转头
    pub pose_left_ratio: f64,
    /// 鼻尖偏移比例低于该值判为向右转头
    pub pose_right_ratio: f64,
    /// 等待摄像头授权的最长时间，超时后按无摄像头继续
    #[serde(rename = "camera_acquire_timeout_ms", with = "millis")]
    pub camera_acquire_timeout: Duration,
    /// 切屏 / 失焦是否计入违规次数（默认只提示不计数）
    pub count_focus_loss_as_violation: bool,
    /// 浏览器可见性轮询间隔
    #[serde(rename = "visibility_poll_interval_ms", with = "millis")]
    pub visibility_poll_interval: Duration,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            detection_period: Duration::from_secs(5),
            warning_clear_delay: Duration::from_secs(10),
            violation_threshold: 3,
            pose_left_ratio: 0.6,
            pose_right_ratio: 0.4,
            camera_acquire_timeout: Duration::from_secs(15),
            count_focus_loss_as_violation: false,
            visibility_poll_interval: Duration::from_millis(500),
        }
    }
}

impl ProctorConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProctorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.violation_threshold == 0 {
            return Err(ConfigError::InvalidCalibration(
                "violation_threshold 必须大于 0".to_string(),
            ));
        }
        if self.detection_period.is_zero() || self.warning_clear_delay.is_zero() {
            return Err(ConfigError::InvalidCalibration(
                "检测周期和警告延迟必须大于 0".to_string(),
            ));
        }
        if self.visibility_poll_interval.is_zero() {
            return Err(ConfigError::InvalidCalibration(
                "visibility_poll_interval 必须大于 0".to_string(),
            ));
        }
        if self.pose_right_ratio >= self.pose_left_ratio {
            return Err(ConfigError::InvalidCalibration(format!(
                "pose_right_ratio ({}) 必须小于 pose_left_ratio ({})",
                self.pose_right_ratio, self.pose_left_ratio
            )));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
