//! 人脸检测 - 基础设施层
//!
//! 只暴露"对当前画面做一次推理"的能力，不判断是否违规

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CaptureError;
use crate::infrastructure::camera::Frame;
use crate::infrastructure::JsExecutor;

/// 二维坐标点（像素）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// 人脸框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 68 点人脸关键点
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<Point>,
}

impl FaceLandmarks {
    pub const POINT_COUNT: usize = 68;
    // 鼻子 27..=35，鼻尖是鼻子段的第 4 个点
    const NOSE_TIP: usize = 30;
    // 左眼 36..=41，外眼角是第 1 个点
    const LEFT_EYE_OUTER: usize = 36;
    // 右眼 42..=47，外眼角是第 4 个点
    const RIGHT_EYE_OUTER: usize = 45;

    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// 点数不是 68 时不可用
    pub fn is_complete(&self) -> bool {
        self.points.len() == Self::POINT_COUNT
    }

    pub fn nose_tip(&self) -> Option<Point> {
        self.point(Self::NOSE_TIP)
    }

    pub fn left_eye_outer(&self) -> Option<Point> {
        self.point(Self::LEFT_EYE_OUTER)
    }

    pub fn right_eye_outer(&self) -> Option<Point> {
        self.point(Self::RIGHT_EYE_OUTER)
    }

    fn point(&self, index: usize) -> Option<Point> {
        if !self.is_complete() {
            return None;
        }
        self.points.get(index).copied()
    }
}

/// 单张人脸的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub landmarks: FaceLandmarks,
}

/// 人脸检测能力
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// 对一帧画面做推理，返回所有检测到的人脸
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceObservation>, CaptureError>;
}

/// 基于页面内 face-api.js 的检测器
///
/// 职责：
/// - 加载 tinyFaceDetector / faceLandmark68Net 模型
/// - 在 <video> 元素上执行 detectAllFaces().withFaceLandmarks()
/// - 只返回原始框和关键点
pub struct BrowserFaceDetector {
    executor: JsExecutor,
    video_element_id: String,
    models_uri: String,
}

impl BrowserFaceDetector {
    pub fn new(executor: JsExecutor, video_element_id: impl Into<String>) -> Self {
        Self {
            executor,
            video_element_id: video_element_id.into(),
            models_uri: "/models".to_string(),
        }
    }

    /// 加载模型；失败只记录日志，之后每轮检测都会失败并按无违规处理
    pub async fn load_models(&self) -> bool {
        let js_code = format!(
            r#"
            (async () => {{
                try {{
                    await faceapi.nets.tinyFaceDetector.loadFromUri('{uri}');
                    await faceapi.nets.faceLandmark68Net.loadFromUri('{uri}');
                    return {{ ok: true }};
                }} catch (error) {{
                    return {{ ok: false, error: String(error) }};
                }}
            }})()
            "#,
            uri = self.models_uri
        );

        match self.executor.eval(js_code).await {
            Ok(result) if result.get("ok").and_then(|v| v.as_bool()) == Some(true) => {
                debug!("face-api 模型加载完成");
                true
            }
            Ok(result) => {
                warn!("⚠️ face-api 模型加载失败: {:?}", result.get("error"));
                false
            }
            Err(e) => {
                warn!("⚠️ face-api 模型加载失败: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl FaceDetector for BrowserFaceDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<FaceObservation>, CaptureError> {
        debug!("第 {} 帧: 执行人脸检测", frame.sequence);

        let js_code = format!(
            r#"
            (async () => {{
                const video = document.getElementById('{id}');
                if (!video) {{ return {{ error: 'video element not found' }}; }}
                try {{
                    const detections = await faceapi
                        .detectAllFaces(video, new faceapi.TinyFaceDetectorOptions())
                        .withFaceLandmarks();
                    return {{
                        faces: detections.map(d => ({{
                            box: {{
                                x: d.detection.box.x,
                                y: d.detection.box.y,
                                width: d.detection.box.width,
                                height: d.detection.box.height
                            }},
                            landmarks: {{ points: d.landmarks.positions.map(p => ({{ x: p.x, y: p.y }})) }}
                        }}))
                    }};
                }} catch (error) {{
                    return {{ error: String(error) }};
                }}
            }})()
            "#,
            id = self.video_element_id
        );

        let result = self
            .executor
            .eval(js_code)
            .await
            .map_err(|e| CaptureError::detection_failure(e.to_string()))?;

        if let Some(error) = result.get("error") {
            return Err(CaptureError::detection_failure(error.to_string()));
        }

        let faces = result
            .get("faces")
            .cloned()
            .ok_or_else(|| CaptureError::detection_failure("missing faces field"))?;
        serde_json::from_value(faces).map_err(|e| CaptureError::detection_failure(e.to_string()))
    }
}
