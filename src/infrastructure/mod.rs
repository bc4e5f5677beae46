//! 基础设施层
//!
//! 持有稀缺资源（页面、摄像头、定时器），只暴露能力，不做违规判断

pub mod camera;
pub mod capture;
pub mod face_api;
pub mod js_executor;
pub mod visibility_probe;

pub use camera::{BrowserCamera, CameraDevice, CameraStream, Frame};
pub use capture::{CaptureManager, CaptureStatus, TickReport};
pub use face_api::{BoundingBox, BrowserFaceDetector, FaceDetector, FaceLandmarks, FaceObservation, Point};
pub use js_executor::JsExecutor;
pub use visibility_probe::{BrowserVisibilityProbe, VisibilityEvent, VisibilitySource};
