#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quiz_proctor::config::ProctorConfig;
use quiz_proctor::error::CaptureError;
use quiz_proctor::infrastructure::{
    BoundingBox, CameraDevice, CameraStream, FaceDetector, FaceLandmarks, FaceObservation, Frame,
    Point, VisibilityEvent, VisibilitySource,
};
use quiz_proctor::models::{Question, Quiz};
use quiz_proctor::workflow::{ProctorDevices, SessionSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// 摄像头被使用情况
#[derive(Debug, Default)]
pub struct CameraProbe {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub frames: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl CameraProbe {
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

enum Behavior {
    Grant,
    Deny,
    Delay(Duration),
}

pub struct FakeCamera {
    behavior: Behavior,
    release_latency: Option<Duration>,
    pub probe: Arc<CameraProbe>,
}

impl FakeCamera {
    pub fn granted() -> Self {
        Self::with(Behavior::Grant)
    }

    pub fn denied() -> Self {
        Self::with(Behavior::Deny)
    }

    /// 授权在 `delay` 之后才到达
    pub fn delayed(delay: Duration) -> Self {
        Self::with(Behavior::Delay(delay))
    }

    /// 释放轨道要花 `latency`，模拟浏览器往返
    pub fn slow_release(mut self, latency: Duration) -> Self {
        self.release_latency = Some(latency);
        self
    }

    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            release_latency: None,
            probe: Arc::new(CameraProbe::default()),
        }
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        match self.behavior {
            Behavior::Deny => return Err(CaptureError::camera_unavailable("NotAllowedError")),
            Behavior::Delay(delay) => tokio::time::sleep(delay).await,
            Behavior::Grant => {}
        }
        let mut stream = FakeStream::new(Arc::clone(&self.probe));
        stream.release_latency = self.release_latency;
        Ok(Box::new(stream))
    }

    async fn cancel_pending(&self) {
        self.probe.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeStream {
    probe: Arc<CameraProbe>,
    live: bool,
    sequence: u64,
    release_latency: Option<Duration>,
}

impl FakeStream {
    pub fn new(probe: Arc<CameraProbe>) -> Self {
        probe.acquired.fetch_add(1, Ordering::SeqCst);
        Self {
            probe,
            live: true,
            sequence: 0,
            release_latency: None,
        }
    }

    fn mark_released(&mut self) {
        if self.live {
            self.live = false;
            self.probe.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl CameraStream for FakeStream {
    async fn attach_and_play(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.live {
            return Err(CaptureError::StreamEnded);
        }
        self.sequence += 1;
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok(Frame {
            sequence: self.sequence,
            captured_at: Instant::now(),
        })
    }

    async fn release(&mut self) {
        if !self.live {
            return;
        }
        if let Some(latency) = self.release_latency {
            tokio::time::sleep(latency).await;
        }
        self.mark_released();
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.mark_released();
    }
}

/// 每 500ms 轮询一次页面、从不产生事件的可见性来源
#[derive(Default)]
pub struct PollingSource {
    pub polls: Arc<AtomicUsize>,
}

#[async_trait]
impl VisibilitySource for PollingSource {
    async fn next_event(&mut self) -> Option<VisibilityEvent> {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.polls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

type Scripted = Result<Vec<FaceObservation>, CaptureError>;

/// 按脚本返回结果的检测器，脚本用完后一直返回一张正脸
#[derive(Default)]
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Scripted>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    /// 每次推理耗时 `latency`
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<FaceObservation>, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(vec![face(120.0)]))
    }
}

/// 双眼外眼角在 x=100 和 x=140，鼻尖在 `nose_x`
pub fn face(nose_x: f64) -> FaceObservation {
    let mut points = vec![Point { x: 0.0, y: 0.0 }; FaceLandmarks::POINT_COUNT];
    points[30].x = nose_x;
    points[36].x = 100.0;
    points[45].x = 140.0;
    FaceObservation {
        bounding_box: BoundingBox {
            x: 80.0,
            y: 40.0,
            width: 80.0,
            height: 100.0,
        },
        landmarks: FaceLandmarks::new(points),
    }
}

/// 两道题：第 1 题答案用字母 B 指向 "4"，第 2 题答案直接写文本
pub fn sample_quiz() -> Quiz {
    Quiz::new(
        "QZ-2024",
        vec![
            Question::new("What is 2 + 2?", ["3", "4", "5", "6"], "B"),
            Question::new(
                "Capital of France?",
                ["Paris", "Rome", "Madrid", "Berlin"],
                "Paris",
            ),
        ],
    )
}

pub fn devices(
    camera: Option<Arc<dyn CameraDevice>>,
    detector: Arc<dyn FaceDetector>,
) -> ProctorDevices {
    ProctorDevices {
        camera,
        detector,
        visibility: None,
    }
}

/// 带可见性事件通道的设备
pub fn devices_with_visibility(
    camera: Option<Arc<dyn CameraDevice>>,
    detector: Arc<dyn FaceDetector>,
) -> (ProctorDevices, mpsc::UnboundedSender<VisibilityEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let devices = ProctorDevices {
        camera,
        detector,
        visibility: Some(Box::new(rx)),
    };
    (devices, tx)
}

pub fn proctor_config() -> ProctorConfig {
    ProctorConfig::default()
}

/// 等待快照满足条件；暂停时钟下超时会自动推进
pub async fn wait_until(
    updates: &mut watch::Receiver<SessionSnapshot>,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(300), updates.wait_for(predicate))
        .await
        .expect("等待快照超时")
        .expect("会话已关闭")
        .clone()
}
