//! 采集资源管理 - 基础设施层
//!
//! 唯一持有摄像头视频流和检测定时器的模块。
//!
//! ## 生命周期
//!
//! ```text
//! Idle ──begin_acquire──▶ Acquiring ──start──▶ Live ──stop──▶ Released
//!                              │                                 ▲
//!                              └──────── 拒绝 ──▶ Unavailable ─┘
//! ```
//!
//! - 检测循环是单个顺序任务：取帧 → 推理 → 上报，上一轮没结束下一轮不会开始
//! - `stop()` 可以重复调用，也可以在从未启动时调用；返回时轨道已经停止，
//!   进行中的申请已在设备侧撤销
//! - 超时不会放弃申请，授权迟到时照样可以 `start`
//! - Drop 只能尽力而为：撤销申请和释放都交给后台任务

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::infrastructure::camera::{CameraDevice, CameraStream};
use crate::infrastructure::face_api::{FaceDetector, FaceObservation};

/// 采集状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    /// 尚未申请摄像头
    Idle,
    /// 正在等待授权
    Acquiring,
    /// 画面播放中，检测定时器运行中
    Live,
    /// 没有摄像头，监考降级为只看切屏
    Unavailable(String),
    /// 已释放，之后的 stop 都是空操作
    Released,
}

/// 一轮检测的原始结果
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sequence: u64,
    pub observed: Result<Vec<FaceObservation>, CaptureError>,
}

type Acquisition = JoinHandle<Result<Box<dyn CameraStream>, CaptureError>>;

/// 采集资源管理器
pub struct CaptureManager {
    period: Duration,
    status: CaptureStatus,
    acquisition: Option<Acquisition>,
    device: Option<Arc<dyn CameraDevice>>,
    detection: Option<JoinHandle<()>>,
    cancel: Option<watch::Sender<bool>>,
}

impl CaptureManager {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            status: CaptureStatus::Idle,
            acquisition: None,
            device: None,
            detection: None,
            cancel: None,
        }
    }

    pub fn status(&self) -> &CaptureStatus {
        &self.status
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquisition.is_some()
    }

    /// 检测定时器是否仍在运行
    pub fn is_timer_active(&self) -> bool {
        self.detection
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 在后台申请摄像头，授权后绑定画面并等首帧元数据就绪再播放
    ///
    /// 不阻塞调用方；结果通过 [`CaptureManager::acquisition`] 取得
    pub fn begin_acquire(&mut self, device: Arc<dyn CameraDevice>) {
        if self.status != CaptureStatus::Idle {
            debug!("摄像头已申请过，忽略重复申请");
            return;
        }
        self.status = CaptureStatus::Acquiring;
        self.device = Some(Arc::clone(&device));
        self.acquisition = Some(tokio::spawn(async move {
            let mut stream = device.acquire().await?;
            if let Err(e) = stream.attach_and_play().await {
                stream.release().await;
                return Err(e);
            }
            Ok(stream)
        }));
    }

    /// 等待摄像头申请结果；没有进行中的申请时永远挂起
    ///
    /// 可安全地放在 `tokio::select!` 分支中
    pub async fn acquisition(&mut self) -> Result<Box<dyn CameraStream>, CaptureError> {
        let Some(handle) = self.acquisition.as_mut() else {
            return std::future::pending().await;
        };
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(CaptureError::camera_unavailable(e.to_string())),
        };
        self.acquisition = None;
        if let Err(e) = &outcome {
            self.status = CaptureStatus::Unavailable(e.to_string());
        }
        outcome
    }

    /// 声明没有摄像头可用；只在尚未申请时生效
    pub fn mark_unavailable(&mut self, reason: &str) {
        if self.status == CaptureStatus::Idle {
            warn!("⚠️ 没有摄像头: {}", reason);
            self.status = CaptureStatus::Unavailable(reason.to_string());
        }
    }

    /// 接管视频流并启动检测定时器
    ///
    /// 已经释放过的管理器不会再启动，传入的流会被立即释放
    pub async fn start(
        &mut self,
        mut stream: Box<dyn CameraStream>,
        detector: Arc<dyn FaceDetector>,
        reports: mpsc::UnboundedSender<TickReport>,
    ) {
        if matches!(self.status, CaptureStatus::Released | CaptureStatus::Live) {
            debug!("采集已结束或已在运行，释放多余的视频流");
            stream.release().await;
            return;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let period = self.period;
        self.detection = Some(tokio::spawn(detection_loop(
            stream, detector, reports, period, cancel_rx,
        )));
        self.cancel = Some(cancel_tx);
        self.status = CaptureStatus::Live;
        info!("⏱️ 检测定时器已启动，周期 {:?}", period);
    }

    /// 停止所有轨道、解绑画面、清除定时器
    ///
    /// 可重复调用；返回时检测任务已经结束，视频流已经释放
    pub async fn stop(&mut self) {
        if let Some(handle) = self.acquisition.take() {
            if let Some(device) = &self.device {
                device.cancel_pending().await;
            }
            release_when_ready(handle);
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        if let Some(handle) = self.detection.take() {
            if let Err(e) = handle.await {
                warn!("检测任务异常结束: {}", e);
            }
        }
        if self.status != CaptureStatus::Released {
            info!("⏹️ 采集资源已释放");
            self.status = CaptureStatus::Released;
        }
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        if let Some(handle) = self.acquisition.take() {
            let device = self.device.take();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Some(device) = device {
                        device.cancel_pending().await;
                    }
                    release_late_stream(handle).await;
                });
            }
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(true);
        }
        // 检测任务收到取消信号后自行释放视频流
        self.detection.take();
    }
}

/// 设备侧已撤销时这里只是兜底：授权若仍然交到了 Rust 这边，就地释放
fn release_when_ready(handle: Acquisition) {
    tokio::spawn(release_late_stream(handle));
}

async fn release_late_stream(handle: Acquisition) {
    if let Ok(Ok(mut stream)) = handle.await {
        debug!("迟到的视频流，立即释放");
        stream.release().await;
    }
}

async fn detection_loop(
    mut stream: Box<dyn CameraStream>,
    detector: Arc<dyn FaceDetector>,
    reports: mpsc::UnboundedSender<TickReport>,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // 推理慢于周期时跳过错过的轮次，不会补跑也不会并发
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }

        let observed = tokio::select! {
            _ = cancel.changed() => break,
            observed = inspect(stream.as_mut(), detector.as_ref()) => observed,
        };
        let sequence = match &observed {
            Ok((sequence, _)) => *sequence,
            Err(_) => 0,
        };
        let report = TickReport {
            sequence,
            observed: observed.map(|(_, faces)| faces),
        };
        if reports.send(report).is_err() {
            debug!("检测结果接收方已关闭，结束检测循环");
            break;
        }
    }

    stream.release().await;
}

async fn inspect(
    stream: &mut dyn CameraStream,
    detector: &dyn FaceDetector,
) -> Result<(u64, Vec<FaceObservation>), CaptureError> {
    let frame = stream.frame().await?;
    let faces = detector.detect(&frame).await?;
    Ok((frame.sequence, faces))
}
