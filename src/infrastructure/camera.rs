//! 摄像头 - 基础设施层
//!
//! 持有摄像头视频流，只暴露"申请 / 取帧 / 释放"能力

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::infrastructure::JsExecutor;

/// 一帧画面的句柄
///
/// 浏览器实现里推理直接在 <video> 元素上进行，帧本身只携带序号和时间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub captured_at: Instant,
}

/// 摄像头设备
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// 申请摄像头权限并返回视频流；拒绝或无硬件时返回 `CameraUnavailable`
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, CaptureError>;

    /// 撤销进行中的申请
    ///
    /// 返回后，之后才到达的授权由设备自己停止轨道，不依赖调用方再去释放
    async fn cancel_pending(&self) {}
}

/// 已获得的视频流
///
/// `release` 必须可以重复调用，释放后流进入惰性状态
#[async_trait]
pub trait CameraStream: Send {
    /// 绑定到显示区域，等首帧元数据就绪后再开始播放
    async fn attach_and_play(&mut self) -> Result<(), CaptureError>;

    /// 取当前帧
    async fn frame(&mut self) -> Result<Frame, CaptureError>;

    /// 停止所有轨道并从显示区域解绑；返回时轨道已经停止
    async fn release(&mut self);
}

/// 页面内 getUserMedia 摄像头
///
/// 每个实例带一个令牌，撤销标记只对本实例发起的申请生效
pub struct BrowserCamera {
    executor: JsExecutor,
    video_element_id: String,
    token: String,
}

impl BrowserCamera {
    pub fn new(executor: JsExecutor, video_element_id: impl Into<String>) -> Self {
        let token = format!(
            "proctor-{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        Self {
            executor,
            video_element_id: video_element_id.into(),
            token,
        }
    }
}

#[async_trait]
impl CameraDevice for BrowserCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, CaptureError> {
        info!("📷 正在申请摄像头权限...");

        // 流挂在 window 上，后续 attach / release 都通过它操作
        // 授权回来时如果申请已被撤销，当场停掉轨道
        let js_code = format!(
            r#"
            (async () => {{
                const cancelled = () => window.__proctorCancelled === '{token}';
                if (cancelled()) {{ return {{ ok: false, error: 'cancelled' }}; }}
                try {{
                    const stream = await navigator.mediaDevices.getUserMedia({{ video: true }});
                    if (cancelled()) {{
                        stream.getTracks().forEach(track => track.stop());
                        return {{ ok: false, error: 'cancelled' }};
                    }}
                    window.__proctorStream = stream;
                    return {{ ok: true, tracks: stream.getTracks().length }};
                }} catch (error) {{
                    return {{ ok: false, error: String(error && error.name || error) }};
                }}
            }})()
            "#,
            token = self.token
        );

        let result = self
            .executor
            .eval(js_code)
            .await
            .map_err(|e| CaptureError::camera_unavailable(e.to_string()))?;

        if result.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let reason = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(CaptureError::CameraUnavailable { reason });
        }

        debug!("摄像头轨道数: {:?}", result.get("tracks"));
        Ok(Box::new(BrowserStream {
            executor: self.executor.clone(),
            video_element_id: self.video_element_id.clone(),
            sequence: 0,
            live: true,
        }))
    }

    async fn cancel_pending(&self) {
        let js_code = format!(
            r#"
            (() => {{
                window.__proctorCancelled = '{token}';
                {stop}
                return true;
            }})()
            "#,
            token = self.token,
            stop = stop_tracks_script(&self.video_element_id)
        );
        match self.executor.eval(js_code).await {
            Ok(_) => info!("📷 已撤销摄像头申请"),
            Err(e) => warn!("撤销摄像头申请失败: {}", e),
        }
    }
}

/// 停止 `window.__proctorStream` 的所有轨道并解绑画面
fn stop_tracks_script(video_element_id: &str) -> String {
    format!(
        r#"
                const stream = window.__proctorStream;
                if (stream) {{ stream.getTracks().forEach(track => track.stop()); }}
                const video = document.getElementById('{id}');
                if (video) {{ video.srcObject = null; }}
                window.__proctorStream = null;"#,
        id = video_element_id
    )
}

/// 页面内的视频流
pub struct BrowserStream {
    executor: JsExecutor,
    video_element_id: String,
    sequence: u64,
    live: bool,
}

#[async_trait]
impl CameraStream for BrowserStream {
    async fn attach_and_play(&mut self) -> Result<(), CaptureError> {
        let js_code = format!(
            r#"
            new Promise((resolve) => {{
                const video = document.getElementById('{id}');
                const stream = window.__proctorStream;
                if (!video || !stream) {{ resolve({{ ok: false, error: 'video or stream missing' }}); return; }}
                video.srcObject = stream;
                const play = () => video.play()
                    .then(() => resolve({{ ok: true }}))
                    .catch(e => resolve({{ ok: false, error: String(e) }}));
                if (video.readyState >= 1) {{ play(); }} else {{ video.onloadedmetadata = play; }}
            }})
            "#,
            id = self.video_element_id
        );

        let result = self
            .executor
            .eval(js_code)
            .await
            .map_err(|e| CaptureError::camera_unavailable(e.to_string()))?;

        if result.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            info!("✓ 摄像头画面已开始播放");
            Ok(())
        } else {
            Err(CaptureError::camera_unavailable(
                result
                    .get("error")
                    .map(|e| e.to_string())
                    .unwrap_or_default(),
            ))
        }
    }

    async fn frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.live {
            return Err(CaptureError::StreamEnded);
        }
        self.sequence += 1;
        Ok(Frame {
            sequence: self.sequence,
            captured_at: Instant::now(),
        })
    }

    async fn release(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;

        match self.executor.eval(self.release_script()).await {
            Ok(_) => info!("📷 摄像头已释放"),
            Err(e) => warn!("释放摄像头失败: {}", e),
        }
    }
}

impl BrowserStream {
    fn release_script(&self) -> String {
        format!(
            "(() => {{{}\n                return true;\n            }})()",
            stop_tracks_script(&self.video_element_id)
        )
    }
}

impl Drop for BrowserStream {
    fn drop(&mut self) {
        if self.live {
            // 同步场景无法等待，只能交给后台执行
            warn!("视频流未显式释放，在 Drop 中释放");
            self.live = false;
            self.executor.spawn_eval(self.release_script());
        }
    }
}
