//! 页面可见性探针 - 基础设施层
//!
//! 只负责产出原始的可见性 / 焦点变化事件

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::infrastructure::JsExecutor;

/// 原始页面事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityEvent {
    /// document.hidden 变为 true（切换了标签页）
    Hidden,
    /// document.hidden 变为 false
    Visible,
    /// 窗口失去焦点（切换窗口或最小化）
    Blur,
    /// 窗口重新获得焦点
    Focus,
}

/// 可见性事件来源
#[async_trait]
pub trait VisibilitySource: Send {
    /// 等待下一个事件；来源关闭时返回 None
    async fn next_event(&mut self) -> Option<VisibilityEvent>;
}

#[async_trait]
impl VisibilitySource for mpsc::UnboundedReceiver<VisibilityEvent> {
    async fn next_event(&mut self) -> Option<VisibilityEvent> {
        self.recv().await
    }
}

#[async_trait]
impl VisibilitySource for mpsc::Receiver<VisibilityEvent> {
    async fn next_event(&mut self) -> Option<VisibilityEvent> {
        self.recv().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct PageState {
    hidden: bool,
    focused: bool,
}

/// 轮询页面状态的探针
///
/// CDP 不直接推送 visibilitychange，这里按固定间隔比较前后两次状态
pub struct BrowserVisibilityProbe {
    executor: JsExecutor,
    poll_interval: Duration,
    last: Option<PageState>,
    pending: VecDeque<VisibilityEvent>,
}

impl BrowserVisibilityProbe {
    pub fn new(executor: JsExecutor, poll_interval: Duration) -> Self {
        Self {
            executor,
            poll_interval,
            last: None,
            pending: VecDeque::new(),
        }
    }

    async fn poll_state(&self) -> Option<PageState> {
        let js_code = "({ hidden: document.hidden, focused: document.hasFocus() })";
        match self.executor.eval_as::<PageState>(js_code).await {
            Ok(state) => Some(state),
            Err(e) => {
                debug!("读取页面可见性失败: {}", e);
                None
            }
        }
    }
}

fn transitions(previous: PageState, current: PageState) -> Vec<VisibilityEvent> {
    let mut events = Vec::new();
    if previous.hidden != current.hidden {
        events.push(if current.hidden {
            VisibilityEvent::Hidden
        } else {
            VisibilityEvent::Visible
        });
    }
    if previous.focused != current.focused {
        events.push(if current.focused {
            VisibilityEvent::Focus
        } else {
            VisibilityEvent::Blur
        });
    }
    events
}

#[async_trait]
impl VisibilitySource for BrowserVisibilityProbe {
    async fn next_event(&mut self) -> Option<VisibilityEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            tokio::time::sleep(self.poll_interval).await;

            let Some(current) = self.poll_state().await else {
                continue;
            };
            // 首次读取只记录基线
            if let Some(previous) = self.last.replace(current) {
                self.pending.extend(transitions(previous, current));
            }
        }
    }
}
