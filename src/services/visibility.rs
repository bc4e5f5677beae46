//! 切屏检测 - 业务能力层
//!
//! 把原始的可见性 / 焦点事件转换成警告信号

use crate::infrastructure::visibility_probe::VisibilityEvent;
use crate::services::violation::ViolationKind;

/// 切换窗口或最小化时的提示
pub const WINDOW_SWITCH_MESSAGE: &str =
    "You have switched the window or minimized the tab. Please return to the quiz.";

/// 切屏信号
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusSignal {
    /// 离开页面；`new_episode` 表示这是本次离开的第一个事件
    Lost {
        message: &'static str,
        new_episode: bool,
    },
    /// 回到页面
    Regained,
}

/// 切屏状态追踪
///
/// 切换标签页时 hidden 和 blur 往往一起到达，两者属于同一次离开
#[derive(Debug, Default)]
pub struct VisibilityWatcher {
    away: bool,
}

impl VisibilityWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_away(&self) -> bool {
        self.away
    }

    pub fn on_event(&mut self, event: VisibilityEvent) -> FocusSignal {
        match event {
            VisibilityEvent::Hidden => self.lost(ViolationKind::TabOrWindowSwitch.message()),
            VisibilityEvent::Blur => self.lost(WINDOW_SWITCH_MESSAGE),
            VisibilityEvent::Visible | VisibilityEvent::Focus => {
                self.away = false;
                FocusSignal::Regained
            }
        }
    }

    fn lost(&mut self, message: &'static str) -> FocusSignal {
        let new_episode = !self.away;
        self.away = true;
        FocusSignal::Lost {
            message,
            new_episode,
        }
    }
}
