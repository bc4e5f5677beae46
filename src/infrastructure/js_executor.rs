//! JS 执行器 - 基础设施层
//!
//! 持有考试页面，只暴露"执行 JS"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// JS 执行器
///
/// 职责：
/// - 持有考试页面 Page
/// - 暴露 eval() 能力给摄像头、检测器、可见性探针
/// - 不认识 Quiz / Violation
/// - 不处理会话流程
///
/// chromiumoxide 的 Page 内部是 Arc，clone 只是共享同一页面
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果（Promise 会被等待）
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 在后台执行一段不关心结果的 JS（用于 Drop 等同步场景）
    pub fn spawn_eval(&self, js_code: impl Into<String>) {
        let js_code = js_code.into();
        let page = self.page.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.evaluate(js_code).await {
                    tracing::debug!("后台 JS 执行失败: {}", e);
                }
            });
        }
    }
}
