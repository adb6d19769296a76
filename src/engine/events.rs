// ==========================================
// 采购撮合运营平台 - 业务事件通知
// ==========================================
// 职责: 定义通知触发点 trait，实现依赖倒置
// 说明: 核心只负责触发，投递（邮件/短信/站内信）由外部实现
// 红线: 通知失败只记日志，不影响核心操作结果
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

use crate::domain::types::HandoffStatus;

// ==========================================
// 业务事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OpsEvent {
    /// 代理认领成功
    HandoffClaimed { handoff_id: String, agent_id: String },
    /// 管理员改派
    HandoffTakenOver {
        handoff_id: String,
        previous_agent_id: Option<String>,
        agent_id: String,
    },
    /// 项目状态推进
    HandoffStatusChanged {
        handoff_id: String,
        from: HandoffStatus,
        to: HandoffStatus,
    },
    /// 报价已发送给客户
    QuoteSent {
        quote_id: String,
        handoff_id: String,
        token: String,
    },
    /// 代理发起提现
    PayoutRequested {
        payout_id: String,
        agent_id: String,
        amount: f64,
    },
}

impl OpsEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpsEvent::HandoffClaimed { .. } => "HandoffClaimed",
            OpsEvent::HandoffTakenOver { .. } => "HandoffTakenOver",
            OpsEvent::HandoffStatusChanged { .. } => "HandoffStatusChanged",
            OpsEvent::QuoteSent { .. } => "QuoteSent",
            OpsEvent::PayoutRequested { .. } => "PayoutRequested",
        }
    }
}

// ==========================================
// 通知分发 Trait
// ==========================================

/// 通知分发者
///
/// # 实现说明
/// - 外部通知服务实现此 trait
/// - 实现方应尽快返回，投递重试由实现方负责
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: &OpsEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作分发者（单元测试或未接入通知服务时使用）
#[derive(Debug, Clone, Default)]
pub struct NoOpDispatcher;

impl NotificationDispatcher for NoOpDispatcher {
    fn dispatch(&self, event: &OpsEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(event_type = event.as_str(), "NoOpDispatcher: 跳过通知");
        Ok(())
    }
}

/// 可选的分发者包装
///
/// 简化 Option<Arc<dyn NotificationDispatcher>> 的使用，且吞掉失败
#[derive(Clone, Default)]
pub struct OptionalDispatcher {
    inner: Option<Arc<dyn NotificationDispatcher>>,
}

impl OptionalDispatcher {
    pub fn with_dispatcher(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            inner: Some(dispatcher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn from_option(dispatcher: Option<Arc<dyn NotificationDispatcher>>) -> Self {
        Self { inner: dispatcher }
    }

    /// 触发通知；失败时记录告警并返回
    pub fn notify(&self, event: OpsEvent) {
        let Some(dispatcher) = &self.inner else {
            tracing::debug!(event_type = event.as_str(), "未配置通知分发者，跳过");
            return;
        };
        if let Err(e) = dispatcher.dispatch(&event) {
            tracing::warn!(
                event_type = event.as_str(),
                error = %e,
                "通知分发失败，已忽略"
            );
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}
