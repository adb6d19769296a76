// ==========================================
// 采购撮合运营平台 - 操作日志领域模型
// ==========================================
// 红线: 所有成功的写操作必须记录
// 用途: 审计追踪（谁在何时对哪个项目做了什么）
// ==========================================

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub handoff_id: Option<String>, // 提现等与项目无关的操作为 None
    pub action_type: String,
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

impl ActionLog {
    /// 以当前时间构造日志
    pub fn now(
        action_type: ActionType,
        handoff_id: Option<&str>,
        actor: &str,
        payload_json: Option<JsonValue>,
        detail: Option<String>,
    ) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            handoff_id: handoff_id.map(|s| s.to_string()),
            action_type: action_type.as_str().to_string(),
            action_ts: Utc::now().naive_utc(),
            actor: actor.to_string(),
            payload_json,
            detail,
        }
    }
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    CreateHandoff,
    Claim,
    Release,
    TakeOver,
    AdvanceStatus,
    UpdateManufacturer,
    CreateQuote,
    UpdateQuote,
    SendQuote,
    SetQuoteReadOnly,
    RecordPayment,
    CreatePayout,
    ResolvePayout,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateHandoff => "CreateHandoff",
            ActionType::Claim => "Claim",
            ActionType::Release => "Release",
            ActionType::TakeOver => "TakeOver",
            ActionType::AdvanceStatus => "AdvanceStatus",
            ActionType::UpdateManufacturer => "UpdateManufacturer",
            ActionType::CreateQuote => "CreateQuote",
            ActionType::UpdateQuote => "UpdateQuote",
            ActionType::SendQuote => "SendQuote",
            ActionType::SetQuoteReadOnly => "SetQuoteReadOnly",
            ActionType::RecordPayment => "RecordPayment",
            ActionType::CreatePayout => "CreatePayout",
            ActionType::ResolvePayout => "ResolvePayout",
        }
    }
}
