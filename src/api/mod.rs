// ==========================================
// 采购撮合运营平台 - API 层
// ==========================================
// 职责: 对外操作契约，组合仓储与引擎
// 红线: 每个写操作校验调用方身份，成功后记录 ActionLog
// ==========================================

pub mod claim_api;
pub mod error;
pub mod handoff_api;
pub mod ledger_api;
pub mod quote_api;
pub mod validator;

// 重导出
pub use claim_api::{ClaimApi, ClaimResult, NewHandoff};
pub use error::{ApiError, ApiResult, ErrorKind};
pub use handoff_api::{HandoffApi, StatusChangeResult};
pub use ledger_api::LedgerApi;
pub use quote_api::{QuoteApi, QuoteInput, QuoteSaveResult};

use crate::domain::action_log::ActionLog;
use crate::domain::handoff::Handoff;
use crate::domain::types::AgentIdentity;
use crate::repository::action_log_repo::ActionLogRepository;
use chrono::{NaiveDateTime, Timelike, Utc};

/// 乐观锁冲突时的最大重读次数
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 3;

/// 当前时间（秒级，与落库精度一致）
pub(crate) fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// 写入操作日志
///
/// 主操作已提交，日志写入失败只记录告警，不回报给调用方
pub(crate) fn record_action(repo: &ActionLogRepository, log: ActionLog) {
    if let Err(e) = repo.insert(&log) {
        tracing::warn!(
            action_type = %log.action_type,
            handoff_id = ?log.handoff_id,
            error = %e,
            "ActionLog 写入失败"
        );
    }
}

/// 非空字符串参数校验
pub(crate) fn require_non_empty(field: &str, value: &str) -> error::ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(())
}

/// 调用方须为项目认领人或管理员
pub(crate) fn require_assignee_or_admin(
    handoff: &Handoff,
    caller: &AgentIdentity,
) -> error::ApiResult<()> {
    if caller.is_admin || handoff.is_assigned_to(&caller.agent_id) {
        return Ok(());
    }
    Err(ApiError::PermissionDenied(format!(
        "{} 不是项目 {} 的认领人",
        caller.agent_id, handoff.handoff_id
    )))
}

/// 调用方须为管理员
pub(crate) fn require_admin(caller: &AgentIdentity, action: &str) -> error::ApiResult<()> {
    if caller.is_admin {
        return Ok(());
    }
    Err(ApiError::PermissionDenied(format!(
        "{} 仅管理员可执行 (caller={})",
        action, caller.agent_id
    )))
}
