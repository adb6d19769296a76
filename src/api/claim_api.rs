// ==========================================
// 采购撮合运营平台 - 认领协调 API
// ==========================================
// 职责: 认领 / 释放 / 管理员改派 / 项目受理与查询
// 红线: 认领只用一条条件更新（assigned_agent_id IS NULL），不做先读后写
// ==========================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::api::{
    now, record_action, require_admin, require_non_empty, MAX_WRITE_ATTEMPTS,
};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::handoff::Handoff;
use crate::domain::types::{AgentIdentity, ClaimOutcome};
use crate::engine::events::{OpsEvent, OptionalDispatcher};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::handoff_repo::HandoffRepository;

// ==========================================
// 请求 / 响应
// ==========================================

/// 认领结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub handoff_id: String,
    pub assigned_agent_id: Option<String>,
    pub outcome: ClaimOutcome,
}

/// 外部受理流程提交的新项目
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewHandoff {
    /// 为空时自动生成
    pub handoff_id: Option<String>,
    pub handoff_type: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_contact: Option<String>,
}

// ==========================================
// ClaimApi
// ==========================================

/// 认领协调API
///
/// 职责：
/// 1. 认领（CAS）与释放
/// 2. 管理员改派
/// 3. 受理入口与项目查询
/// 4. ActionLog记录 + 通知触发
pub struct ClaimApi {
    handoff_repo: Arc<HandoffRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    notifier: OptionalDispatcher,
}

impl ClaimApi {
    pub fn new(
        handoff_repo: Arc<HandoffRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        notifier: OptionalDispatcher,
    ) -> Self {
        Self {
            handoff_repo,
            action_log_repo,
            notifier,
        }
    }

    /// 认领项目
    ///
    /// 只登记认领人；项目状态仍由 HandoffApi 推进（pending → claimed）
    ///
    /// # 返回
    /// - outcome=claimed: 本次认领成功
    /// - outcome=already_assigned: 已被认领（自己或他人），assigned_agent_id 为当前认领人
    ///
    /// # 错误
    /// - NotFound: 项目不存在
    /// - StateConflict: 项目已终结
    #[instrument(skip(self, caller), fields(agent_id = %caller.agent_id))]
    pub fn claim(&self, handoff_id: &str, caller: &AgentIdentity) -> ApiResult<ClaimResult> {
        require_non_empty("handoff_id", handoff_id)?;
        require_non_empty("agent_id", &caller.agent_id)?;

        // 未命中后读现状；若读到的是"未分配"（两次操作之间被释放），重新尝试
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let rows = self
                .handoff_repo
                .try_claim(handoff_id, &caller.agent_id)?;

            if rows == 1 {
                record_action(
                    &self.action_log_repo,
                    ActionLog::now(
                        ActionType::Claim,
                        Some(handoff_id),
                        &caller.agent_id,
                        None,
                        Some(format!("{} 认领项目", caller.agent_id)),
                    ),
                );
                self.notifier.notify(OpsEvent::HandoffClaimed {
                    handoff_id: handoff_id.to_string(),
                    agent_id: caller.agent_id.clone(),
                });
                tracing::info!(handoff_id, "认领成功");
                return Ok(ClaimResult {
                    handoff_id: handoff_id.to_string(),
                    assigned_agent_id: Some(caller.agent_id.clone()),
                    outcome: ClaimOutcome::Claimed,
                });
            }

            let current = self.load(handoff_id)?;
            if let Some(owner) = current.assigned_agent_id {
                tracing::info!(handoff_id, owner = %owner, "项目已被认领");
                return Ok(ClaimResult {
                    handoff_id: handoff_id.to_string(),
                    assigned_agent_id: Some(owner),
                    outcome: ClaimOutcome::AlreadyAssigned,
                });
            }
            if current.status.is_terminal() {
                return Err(ApiError::StateConflict(format!(
                    "项目 {} 已处于终态 {}，不能认领",
                    handoff_id, current.status
                )));
            }
        }

        Err(ApiError::StateConflict(format!(
            "项目 {} 认领竞争过于激烈，请重试",
            handoff_id
        )))
    }

    /// 释放认领
    ///
    /// 仅 pending / manufacturer_found 可释放；项目回到待认领池，状态不变
    ///
    /// # 错误
    /// - PermissionDenied: 调用方不是认领人
    /// - StateConflict: 当前状态不在释放窗口内
    #[instrument(skip(self, caller), fields(agent_id = %caller.agent_id))]
    pub fn release(&self, handoff_id: &str, caller: &AgentIdentity) -> ApiResult<()> {
        require_non_empty("handoff_id", handoff_id)?;

        let rows = self.handoff_repo.try_release(handoff_id, &caller.agent_id)?;
        if rows == 0 {
            let current = self.load(handoff_id)?;
            if !current.is_assigned_to(&caller.agent_id) {
                return Err(ApiError::PermissionDenied(format!(
                    "{} 不是项目 {} 的认领人，不能释放",
                    caller.agent_id, handoff_id
                )));
            }
            tracing::warn!(handoff_id, status = %current.status, "状态不允许释放");
            if current.status.releasable() {
                // 条件更新未命中但重读可释放：两次操作之间被并发修改
                return Err(ApiError::StateConflict(format!(
                    "项目 {} 已被并发修改，请重试",
                    handoff_id
                )));
            }
            return Err(ApiError::StateConflict(format!(
                "项目 {} 当前状态 {} 不允许释放（仅 pending / manufacturer_found）",
                handoff_id, current.status
            )));
        }

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::Release,
                Some(handoff_id),
                &caller.agent_id,
                None,
                Some(format!("{} 释放项目", caller.agent_id)),
            ),
        );
        tracing::info!(handoff_id, "释放成功");
        Ok(())
    }

    /// 管理员改派
    ///
    /// # 错误
    /// - PermissionDenied: 调用方不是管理员
    /// - StateConflict: 项目已终结
    #[instrument(skip(self, admin), fields(admin_id = %admin.agent_id))]
    pub fn take_over(
        &self,
        handoff_id: &str,
        new_agent_id: &str,
        admin: &AgentIdentity,
    ) -> ApiResult<ClaimResult> {
        require_admin(admin, "改派")?;
        require_non_empty("handoff_id", handoff_id)?;
        require_non_empty("new_agent_id", new_agent_id)?;

        let previous = self.load(handoff_id)?.assigned_agent_id;

        let rows = self.handoff_repo.force_assign(handoff_id, new_agent_id)?;
        if rows == 0 {
            let current = self.load(handoff_id)?;
            return Err(ApiError::StateConflict(format!(
                "项目 {} 已处于终态 {}，不能改派",
                handoff_id, current.status
            )));
        }

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::TakeOver,
                Some(handoff_id),
                &admin.agent_id,
                Some(serde_json::json!({
                    "previous_agent_id": previous,
                    "agent_id": new_agent_id,
                })),
                Some(format!("改派给 {}", new_agent_id)),
            ),
        );
        self.notifier.notify(OpsEvent::HandoffTakenOver {
            handoff_id: handoff_id.to_string(),
            previous_agent_id: previous,
            agent_id: new_agent_id.to_string(),
        });
        tracing::info!(handoff_id, new_agent_id, "改派成功");

        Ok(ClaimResult {
            handoff_id: handoff_id.to_string(),
            assigned_agent_id: Some(new_agent_id.to_string()),
            outcome: ClaimOutcome::TakenOver,
        })
    }

    /// 受理新项目（始终为 pending、未分配）
    pub fn create_handoff(&self, input: NewHandoff, actor: &str) -> ApiResult<Handoff> {
        require_non_empty("handoff_type", &input.handoff_type)?;
        require_non_empty("customer_id", &input.customer_id)?;

        let handoff_id = match input.handoff_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let mut handoff = Handoff::new_pending(
            handoff_id,
            input.handoff_type.trim().to_string(),
            input.customer_id.trim().to_string(),
            now(),
        );
        handoff.customer_name = input.customer_name;
        handoff.customer_contact = input.customer_contact;

        self.handoff_repo.insert(&handoff)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::CreateHandoff,
                Some(&handoff.handoff_id),
                actor,
                Some(serde_json::json!({
                    "handoff_type": handoff.handoff_type,
                    "customer_id": handoff.customer_id,
                })),
                None,
            ),
        );
        tracing::info!(handoff_id = %handoff.handoff_id, "受理新项目");
        Ok(handoff)
    }

    pub fn get_handoff(&self, handoff_id: &str) -> ApiResult<Handoff> {
        require_non_empty("handoff_id", handoff_id)?;
        self.load(handoff_id)
    }

    /// 待认领池
    pub fn list_unassigned(&self) -> ApiResult<Vec<Handoff>> {
        Ok(self.handoff_repo.list_unassigned()?)
    }

    pub fn list_by_agent(&self, agent_id: &str) -> ApiResult<Vec<Handoff>> {
        require_non_empty("agent_id", agent_id)?;
        Ok(self.handoff_repo.list_by_agent(agent_id)?)
    }

    fn load(&self, handoff_id: &str) -> ApiResult<Handoff> {
        self.handoff_repo
            .find_by_id(handoff_id)?
            .ok_or_else(|| ApiError::not_found("Handoff", handoff_id))
    }
}
