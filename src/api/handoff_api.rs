// ==========================================
// 采购撮合运营平台 - 项目生命周期 API
// ==========================================
// 职责: 状态推进、厂家信息维护
// 红线: 守卫基于最新读取评估，写入带 revision 校验；冲突时重读重判
// ==========================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::api::error::{transition_error, ApiError, ApiResult};
use crate::api::{now, record_action, require_assignee_or_admin, require_non_empty, MAX_WRITE_ATTEMPTS};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::handoff::{Handoff, ManufacturerDetails, Milestones, StatusExtraFields};
use crate::domain::types::{AgentIdentity, HandoffStatus};
use crate::engine::events::{OpsEvent, OptionalDispatcher};
use crate::engine::lifecycle::LifecycleMachine;
use crate::engine::quote_calc::QuoteCalculator;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::error::RepositoryError;
use crate::repository::handoff_repo::HandoffRepository;
use crate::repository::quote_repo::QuoteRepository;

/// 状态推进结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeResult {
    pub handoff_id: String,
    pub status: HandoffStatus,
    pub milestones: Milestones,
}

// ==========================================
// HandoffApi
// ==========================================
pub struct HandoffApi {
    handoff_repo: Arc<HandoffRepository>,
    quote_repo: Arc<QuoteRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    notifier: OptionalDispatcher,
}

impl HandoffApi {
    pub fn new(
        handoff_repo: Arc<HandoffRepository>,
        quote_repo: Arc<QuoteRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        notifier: OptionalDispatcher,
    ) -> Self {
        Self {
            handoff_repo,
            quote_repo,
            action_log_repo,
            notifier,
        }
    }

    /// 推进项目状态
    ///
    /// # 参数
    /// - next: 目标状态
    /// - extra: 厂家信息（manufacturer_found）、物流（shipped）、取消原因（cancelled）
    ///
    /// # 错误
    /// - PermissionDenied: 调用方不是认领人/管理员
    /// - InvalidStateTransition: 非法边、货款未结清等
    /// - ValidationError: 缺少目标状态要求的字段
    #[instrument(skip(self, extra, caller), fields(agent_id = %caller.agent_id))]
    pub fn advance_status(
        &self,
        handoff_id: &str,
        next: HandoffStatus,
        extra: StatusExtraFields,
        caller: &AgentIdentity,
    ) -> ApiResult<StatusChangeResult> {
        require_non_empty("handoff_id", handoff_id)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load(handoff_id)?;
            require_assignee_or_admin(&current, caller)?;

            // 报价/收款写入会递增项目 revision：余额在此之后若有变动，下面的 update 必然冲突
            let balance = if next == HandoffStatus::Shipped {
                self.current_product_balance(handoff_id)?
            } else {
                None
            };

            let planned = LifecycleMachine::plan_transition(&current, next, &extra, balance, now())
                .map_err(|r| {
                    tracing::warn!(handoff_id, from = %current.status, to = %next, reason = %r, "状态推进被拒绝");
                    transition_error(current.status, next, r)
                })?;

            match self.handoff_repo.update(&planned) {
                Ok(()) => {
                    self.after_transition(&current, &planned, caller);
                    return Ok(StatusChangeResult {
                        handoff_id: planned.handoff_id,
                        status: planned.status,
                        milestones: planned.milestones,
                    });
                }
                Err(RepositoryError::OptimisticLockFailure { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(handoff_id, attempt, "并发修改，重读后重新校验");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 按状态名推进（边界处解析状态字符串）
    pub fn advance_status_by_name(
        &self,
        handoff_id: &str,
        next_status: &str,
        extra: StatusExtraFields,
        caller: &AgentIdentity,
    ) -> ApiResult<StatusChangeResult> {
        let next = HandoffStatus::parse(next_status).ok_or_else(|| {
            ApiError::ValidationError(format!("未知的项目状态: '{}'", next_status))
        })?;
        self.advance_status(handoff_id, next, extra, caller)
    }

    /// 更新厂家信息
    ///
    /// 仅 manufacturer_found / paid / shipped 可编辑；名称与地址不可清空
    #[instrument(skip(self, patch, caller), fields(agent_id = %caller.agent_id))]
    pub fn update_manufacturer_details(
        &self,
        handoff_id: &str,
        patch: ManufacturerDetails,
        caller: &AgentIdentity,
    ) -> ApiResult<()> {
        require_non_empty("handoff_id", handoff_id)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut handoff = self.load(handoff_id)?;
            require_assignee_or_admin(&handoff, caller)?;

            if !handoff.status.manufacturer_editable() {
                return Err(ApiError::StateConflict(format!(
                    "项目 {} 当前状态 {} 不允许修改厂家信息",
                    handoff_id, handoff.status
                )));
            }

            let merged = handoff.manufacturer.merged_with(&patch);
            if !merged.is_complete() {
                return Err(ApiError::ValidationError(
                    "厂家名称与地址不能为空".to_string(),
                ));
            }
            handoff.manufacturer = merged;

            match self.handoff_repo.update(&handoff) {
                Ok(()) => break,
                Err(RepositoryError::OptimisticLockFailure { .. }) if attempt < MAX_WRITE_ATTEMPTS => {}
                Err(e) => return Err(e.into()),
            }
        }

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::UpdateManufacturer,
                Some(handoff_id),
                &caller.agent_id,
                serde_json::to_value(&patch).ok(),
                None,
            ),
        );
        tracing::info!(handoff_id, "厂家信息已更新");
        Ok(())
    }

    /// 当前报价的货款余额（无报价为 None）
    pub fn current_product_balance(&self, handoff_id: &str) -> ApiResult<Option<f64>> {
        let Some(quote) = self.quote_repo.find_current_for_handoff(handoff_id)? else {
            return Ok(None);
        };
        let payments = self.quote_repo.list_payments(&quote.quote_id)?;
        Ok(Some(QuoteCalculator::product_balance(&quote.totals, &payments)))
    }

    fn after_transition(&self, before: &Handoff, after: &Handoff, caller: &AgentIdentity) {
        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::AdvanceStatus,
                Some(&after.handoff_id),
                &caller.agent_id,
                Some(serde_json::json!({
                    "from": before.status,
                    "to": after.status,
                    "shipper": after.shipper,
                    "tracking_number": after.tracking_number,
                    "cancel_reason": after.cancel_reason,
                })),
                Some(format!("{} → {}", before.status, after.status)),
            ),
        );
        self.notifier.notify(OpsEvent::HandoffStatusChanged {
            handoff_id: after.handoff_id.clone(),
            from: before.status,
            to: after.status,
        });
        tracing::info!(
            handoff_id = %after.handoff_id,
            from = %before.status,
            to = %after.status,
            "状态推进成功"
        );
    }

    fn load(&self, handoff_id: &str) -> ApiResult<Handoff> {
        self.handoff_repo
            .find_by_id(handoff_id)?
            .ok_or_else(|| ApiError::not_found("Handoff", handoff_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorKind;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (HandoffApi, Arc<HandoffRepository>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let handoffs = Arc::new(HandoffRepository::new(conn.clone()));
        let api = HandoffApi::new(
            handoffs.clone(),
            Arc::new(QuoteRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn)),
            OptionalDispatcher::none(),
        );
        (api, handoffs)
    }

    fn claimed(repo: &HandoffRepository, id: &str, agent: &str) {
        repo.insert(&Handoff::new_pending(
            id.to_string(),
            "sourcing".to_string(),
            "C1".to_string(),
            now(),
        ))
        .unwrap();
        assert_eq!(repo.try_claim(id, agent).unwrap(), 1);
        let mut h = repo.find_by_id(id).unwrap().unwrap();
        h.status = HandoffStatus::Claimed;
        h.milestones.claimed_at = Some(now());
        repo.update(&h).unwrap();
    }

    fn factory() -> StatusExtraFields {
        StatusExtraFields {
            manufacturer: Some(ManufacturerDetails {
                name: Some("Ningbo Home".to_string()),
                address: Some("Cixi Rd 12".to_string()),
                ..ManufacturerDetails::default()
            }),
            ..StatusExtraFields::default()
        }
    }

    #[test]
    fn test_advance_and_manufacturer_edits() {
        let (api, repo) = setup();
        claimed(&repo, "H1", "A");
        let a = AgentIdentity::agent("A");

        let err = api
            .update_manufacturer_details("H1", ManufacturerDetails::default(), &a)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let r = api
            .advance_status("H1", HandoffStatus::ManufacturerFound, factory(), &a)
            .unwrap();
        assert_eq!(r.status, HandoffStatus::ManufacturerFound);
        assert!(r.milestones.manufacturer_found_at.is_some());

        api.update_manufacturer_details(
            "H1",
            ManufacturerDetails {
                contact: Some("+86 574 0000".to_string()),
                ..ManufacturerDetails::default()
            },
            &a,
        )
        .unwrap();
        let err = api
            .update_manufacturer_details(
                "H1",
                ManufacturerDetails {
                    name: Some(" ".to_string()),
                    ..ManufacturerDetails::default()
                },
                &a,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let h = repo.find_by_id("H1").unwrap().unwrap();
        assert_eq!(h.manufacturer.contact.as_deref(), Some("+86 574 0000"));
        assert_eq!(h.manufacturer.name.as_deref(), Some("Ningbo Home"));
    }

    #[test]
    fn test_non_assignee_and_bad_status_name() {
        let (api, repo) = setup();
        claimed(&repo, "H1", "A");

        let err = api
            .advance_status("H1", HandoffStatus::ManufacturerFound, factory(), &AgentIdentity::agent("B"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err = api
            .advance_status_by_name("H1", "teleported", StatusExtraFields::default(), &AgentIdentity::agent("A"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // 跳级
        let err = api
            .advance_status_by_name("H1", "paid", StatusExtraFields::default(), &AgentIdentity::agent("A"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(err.to_string().contains("claimed"));
    }
}
