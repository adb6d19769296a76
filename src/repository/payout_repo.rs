// ==========================================
// 采购撮合运营平台 - 提现申请数据仓储
// ==========================================
// 红线: 状态流转用条件更新（WHERE status = 期望状态），未命中即冲突
// ==========================================

use crate::domain::payout::PayoutRequest;
use crate::domain::types::PayoutStatus;
use crate::repository::error::{
    enum_column, fmt_ts, parse_opt_ts, parse_ts, RepositoryError, RepositoryResult,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// PayoutRequestRepository - 提现申请仓储
// ==========================================
pub struct PayoutRequestRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PayoutRequestRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, payout: &PayoutRequest) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO payout_request (
                payout_id, agent_id, amount, currency, status,
                requested_note, admin_note, requested_at, approved_at, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                payout.payout_id,
                payout.agent_id,
                payout.amount,
                payout.currency,
                payout.status.as_str(),
                payout.requested_note,
                payout.admin_note,
                fmt_ts(&payout.requested_at),
                payout.approved_at.as_ref().map(fmt_ts),
                payout.paid_at.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(payout.payout_id.clone())
    }

    /// 状态流转（比较并设置）
    ///
    /// approved 写入 approved_at，paid 写入 paid_at；admin_note 非空时覆盖
    ///
    /// # 错误
    /// - `RepositoryError::StatusChanged`: 当前状态不是 expected
    /// - `RepositoryError::NotFound`: payout_id 不存在
    pub fn transition(
        &self,
        payout_id: &str,
        expected: PayoutStatus,
        next: PayoutStatus,
        admin_note: Option<&str>,
        now: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now_str = fmt_ts(&now);
        let rows = conn.execute(
            r#"
            UPDATE payout_request
            SET status = ?1,
                admin_note = COALESCE(?2, admin_note),
                approved_at = CASE WHEN ?1 = 'approved' THEN ?3 ELSE approved_at END,
                paid_at = CASE WHEN ?1 = 'paid' THEN ?3 ELSE paid_at END
            WHERE payout_id = ?4 AND status = ?5
            "#,
            params![next.as_str(), admin_note, now_str, payout_id, expected.as_str()],
        )?;

        if rows == 0 {
            let actual: Result<String, _> = conn.query_row(
                "SELECT status FROM payout_request WHERE payout_id = ?1",
                params![payout_id],
                |row| row.get(0),
            );
            return match actual {
                Ok(actual) => Err(RepositoryError::StatusChanged {
                    entity: "PayoutRequest".to_string(),
                    id: payout_id.to_string(),
                    expected: expected.as_str().to_string(),
                    actual,
                }),
                Err(_) => Err(RepositoryError::NotFound {
                    entity: "PayoutRequest".to_string(),
                    id: payout_id.to_string(),
                }),
            };
        }
        Ok(())
    }

    pub fn find_by_id(&self, payout_id: &str) -> RepositoryResult<Option<PayoutRequest>> {
        let conn = self.get_conn()?;
        match conn.query_row(
            r#"
            SELECT payout_id, agent_id, amount, currency, status,
                   requested_note, admin_note, requested_at, approved_at, paid_at
            FROM payout_request
            WHERE payout_id = ?1
            "#,
            params![payout_id],
            map_row,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_by_agent(&self, agent_id: &str) -> RepositoryResult<Vec<PayoutRequest>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payout_id, agent_id, amount, currency, status,
                   requested_note, admin_note, requested_at, approved_at, paid_at
            FROM payout_request
            WHERE agent_id = ?1
            ORDER BY requested_at DESC
            "#,
        )?;
        let rows = stmt
            .query_map(params![agent_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

fn map_row(row: &Row) -> SqliteResult<PayoutRequest> {
    let status_str: String = row.get(4)?;
    let requested_at: String = row.get(7)?;
    Ok(PayoutRequest {
        payout_id: row.get(0)?,
        agent_id: row.get(1)?,
        amount: row.get(2)?,
        currency: row.get(3)?,
        status: enum_column(4, &status_str, PayoutStatus::parse(&status_str))?,
        requested_note: row.get(5)?,
        admin_note: row.get(6)?,
        requested_at: parse_ts(7, &requested_at)?,
        approved_at: parse_opt_ts(8, row.get(8)?)?,
        paid_at: parse_opt_ts(9, row.get(9)?)?,
    })
}
