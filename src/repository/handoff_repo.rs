// ==========================================
// 采购撮合运营平台 - 采购项目数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 认领必须是单条条件更新（assigned_agent_id IS NULL），禁止先读后写
// ==========================================

use crate::domain::handoff::{Handoff, ManufacturerDetails, Milestones};
use crate::domain::types::HandoffStatus;
use crate::repository::error::{
    enum_column, fmt_ts, parse_opt_ts, parse_ts, RepositoryError, RepositoryResult,
};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT handoff_id, handoff_type, status, assigned_agent_id,
           customer_id, customer_name, customer_contact,
           manufacturer_name, manufacturer_address, manufacturer_contact, manufacturer_note,
           shipper, tracking_number, cancel_reason,
           created_at, claimed_at, manufacturer_found_at, paid_at,
           shipped_at, delivered_at, cancelled_at,
           revision
    FROM handoff
"#;

// ==========================================
// HandoffRepository - 采购项目仓储
// ==========================================
pub struct HandoffRepository {
    conn: Arc<Mutex<Connection>>,
}

impl HandoffRepository {
    /// 创建新的HandoffRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建项目（受理流程调用）
    pub fn insert(&self, handoff: &Handoff) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let m = &handoff.milestones;

        conn.execute(
            r#"
            INSERT INTO handoff (
                handoff_id, handoff_type, status, assigned_agent_id,
                customer_id, customer_name, customer_contact,
                manufacturer_name, manufacturer_address, manufacturer_contact, manufacturer_note,
                shipper, tracking_number, cancel_reason,
                created_at, claimed_at, manufacturer_found_at, paid_at,
                shipped_at, delivered_at, cancelled_at,
                revision
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17, ?18,
                ?19, ?20, ?21,
                ?22
            )
            "#,
            params![
                handoff.handoff_id,
                handoff.handoff_type,
                handoff.status.as_str(),
                handoff.assigned_agent_id,
                handoff.customer_id,
                handoff.customer_name,
                handoff.customer_contact,
                handoff.manufacturer.name,
                handoff.manufacturer.address,
                handoff.manufacturer.contact,
                handoff.manufacturer.note,
                handoff.shipper,
                handoff.tracking_number,
                handoff.cancel_reason,
                fmt_ts(&m.created_at),
                m.claimed_at.as_ref().map(fmt_ts),
                m.manufacturer_found_at.as_ref().map(fmt_ts),
                m.paid_at.as_ref().map(fmt_ts),
                m.shipped_at.as_ref().map(fmt_ts),
                m.delivered_at.as_ref().map(fmt_ts),
                m.cancelled_at.as_ref().map(fmt_ts),
                handoff.revision,
            ],
        )?;

        Ok(handoff.handoff_id.clone())
    }

    /// 认领（比较并设置）
    ///
    /// 单条条件更新：仅当 assigned_agent_id 为空且项目未终结时写入。
    /// 只写认领人，不改状态；pending → claimed 由状态机推进（同时打 claimed_at）。
    ///
    /// # 返回
    /// - Ok(1): 本次认领成功
    /// - Ok(0): 未命中（已被认领 / 已终结 / 不存在），由调用方读取现状解释
    pub fn try_claim(&self, handoff_id: &str, agent_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE handoff
            SET assigned_agent_id = ?1,
                revision = revision + 1
            WHERE handoff_id = ?2
              AND assigned_agent_id IS NULL
              AND status NOT IN ('delivered', 'cancelled')
            "#,
            params![agent_id, handoff_id],
        )?;
        Ok(rows)
    }

    /// 管理员改派（无视当前认领人，状态不变）
    pub fn force_assign(&self, handoff_id: &str, agent_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE handoff
            SET assigned_agent_id = ?1,
                revision = revision + 1
            WHERE handoff_id = ?2
              AND status NOT IN ('delivered', 'cancelled')
            "#,
            params![agent_id, handoff_id],
        )?;
        Ok(rows)
    }

    /// 释放认领
    ///
    /// 仅当前认领人、且状态为 pending / manufacturer_found 时命中；
    /// 只清空认领人，状态与里程碑不动（状态只前进不后退）。
    pub fn try_release(&self, handoff_id: &str, agent_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE handoff
            SET assigned_agent_id = NULL,
                revision = revision + 1
            WHERE handoff_id = ?1
              AND assigned_agent_id = ?2
              AND status IN ('pending', 'manufacturer_found')
            "#,
            params![handoff_id, agent_id],
        )?;
        Ok(rows)
    }

    /// 更新项目 (带乐观锁检查)
    ///
    /// # 并发控制
    /// 使用 revision 字段，写入时重新校验读到的版本，拒绝基于过期读的写入
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision不匹配
    /// - `RepositoryError::NotFound`: handoff_id不存在
    pub fn update(&self, handoff: &Handoff) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let m = &handoff.milestones;

        let rows_affected = conn.execute(
            r#"
            UPDATE handoff
            SET status = ?1, assigned_agent_id = ?2,
                manufacturer_name = ?3, manufacturer_address = ?4,
                manufacturer_contact = ?5, manufacturer_note = ?6,
                shipper = ?7, tracking_number = ?8, cancel_reason = ?9,
                claimed_at = ?10, manufacturer_found_at = ?11, paid_at = ?12,
                shipped_at = ?13, delivered_at = ?14, cancelled_at = ?15,
                revision = revision + 1
            WHERE handoff_id = ?16 AND revision = ?17
            "#,
            params![
                handoff.status.as_str(),
                handoff.assigned_agent_id,
                handoff.manufacturer.name,
                handoff.manufacturer.address,
                handoff.manufacturer.contact,
                handoff.manufacturer.note,
                handoff.shipper,
                handoff.tracking_number,
                handoff.cancel_reason,
                m.claimed_at.as_ref().map(fmt_ts),
                m.manufacturer_found_at.as_ref().map(fmt_ts),
                m.paid_at.as_ref().map(fmt_ts),
                m.shipped_at.as_ref().map(fmt_ts),
                m.delivered_at.as_ref().map(fmt_ts),
                m.cancelled_at.as_ref().map(fmt_ts),
                handoff.handoff_id,
                handoff.revision,
            ],
        )?;

        if rows_affected == 0 {
            let exists: Result<i32, _> = conn.query_row(
                "SELECT revision FROM handoff WHERE handoff_id = ?1",
                params![handoff.handoff_id],
                |row| row.get(0),
            );

            return match exists {
                Ok(actual) => Err(RepositoryError::OptimisticLockFailure {
                    entity: "Handoff".to_string(),
                    id: handoff.handoff_id.clone(),
                    expected: handoff.revision,
                    actual,
                }),
                Err(_) => Err(RepositoryError::NotFound {
                    entity: "Handoff".to_string(),
                    id: handoff.handoff_id.clone(),
                }),
            };
        }

        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, handoff_id: &str) -> RepositoryResult<Option<Handoff>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE handoff_id = ?1", SELECT_COLUMNS);

        match conn.query_row(&sql, params![handoff_id], map_row) {
            Ok(h) => Ok(Some(h)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 待认领池（未分配且未终结）
    pub fn list_unassigned(&self) -> RepositoryResult<Vec<Handoff>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE assigned_agent_id IS NULL AND status NOT IN ('delivered', 'cancelled') ORDER BY created_at ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 某代理名下的项目
    pub fn list_by_agent(&self, agent_id: &str) -> RepositoryResult<Vec<Handoff>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE assigned_agent_id = ?1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![agent_id], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 按状态统计数量
    pub fn count_by_status(&self) -> RepositoryResult<HashMap<String, i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM handoff GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count);
        }
        Ok(counts)
    }
}

fn map_row(row: &Row) -> SqliteResult<Handoff> {
    let status_str: String = row.get(2)?;
    let status = enum_column(2, &status_str, HandoffStatus::parse(&status_str))?;
    let created_at_str: String = row.get(14)?;

    Ok(Handoff {
        handoff_id: row.get(0)?,
        handoff_type: row.get(1)?,
        status,
        assigned_agent_id: row.get(3)?,
        customer_id: row.get(4)?,
        customer_name: row.get(5)?,
        customer_contact: row.get(6)?,
        manufacturer: ManufacturerDetails {
            name: row.get(7)?,
            address: row.get(8)?,
            contact: row.get(9)?,
            note: row.get(10)?,
        },
        shipper: row.get(11)?,
        tracking_number: row.get(12)?,
        cancel_reason: row.get(13)?,
        milestones: Milestones {
            created_at: parse_ts(14, &created_at_str)?,
            claimed_at: parse_opt_ts(15, row.get(15)?)?,
            manufacturer_found_at: parse_opt_ts(16, row.get(16)?)?,
            paid_at: parse_opt_ts(17, row.get(17)?)?,
            shipped_at: parse_opt_ts(18, row.get(18)?)?,
            delivered_at: parse_opt_ts(19, row.get(19)?)?,
            cancelled_at: parse_opt_ts(20, row.get(20)?)?,
        },
        revision: row.get(21)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn setup() -> HandoffRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        HandoffRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_try_claim_is_compare_and_set() {
        let repo = setup();
        let h = Handoff::new_pending("H1".into(), "sourcing".into(), "C1".into(), ts());
        repo.insert(&h).unwrap();

        assert_eq!(repo.try_claim("H1", "agent_a").unwrap(), 1);
        assert_eq!(repo.try_claim("H1", "agent_b").unwrap(), 0);

        let found = repo.find_by_id("H1").unwrap().unwrap();
        assert_eq!(found.assigned_agent_id.as_deref(), Some("agent_a"));
        // 认领只写认领人
        assert_eq!(found.status, HandoffStatus::Pending);
        assert_eq!(found.milestones.claimed_at, None);
        assert_eq!(found.revision, 1);
    }

    #[test]
    fn test_release_only_by_assignee() {
        let repo = setup();
        let h = Handoff::new_pending("H2".into(), "sourcing".into(), "C1".into(), ts());
        repo.insert(&h).unwrap();
        repo.try_claim("H2", "agent_a").unwrap();

        assert_eq!(repo.try_release("H2", "agent_b").unwrap(), 0);
        assert_eq!(repo.try_release("H2", "agent_a").unwrap(), 1);

        let found = repo.find_by_id("H2").unwrap().unwrap();
        assert_eq!(found.assigned_agent_id, None);
        assert_eq!(found.status, HandoffStatus::Pending);
    }

    #[test]
    fn test_release_never_rewrites_status() {
        let repo = setup();
        let h = Handoff::new_pending("H4".into(), "sourcing".into(), "C1".into(), ts());
        repo.insert(&h).unwrap();
        repo.try_claim("H4", "agent_a").unwrap();

        // claimed 不在释放窗口内
        let mut claimed = repo.find_by_id("H4").unwrap().unwrap();
        claimed.status = HandoffStatus::Claimed;
        claimed.milestones.claimed_at = Some(ts());
        repo.update(&claimed).unwrap();
        assert_eq!(repo.try_release("H4", "agent_a").unwrap(), 0);

        let mut found = repo.find_by_id("H4").unwrap().unwrap();
        found.status = HandoffStatus::ManufacturerFound;
        found.milestones.manufacturer_found_at = Some(ts());
        repo.update(&found).unwrap();
        assert_eq!(repo.try_release("H4", "agent_a").unwrap(), 1);

        let after = repo.find_by_id("H4").unwrap().unwrap();
        assert_eq!(after.status, HandoffStatus::ManufacturerFound);
        assert_eq!(after.assigned_agent_id, None);
        assert_eq!(after.milestones.claimed_at, Some(ts()));
    }

    #[test]
    fn test_update_rejects_stale_revision() {
        let repo = setup();
        let h = Handoff::new_pending("H3".into(), "sourcing".into(), "C1".into(), ts());
        repo.insert(&h).unwrap();

        let stale = repo.find_by_id("H3").unwrap().unwrap();
        repo.try_claim("H3", "agent_a").unwrap();

        let mut update = stale.clone();
        update.cancel_reason = Some("客户撤单".to_string());
        match repo.update(&update) {
            Err(RepositoryError::OptimisticLockFailure { expected, actual, .. }) => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("Expected OptimisticLockFailure, got {:?}", other),
        }
    }
}
