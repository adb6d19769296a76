// ==========================================
// 采购撮合运营平台 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写、快照
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::rate_config_trait::{ConfigResult, RateConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::types::ShippingRateUnit;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 补齐缺失的默认配置（已有值不覆盖）
    ///
    /// # 返回
    /// - 新写入的配置项数量
    pub fn seed_defaults(&self) -> ConfigResult<usize> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut count = 0;
        for (key, value) in config_keys::DEFAULTS {
            count += conn.execute(
                "INSERT OR IGNORE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
                params![key, value],
            )?;
        }
        Ok(count)
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }

    /// 从配置快照恢复配置
    ///
    /// # 注意
    /// - 此方法会覆盖现有的global配置
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> ConfigResult<usize> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    /// 读取数值配置；缺失用默认值，格式错误记录告警后用默认值
    fn get_f64_or_default(&self, key: &str, default: f64) -> ConfigResult<f64> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    "数值配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }
}

// ==========================================
// RateConfigReader Trait 实现
// ==========================================
#[async_trait]
impl RateConfigReader for ConfigManager {
    async fn get_exchange_rate_rmb(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::EXCHANGE_RATE_RMB, 230.0)
    }

    async fn get_exchange_rate_usd(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::EXCHANGE_RATE_USD, 1600.0)
    }

    async fn get_shipping_rate_usd(&self, unit: ShippingRateUnit) -> ConfigResult<f64> {
        match unit {
            ShippingRateUnit::PerKg => {
                self.get_f64_or_default(config_keys::SHIPPING_RATE_USD_PER_KG, 5.0)
            }
            ShippingRateUnit::PerCbm => {
                self.get_f64_or_default(config_keys::SHIPPING_RATE_USD_PER_CBM, 350.0)
            }
        }
    }

    async fn get_markup_percent(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::MARKUP_PERCENT, 20.0)
    }

    async fn get_agent_percent(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::AGENT_PERCENT, 10.0)
    }

    async fn get_agent_commitment_percent(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::AGENT_COMMITMENT_PERCENT, 20.0)
    }

    async fn get_deposit_percent(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::DEPOSIT_PERCENT, 50.0)
    }

    async fn get_min_payout(&self) -> ConfigResult<f64> {
        self.get_f64_or_default(config_keys::MIN_PAYOUT_NGN, 5000.0)
    }

    async fn get_payout_currency(&self) -> ConfigResult<String> {
        Ok(self
            .get_config_value(config_keys::PAYOUT_CURRENCY)?
            .map(|v| v.trim().to_uppercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "NGN".to_string()))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 汇率
    pub const EXCHANGE_RATE_RMB: &str = "exchange_rate_rmb";
    pub const EXCHANGE_RATE_USD: &str = "exchange_rate_usd";

    // 运费
    pub const SHIPPING_RATE_USD_PER_KG: &str = "shipping_rate_usd_per_kg";
    pub const SHIPPING_RATE_USD_PER_CBM: &str = "shipping_rate_usd_per_cbm";

    // 比例（%）
    pub const MARKUP_PERCENT: &str = "markup_percent";
    pub const AGENT_PERCENT: &str = "agent_percent";
    pub const AGENT_COMMITMENT_PERCENT: &str = "agent_commitment_percent";
    pub const DEPOSIT_PERCENT: &str = "deposit_percent";

    // 提现
    pub const MIN_PAYOUT_NGN: &str = "min_payout_ngn";
    pub const PAYOUT_CURRENCY: &str = "payout_currency";

    /// 首次启动写入的默认值
    pub const DEFAULTS: [(&str, &str); 10] = [
        (EXCHANGE_RATE_RMB, "230"),
        (EXCHANGE_RATE_USD, "1600"),
        (SHIPPING_RATE_USD_PER_KG, "5"),
        (SHIPPING_RATE_USD_PER_CBM, "350"),
        (MARKUP_PERCENT, "20"),
        (AGENT_PERCENT, "10"),
        (AGENT_COMMITMENT_PERCENT, "20"),
        (DEPOSIT_PERCENT, "50"),
        (MIN_PAYOUT_NGN, "5000"),
        (PAYOUT_CURRENCY, "NGN"),
    ];
}
