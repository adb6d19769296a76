// ==========================================
// 采购撮合运营平台 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ClaimApi, HandoffApi, LedgerApi, QuoteApi};
use crate::config::{ConfigManager, RateConfigReader};
use crate::db::{ensure_schema, open_sqlite_connection, read_schema_version, CURRENT_SCHEMA_VERSION};
use crate::engine::events::{NotificationDispatcher, OptionalDispatcher};
use crate::repository::{
    ActionLogRepository, HandoffRepository, PayoutRequestRepository, QuoteRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源，所有仓储共用一条连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 认领协调API
    pub claim_api: Arc<ClaimApi>,

    /// 项目生命周期API
    pub handoff_api: Arc<HandoffApi>,

    /// 报价API
    pub quote_api: Arc<QuoteApi>,

    /// 佣金台账API
    pub ledger_api: Arc<LedgerApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 项目仓储（用于统计）
    pub handoff_repo: Arc<HandoffRepository>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例（不接入通知）
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_dispatcher(db_path, None)
    }

    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并确保 schema
    /// 2. 初始化所有Repository
    /// 3. 创建所有API实例
    pub fn with_dispatcher(
        db_path: String,
        dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("无法初始化数据库结构: {}", e))?;
        match read_schema_version(&conn) {
            Ok(Some(v)) if v == CURRENT_SCHEMA_VERSION => {}
            Ok(v) => tracing::warn!(
                "schema_version 与程序不一致: db={:?}, expected={}",
                v,
                CURRENT_SCHEMA_VERSION
            ),
            Err(e) => tracing::warn!("读取 schema_version 失败: {}", e),
        }
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let handoff_repo = Arc::new(HandoffRepository::new(conn.clone()));
        let quote_repo = Arc::new(QuoteRepository::new(conn.clone()));
        let payout_repo = Arc::new(PayoutRequestRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        // 配置管理器
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let seeded = config_manager
            .seed_defaults()
            .map_err(|e| format!("无法写入默认配置: {}", e))?;
        if seeded > 0 {
            tracing::info!("已补齐默认配置 {} 项", seeded);
        }
        let config_reader: Arc<dyn RateConfigReader> = config_manager.clone();

        let notifier = OptionalDispatcher::from_option(dispatcher);

        // ==========================================
        // 创建API实例
        // ==========================================
        let claim_api = Arc::new(ClaimApi::new(
            handoff_repo.clone(),
            action_log_repo.clone(),
            notifier.clone(),
        ));
        let handoff_api = Arc::new(HandoffApi::new(
            handoff_repo.clone(),
            quote_repo.clone(),
            action_log_repo.clone(),
            notifier.clone(),
        ));
        let quote_api = Arc::new(QuoteApi::new(
            handoff_repo.clone(),
            quote_repo.clone(),
            action_log_repo.clone(),
            config_reader.clone(),
            notifier.clone(),
        ));
        let ledger_api = Arc::new(LedgerApi::new(
            handoff_repo.clone(),
            quote_repo,
            payout_repo,
            action_log_repo.clone(),
            config_reader,
            notifier,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            claim_api,
            handoff_api,
            quote_api,
            ledger_api,
            config_manager,
            handoff_repo,
            action_log_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 SOURCING_OPS_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SOURCING_OPS_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./sourcing_ops.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("sourcing-ops");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("sourcing_ops.db");
        }
    }

    path.to_string_lossy().to_string()
}
