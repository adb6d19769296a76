// ==========================================
// 采购撮合运营平台 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository/Engine错误为调用方可读的错误
// 红线: 每个错误都有稳定的类别(kind) + 显式原因
// ==========================================

use crate::config::ConfigResult;
use crate::engine::{PayoutRejection, SubmitBlocker, TransitionRejection};
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入校验错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 状态 / 归属冲突
    // ==========================================
    #[error("无效的状态转换: from={from} to={to}, 原因: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("状态冲突: {0}")]
    StateConflict(String),

    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 权限 / 资源
    // ==========================================
    #[error("权限不足: {0}")]
    PermissionDenied(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("配置读取失败: {0}")]
    ConfigError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// ErrorKind - 对外稳定的错误类别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Permission,
    NotFound,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::InvalidInput(_) | ApiError::ValidationError(_) => ErrorKind::Validation,
            ApiError::InvalidStateTransition { .. }
            | ApiError::StateConflict(_)
            | ApiError::OptimisticLockFailure(_) => ErrorKind::StateConflict,
            ApiError::PermissionDenied(_) => ErrorKind::Permission,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_)
            | ApiError::ConfigError(_)
            | ApiError::InternalError(_)
            | ApiError::Other(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        ApiError::NotFound(format!("{}(id={})不存在", entity, id))
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "{}(id={})已被其他请求修改（期望revision={}，实际revision={}）",
                entity, id, expected, actual
            )),
            RepositoryError::StatusChanged {
                entity,
                id,
                expected,
                actual,
            } => ApiError::StateConflict(format!(
                "{}(id={})状态已变化（期望{}，实际{}）",
                entity, id, expected, actual
            )),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::StateConflict(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::NotFound(format!("引用的记录不存在: {}", msg))
            }

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从引擎拒绝原因转换
// ==========================================
impl From<SubmitBlocker> for ApiError {
    fn from(b: SubmitBlocker) -> Self {
        if b.is_permission() {
            ApiError::PermissionDenied(b.to_string())
        } else {
            ApiError::ValidationError(b.to_string())
        }
    }
}

impl From<PayoutRejection> for ApiError {
    fn from(r: PayoutRejection) -> Self {
        if r.is_state_conflict() {
            ApiError::StateConflict(r.to_string())
        } else {
            ApiError::ValidationError(r.to_string())
        }
    }
}

/// 状态机拒绝需带上 from/to，故以函数而非 From 转换
pub(crate) fn transition_error(
    from: crate::domain::types::HandoffStatus,
    to: crate::domain::types::HandoffStatus,
    rejection: TransitionRejection,
) -> ApiError {
    if rejection.is_validation() {
        ApiError::ValidationError(format!("{} → {}: {}", from, to, rejection))
    } else {
        ApiError::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: rejection.to_string(),
        }
    }
}

/// 配置读取失败统一转换
pub(crate) fn config_error<T>(res: ConfigResult<T>) -> ApiResult<T> {
    res.map_err(|e| ApiError::ConfigError(e.to_string()))
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
