// ==========================================
// 餐厅后台库存系统 - 服务层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 口径: 每条错误消息指名具体的物料/单位/数量,
//       操作员不看日志也能定位问题
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

/// 服务层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ===== 请求校验 =====
    #[error("校验失败: {0}")]
    Validation(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    // ===== 生命周期状态 =====
    #[error("单据已锁定,禁止操作: {0}")]
    AlreadyLocked(String),

    #[error("单据未锁定,无法解锁: {0}")]
    NotLocked(String),

    // ===== 台账约束 =====
    #[error("库存不足: 物料 {material} 可用 {available}, 需求 {requested}")]
    InsufficientStock {
        material: String,
        available: f64,
        requested: f64,
    },

    #[error("批次余量不能为负: ledger_id={ledger_id}")]
    NegativeResult { ledger_id: Uuid },

    #[error("批次已被消耗或引用,无法安全解锁: {0}")]
    BatchInUse(String),

    // ===== 单位换算 =====
    #[error("未找到换算关系: {from} -> {to}")]
    ConversionNotFound { from: String, to: String },

    #[error("正反向换算系数不一致: 期望 {expected}, 提交 {supplied}")]
    ConversionInconsistent { expected: f64, supplied: f64 },

    // ===== 盘点 =====
    #[error("盘点单未指定盘点人,无法完成")]
    MissingPerformer,

    // ===== 透传 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 服务层结果类型
pub type ApiResult<T> = Result<T, ApiError>;
