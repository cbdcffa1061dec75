// ==========================================
// 餐厅后台库存系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 库存台账与 FIFO 成本核算核心
// 红线: 台账只能通过 建批/FIFO消耗/定向盘点 三条路径变更
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 服务层 - 对外业务接口
pub mod api;

// 数据库基础设施（连接初始化/PRAGMA/建表 统一）
pub mod db;

// 日志系统
pub mod logging;

// 配置层 - 核算参数
pub mod config;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AdjustmentType, ChangeType, DataStatus, InventoryCountStatus, StockInType, StockOutType,
    TransactionKind,
};

// 领域实体
pub use domain::{
    BatchMapping, InventoryCount, InventoryCountItem, InventoryLedgerEntry, MaterialUnit,
    StockTransaction, TransactionItem, UnitConversion, UnitConversionHistory,
};

// 仓储
pub use repository::{
    BatchMappingRepository, InventoryCountRepository, InventoryLedgerRepository,
    MaterialUnitRepository, RepositoryError, RepositoryResult, StockTransactionRepository,
    UnitConversionRepository,
};

// 引擎
pub use engine::{Allocation, FifoPlan, LedgerEffect, StockKeyLock};

// 服务层
pub use api::{
    ApiError, ApiResult, InventoryCountService, MasterDataLookup, StaticLookup,
    StockTransactionService, UnitConversionService,
};

// 配置
pub use config::LedgerSettings;
