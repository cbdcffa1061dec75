// ==========================================
// 餐厅后台库存系统 - 领域层
// ==========================================
// 职责: 定义实体与类型,不含 SQL,不含编排逻辑
// ==========================================

pub mod count;
pub mod ledger;
pub mod transaction;
pub mod types;
pub mod unit;

/// 数量比较用的业务零阈值
///
/// 台账数量经多次加减后与理论值可能差出 f64::EPSILON 量级,
/// "耗尽/满足/有差异"一律按同一宽松阈值判定
pub const QUANTITY_EPSILON: f64 = 1e-9;

// 重导出核心实体
pub use count::{InventoryCount, InventoryCountItem};
pub use ledger::{BatchMapping, InventoryLedgerEntry};
pub use transaction::{StockTransaction, TransactionItem};
pub use unit::{MaterialUnit, UnitConversion, UnitConversionHistory};
