// ==========================================
// 餐厅后台库存系统 - 核算引擎层
// ==========================================
// 职责: 纯计算与并发原语,不触数据库
// - fifo: 先进先出消耗规划
// - effect: 单据种类 -> 台账作用的映射
// - key_lock: (仓库, 物料) 粒度的检查-消耗串行化
// ==========================================

pub mod effect;
pub mod fifo;
pub mod key_lock;

pub use effect::LedgerEffect;
pub use fifo::{Allocation, FifoPlan};
pub use key_lock::StockKeyLock;
