// ==========================================
// 餐厅后台库存系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: 以 `_tx` 结尾的关联函数接收外部事务中的连接,
//       供服务层在同一原子单元内组合多仓储写入
// ==========================================

pub mod count_repo;
pub mod error;
pub mod ledger_repo;
pub mod transaction_repo;
pub mod unit_repo;

// 重导出核心仓储
pub use count_repo::InventoryCountRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use ledger_repo::InventoryLedgerRepository;
pub use transaction_repo::{BatchMappingRepository, StockTransactionRepository};
pub use unit_repo::{MaterialUnitRepository, UnitConversionRepository};

use uuid::Uuid;

/// TEXT 列 → Uuid 的统一转换
pub(crate) fn column_uuid(idx: usize, raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// TEXT 列 → Option<Uuid> 的统一转换
pub(crate) fn column_uuid_opt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<Uuid>> {
    match raw {
        Some(s) => column_uuid(idx, s).map(Some),
        None => Ok(None),
    }
}

/// TEXT 列 → 领域枚举的统一转换(依赖 FromStr)
pub(crate) fn column_enum<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}
