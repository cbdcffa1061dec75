// ==========================================
// 餐厅后台库存系统 - 服务层
// ==========================================
// 职责: 对外业务接口,编排 仓储 + 引擎 + 键锁
// 红线: 每次生命周期调用要么全部落库要么全部回滚
// ==========================================

pub mod count_api;
pub mod dto;
pub mod error;
pub mod lookup;
pub mod stock_api;
pub mod unit_api;

pub use count_api::InventoryCountService;
pub use dto::{
    ConversionRequest, ConversionUpdateOutcome, CountDraft, CountItemView, CountLineDraft,
    CountView, ItemDraft, LedgerPreview, LedgerPreviewBatch, LedgerPreviewItem, TransactionDraft,
    TransactionItemView, TransactionView,
};
pub use error::{ApiError, ApiResult};
pub use lookup::{MasterDataLookup, StaticLookup};
pub use stock_api::StockTransactionService;
pub use unit_api::UnitConversionService;

use std::sync::atomic::{AtomicU64, Ordering};

static CODE_SEQ: AtomicU64 = AtomicU64::new(0);

/// 人读单据/盘点编码: 前缀 + 毫秒时间戳 + 进程内序号
///
/// 序号挡住同毫秒并发创建撞 UNIQUE 约束
pub(crate) fn next_code(prefix: &str) -> String {
    let seq = CODE_SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
    format!(
        "{}{}{:03}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        seq
    )
}
