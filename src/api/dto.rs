// ==========================================
// 餐厅后台库存系统 - 服务层数据传输对象
// ==========================================
// 入参草稿只携带业务字段,id/编码/审计字段由服务层生成;
// 出参视图附带主数据名称,调用方免于二次解析
// ==========================================

use crate::domain::count::{InventoryCount, InventoryCountItem};
use crate::domain::transaction::{StockTransaction, TransactionItem};
use crate::domain::types::{AdjustmentType, StockInType, StockOutType, TransactionKind};
use crate::domain::unit::UnitConversion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// 单据草稿
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub warehouse_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub destination_warehouse_id: Option<Uuid>,
    pub stock_in_type: Option<StockInType>,
    pub stock_out_type: Option<StockOutType>,
    pub adjustment_type: Option<AdjustmentType>,
    pub reason: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub items: Vec<ItemDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDraft {
    pub material_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: f64,
    /// 入库成本单价;出库行留空,锁定核算后回填
    pub unit_price: Option<f64>,
    /// 盘点定向修正: 直指批次
    pub target_ledger_id: Option<Uuid>,
    /// 盘点定向修正: 实盘 - 系统(带符号)
    pub signed_delta: Option<f64>,
    pub notes: Option<String>,
}

// ==========================================
// 单据视图
// ==========================================

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub transaction: StockTransaction,
    pub warehouse_name: String,
    pub items: Vec<TransactionItemView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionItemView {
    pub item: TransactionItem,
    pub material_name: String,
    pub unit_name: String,
}

// ==========================================
// 锁定预演
// ==========================================

/// 草稿单据的台账作用预演
///
/// 与 lock() 共用同一规划函数: 台账不变则结果一致
#[derive(Debug, Clone, Serialize)]
pub struct LedgerPreview {
    pub transaction_id: Uuid,
    pub items: Vec<LedgerPreviewItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerPreviewItem {
    pub item_id: Uuid,
    pub material_id: Uuid,
    pub material_name: String,
    pub requested: f64,
    /// 库存不足时的缺口(预演不视为错误)
    pub shortage: f64,
    pub batches: Vec<LedgerPreviewBatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerPreviewBatch {
    /// 既有批次的 id;建批预演的合成批次为 None
    pub ledger_id: Option<Uuid>,
    pub batch_code: String,
    pub transaction_date: Option<DateTime<Utc>>,
    /// 作用数量(盘点修正为带符号差异)
    pub quantity: f64,
    pub unit_price: f64,
    pub line_cost: f64,
    pub remaining_after: f64,
}

// ==========================================
// 盘点
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountDraft {
    pub warehouse_id: Uuid,
    pub count_date: DateTime<Utc>,
    pub performed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub items: Vec<CountLineDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountLineDraft {
    /// 钉定批次;system_quantity 在建行时点快照
    pub ledger_id: Uuid,
    pub actual_quantity: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountView {
    pub count: InventoryCount,
    pub warehouse_name: String,
    pub items: Vec<CountItemView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountItemView {
    pub item: InventoryCountItem,
    pub material_name: String,
    pub unit_name: String,
}

// ==========================================
// 单位换算
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub from_unit_id: Uuid,
    pub to_unit_id: Uuid,
    pub factor: f64,
    pub reason: Option<String>,
}

/// 系数更新结果
///
/// ledger_rows_with_from_unit 为仍按旧系数入账的台账行数,
/// 仅供操作员知悉,历史成本不回溯重算
#[derive(Debug, Clone, Serialize)]
pub struct ConversionUpdateOutcome {
    pub conversion: UnitConversion,
    pub ledger_rows_with_from_unit: i64,
}
