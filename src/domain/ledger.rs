// ==========================================
// 餐厅后台库存系统 - 台账领域模型
// ==========================================
// 红线: 台账是唯一共享可变资源,只能经由
//       建批/FIFO消耗/盘点定向修正 三条路径改写
// ==========================================

use crate::domain::types::DataStatus;
use crate::domain::QUANTITY_EPSILON;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// InventoryLedgerEntry - 台账批次
// ==========================================
// 一次入库事件对应一行;quantity 为入库原始数量(不可变),
// remaining_quantity 单调不增,仅解锁回补与盘点增差可回升
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLedgerEntry {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub material_id: Uuid,

    // ===== 来源单据 =====
    pub transaction_id: Uuid,
    pub transaction_code: String, // 人读单据编码(IN-xxx 等)
    pub transaction_date: DateTime<Utc>,

    // ===== 成本口径 =====
    pub unit_id: Uuid,
    pub unit_price: f64, // 入库成本单价(调整增单恒为 0)

    // ===== 数量 =====
    pub quantity: f64,           // 入库原始数量
    pub remaining_quantity: f64, // 剩余数量(FIFO 消耗对象)

    pub status: DataStatus,
    pub batch_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryLedgerEntry {
    /// 批次是否已耗尽（耗尽批次保留,只有创建它的单据解锁才会删除）
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity <= 0.0
    }

    /// 批次是否被部分消耗过(含盘点修正)
    pub fn is_touched(&self) -> bool {
        (self.remaining_quantity - self.quantity).abs() > QUANTITY_EPSILON
    }

    /// 展示用批次编码: 优先批次号,其次单据编码
    pub fn display_batch_code(&self) -> &str {
        match &self.batch_number {
            Some(code) if !code.is_empty() => code,
            _ => &self.transaction_code,
        }
    }
}

// ==========================================
// BatchMapping - 批次追溯映射
// ==========================================
// 消耗行项目 → 来源批次 的追溯边;
// 仅在所属单据处于锁定态时存在,解锁即删除并回补批次余量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMapping {
    pub id: Uuid,
    pub item_id: Uuid,      // 消耗方行项目
    pub ledger_id: Uuid,    // 来源批次
    pub quantity_used: f64, // 从该批次取用的数量
    pub unit_price: f64,    // 消耗时点的批次单价快照
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(quantity: f64, remaining: f64) -> InventoryLedgerEntry {
        InventoryLedgerEntry {
            id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            transaction_code: "IN-1".to_string(),
            transaction_date: Utc::now(),
            unit_id: Uuid::new_v4(),
            unit_price: 10.0,
            quantity,
            remaining_quantity: remaining,
            status: DataStatus::Active,
            batch_number: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exhausted_and_touched() {
        assert!(entry(100.0, 0.0).is_exhausted());
        assert!(!entry(100.0, 40.0).is_exhausted());
        assert!(entry(100.0, 40.0).is_touched());
        assert!(!entry(100.0, 100.0).is_touched());
    }

    #[test]
    fn test_display_batch_code_falls_back_to_transaction_code() {
        let mut e = entry(10.0, 10.0);
        assert_eq!(e.display_batch_code(), "IN-1");
        e.batch_number = Some("B-77".to_string());
        assert_eq!(e.display_batch_code(), "B-77");
    }
}
