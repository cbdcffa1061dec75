// ==========================================
// 餐厅后台库存系统 - 单据的台账作用分类
// ==========================================
// 锁定/解锁不按单据种类散落分支,先归类再统一分发:
// - CreateBatch:    建新批次(入库、调整增)
// - ConsumeFifo:    FIFO 消耗既有批次(出库、调整减)
// - TargetedMutate: 定向修正指定批次(盘点调整,绕过 FIFO)
// ==========================================

use crate::domain::transaction::StockTransaction;
use crate::domain::types::{AdjustmentType, TransactionKind};

/// 单据锁定时对台账产生的作用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    CreateBatch,
    ConsumeFifo,
    TargetedMutate,
}

impl LedgerEffect {
    /// 由单据头归类台账作用
    ///
    /// 调整单缺少调整类型时返回 Err(字段校验在服务层更早兜住)
    pub fn for_transaction(txn: &StockTransaction) -> Result<Self, String> {
        match txn.kind {
            TransactionKind::StockIn => Ok(LedgerEffect::CreateBatch),
            TransactionKind::StockOut => Ok(LedgerEffect::ConsumeFifo),
            TransactionKind::Adjustment => match txn.adjustment_type {
                Some(AdjustmentType::Increase) => Ok(LedgerEffect::CreateBatch),
                Some(AdjustmentType::Decrease) => Ok(LedgerEffect::ConsumeFifo),
                Some(AdjustmentType::InventoryCount) => Ok(LedgerEffect::TargetedMutate),
                None => Err("调整单缺少调整类型,无法归类台账作用".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{DataStatus, StockOutType};
    use chrono::Utc;
    use uuid::Uuid;

    fn txn(kind: TransactionKind) -> StockTransaction {
        StockTransaction {
            id: Uuid::new_v4(),
            transaction_code: "T-1".to_string(),
            kind,
            warehouse_id: Uuid::new_v4(),
            supplier_id: None,
            customer_id: None,
            destination_warehouse_id: None,
            stock_in_type: None,
            stock_out_type: None,
            adjustment_type: None,
            related_transaction_id: None,
            reason: None,
            reference_number: None,
            notes: None,
            transaction_date: Utc::now(),
            total_amount: 0.0,
            is_locked: false,
            status: DataStatus::Active,
            performed_by: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_effect_classification() {
        assert_eq!(
            LedgerEffect::for_transaction(&txn(TransactionKind::StockIn)).unwrap(),
            LedgerEffect::CreateBatch
        );

        let mut out = txn(TransactionKind::StockOut);
        out.stock_out_type = Some(StockOutType::Sale);
        assert_eq!(
            LedgerEffect::for_transaction(&out).unwrap(),
            LedgerEffect::ConsumeFifo
        );

        let mut adj = txn(TransactionKind::Adjustment);
        adj.adjustment_type = Some(AdjustmentType::Increase);
        assert_eq!(
            LedgerEffect::for_transaction(&adj).unwrap(),
            LedgerEffect::CreateBatch
        );
        adj.adjustment_type = Some(AdjustmentType::Decrease);
        assert_eq!(
            LedgerEffect::for_transaction(&adj).unwrap(),
            LedgerEffect::ConsumeFifo
        );
        adj.adjustment_type = Some(AdjustmentType::InventoryCount);
        assert_eq!(
            LedgerEffect::for_transaction(&adj).unwrap(),
            LedgerEffect::TargetedMutate
        );
        adj.adjustment_type = None;
        assert!(LedgerEffect::for_transaction(&adj).is_err());
    }
}
