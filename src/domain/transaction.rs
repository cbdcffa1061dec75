// ==========================================
// 餐厅后台库存系统 - 单据领域模型
// ==========================================
// 三类单据(入库/出库/调整)共用同一形状,语义由种类决定
// 生命周期: DRAFT(可编辑,不触台账) <-> LOCKED(台账生效)
// ==========================================

use crate::domain::types::{
    AdjustmentType, DataStatus, StockInType, StockOutType, TransactionKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// StockTransaction - 库存单据
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub transaction_code: String,
    pub kind: TransactionKind,
    pub warehouse_id: Uuid,

    // ===== 对手方(按种类取用) =====
    pub supplier_id: Option<Uuid>,              // 入库: 供应商
    pub customer_id: Option<Uuid>,              // 出库-销售: 客户
    pub destination_warehouse_id: Option<Uuid>, // 出库-调拨: 目的仓

    // ===== 子类型 =====
    pub stock_in_type: Option<StockInType>,
    pub stock_out_type: Option<StockOutType>,
    pub adjustment_type: Option<AdjustmentType>,

    /// 调拨配对: 转出单与自动入库单互指
    pub related_transaction_id: Option<Uuid>,

    pub reason: Option<String>, // 调整/报废原因
    pub reference_number: Option<String>,
    pub notes: Option<String>,

    pub transaction_date: DateTime<Utc>,
    pub total_amount: f64,
    pub is_locked: bool,
    pub status: DataStatus,

    // ===== 审计(显式操作者,无隐式全局用户) =====
    pub performed_by: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockTransaction {
    /// 是否为内部调拨出库单
    pub fn is_internal_transfer_out(&self) -> bool {
        self.kind == TransactionKind::StockOut
            && self.stock_out_type == Some(StockOutType::InternalTransfer)
    }

    /// 校验单据头的种类特定约束
    ///
    /// 只做字段存在性/组合校验,不做库存校验
    pub fn validate(&self) -> Result<(), String> {
        match self.kind {
            TransactionKind::StockIn => Ok(()),
            TransactionKind::StockOut => {
                let out_type = self
                    .stock_out_type
                    .ok_or_else(|| "出库单必须指定出库类型".to_string())?;
                match out_type {
                    StockOutType::InternalTransfer => {
                        let dest = self
                            .destination_warehouse_id
                            .ok_or_else(|| "调拨出库必须指定目的仓库".to_string())?;
                        if dest == self.warehouse_id {
                            return Err("调拨出库的目的仓库不能与源仓库相同".to_string());
                        }
                        Ok(())
                    }
                    StockOutType::Disposal => {
                        if self.reason.as_deref().unwrap_or("").trim().is_empty() {
                            return Err("报废出库必须填写报废原因".to_string());
                        }
                        Ok(())
                    }
                    StockOutType::Sale => Ok(()),
                }
            }
            TransactionKind::Adjustment => {
                if self.adjustment_type.is_none() {
                    return Err("调整单必须指定调整类型".to_string());
                }
                if self.reason.as_deref().unwrap_or("").trim().is_empty() {
                    return Err("调整单必须填写调整原因".to_string());
                }
                Ok(())
            }
        }
    }
}

// ==========================================
// TransactionItem - 单据行项目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub material_id: Uuid,
    pub unit_id: Uuid,
    pub quantity: f64, // 恒为正数;盘点行的方向在 signed_delta

    /// 入库成本单价;出库行在锁定核算后写入 FIFO 摊算结果
    pub unit_price: Option<f64>,
    pub total_amount: Option<f64>,

    // ===== 盘点定向修正专用 =====
    pub target_ledger_id: Option<Uuid>, // 直指批次,绕过 FIFO
    pub signed_delta: Option<f64>,      // 实盘 - 系统(带符号)

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionItem {
    /// 行项目基础校验
    pub fn validate(&self) -> Result<(), String> {
        if self.quantity <= 0.0 {
            return Err(format!(
                "行项目数量必须大于 0: material_id={}, quantity={}",
                self.material_id, self.quantity
            ));
        }
        if let Some(price) = self.unit_price {
            if price < 0.0 {
                return Err(format!(
                    "行项目单价不能为负: material_id={}, unit_price={}",
                    self.material_id, price
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_transaction(kind: TransactionKind) -> StockTransaction {
        StockTransaction {
            id: Uuid::new_v4(),
            transaction_code: "OUT-1".to_string(),
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
    fn test_transfer_requires_distinct_destination() {
        let mut txn = base_transaction(TransactionKind::StockOut);
        txn.stock_out_type = Some(StockOutType::InternalTransfer);
        assert!(txn.validate().is_err());

        txn.destination_warehouse_id = Some(txn.warehouse_id);
        assert!(txn.validate().is_err());

        txn.destination_warehouse_id = Some(Uuid::new_v4());
        assert!(txn.validate().is_ok());
    }

    #[test]
    fn test_disposal_requires_reason() {
        let mut txn = base_transaction(TransactionKind::StockOut);
        txn.stock_out_type = Some(StockOutType::Disposal);
        assert!(txn.validate().is_err());
        txn.reason = Some("过期报废".to_string());
        assert!(txn.validate().is_ok());
    }

    #[test]
    fn test_adjustment_requires_type_and_reason() {
        let mut txn = base_transaction(TransactionKind::Adjustment);
        assert!(txn.validate().is_err());
        txn.adjustment_type = Some(AdjustmentType::Increase);
        assert!(txn.validate().is_err());
        txn.reason = Some("盘盈".to_string());
        assert!(txn.validate().is_ok());
    }

    #[test]
    fn test_item_rejects_non_positive_quantity() {
        let item = TransactionItem {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            unit_id: Uuid::new_v4(),
            quantity: 0.0,
            unit_price: None,
            total_amount: None,
            target_ledger_id: None,
            signed_delta: None,
            notes: None,
            created_at: Utc::now(),
        };
        assert!(item.validate().is_err());
    }
}
