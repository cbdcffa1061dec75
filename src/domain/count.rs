// ==========================================
// 餐厅后台库存系统 - 盘点领域模型
// ==========================================
// 盘点行逐一钉在具体批次上,system_quantity 为创建行时点的
// 批次剩余量快照; 完成盘点将差异行转为一张已锁定的盘点调整单
// ==========================================

use crate::domain::types::{DataStatus, InventoryCountStatus};
use crate::domain::QUANTITY_EPSILON;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// InventoryCount - 盘点单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCount {
    pub id: Uuid,
    pub count_code: String,
    pub warehouse_id: Uuid,
    pub count_date: DateTime<Utc>,
    pub count_status: InventoryCountStatus,

    /// 完成盘点生成的调整单(一旦生成永不自动回退)
    pub adjustment_transaction_id: Option<Uuid>,

    pub performed_by: Option<Uuid>, // 盘点人(完成前必填)
    pub created_by: Uuid,
    pub notes: Option<String>,
    pub status: DataStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryCount {
    pub fn is_completed(&self) -> bool {
        self.count_status == InventoryCountStatus::Completed
    }

    /// 仅草稿可编辑
    pub fn can_edit(&self) -> bool {
        self.count_status == InventoryCountStatus::Draft
    }

    /// 状态迁移: DRAFT -> COMPLETED
    pub fn complete(&mut self) -> Result<(), String> {
        match self.count_status {
            InventoryCountStatus::Draft => {
                self.count_status = InventoryCountStatus::Completed;
                Ok(())
            }
            InventoryCountStatus::Completed => Err("盘点单已完成".to_string()),
            InventoryCountStatus::Cancelled => Err("盘点单已取消,无法完成".to_string()),
        }
    }

    /// 状态迁移: 任意态 -> CANCELLED
    ///
    /// 已完成盘点允许取消,但已生成的调整单保留不回退
    pub fn cancel(&mut self) -> Result<(), String> {
        if self.count_status == InventoryCountStatus::Cancelled {
            return Err("盘点单已是取消状态".to_string());
        }
        self.count_status = InventoryCountStatus::Cancelled;
        Ok(())
    }
}

// ==========================================
// InventoryCountItem - 盘点行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCountItem {
    pub id: Uuid,
    pub count_id: Uuid,
    pub material_id: Uuid,
    pub unit_id: Uuid,

    // ===== 钉定批次 =====
    pub ledger_id: Uuid,
    pub batch_number: Option<String>,
    pub transaction_date: DateTime<Utc>, // 批次入库日期

    // ===== 数量 =====
    pub system_quantity: f64,     // 创建行时点的批次剩余量快照
    pub actual_quantity: f64,     // 实盘数量
    pub difference_quantity: f64, // 实盘 - 系统

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryCountItem {
    /// 重算差异量(实盘 - 系统)
    pub fn calculate_difference(&mut self) {
        self.difference_quantity = self.actual_quantity - self.system_quantity;
    }

    /// 是否存在差异(差异为零的行不产生调整)
    pub fn has_difference(&self) -> bool {
        self.difference_quantity.abs() > QUANTITY_EPSILON
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.actual_quantity < 0.0 {
            return Err(format!(
                "实盘数量不能为负: material_id={}, actual={}",
                self.material_id, self.actual_quantity
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count() -> InventoryCount {
        InventoryCount {
            id: Uuid::new_v4(),
            count_code: "IC1".to_string(),
            warehouse_id: Uuid::new_v4(),
            count_date: Utc::now(),
            count_status: InventoryCountStatus::Draft,
            adjustment_transaction_id: None,
            performed_by: None,
            created_by: Uuid::new_v4(),
            notes: None,
            status: DataStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_complete_only_from_draft() {
        let mut c = count();
        assert!(c.complete().is_ok());
        assert!(c.complete().is_err());
    }

    #[test]
    fn test_cancel_keeps_adjustment_link() {
        let mut c = count();
        c.complete().unwrap();
        c.adjustment_transaction_id = Some(Uuid::new_v4());
        assert!(c.cancel().is_ok());
        assert!(c.adjustment_transaction_id.is_some());
        assert!(c.cancel().is_err());
    }

    #[test]
    fn test_difference_calculation() {
        let mut item = InventoryCountItem {
            id: Uuid::new_v4(),
            count_id: Uuid::new_v4(),
            material_id: Uuid::new_v4(),
            unit_id: Uuid::new_v4(),
            ledger_id: Uuid::new_v4(),
            batch_number: None,
            transaction_date: Utc::now(),
            system_quantity: 40.0,
            actual_quantity: 35.0,
            difference_quantity: 0.0,
            notes: None,
            created_at: Utc::now(),
        };
        item.calculate_difference();
        assert_eq!(item.difference_quantity, -5.0);
        assert!(item.has_difference());

        item.actual_quantity = 40.0;
        item.calculate_difference();
        assert!(!item.has_difference());
    }
}
