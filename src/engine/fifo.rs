// ==========================================
// 餐厅后台库存系统 - FIFO 消耗规划
// ==========================================
// 红线: 纯函数,不触数据库;调用方保证批次已按
//       transaction_date ASC, created_at ASC, id ASC 排好序
// 口径: 每批取 min(还需, 批剩余); 单次调用全有或全无
// ==========================================

use crate::domain::ledger::InventoryLedgerEntry;
use crate::domain::QUANTITY_EPSILON;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 从单个批次取用的规划结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ledger_id: Uuid,
    pub batch_code: String,
    pub quantity_taken: f64,
    pub unit_price: f64,
    /// 取用后的批次剩余量
    pub remaining_after: f64,
}

impl Allocation {
    /// 该笔取用的成本金额
    pub fn cost(&self) -> f64 {
        self.quantity_taken * self.unit_price
    }
}

/// 一次 FIFO 规划的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FifoPlan {
    pub requested: f64,
    pub fulfilled: f64,
    pub allocations: Vec<Allocation>,
}

impl FifoPlan {
    /// 需求是否被完全满足
    pub fn is_satisfied(&self) -> bool {
        self.shortage() <= 0.0
    }

    /// 缺口数量(满足时为 0)
    ///
    /// 与服务层库存校验共用同一业务零阈值,浮点残差不构成缺口
    pub fn shortage(&self) -> f64 {
        let gap = self.requested - self.fulfilled;
        if gap > QUANTITY_EPSILON {
            gap
        } else {
            0.0
        }
    }

    /// 全部取用的成本合计
    pub fn total_cost(&self) -> f64 {
        self.allocations.iter().map(Allocation::cost).sum()
    }

    /// 满足量加权平均单价(未取用任何批次时为 0)
    pub fn weighted_average_price(&self) -> f64 {
        if self.fulfilled <= 0.0 {
            return 0.0;
        }
        self.total_cost() / self.fulfilled
    }
}

/// 尽力规划: 顺序吃批次直到满足需求或批次耗尽
///
/// 不足时返回部分规划(预演展示缺口用),不报错
pub fn plan_partial(batches: &[InventoryLedgerEntry], required: f64) -> FifoPlan {
    let mut remaining_required = required;
    let mut allocations = Vec::new();

    for batch in batches {
        if remaining_required <= QUANTITY_EPSILON {
            break;
        }
        if batch.remaining_quantity <= 0.0 {
            continue;
        }
        let take = remaining_required.min(batch.remaining_quantity);
        allocations.push(Allocation {
            ledger_id: batch.id,
            batch_code: batch.display_batch_code().to_string(),
            quantity_taken: take,
            unit_price: batch.unit_price,
            remaining_after: batch.remaining_quantity - take,
        });
        remaining_required -= take;
    }

    FifoPlan {
        requested: required,
        fulfilled: required - remaining_required.max(0.0),
        allocations,
    }
}

/// 严格规划: 需求必须被完全满足,否则返回缺口
///
/// 锁定核算使用;错误值为 (可满足量, 缺口量)
pub fn plan(batches: &[InventoryLedgerEntry], required: f64) -> Result<FifoPlan, (f64, f64)> {
    let plan = plan_partial(batches, required);
    if plan.is_satisfied() {
        Ok(plan)
    } else {
        Err((plan.fulfilled, plan.shortage()))
    }
}
