// ==========================================
// 餐厅后台库存系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 数据状态 (Data Status)
// ==========================================
// 软删除口径: DELETED 仅为历史展示保留,一切可用性查询只看 ACTIVE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataStatus {
    Active,
    Deleted,
}

impl DataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataStatus::Active => "ACTIVE",
            DataStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(DataStatus::Active),
            "DELETED" => Ok(DataStatus::Deleted),
            other => Err(format!("未知数据状态: {other}")),
        }
    }
}

// ==========================================
// 单据种类 (Transaction Kind)
// ==========================================
// 三类单据共用同一表结构,语义由种类 + 子类型决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    StockIn,
    StockOut,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::StockIn => "STOCK_IN",
            TransactionKind::StockOut => "STOCK_OUT",
            TransactionKind::Adjustment => "ADJUSTMENT",
        }
    }

    /// 单据编码前缀（IN-/OUT-/ADJ-）
    pub fn code_prefix(&self) -> &'static str {
        match self {
            TransactionKind::StockIn => "IN",
            TransactionKind::StockOut => "OUT",
            TransactionKind::Adjustment => "ADJ",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STOCK_IN" => Ok(TransactionKind::StockIn),
            "STOCK_OUT" => Ok(TransactionKind::StockOut),
            "ADJUSTMENT" => Ok(TransactionKind::Adjustment),
            other => Err(format!("未知单据种类: {other}")),
        }
    }
}

// ==========================================
// 入库子类型 (Stock-In Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockInType {
    Purchase,         // 采购入库
    InternalTransfer, // 内部调拨入库（由转出单自动生成）
}

impl StockInType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockInType::Purchase => "PURCHASE",
            StockInType::InternalTransfer => "INTERNAL_TRANSFER",
        }
    }
}

impl FromStr for StockInType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PURCHASE" => Ok(StockInType::Purchase),
            "INTERNAL_TRANSFER" => Ok(StockInType::InternalTransfer),
            other => Err(format!("未知入库类型: {other}")),
        }
    }
}

// ==========================================
// 出库子类型 (Stock-Out Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockOutType {
    Sale,             // 销售出库
    InternalTransfer, // 内部调拨出库（锁定时自动生成目的仓入库单）
    Disposal,         // 报废出库
}

impl StockOutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOutType::Sale => "SALE",
            StockOutType::InternalTransfer => "INTERNAL_TRANSFER",
            StockOutType::Disposal => "DISPOSAL",
        }
    }
}

impl FromStr for StockOutType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SALE" => Ok(StockOutType::Sale),
            "INTERNAL_TRANSFER" => Ok(StockOutType::InternalTransfer),
            "DISPOSAL" => Ok(StockOutType::Disposal),
            other => Err(format!("未知出库类型: {other}")),
        }
    }
}

// ==========================================
// 调整子类型 (Adjustment Type)
// ==========================================
// INCREASE: 建批,单价记零(遗留口径,见 DESIGN.md)
// DECREASE: FIFO 消耗
// INVENTORY_COUNT: 盘点定向修正,绕过 FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Increase,
    Decrease,
    InventoryCount,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Increase => "INCREASE",
            AdjustmentType::Decrease => "DECREASE",
            AdjustmentType::InventoryCount => "INVENTORY_COUNT",
        }
    }
}

impl fmt::Display for AdjustmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdjustmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCREASE" => Ok(AdjustmentType::Increase),
            "DECREASE" => Ok(AdjustmentType::Decrease),
            "INVENTORY_COUNT" => Ok(AdjustmentType::InventoryCount),
            other => Err(format!("未知调整类型: {other}")),
        }
    }
}

// ==========================================
// 盘点单状态 (Inventory Count Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryCountStatus {
    Draft,
    Completed,
    Cancelled,
}

impl InventoryCountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryCountStatus::Draft => "DRAFT",
            InventoryCountStatus::Completed => "COMPLETED",
            InventoryCountStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for InventoryCountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InventoryCountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(InventoryCountStatus::Draft),
            "COMPLETED" => Ok(InventoryCountStatus::Completed),
            "CANCELLED" => Ok(InventoryCountStatus::Cancelled),
            other => Err(format!("未知盘点状态: {other}")),
        }
    }
}

// ==========================================
// 换算系数变更类型 (Conversion Change Type)
// ==========================================
// AUTO_* 为系统对反向边的级联操作,区别于人工操作便于审计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    AutoCreateReverse,
    AutoUpdateReverse,
    AutoDeleteReverse,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
            ChangeType::AutoCreateReverse => "AUTO_CREATE_REVERSE",
            ChangeType::AutoUpdateReverse => "AUTO_UPDATE_REVERSE",
            ChangeType::AutoDeleteReverse => "AUTO_DELETE_REVERSE",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(ChangeType::Create),
            "UPDATE" => Ok(ChangeType::Update),
            "DELETE" => Ok(ChangeType::Delete),
            "AUTO_CREATE_REVERSE" => Ok(ChangeType::AutoCreateReverse),
            "AUTO_UPDATE_REVERSE" => Ok(ChangeType::AutoUpdateReverse),
            "AUTO_DELETE_REVERSE" => Ok(ChangeType::AutoDeleteReverse),
            other => Err(format!("未知变更类型: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_round_trips_through_as_str() {
        let all = [
            ChangeType::Create,
            ChangeType::Update,
            ChangeType::Delete,
            ChangeType::AutoCreateReverse,
            ChangeType::AutoUpdateReverse,
            ChangeType::AutoDeleteReverse,
        ];
        for change in all {
            assert_eq!(change.as_str().parse::<ChangeType>().unwrap(), change);
        }
        assert!("REVERSE".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_serde_representation_matches_database_column() {
        // JSON 序列化与数据库列存储必须是同一套字符串
        assert_eq!(
            serde_json::to_string(&TransactionKind::StockIn).unwrap(),
            "\"STOCK_IN\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeType::AutoCreateReverse).unwrap(),
            "\"AUTO_CREATE_REVERSE\""
        );
        assert_eq!(
            serde_json::from_str::<AdjustmentType>("\"INVENTORY_COUNT\"").unwrap(),
            AdjustmentType::InventoryCount
        );
        assert_eq!(
            serde_json::from_str::<DataStatus>("\"DELETED\"").unwrap(),
            DataStatus::Deleted
        );
    }
}
