// ==========================================
// 餐厅后台库存系统 - 计量单位领域模型
// ==========================================
// 换算为有向边 (from -> to, factor), 仅支持直接边查找;
// 每种物料经 MaterialUnit 成员资格指定唯一基准单位
// ==========================================

use crate::domain::types::DataStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==========================================
// UnitConversion - 单位换算有向边
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConversion {
    pub id: Uuid,
    pub from_unit_id: Uuid,
    pub to_unit_id: Uuid,
    pub factor: f64, // 恒为正数; 1 from = factor * to
    pub status: DataStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ==========================================
// UnitConversionHistory - 换算系数变更历史
// ==========================================
// 人工与系统级联(AUTO_*)变更都落历史,保证可审计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConversionHistory {
    pub id: Uuid,
    pub conversion_id: Uuid,
    pub from_unit_id: Uuid,
    pub to_unit_id: Uuid,
    pub old_factor: Option<f64>,
    pub new_factor: Option<f64>,
    pub change_type: crate::domain::types::ChangeType,
    pub reason: Option<String>,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
}

// ==========================================
// MaterialUnit - 物料-单位成员资格
// ==========================================
// 每种物料任意时刻至多一个 ACTIVE 基准单位;
// 第一个挂接的单位必须是基准单位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialUnit {
    pub id: Uuid,
    pub material_id: Uuid,
    pub unit_id: Uuid,
    pub is_base_unit: bool,
    pub status: DataStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
