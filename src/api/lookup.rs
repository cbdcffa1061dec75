// ==========================================
// 餐厅后台库存系统 - 主数据名称解析
// ==========================================
// 物料/单位/仓库主数据在本核心之外维护,
// 服务层只需要"id -> 人读名称"用于展示与错误消息;
// 以 trait 留出接缝,测试与嵌入场景注入静态表即可
// ==========================================

use std::collections::HashMap;
use uuid::Uuid;

/// 主数据名称解析接缝
pub trait MasterDataLookup: Send + Sync {
    fn material_name(&self, id: Uuid) -> String;
    fn unit_name(&self, id: Uuid) -> String;
    fn warehouse_name(&self, id: Uuid) -> String;
}

/// 静态表实现(测试与嵌入场景)
///
/// 未登记的 id 回退为 id 字符串,名称缺失不致错误消息失效
#[derive(Default)]
pub struct StaticLookup {
    materials: HashMap<Uuid, String>,
    units: HashMap<Uuid, String>,
    warehouses: HashMap<Uuid, String>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.materials.insert(id, name.into());
        self
    }

    pub fn with_unit(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.units.insert(id, name.into());
        self
    }

    pub fn with_warehouse(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.warehouses.insert(id, name.into());
        self
    }
}

impl MasterDataLookup for StaticLookup {
    fn material_name(&self, id: Uuid) -> String {
        self.materials
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn unit_name(&self, id: Uuid) -> String {
        self.units
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn warehouse_name(&self, id: Uuid) -> String {
        self.warehouses
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}
