// ==========================================
// 餐厅后台库存系统 - 单位换算与物料单位仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: unit_conversion / unit_conversion_history / material_unit_group
//       三张表的数据访问; 反向边级联与容差校验在服务层
// ==========================================

use crate::domain::types::{ChangeType, DataStatus};
use crate::domain::unit::{MaterialUnit, UnitConversion, UnitConversionHistory};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{column_enum, column_uuid, column_uuid_opt};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// UnitConversionRepository
// ==========================================

/// 单位换算有向边仓储
pub struct UnitConversionRepository {
    conn: Arc<Mutex<Connection>>,
}

const CONVERSION_COLUMNS: &str = "id, from_unit_id, to_unit_id, factor, status, created_by, \
     created_at, updated_by, updated_at";

fn map_conversion_row(row: &Row<'_>) -> rusqlite::Result<UnitConversion> {
    Ok(UnitConversion {
        id: column_uuid(0, row.get(0)?)?,
        from_unit_id: column_uuid(1, row.get(1)?)?,
        to_unit_id: column_uuid(2, row.get(2)?)?,
        factor: row.get(3)?,
        status: column_enum::<DataStatus>(4, row.get(4)?)?,
        created_by: column_uuid(5, row.get(5)?)?,
        created_at: row.get::<_, DateTime<Utc>>(6)?,
        updated_by: column_uuid_opt(7, row.get(7)?)?,
        updated_at: row.get::<_, Option<DateTime<Utc>>>(8)?,
    })
}

impl UnitConversionRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 读路径
    // ==========================================

    /// 查找 ACTIVE 的直接换算边
    pub fn find_active_pair(
        &self,
        from_unit_id: Uuid,
        to_unit_id: Uuid,
    ) -> RepositoryResult<Option<UnitConversion>> {
        let conn = self.get_conn()?;
        Self::find_active_pair_tx(&conn, from_unit_id, to_unit_id)
    }

    pub fn find_active_pair_tx(
        conn: &Connection,
        from_unit_id: Uuid,
        to_unit_id: Uuid,
    ) -> RepositoryResult<Option<UnitConversion>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM unit_conversion \
             WHERE from_unit_id = ?1 AND to_unit_id = ?2 AND status = 'ACTIVE'"
        ))?;
        let conversion = stmt
            .query_row(
                params![from_unit_id.to_string(), to_unit_id.to_string()],
                map_conversion_row,
            )
            .optional()?;
        Ok(conversion)
    }

    pub fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<UnitConversion>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    pub fn find_by_id_tx(conn: &Connection, id: Uuid) -> RepositoryResult<Option<UnitConversion>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM unit_conversion WHERE id = ?1"
        ))?;
        let conversion = stmt
            .query_row(params![id.to_string()], map_conversion_row)
            .optional()?;
        Ok(conversion)
    }

    /// 列出全部 ACTIVE 换算边
    pub fn list_active(&self) -> RepositoryResult<Vec<UnitConversion>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM unit_conversion \
             WHERE status = 'ACTIVE' ORDER BY created_at ASC"
        ))?;
        let conversions = stmt
            .query_map([], map_conversion_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversions)
    }

    /// 换算边变更历史(新变更在前)
    pub fn list_history(&self, conversion_id: Uuid) -> RepositoryResult<Vec<UnitConversionHistory>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversion_id, from_unit_id, to_unit_id, old_factor, new_factor, \
             change_type, reason, changed_by, changed_at \
             FROM unit_conversion_history WHERE conversion_id = ?1 \
             ORDER BY changed_at DESC, id DESC",
        )?;
        let history = stmt
            .query_map(params![conversion_id.to_string()], map_history_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(history)
    }

    // ==========================================
    // 写路径(一律事务内)
    // ==========================================

    pub fn insert_tx(conn: &Connection, conversion: &UnitConversion) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO unit_conversion ({CONVERSION_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                conversion.id.to_string(),
                conversion.from_unit_id.to_string(),
                conversion.to_unit_id.to_string(),
                conversion.factor,
                conversion.status.as_str(),
                conversion.created_by.to_string(),
                conversion.created_at,
                conversion.updated_by.map(|u| u.to_string()),
                conversion.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 改写换算系数
    pub fn set_factor_tx(
        conn: &Connection,
        conversion_id: Uuid,
        factor: f64,
        updated_by: Uuid,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE unit_conversion SET factor = ?1, updated_by = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![factor, updated_by.to_string(), now, conversion_id.to_string()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "unit_conversion".to_string(),
                id: conversion_id.to_string(),
            });
        }
        Ok(())
    }

    /// 软删除(台账引用时的删除路径)
    pub fn set_status_tx(
        conn: &Connection,
        conversion_id: Uuid,
        status: DataStatus,
        updated_by: Uuid,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE unit_conversion SET status = ?1, updated_by = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![
                status.as_str(),
                updated_by.to_string(),
                now,
                conversion_id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "unit_conversion".to_string(),
                id: conversion_id.to_string(),
            });
        }
        Ok(())
    }

    /// 物理删除(无台账引用时的删除路径)
    pub fn delete_tx(conn: &Connection, conversion_id: Uuid) -> RepositoryResult<()> {
        let deleted = conn.execute(
            "DELETE FROM unit_conversion WHERE id = ?1",
            params![conversion_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(RepositoryError::NotFound {
                entity: "unit_conversion".to_string(),
                id: conversion_id.to_string(),
            });
        }
        Ok(())
    }

    /// 追加变更历史(人工与 AUTO_* 级联共用)
    pub fn insert_history_tx(
        conn: &Connection,
        history: &UnitConversionHistory,
    ) -> RepositoryResult<()> {
        conn.execute(
            "INSERT INTO unit_conversion_history (id, conversion_id, from_unit_id, to_unit_id, \
             old_factor, new_factor, change_type, reason, changed_by, changed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                history.id.to_string(),
                history.conversion_id.to_string(),
                history.from_unit_id.to_string(),
                history.to_unit_id.to_string(),
                history.old_factor,
                history.new_factor,
                history.change_type.as_str(),
                history.reason,
                history.changed_by.to_string(),
                history.changed_at,
            ],
        )?;
        Ok(())
    }
}

fn map_history_row(row: &Row<'_>) -> rusqlite::Result<UnitConversionHistory> {
    Ok(UnitConversionHistory {
        id: column_uuid(0, row.get(0)?)?,
        conversion_id: column_uuid(1, row.get(1)?)?,
        from_unit_id: column_uuid(2, row.get(2)?)?,
        to_unit_id: column_uuid(3, row.get(3)?)?,
        old_factor: row.get(4)?,
        new_factor: row.get(5)?,
        change_type: column_enum::<ChangeType>(6, row.get(6)?)?,
        reason: row.get(7)?,
        changed_by: column_uuid(8, row.get(8)?)?,
        changed_at: row.get::<_, DateTime<Utc>>(9)?,
    })
}

// ==========================================
// MaterialUnitRepository
// ==========================================

/// 物料-单位成员资格仓储
pub struct MaterialUnitRepository {
    conn: Arc<Mutex<Connection>>,
}

const MATERIAL_UNIT_COLUMNS: &str =
    "id, material_id, unit_id, is_base_unit, status, created_by, created_at";

fn map_material_unit_row(row: &Row<'_>) -> rusqlite::Result<MaterialUnit> {
    Ok(MaterialUnit {
        id: column_uuid(0, row.get(0)?)?,
        material_id: column_uuid(1, row.get(1)?)?,
        unit_id: column_uuid(2, row.get(2)?)?,
        is_base_unit: row.get(3)?,
        status: column_enum::<DataStatus>(4, row.get(4)?)?,
        created_by: column_uuid(5, row.get(5)?)?,
        created_at: row.get::<_, DateTime<Utc>>(6)?,
    })
}

impl MaterialUnitRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 某物料的全部 ACTIVE 单位(基准单位在前)
    pub fn list_for_material(&self, material_id: Uuid) -> RepositoryResult<Vec<MaterialUnit>> {
        let conn = self.get_conn()?;
        Self::list_for_material_tx(&conn, material_id)
    }

    pub fn list_for_material_tx(
        conn: &Connection,
        material_id: Uuid,
    ) -> RepositoryResult<Vec<MaterialUnit>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATERIAL_UNIT_COLUMNS} FROM material_unit_group \
             WHERE material_id = ?1 AND status = 'ACTIVE' \
             ORDER BY is_base_unit DESC, created_at ASC"
        ))?;
        let units = stmt
            .query_map(params![material_id.to_string()], map_material_unit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(units)
    }

    /// 某物料的 ACTIVE 基准单位
    pub fn find_base_unit(&self, material_id: Uuid) -> RepositoryResult<Option<MaterialUnit>> {
        let conn = self.get_conn()?;
        Self::find_base_unit_tx(&conn, material_id)
    }

    pub fn find_base_unit_tx(
        conn: &Connection,
        material_id: Uuid,
    ) -> RepositoryResult<Option<MaterialUnit>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {MATERIAL_UNIT_COLUMNS} FROM material_unit_group \
             WHERE material_id = ?1 AND is_base_unit = 1 AND status = 'ACTIVE'"
        ))?;
        let unit = stmt
            .query_row(params![material_id.to_string()], map_material_unit_row)
            .optional()?;
        Ok(unit)
    }

    /// 某单位是否被任何物料的 ACTIVE 成员资格使用(换算边删除守卫)
    pub fn unit_in_use_tx(conn: &Connection, unit_id: Uuid) -> RepositoryResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM material_unit_group WHERE unit_id = ?1 AND status = 'ACTIVE'",
            params![unit_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 某物料是否已挂接某单位(ACTIVE)
    pub fn exists_tx(
        conn: &Connection,
        material_id: Uuid,
        unit_id: Uuid,
    ) -> RepositoryResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM material_unit_group \
             WHERE material_id = ?1 AND unit_id = ?2 AND status = 'ACTIVE'",
            params![material_id.to_string(), unit_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn insert_tx(conn: &Connection, member: &MaterialUnit) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO material_unit_group ({MATERIAL_UNIT_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                member.id.to_string(),
                member.material_id.to_string(),
                member.unit_id.to_string(),
                member.is_base_unit,
                member.status.as_str(),
                member.created_by.to_string(),
                member.created_at,
            ],
        )?;
        Ok(())
    }

    /// 改写基准单位标志(基准切换时成对调用)
    pub fn set_base_flag_tx(
        conn: &Connection,
        material_id: Uuid,
        unit_id: Uuid,
        is_base: bool,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE material_unit_group SET is_base_unit = ?1 \
             WHERE material_id = ?2 AND unit_id = ?3 AND status = 'ACTIVE'",
            params![is_base, material_id.to_string(), unit_id.to_string()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "material_unit_group".to_string(),
                id: format!("material={material_id}, unit={unit_id}"),
            });
        }
        Ok(())
    }

    /// 解绑单位(软删除)
    pub fn soft_delete_tx(
        conn: &Connection,
        material_id: Uuid,
        unit_id: Uuid,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE material_unit_group SET status = 'DELETED' \
             WHERE material_id = ?1 AND unit_id = ?2 AND status = 'ACTIVE'",
            params![material_id.to_string(), unit_id.to_string()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "material_unit_group".to_string(),
                id: format!("material={material_id}, unit={unit_id}"),
            });
        }
        Ok(())
    }
}
