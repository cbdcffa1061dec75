// ==========================================
// 餐厅后台库存系统 - 盘点数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: inventory_count / inventory_count_item 两张表的数据访问
// ==========================================

use crate::domain::count::{InventoryCount, InventoryCountItem};
use crate::domain::types::{DataStatus, InventoryCountStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{column_enum, column_uuid, column_uuid_opt};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 盘点单仓储
pub struct InventoryCountRepository {
    conn: Arc<Mutex<Connection>>,
}

const COUNT_COLUMNS: &str = "id, count_code, warehouse_id, count_date, count_status, \
     adjustment_transaction_id, performed_by, created_by, notes, status, created_at, updated_at";

fn map_count_row(row: &Row<'_>) -> rusqlite::Result<InventoryCount> {
    Ok(InventoryCount {
        id: column_uuid(0, row.get(0)?)?,
        count_code: row.get(1)?,
        warehouse_id: column_uuid(2, row.get(2)?)?,
        count_date: row.get::<_, DateTime<Utc>>(3)?,
        count_status: column_enum::<InventoryCountStatus>(4, row.get(4)?)?,
        adjustment_transaction_id: column_uuid_opt(5, row.get(5)?)?,
        performed_by: column_uuid_opt(6, row.get(6)?)?,
        created_by: column_uuid(7, row.get(7)?)?,
        notes: row.get(8)?,
        status: column_enum::<DataStatus>(9, row.get(9)?)?,
        created_at: row.get::<_, DateTime<Utc>>(10)?,
        updated_at: row.get::<_, DateTime<Utc>>(11)?,
    })
}

const COUNT_ITEM_COLUMNS: &str = "id, count_id, material_id, unit_id, ledger_id, batch_number, \
     transaction_date, system_quantity, actual_quantity, difference_quantity, notes, created_at";

fn map_count_item_row(row: &Row<'_>) -> rusqlite::Result<InventoryCountItem> {
    Ok(InventoryCountItem {
        id: column_uuid(0, row.get(0)?)?,
        count_id: column_uuid(1, row.get(1)?)?,
        material_id: column_uuid(2, row.get(2)?)?,
        unit_id: column_uuid(3, row.get(3)?)?,
        ledger_id: column_uuid(4, row.get(4)?)?,
        batch_number: row.get(5)?,
        transaction_date: row.get::<_, DateTime<Utc>>(6)?,
        system_quantity: row.get(7)?,
        actual_quantity: row.get(8)?,
        difference_quantity: row.get(9)?,
        notes: row.get(10)?,
        created_at: row.get::<_, DateTime<Utc>>(11)?,
    })
}

impl InventoryCountRepository {
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

    pub fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<InventoryCount>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    pub fn find_by_id_tx(conn: &Connection, id: Uuid) -> RepositoryResult<Option<InventoryCount>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COUNT_COLUMNS} FROM inventory_count WHERE id = ?1"
        ))?;
        let count = stmt
            .query_row(params![id.to_string()], map_count_row)
            .optional()?;
        Ok(count)
    }

    pub fn find_items(&self, count_id: Uuid) -> RepositoryResult<Vec<InventoryCountItem>> {
        let conn = self.get_conn()?;
        Self::find_items_tx(&conn, count_id)
    }

    pub fn find_items_tx(
        conn: &Connection,
        count_id: Uuid,
    ) -> RepositoryResult<Vec<InventoryCountItem>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COUNT_ITEM_COLUMNS} FROM inventory_count_item \
             WHERE count_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let items = stmt
            .query_map(params![count_id.to_string()], map_count_item_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// 某仓库的盘点单列表(新单在前)
    pub fn list_by_warehouse(&self, warehouse_id: Uuid) -> RepositoryResult<Vec<InventoryCount>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COUNT_COLUMNS} FROM inventory_count \
             WHERE warehouse_id = ?1 AND status = 'ACTIVE' \
             ORDER BY count_date DESC, created_at DESC"
        ))?;
        let counts = stmt
            .query_map(params![warehouse_id.to_string()], map_count_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ==========================================
    // 写路径(一律事务内)
    // ==========================================

    pub fn insert_tx(conn: &Connection, count: &InventoryCount) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO inventory_count ({COUNT_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                count.id.to_string(),
                count.count_code,
                count.warehouse_id.to_string(),
                count.count_date,
                count.count_status.as_str(),
                count.adjustment_transaction_id.map(|u| u.to_string()),
                count.performed_by.map(|u| u.to_string()),
                count.created_by.to_string(),
                count.notes,
                count.status.as_str(),
                count.created_at,
                count.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn insert_item_tx(conn: &Connection, item: &InventoryCountItem) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO inventory_count_item ({COUNT_ITEM_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                item.id.to_string(),
                item.count_id.to_string(),
                item.material_id.to_string(),
                item.unit_id.to_string(),
                item.ledger_id.to_string(),
                item.batch_number,
                item.transaction_date,
                item.system_quantity,
                item.actual_quantity,
                item.difference_quantity,
                item.notes,
                item.created_at,
            ],
        )?;
        Ok(())
    }

    /// 草稿编辑: 整体替换盘点行
    pub fn replace_items_tx(
        conn: &Connection,
        count_id: Uuid,
        items: &[InventoryCountItem],
    ) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM inventory_count_item WHERE count_id = ?1",
            params![count_id.to_string()],
        )?;
        for item in items {
            Self::insert_item_tx(conn, item)?;
        }
        Ok(())
    }

    /// 更新盘点单头(草稿编辑)
    pub fn update_header_tx(conn: &Connection, count: &InventoryCount) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE inventory_count SET count_date = ?1, performed_by = ?2, notes = ?3, \
             updated_at = ?4 WHERE id = ?5",
            params![
                count.count_date,
                count.performed_by.map(|u| u.to_string()),
                count.notes,
                count.updated_at,
                count.id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "inventory_count".to_string(),
                id: count.id.to_string(),
            });
        }
        Ok(())
    }

    /// 改写盘点状态并(完成时)挂接调整单
    pub fn set_status_tx(
        conn: &Connection,
        count_id: Uuid,
        count_status: InventoryCountStatus,
        adjustment_transaction_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE inventory_count SET count_status = ?1, \
             adjustment_transaction_id = COALESCE(?2, adjustment_transaction_id), \
             updated_at = ?3 WHERE id = ?4",
            params![
                count_status.as_str(),
                adjustment_transaction_id.map(|u| u.to_string()),
                now,
                count_id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "inventory_count".to_string(),
                id: count_id.to_string(),
            });
        }
        Ok(())
    }
}
