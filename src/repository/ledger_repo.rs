// ==========================================
// 餐厅后台库存系统 - 台账数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: inventory_ledger 表的数据访问;
//       FIFO 排序口径(transaction_date ASC, created_at ASC, id ASC)
//       只在这里定义一次
// ==========================================

use crate::domain::ledger::InventoryLedgerEntry;
use crate::domain::types::DataStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{column_enum, column_uuid};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// 台账批次仓储
pub struct InventoryLedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

const LEDGER_COLUMNS: &str = "id, warehouse_id, material_id, transaction_id, transaction_code, \
     transaction_date, unit_id, unit_price, quantity, remaining_quantity, status, batch_number, \
     created_at";

fn map_ledger_row(row: &Row<'_>) -> rusqlite::Result<InventoryLedgerEntry> {
    Ok(InventoryLedgerEntry {
        id: column_uuid(0, row.get(0)?)?,
        warehouse_id: column_uuid(1, row.get(1)?)?,
        material_id: column_uuid(2, row.get(2)?)?,
        transaction_id: column_uuid(3, row.get(3)?)?,
        transaction_code: row.get(4)?,
        transaction_date: row.get::<_, DateTime<Utc>>(5)?,
        unit_id: column_uuid(6, row.get(6)?)?,
        unit_price: row.get(7)?,
        quantity: row.get(8)?,
        remaining_quantity: row.get(9)?,
        status: column_enum::<DataStatus>(10, row.get(10)?)?,
        batch_number: row.get(11)?,
        created_at: row.get::<_, DateTime<Utc>>(12)?,
    })
}

impl InventoryLedgerRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 读路径
    // ==========================================

    /// 按 id 查询单个批次
    pub fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<InventoryLedgerEntry>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    /// 事务内按 id 查询
    pub fn find_by_id_tx(
        conn: &Connection,
        id: Uuid,
    ) -> RepositoryResult<Option<InventoryLedgerEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM inventory_ledger WHERE id = ?1"
        ))?;
        let entry = stmt
            .query_row(params![id.to_string()], map_ledger_row)
            .optional()?;
        Ok(entry)
    }

    /// 按 (仓库, 物料) 查询可消耗批次, FIFO 次序
    ///
    /// 口径: ACTIVE 且 remaining_quantity > 0,
    ///       按 transaction_date ASC, created_at ASC, id ASC 稳定排序
    pub fn find_available_batches(
        &self,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> RepositoryResult<Vec<InventoryLedgerEntry>> {
        let conn = self.get_conn()?;
        Self::find_available_batches_tx(&conn, warehouse_id, material_id)
    }

    /// 事务内查询可消耗批次(锁定核算使用,与读路径同一 SQL)
    pub fn find_available_batches_tx(
        conn: &Connection,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> RepositoryResult<Vec<InventoryLedgerEntry>> {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM inventory_ledger
            WHERE warehouse_id = ?1 AND material_id = ?2
              AND status = 'ACTIVE' AND remaining_quantity > 0
            ORDER BY transaction_date ASC, created_at ASC, id ASC
            "#
        ))?;

        let entries = stmt
            .query_map(
                params![warehouse_id.to_string(), material_id.to_string()],
                map_ledger_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// 按 (仓库, 物料) 汇总可用库存
    pub fn available_stock(&self, warehouse_id: Uuid, material_id: Uuid) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        Self::available_stock_tx(&conn, warehouse_id, material_id)
    }

    /// 事务内汇总可用库存(锁定前置校验使用)
    pub fn available_stock_tx(
        conn: &Connection,
        warehouse_id: Uuid,
        material_id: Uuid,
    ) -> RepositoryResult<f64> {
        let total: f64 = conn.query_row(
            r#"
            SELECT COALESCE(SUM(remaining_quantity), 0)
            FROM inventory_ledger
            WHERE warehouse_id = ?1 AND material_id = ?2 AND status = 'ACTIVE'
            "#,
            params![warehouse_id.to_string(), material_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// 查询某单据创建的全部批次
    pub fn find_by_transaction(
        &self,
        transaction_id: Uuid,
    ) -> RepositoryResult<Vec<InventoryLedgerEntry>> {
        let conn = self.get_conn()?;
        Self::find_by_transaction_tx(&conn, transaction_id)
    }

    /// 事务内查询某单据创建的批次
    pub fn find_by_transaction_tx(
        conn: &Connection,
        transaction_id: Uuid,
    ) -> RepositoryResult<Vec<InventoryLedgerEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {LEDGER_COLUMNS} FROM inventory_ledger \
             WHERE transaction_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let entries = stmt
            .query_map(params![transaction_id.to_string()], map_ledger_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// 统计使用某单位的台账行数(换算系数删除守卫)
    pub fn count_usage_by_unit(&self, unit_id: Uuid) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::count_usage_by_unit_tx(&conn, unit_id)
    }

    pub fn count_usage_by_unit_tx(conn: &Connection, unit_id: Uuid) -> RepositoryResult<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inventory_ledger WHERE unit_id = ?1",
            params![unit_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 统计某物料+单位的台账行数(物料解绑单位守卫)
    pub fn count_usage_by_material_and_unit(
        &self,
        material_id: Uuid,
        unit_id: Uuid,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::count_usage_by_material_and_unit_tx(&conn, material_id, unit_id)
    }

    pub fn count_usage_by_material_and_unit_tx(
        conn: &Connection,
        material_id: Uuid,
        unit_id: Uuid,
    ) -> RepositoryResult<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inventory_ledger WHERE material_id = ?1 AND unit_id = ?2",
            params![material_id.to_string(), unit_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 统计某物料的全部台账行数(基准单位不可变守卫)
    pub fn count_by_material(&self, material_id: Uuid) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::count_by_material_tx(&conn, material_id)
    }

    pub fn count_by_material_tx(conn: &Connection, material_id: Uuid) -> RepositoryResult<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inventory_ledger WHERE material_id = ?1",
            params![material_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 写路径(一律事务内)
    // ==========================================

    /// 插入新批次 —— 库存进入台账的唯一入口
    pub fn insert_batch_tx(conn: &Connection, entry: &InventoryLedgerEntry) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO inventory_ledger (
                id, warehouse_id, material_id, transaction_id, transaction_code,
                transaction_date, unit_id, unit_price, quantity, remaining_quantity,
                status, batch_number, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                entry.id.to_string(),
                entry.warehouse_id.to_string(),
                entry.material_id.to_string(),
                entry.transaction_id.to_string(),
                entry.transaction_code,
                entry.transaction_date,
                entry.unit_id.to_string(),
                entry.unit_price,
                entry.quantity,
                entry.remaining_quantity,
                entry.status.as_str(),
                entry.batch_number,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// 改写批次剩余量(FIFO 消耗/解锁回补共用)
    pub fn set_remaining_tx(
        conn: &Connection,
        ledger_id: Uuid,
        remaining: f64,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE inventory_ledger SET remaining_quantity = ?1 WHERE id = ?2",
            params![remaining, ledger_id.to_string()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "inventory_ledger".to_string(),
                id: ledger_id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除某单据创建的全部批次(仅建批类单据解锁路径)
    ///
    /// 被引用校验由服务层先行完成,这里只做删除
    pub fn delete_by_transaction_tx(
        conn: &Connection,
        transaction_id: Uuid,
    ) -> RepositoryResult<usize> {
        let deleted = conn.execute(
            "DELETE FROM inventory_ledger WHERE transaction_id = ?1",
            params![transaction_id.to_string()],
        )?;
        Ok(deleted)
    }
}
