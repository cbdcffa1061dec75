// ==========================================
// 餐厅后台库存系统 - 单据与批次映射仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: stock_transaction / stock_transaction_item / batch_mapping
//       三张表的数据访问
// ==========================================

use crate::domain::ledger::BatchMapping;
use crate::domain::transaction::{StockTransaction, TransactionItem};
use crate::domain::types::{
    AdjustmentType, DataStatus, StockInType, StockOutType, TransactionKind,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{column_enum, column_uuid, column_uuid_opt};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ==========================================
// StockTransactionRepository
// ==========================================

/// 库存单据仓储
pub struct StockTransactionRepository {
    conn: Arc<Mutex<Connection>>,
}

const TXN_COLUMNS: &str = "id, transaction_code, kind, warehouse_id, supplier_id, customer_id, \
     destination_warehouse_id, stock_in_type, stock_out_type, adjustment_type, \
     related_transaction_id, reason, reference_number, notes, transaction_date, total_amount, \
     is_locked, status, performed_by, created_by, created_at, updated_at";

fn column_enum_opt<T>(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    match raw {
        Some(s) => column_enum(idx, s).map(Some),
        None => Ok(None),
    }
}

fn map_transaction_row(row: &Row<'_>) -> rusqlite::Result<StockTransaction> {
    Ok(StockTransaction {
        id: column_uuid(0, row.get(0)?)?,
        transaction_code: row.get(1)?,
        kind: column_enum::<TransactionKind>(2, row.get(2)?)?,
        warehouse_id: column_uuid(3, row.get(3)?)?,
        supplier_id: column_uuid_opt(4, row.get(4)?)?,
        customer_id: column_uuid_opt(5, row.get(5)?)?,
        destination_warehouse_id: column_uuid_opt(6, row.get(6)?)?,
        stock_in_type: column_enum_opt::<StockInType>(7, row.get(7)?)?,
        stock_out_type: column_enum_opt::<StockOutType>(8, row.get(8)?)?,
        adjustment_type: column_enum_opt::<AdjustmentType>(9, row.get(9)?)?,
        related_transaction_id: column_uuid_opt(10, row.get(10)?)?,
        reason: row.get(11)?,
        reference_number: row.get(12)?,
        notes: row.get(13)?,
        transaction_date: row.get::<_, DateTime<Utc>>(14)?,
        total_amount: row.get(15)?,
        is_locked: row.get(16)?,
        status: column_enum::<DataStatus>(17, row.get(17)?)?,
        performed_by: column_uuid_opt(18, row.get(18)?)?,
        created_by: column_uuid(19, row.get(19)?)?,
        created_at: row.get::<_, DateTime<Utc>>(20)?,
        updated_at: row.get::<_, DateTime<Utc>>(21)?,
    })
}

const ITEM_COLUMNS: &str = "id, transaction_id, material_id, unit_id, quantity, unit_price, \
     total_amount, target_ledger_id, signed_delta, notes, created_at";

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<TransactionItem> {
    Ok(TransactionItem {
        id: column_uuid(0, row.get(0)?)?,
        transaction_id: column_uuid(1, row.get(1)?)?,
        material_id: column_uuid(2, row.get(2)?)?,
        unit_id: column_uuid(3, row.get(3)?)?,
        quantity: row.get(4)?,
        unit_price: row.get(5)?,
        total_amount: row.get(6)?,
        target_ledger_id: column_uuid_opt(7, row.get(7)?)?,
        signed_delta: row.get(8)?,
        notes: row.get(9)?,
        created_at: row.get::<_, DateTime<Utc>>(10)?,
    })
}

impl StockTransactionRepository {
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

    pub fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<StockTransaction>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, id)
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        id: Uuid,
    ) -> RepositoryResult<Option<StockTransaction>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM stock_transaction WHERE id = ?1"
        ))?;
        let txn = stmt
            .query_row(params![id.to_string()], map_transaction_row)
            .optional()?;
        Ok(txn)
    }

    /// 查询单据的全部行项目
    pub fn find_items(&self, transaction_id: Uuid) -> RepositoryResult<Vec<TransactionItem>> {
        let conn = self.get_conn()?;
        Self::find_items_tx(&conn, transaction_id)
    }

    pub fn find_items_tx(
        conn: &Connection,
        transaction_id: Uuid,
    ) -> RepositoryResult<Vec<TransactionItem>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM stock_transaction_item \
             WHERE transaction_id = ?1 ORDER BY created_at ASC, id ASC"
        ))?;
        let items = stmt
            .query_map(params![transaction_id.to_string()], map_item_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// 某仓库的单据列表(新单在前)
    pub fn list_by_warehouse(
        &self,
        warehouse_id: Uuid,
    ) -> RepositoryResult<Vec<StockTransaction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM stock_transaction \
             WHERE warehouse_id = ?1 AND status = 'ACTIVE' \
             ORDER BY transaction_date DESC, created_at DESC"
        ))?;
        let txns = stmt
            .query_map(params![warehouse_id.to_string()], map_transaction_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(txns)
    }

    // ==========================================
    // 写路径(一律事务内)
    // ==========================================

    /// 插入单据头
    pub fn insert_tx(conn: &Connection, txn: &StockTransaction) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO stock_transaction ({TXN_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                  ?17, ?18, ?19, ?20, ?21, ?22)"
            ),
            params![
                txn.id.to_string(),
                txn.transaction_code,
                txn.kind.as_str(),
                txn.warehouse_id.to_string(),
                txn.supplier_id.map(|u| u.to_string()),
                txn.customer_id.map(|u| u.to_string()),
                txn.destination_warehouse_id.map(|u| u.to_string()),
                txn.stock_in_type.map(|t| t.as_str()),
                txn.stock_out_type.map(|t| t.as_str()),
                txn.adjustment_type.map(|t| t.as_str()),
                txn.related_transaction_id.map(|u| u.to_string()),
                txn.reason,
                txn.reference_number,
                txn.notes,
                txn.transaction_date,
                txn.total_amount,
                txn.is_locked,
                txn.status.as_str(),
                txn.performed_by.map(|u| u.to_string()),
                txn.created_by.to_string(),
                txn.created_at,
                txn.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 插入单条行项目
    pub fn insert_item_tx(conn: &Connection, item: &TransactionItem) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO stock_transaction_item ({ITEM_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                item.id.to_string(),
                item.transaction_id.to_string(),
                item.material_id.to_string(),
                item.unit_id.to_string(),
                item.quantity,
                item.unit_price,
                item.total_amount,
                item.target_ledger_id.map(|u| u.to_string()),
                item.signed_delta,
                item.notes,
                item.created_at,
            ],
        )?;
        Ok(())
    }

    /// 草稿编辑: 整体替换行项目
    pub fn replace_items_tx(
        conn: &Connection,
        transaction_id: Uuid,
        items: &[TransactionItem],
    ) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM stock_transaction_item WHERE transaction_id = ?1",
            params![transaction_id.to_string()],
        )?;
        for item in items {
            Self::insert_item_tx(conn, item)?;
        }
        Ok(())
    }

    /// 更新单据头(草稿编辑)
    pub fn update_header_tx(conn: &Connection, txn: &StockTransaction) -> RepositoryResult<()> {
        let updated = conn.execute(
            r#"
            UPDATE stock_transaction SET
                warehouse_id = ?1, supplier_id = ?2, customer_id = ?3,
                destination_warehouse_id = ?4, stock_in_type = ?5, stock_out_type = ?6,
                adjustment_type = ?7, reason = ?8, reference_number = ?9, notes = ?10,
                transaction_date = ?11, performed_by = ?12, updated_at = ?13
            WHERE id = ?14
            "#,
            params![
                txn.warehouse_id.to_string(),
                txn.supplier_id.map(|u| u.to_string()),
                txn.customer_id.map(|u| u.to_string()),
                txn.destination_warehouse_id.map(|u| u.to_string()),
                txn.stock_in_type.map(|t| t.as_str()),
                txn.stock_out_type.map(|t| t.as_str()),
                txn.adjustment_type.map(|t| t.as_str()),
                txn.reason,
                txn.reference_number,
                txn.notes,
                txn.transaction_date,
                txn.performed_by.map(|u| u.to_string()),
                txn.updated_at,
                txn.id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "stock_transaction".to_string(),
                id: txn.id.to_string(),
            });
        }
        Ok(())
    }

    /// 改写锁定标志与操作者
    pub fn set_locked_tx(
        conn: &Connection,
        transaction_id: Uuid,
        locked: bool,
        performed_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let updated = conn.execute(
            "UPDATE stock_transaction SET is_locked = ?1, performed_by = ?2, updated_at = ?3 \
             WHERE id = ?4",
            params![
                locked,
                performed_by.map(|u| u.to_string()),
                now,
                transaction_id.to_string(),
            ],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "stock_transaction".to_string(),
                id: transaction_id.to_string(),
            });
        }
        Ok(())
    }

    /// 挂接调拨配对单
    pub fn set_related_tx(
        conn: &Connection,
        transaction_id: Uuid,
        related_transaction_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE stock_transaction SET related_transaction_id = ?1, updated_at = ?2 \
             WHERE id = ?3",
            params![
                related_transaction_id.map(|u| u.to_string()),
                now,
                transaction_id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// 写回单据总金额(出库 FIFO 核算后)
    pub fn set_total_tx(
        conn: &Connection,
        transaction_id: Uuid,
        total_amount: f64,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE stock_transaction SET total_amount = ?1, updated_at = ?2 WHERE id = ?3",
            params![total_amount, now, transaction_id.to_string()],
        )?;
        Ok(())
    }

    /// 写回单条行项目的 FIFO 摊算结果
    pub fn set_item_cost_tx(
        conn: &Connection,
        item_id: Uuid,
        unit_price: f64,
        total_amount: f64,
    ) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE stock_transaction_item SET unit_price = ?1, total_amount = ?2 WHERE id = ?3",
            params![unit_price, total_amount, item_id.to_string()],
        )?;
        Ok(())
    }

    /// 清除行项目的 FIFO 摊算结果(解锁回退)
    pub fn clear_item_cost_tx(conn: &Connection, transaction_id: Uuid) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE stock_transaction_item SET unit_price = NULL, total_amount = NULL \
             WHERE transaction_id = ?1",
            params![transaction_id.to_string()],
        )?;
        Ok(())
    }

    /// 删除草稿单据(含行项目)
    ///
    /// 锁定校验由服务层先行完成
    pub fn delete_draft_tx(conn: &Connection, transaction_id: Uuid) -> RepositoryResult<()> {
        conn.execute(
            "DELETE FROM stock_transaction_item WHERE transaction_id = ?1",
            params![transaction_id.to_string()],
        )?;
        let deleted = conn.execute(
            "DELETE FROM stock_transaction WHERE id = ?1",
            params![transaction_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(RepositoryError::NotFound {
                entity: "stock_transaction".to_string(),
                id: transaction_id.to_string(),
            });
        }
        Ok(())
    }
}

// ==========================================
// BatchMappingRepository
// ==========================================

/// 出库/调整行与台账批次的映射仓储(成本追溯)
pub struct BatchMappingRepository {
    conn: Arc<Mutex<Connection>>,
}

const MAPPING_COLUMNS: &str = "id, item_id, ledger_id, quantity_used, unit_price, created_at";

fn map_mapping_row(row: &Row<'_>) -> rusqlite::Result<BatchMapping> {
    Ok(BatchMapping {
        id: column_uuid(0, row.get(0)?)?,
        item_id: column_uuid(1, row.get(1)?)?,
        ledger_id: column_uuid(2, row.get(2)?)?,
        quantity_used: row.get(3)?,
        unit_price: row.get(4)?,
        created_at: row.get::<_, DateTime<Utc>>(5)?,
    })
}

impl BatchMappingRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询某单据全部行项目的批次映射(FIFO 消耗次序)
    pub fn find_by_transaction(&self, transaction_id: Uuid) -> RepositoryResult<Vec<BatchMapping>> {
        let conn = self.get_conn()?;
        Self::find_by_transaction_tx(&conn, transaction_id)
    }

    pub fn find_by_transaction_tx(
        conn: &Connection,
        transaction_id: Uuid,
    ) -> RepositoryResult<Vec<BatchMapping>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT m.id, m.item_id, m.ledger_id, m.quantity_used, m.unit_price, m.created_at \
             FROM batch_mapping m \
             JOIN stock_transaction_item i ON i.id = m.item_id \
             WHERE i.transaction_id = ?1 ORDER BY m.created_at ASC, m.id ASC"
        ))?;
        let mappings = stmt
            .query_map(params![transaction_id.to_string()], map_mapping_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(mappings)
    }

    /// 插入映射行
    pub fn insert_tx(conn: &Connection, mapping: &BatchMapping) -> RepositoryResult<()> {
        conn.execute(
            &format!(
                "INSERT INTO batch_mapping ({MAPPING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                mapping.id.to_string(),
                mapping.item_id.to_string(),
                mapping.ledger_id.to_string(),
                mapping.quantity_used,
                mapping.unit_price,
                mapping.created_at,
            ],
        )?;
        Ok(())
    }

    /// 删除某单据的全部映射(解锁回补)
    pub fn delete_by_transaction_tx(
        conn: &Connection,
        transaction_id: Uuid,
    ) -> RepositoryResult<usize> {
        let deleted = conn.execute(
            "DELETE FROM batch_mapping WHERE item_id IN \
             (SELECT id FROM stock_transaction_item WHERE transaction_id = ?1)",
            params![transaction_id.to_string()],
        )?;
        Ok(deleted)
    }

    /// 某批次是否被其他单据引用(建批单据解锁守卫)
    pub fn exists_for_ledger_tx(conn: &Connection, ledger_id: Uuid) -> RepositoryResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM batch_mapping WHERE ledger_id = ?1",
            params![ledger_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
