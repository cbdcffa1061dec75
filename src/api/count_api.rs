// ==========================================
// 餐厅后台库存系统 - 库存盘点服务
// ==========================================
// 口径:
// - 盘点行钉在具体批次上,system_quantity 为建行时点的剩余量快照
// - 完成盘点: 有差异的行汇成一张已锁定的盘点调整单,
//   经定向修正路径直达各自批次,绕过 FIFO
// - 取消盘点永不回退已生成的调整单
// ==========================================

use crate::api::dto::{CountDraft, CountItemView, CountView};
use crate::api::error::{ApiError, ApiResult};
use crate::api::lookup::MasterDataLookup;
use crate::domain::count::{InventoryCount, InventoryCountItem};
use crate::domain::transaction::{StockTransaction, TransactionItem};
use crate::domain::types::{
    AdjustmentType, DataStatus, InventoryCountStatus, TransactionKind,
};
use crate::domain::QUANTITY_EPSILON;
use crate::engine::key_lock::{StockKey, StockKeyLock};
use crate::repository::{
    InventoryCountRepository, InventoryLedgerRepository, RepositoryError,
    StockTransactionRepository,
};
use chrono::Utc;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// 库存盘点服务
pub struct InventoryCountService {
    conn: Arc<Mutex<Connection>>,
    key_lock: Arc<StockKeyLock>,
    lookup: Arc<dyn MasterDataLookup>,
}

impl InventoryCountService {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        key_lock: Arc<StockKeyLock>,
        lookup: Arc<dyn MasterDataLookup>,
    ) -> Self {
        Self {
            conn,
            key_lock,
            lookup,
        }
    }

    fn get_conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::Repository(RepositoryError::LockError(e.to_string())))
    }

    fn load_tx(conn: &Connection, id: Uuid) -> ApiResult<(InventoryCount, Vec<InventoryCountItem>)> {
        let count = InventoryCountRepository::find_by_id_tx(conn, id)?.ok_or_else(|| {
            ApiError::NotFound {
                entity: "inventory_count".to_string(),
                id: id.to_string(),
            }
        })?;
        let items = InventoryCountRepository::find_items_tx(conn, id)?;
        Ok((count, items))
    }

    // ==========================================
    // 草稿操作
    // ==========================================

    /// 创建盘点单(草稿),逐行快照钉定批次的剩余量
    pub fn create(&self, actor: Uuid, draft: CountDraft) -> ApiResult<InventoryCount> {
        if draft.items.is_empty() {
            return Err(ApiError::Validation("盘点单至少需要一个盘点行".to_string()));
        }

        let now = Utc::now();
        let count = InventoryCount {
            id: Uuid::new_v4(),
            count_code: crate::api::next_code("IC"),
            warehouse_id: draft.warehouse_id,
            count_date: draft.count_date,
            count_status: InventoryCountStatus::Draft,
            adjustment_transaction_id: None,
            performed_by: draft.performed_by,
            created_by: actor,
            notes: draft.notes.clone(),
            status: DataStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let conn = self.get_conn()?;
        let items = Self::snapshot_items(&conn, &count, &draft)?;

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        InventoryCountRepository::insert_tx(&tx, &count)?;
        for item in &items {
            InventoryCountRepository::insert_item_tx(&tx, item)?;
        }
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(code = %count.count_code, lines = items.len(), "创建盘点单");
        Ok(count)
    }

    /// 编辑盘点草稿(整体替换盘点行,重新快照)
    pub fn update(&self, actor: Uuid, id: Uuid, draft: CountDraft) -> ApiResult<()> {
        if draft.items.is_empty() {
            return Err(ApiError::Validation("盘点单至少需要一个盘点行".to_string()));
        }

        let conn = self.get_conn()?;
        let (existing, _) = Self::load_tx(&conn, id)?;
        if !existing.can_edit() {
            return Err(ApiError::Validation(format!(
                "盘点单 {} 已{},仅草稿可编辑",
                existing.count_code, existing.count_status
            )));
        }

        let now = Utc::now();
        let updated = InventoryCount {
            count_date: draft.count_date,
            performed_by: draft.performed_by,
            notes: draft.notes.clone(),
            updated_at: now,
            ..existing
        };
        let items = Self::snapshot_items(&conn, &updated, &draft)?;

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        InventoryCountRepository::update_header_tx(&tx, &updated)?;
        InventoryCountRepository::replace_items_tx(&tx, id, &items)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(code = %updated.count_code, operator = %actor, "更新盘点草稿");
        Ok(())
    }

    // ==========================================
    // 完成与取消
    // ==========================================

    /// 完成盘点
    ///
    /// 差异行汇成一张已锁定的盘点调整单,与状态迁移同事务提交;
    /// 任一批次修正会导致余量为负则整体失败,盘点保持草稿
    pub fn complete(&self, actor: Uuid, id: Uuid) -> ApiResult<InventoryCount> {
        let (mut probe, mut probe_items) = {
            let conn = self.get_conn()?;
            Self::load_tx(&conn, id)?
        };

        loop {
            let keys: Vec<StockKey> = probe_items
                .iter()
                .map(|item| (probe.warehouse_id, item.material_id))
                .collect();
            let held = self.key_lock.acquire(&keys);

            let conn = self.get_conn()?;
            // 持键锁后重读,挡住并发完成与并发改行
            let (fresh, items) = Self::load_tx(&conn, id)?;
            let fresh_keys: Vec<StockKey> = items
                .iter()
                .map(|item| (fresh.warehouse_id, item.material_id))
                .collect();
            // 并发编辑可能换掉盘点行的物料,键集失配则换键重试
            if !held.covers(&fresh_keys) {
                drop(conn);
                probe = fresh;
                probe_items = items;
                continue;
            }

            let mut count = fresh;
            count.complete().map_err(ApiError::Validation)?;
            let performer = count.performed_by.ok_or(ApiError::MissingPerformer)?;

            let diff_items: Vec<&InventoryCountItem> =
                items.iter().filter(|item| item.has_difference()).collect();

            let now = Utc::now();
            let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;

            let adjustment_id = if diff_items.is_empty() {
                None
            } else {
                let adjustment = StockTransaction {
                    id: Uuid::new_v4(),
                    transaction_code: crate::api::next_code("ADJ-IC-"),
                    kind: TransactionKind::Adjustment,
                    warehouse_id: count.warehouse_id,
                    supplier_id: None,
                    customer_id: None,
                    destination_warehouse_id: None,
                    stock_in_type: None,
                    stock_out_type: None,
                    adjustment_type: Some(AdjustmentType::InventoryCount),
                    related_transaction_id: None,
                    reason: Some(format!("盘点调整: {}", count.count_code)),
                    reference_number: Some(count.count_code.clone()),
                    notes: count.notes.clone(),
                    transaction_date: count.count_date,
                    total_amount: 0.0,
                    is_locked: true,
                    status: DataStatus::Active,
                    performed_by: Some(performer),
                    created_by: actor,
                    created_at: now,
                    updated_at: now,
                };
                StockTransactionRepository::insert_tx(&tx, &adjustment)?;

                for item in &diff_items {
                    let delta = item.difference_quantity;
                    let entry = InventoryLedgerRepository::find_by_id_tx(&tx, item.ledger_id)?
                        .ok_or_else(|| ApiError::NotFound {
                            entity: "inventory_ledger".to_string(),
                            id: item.ledger_id.to_string(),
                        })?;
                    let new_remaining = entry.remaining_quantity + delta;
                    if new_remaining < -QUANTITY_EPSILON {
                        return Err(ApiError::NegativeResult {
                            ledger_id: item.ledger_id,
                        });
                    }
                    InventoryLedgerRepository::set_remaining_tx(
                        &tx,
                        item.ledger_id,
                        new_remaining.max(0.0),
                    )?;

                    StockTransactionRepository::insert_item_tx(
                        &tx,
                        &TransactionItem {
                            id: Uuid::new_v4(),
                            transaction_id: adjustment.id,
                            material_id: item.material_id,
                            unit_id: item.unit_id,
                            quantity: delta.abs(),
                            unit_price: None,
                            total_amount: None,
                            target_ledger_id: Some(item.ledger_id),
                            signed_delta: Some(delta),
                            notes: item.notes.clone(),
                            created_at: now,
                        },
                    )?;
                }
                Some(adjustment.id)
            };

            InventoryCountRepository::set_status_tx(
                &tx,
                id,
                InventoryCountStatus::Completed,
                adjustment_id,
                now,
            )?;
            tx.commit().map_err(RepositoryError::from)?;

            tracing::info!(
                code = %count.count_code,
                differences = diff_items.len(),
                adjustment = ?adjustment_id,
                "盘点完成"
            );
            count.adjustment_transaction_id = adjustment_id;
            count.updated_at = now;
            return Ok(count);
        }
    }

    /// 取消盘点
    ///
    /// 草稿或已完成均可取消;已生成的调整单保留不回退
    pub fn cancel(&self, id: Uuid) -> ApiResult<()> {
        let conn = self.get_conn()?;
        let (mut count, _) = Self::load_tx(&conn, id)?;
        count.cancel().map_err(ApiError::Validation)?;

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        InventoryCountRepository::set_status_tx(&tx, id, InventoryCountStatus::Cancelled, None, Utc::now())?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(code = %count.count_code, "取消盘点单");
        Ok(())
    }

    // ==========================================
    // 读路径
    // ==========================================

    /// 查询盘点单(附主数据名称)
    pub fn get(&self, id: Uuid) -> ApiResult<CountView> {
        let conn = self.get_conn()?;
        let (count, items) = Self::load_tx(&conn, id)?;
        let warehouse_name = self.lookup.warehouse_name(count.warehouse_id);
        let items = items
            .into_iter()
            .map(|item| CountItemView {
                material_name: self.lookup.material_name(item.material_id),
                unit_name: self.lookup.unit_name(item.unit_id),
                item,
            })
            .collect();
        Ok(CountView {
            count,
            warehouse_name,
            items,
        })
    }

    /// 某仓库的盘点单列表
    pub fn list_by_warehouse(&self, warehouse_id: Uuid) -> ApiResult<Vec<InventoryCount>> {
        let repo = InventoryCountRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.list_by_warehouse(warehouse_id)?)
    }

    // ==========================================
    // 内部工具
    // ==========================================

    /// 由草稿行构造盘点行: 读取钉定批次,快照当前剩余量
    fn snapshot_items(
        conn: &Connection,
        count: &InventoryCount,
        draft: &CountDraft,
    ) -> ApiResult<Vec<InventoryCountItem>> {
        let now = Utc::now();
        let mut items = Vec::with_capacity(draft.items.len());
        for line in &draft.items {
            let entry = InventoryLedgerRepository::find_by_id_tx(conn, line.ledger_id)?
                .ok_or_else(|| ApiError::NotFound {
                    entity: "inventory_ledger".to_string(),
                    id: line.ledger_id.to_string(),
                })?;
            if entry.warehouse_id != count.warehouse_id {
                return Err(ApiError::Validation(format!(
                    "批次 {} 不属于盘点仓库",
                    entry.display_batch_code()
                )));
            }

            let mut item = InventoryCountItem {
                id: Uuid::new_v4(),
                count_id: count.id,
                material_id: entry.material_id,
                unit_id: entry.unit_id,
                ledger_id: entry.id,
                batch_number: Some(entry.display_batch_code().to_string()),
                transaction_date: entry.transaction_date,
                system_quantity: entry.remaining_quantity,
                actual_quantity: line.actual_quantity,
                difference_quantity: 0.0,
                notes: line.notes.clone(),
                created_at: now,
            };
            item.validate().map_err(ApiError::Validation)?;
            item.calculate_difference();
            items.push(item);
        }
        Ok(items)
    }
}
