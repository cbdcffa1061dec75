// ==========================================
// 餐厅后台库存系统 - 单据生命周期服务
// ==========================================
// 红线:
// - 草稿不触台账,台账只在 锁定/解锁 时变更
// - "检查库存充足 -> FIFO 消耗" 全程持 (仓库, 物料) 键锁
// - 每次锁定/解锁在单个数据库事务内完成,失败即整体回滚
// 分发: 单据先归类为 LedgerEffect,再统一 match,
//       禁止在各调用点按单据种类散落分支
// ==========================================

use crate::api::dto::{
    ItemDraft, LedgerPreview, LedgerPreviewBatch, LedgerPreviewItem, TransactionDraft,
    TransactionItemView, TransactionView,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::lookup::MasterDataLookup;
use crate::config::LedgerSettings;
use crate::domain::ledger::{BatchMapping, InventoryLedgerEntry};
use crate::domain::transaction::{StockTransaction, TransactionItem};
use crate::domain::types::{
    AdjustmentType, DataStatus, StockInType, TransactionKind,
};
use crate::domain::QUANTITY_EPSILON;
use crate::engine::fifo;
use crate::engine::key_lock::{StockKey, StockKeyLock};
use crate::engine::LedgerEffect;
use crate::repository::{
    BatchMappingRepository, InventoryLedgerRepository, RepositoryError, StockTransactionRepository,
};
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// 库存单据生命周期服务
pub struct StockTransactionService {
    conn: Arc<Mutex<Connection>>,
    key_lock: Arc<StockKeyLock>,
    lookup: Arc<dyn MasterDataLookup>,
    settings: LedgerSettings,
}

impl StockTransactionService {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        key_lock: Arc<StockKeyLock>,
        lookup: Arc<dyn MasterDataLookup>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            conn,
            key_lock,
            lookup,
            settings,
        }
    }

    fn get_conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::Repository(RepositoryError::LockError(e.to_string())))
    }

    fn load_tx(
        conn: &Connection,
        id: Uuid,
    ) -> ApiResult<(StockTransaction, Vec<TransactionItem>)> {
        let txn = StockTransactionRepository::find_by_id_tx(conn, id)?.ok_or_else(|| {
            ApiError::NotFound {
                entity: "stock_transaction".to_string(),
                id: id.to_string(),
            }
        })?;
        let items = StockTransactionRepository::find_items_tx(conn, id)?;
        Ok((txn, items))
    }

    /// 单据编码: 种类前缀 + 毫秒时间戳 + 序号
    fn generate_code(kind: TransactionKind) -> String {
        crate::api::next_code(&format!("{}-", kind.code_prefix()))
    }

    // ==========================================
    // 草稿操作
    // ==========================================

    /// 创建草稿单据(不触台账)
    pub fn create_draft(&self, actor: Uuid, draft: TransactionDraft) -> ApiResult<StockTransaction> {
        if draft.items.is_empty() {
            return Err(ApiError::Validation("单据至少需要一个行项目".to_string()));
        }

        let now = Utc::now();
        let txn = StockTransaction {
            id: Uuid::new_v4(),
            transaction_code: Self::generate_code(draft.kind),
            kind: draft.kind,
            warehouse_id: draft.warehouse_id,
            supplier_id: draft.supplier_id,
            customer_id: draft.customer_id,
            destination_warehouse_id: draft.destination_warehouse_id,
            stock_in_type: draft.stock_in_type,
            stock_out_type: draft.stock_out_type,
            adjustment_type: draft.adjustment_type,
            related_transaction_id: None,
            reason: draft.reason,
            reference_number: draft.reference_number,
            notes: draft.notes,
            transaction_date: draft.transaction_date,
            total_amount: 0.0,
            is_locked: false,
            status: DataStatus::Active,
            performed_by: None,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };
        txn.validate().map_err(ApiError::Validation)?;
        let effect = LedgerEffect::for_transaction(&txn).map_err(ApiError::Validation)?;

        let items = Self::build_items(&txn, effect, &draft.items)?;
        let estimated_total = Self::estimated_total(&items);

        // 出库草稿的库存预警(非致命,锁定时才强校验)
        if effect == LedgerEffect::ConsumeFifo {
            self.warn_on_shortage(&txn, &items)?;
        }

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        StockTransactionRepository::insert_tx(&tx, &txn)?;
        for item in &items {
            StockTransactionRepository::insert_item_tx(&tx, item)?;
        }
        StockTransactionRepository::set_total_tx(&tx, txn.id, estimated_total, now)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(
            code = %txn.transaction_code,
            kind = %txn.kind,
            items = items.len(),
            "创建草稿单据"
        );
        Ok(StockTransaction {
            total_amount: estimated_total,
            ..txn
        })
    }

    /// 编辑草稿单据(整体替换行项目)
    pub fn update_draft(&self, actor: Uuid, id: Uuid, draft: TransactionDraft) -> ApiResult<()> {
        if draft.items.is_empty() {
            return Err(ApiError::Validation("单据至少需要一个行项目".to_string()));
        }

        let conn = self.get_conn()?;
        let (existing, _) = Self::load_tx(&conn, id)?;
        if existing.is_locked {
            return Err(ApiError::AlreadyLocked(existing.transaction_code));
        }

        let now = Utc::now();
        let updated = StockTransaction {
            kind: existing.kind, // 种类不可变
            warehouse_id: draft.warehouse_id,
            supplier_id: draft.supplier_id,
            customer_id: draft.customer_id,
            destination_warehouse_id: draft.destination_warehouse_id,
            stock_in_type: draft.stock_in_type,
            stock_out_type: draft.stock_out_type,
            adjustment_type: draft.adjustment_type,
            reason: draft.reason,
            reference_number: draft.reference_number,
            notes: draft.notes,
            transaction_date: draft.transaction_date,
            performed_by: Some(actor),
            updated_at: now,
            ..existing
        };
        updated.validate().map_err(ApiError::Validation)?;
        let effect = LedgerEffect::for_transaction(&updated).map_err(ApiError::Validation)?;
        let items = Self::build_items(&updated, effect, &draft.items)?;
        let estimated_total = Self::estimated_total(&items);

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        StockTransactionRepository::update_header_tx(&tx, &updated)?;
        StockTransactionRepository::replace_items_tx(&tx, id, &items)?;
        StockTransactionRepository::set_total_tx(&tx, id, estimated_total, now)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(code = %updated.transaction_code, "更新草稿单据");
        Ok(())
    }

    /// 删除草稿单据
    pub fn delete_draft(&self, id: Uuid) -> ApiResult<()> {
        let conn = self.get_conn()?;
        let (txn, _) = Self::load_tx(&conn, id)?;
        if txn.is_locked {
            return Err(ApiError::AlreadyLocked(txn.transaction_code));
        }

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        StockTransactionRepository::delete_draft_tx(&tx, id)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(code = %txn.transaction_code, "删除草稿单据");
        Ok(())
    }

    // ==========================================
    // 锁定: 台账生效
    // ==========================================

    /// 锁定单据,按其台账作用生效
    ///
    /// 全程持 (仓库, 物料) 键锁,库存校验与消耗之间不会被
    /// 并发锁定插队;调拨出库同时生成目的仓自动入库单
    pub fn lock(&self, actor: Uuid, id: Uuid) -> ApiResult<StockTransaction> {
        // 先读一次定位键集(不改状态)
        let (mut probe, mut probe_items) = {
            let conn = self.get_conn()?;
            Self::load_tx(&conn, id)?
        };

        loop {
            if probe.is_locked {
                return Err(ApiError::AlreadyLocked(probe.transaction_code));
            }

            let keys = Self::stock_keys(&probe, &probe_items);
            let held = self.key_lock.acquire(&keys);

            // 持键锁后重读,挡住与并发锁定的交错
            let conn = self.get_conn()?;
            let (txn, items) = Self::load_tx(&conn, id)?;
            // 并发编辑可能换掉仓库或物料,持有键集必须覆盖重读结果,
            // 否则消耗会落在无锁的 (仓库, 物料) 上;换键重试
            if !held.covers(&Self::stock_keys(&txn, &items)) {
                drop(conn);
                probe = txn;
                probe_items = items;
                continue;
            }
            if txn.is_locked {
                return Err(ApiError::AlreadyLocked(txn.transaction_code));
            }
            txn.validate().map_err(ApiError::Validation)?;
            let effect = LedgerEffect::for_transaction(&txn).map_err(ApiError::Validation)?;

            let now = Utc::now();
            let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
            match effect {
                LedgerEffect::CreateBatch => {
                    self.apply_create_batches(&tx, &txn, &items)?;
                }
                LedgerEffect::ConsumeFifo => {
                    let avg_prices = self.apply_consume_fifo(&tx, &txn, &items)?;
                    if txn.is_internal_transfer_out() {
                        self.synthesize_transfer_in(&tx, actor, &txn, &items, &avg_prices)?;
                    }
                }
                LedgerEffect::TargetedMutate => {
                    Self::apply_targeted_mutate(&tx, &items)?;
                }
            }
            StockTransactionRepository::set_locked_tx(&tx, id, true, Some(actor), now)?;
            tx.commit().map_err(RepositoryError::from)?;

            tracing::info!(
                code = %txn.transaction_code,
                effect = ?effect,
                "锁定单据,台账已生效"
            );
            let (locked, _) = Self::load_tx(&conn, id)?;
            return Ok(locked);
        }
    }

    /// 建批: 每个行项目生成一个新批次
    fn apply_create_batches(
        &self,
        tx: &Connection,
        txn: &StockTransaction,
        items: &[TransactionItem],
    ) -> ApiResult<()> {
        let now = Utc::now();
        let mut total = 0.0;
        for item in items {
            // 调整增的批次单价恒为零(遗留口径,见 DESIGN.md)
            let unit_price = if txn.adjustment_type == Some(AdjustmentType::Increase) {
                0.0
            } else {
                item.unit_price.unwrap_or(0.0)
            };
            let entry = InventoryLedgerEntry {
                id: Uuid::new_v4(),
                warehouse_id: txn.warehouse_id,
                material_id: item.material_id,
                transaction_id: txn.id,
                transaction_code: txn.transaction_code.clone(),
                transaction_date: txn.transaction_date,
                unit_id: item.unit_id,
                unit_price,
                quantity: item.quantity,
                remaining_quantity: item.quantity,
                status: DataStatus::Active,
                batch_number: None,
                created_at: now,
            };
            InventoryLedgerRepository::insert_batch_tx(tx, &entry)?;
            total += item.quantity * unit_price;
        }
        StockTransactionRepository::set_total_tx(tx, txn.id, self.settings.round_price(total), now)?;
        Ok(())
    }

    /// FIFO 消耗: 逐行 先校验充足 再吃批次,回写成本
    ///
    /// 返回 行项目 id -> 加权平均单价,供调拨配对单定价
    fn apply_consume_fifo(
        &self,
        tx: &Connection,
        txn: &StockTransaction,
        items: &[TransactionItem],
    ) -> ApiResult<HashMap<Uuid, f64>> {
        let now = Utc::now();
        let mut grand_total = 0.0;
        let mut avg_prices = HashMap::new();

        for item in items {
            let batches = InventoryLedgerRepository::find_available_batches_tx(
                tx,
                txn.warehouse_id,
                item.material_id,
            )?;
            let available: f64 = batches.iter().map(|b| b.remaining_quantity).sum();
            if available + QUANTITY_EPSILON < item.quantity {
                return Err(ApiError::InsufficientStock {
                    material: self.lookup.material_name(item.material_id),
                    available,
                    requested: item.quantity,
                });
            }

            let plan = fifo::plan(&batches, item.quantity).map_err(|(fulfilled, _shortage)| {
                ApiError::InsufficientStock {
                    material: self.lookup.material_name(item.material_id),
                    available: fulfilled,
                    requested: item.quantity,
                }
            })?;

            for alloc in &plan.allocations {
                InventoryLedgerRepository::set_remaining_tx(
                    tx,
                    alloc.ledger_id,
                    alloc.remaining_after,
                )?;
                BatchMappingRepository::insert_tx(
                    tx,
                    &BatchMapping {
                        id: Uuid::new_v4(),
                        item_id: item.id,
                        ledger_id: alloc.ledger_id,
                        quantity_used: alloc.quantity_taken,
                        unit_price: alloc.unit_price,
                        created_at: now,
                    },
                )?;
            }

            let avg = self.settings.round_price(plan.weighted_average_price());
            let line_total = self.settings.round_price(plan.total_cost());
            StockTransactionRepository::set_item_cost_tx(tx, item.id, avg, line_total)?;
            tracing::debug!(
                material = %self.lookup.material_name(item.material_id),
                quantity = item.quantity,
                batches = plan.allocations.len(),
                cost = line_total,
                "FIFO 消耗完成"
            );

            avg_prices.insert(item.id, avg);
            grand_total += plan.total_cost();
        }

        StockTransactionRepository::set_total_tx(
            tx,
            txn.id,
            self.settings.round_price(grand_total),
            now,
        )?;
        Ok(avg_prices)
    }

    /// 调拨出库: 同事务生成目的仓自动入库单(已锁定,批次就位)
    fn synthesize_transfer_in(
        &self,
        tx: &Connection,
        actor: Uuid,
        out_txn: &StockTransaction,
        out_items: &[TransactionItem],
        avg_prices: &HashMap<Uuid, f64>,
    ) -> ApiResult<()> {
        let destination = out_txn.destination_warehouse_id.ok_or_else(|| {
            ApiError::Validation("调拨出库缺少目的仓库,无法生成入库单".to_string())
        })?;

        let now = Utc::now();
        let companion_id = Uuid::new_v4();
        let companion_code = format!("IN-AUTO-{}", out_txn.transaction_code);

        let mut total = 0.0;
        let mut companion_items = Vec::with_capacity(out_items.len());
        for item in out_items {
            // 入库成本 = 转出行的加权平均摊算价
            let price = avg_prices.get(&item.id).copied().unwrap_or(0.0);
            let line_total = self.settings.round_price(item.quantity * price);
            total += item.quantity * price;
            companion_items.push(TransactionItem {
                id: Uuid::new_v4(),
                transaction_id: companion_id,
                material_id: item.material_id,
                unit_id: item.unit_id,
                quantity: item.quantity,
                unit_price: Some(price),
                total_amount: Some(line_total),
                target_ledger_id: None,
                signed_delta: None,
                notes: None,
                created_at: now,
            });
        }

        let companion = StockTransaction {
            id: companion_id,
            transaction_code: companion_code.clone(),
            kind: TransactionKind::StockIn,
            warehouse_id: destination,
            supplier_id: None,
            customer_id: None,
            destination_warehouse_id: None,
            stock_in_type: Some(StockInType::InternalTransfer),
            stock_out_type: None,
            adjustment_type: None,
            related_transaction_id: Some(out_txn.id),
            reason: None,
            reference_number: Some(out_txn.transaction_code.clone()),
            notes: None,
            transaction_date: out_txn.transaction_date,
            total_amount: self.settings.round_price(total),
            is_locked: true,
            status: DataStatus::Active,
            performed_by: Some(actor),
            created_by: actor,
            created_at: now,
            updated_at: now,
        };

        StockTransactionRepository::insert_tx(tx, &companion)?;
        for item in &companion_items {
            StockTransactionRepository::insert_item_tx(tx, item)?;
            InventoryLedgerRepository::insert_batch_tx(
                tx,
                &InventoryLedgerEntry {
                    id: Uuid::new_v4(),
                    warehouse_id: destination,
                    material_id: item.material_id,
                    transaction_id: companion_id,
                    transaction_code: companion_code.clone(),
                    transaction_date: companion.transaction_date,
                    unit_id: item.unit_id,
                    unit_price: item.unit_price.unwrap_or(0.0),
                    quantity: item.quantity,
                    remaining_quantity: item.quantity,
                    status: DataStatus::Active,
                    batch_number: None,
                    created_at: now,
                },
            )?;
        }
        StockTransactionRepository::set_related_tx(tx, out_txn.id, Some(companion_id), now)?;

        tracing::info!(
            out = %out_txn.transaction_code,
            companion = %companion_code,
            "调拨自动入库单已生成"
        );
        Ok(())
    }

    /// 盘点定向修正: 带符号差异直达指定批次,绕过 FIFO
    fn apply_targeted_mutate(tx: &Connection, items: &[TransactionItem]) -> ApiResult<()> {
        for item in items {
            let ledger_id = item.target_ledger_id.ok_or_else(|| {
                ApiError::Validation(format!(
                    "盘点调整行缺少目标批次: item_id={}",
                    item.id
                ))
            })?;
            let delta = item.signed_delta.ok_or_else(|| {
                ApiError::Validation(format!(
                    "盘点调整行缺少带符号差异: item_id={}",
                    item.id
                ))
            })?;

            let entry = InventoryLedgerRepository::find_by_id_tx(tx, ledger_id)?.ok_or_else(
                || ApiError::NotFound {
                    entity: "inventory_ledger".to_string(),
                    id: ledger_id.to_string(),
                },
            )?;
            let new_remaining = entry.remaining_quantity + delta;
            if new_remaining < -QUANTITY_EPSILON {
                return Err(ApiError::NegativeResult { ledger_id });
            }
            InventoryLedgerRepository::set_remaining_tx(tx, ledger_id, new_remaining.max(0.0))?;
        }
        Ok(())
    }

    // ==========================================
    // 解锁: 精确逆操作
    // ==========================================

    /// 解锁单据,逆转其台账作用
    ///
    /// - 建批类: 任一批次被消耗或引用则拒绝(BatchInUse)
    /// - 消耗类: 按映射逐批回补剩余量,删除映射,清除摊算成本
    /// - 盘点调整: 终态,不可解锁
    /// - 调拨出库: 配对入库单仍锁定时拒绝,须先解锁配对单
    pub fn unlock(&self, actor: Uuid, id: Uuid) -> ApiResult<()> {
        let (mut probe, mut probe_items) = {
            let conn = self.get_conn()?;
            Self::load_tx(&conn, id)?
        };

        loop {
            if !probe.is_locked {
                return Err(ApiError::NotLocked(probe.transaction_code));
            }

            let keys = Self::stock_keys(&probe, &probe_items);
            let held = self.key_lock.acquire(&keys);

            let conn = self.get_conn()?;
            let (txn, items) = Self::load_tx(&conn, id)?;
            // 探测与持锁之间单据可能被 解锁-编辑-再锁定,键集失配则换键重试
            if !held.covers(&Self::stock_keys(&txn, &items)) {
                drop(conn);
                probe = txn;
                probe_items = items;
                continue;
            }
            if !txn.is_locked {
                return Err(ApiError::NotLocked(txn.transaction_code));
            }
            let effect = LedgerEffect::for_transaction(&txn).map_err(ApiError::Validation)?;
            if effect == LedgerEffect::TargetedMutate {
                return Err(ApiError::Validation(format!(
                    "盘点调整单 {} 为终态,不可解锁",
                    txn.transaction_code
                )));
            }

            // 调拨耦合: 目的仓批次由配对单管理,配对单未解锁则源仓不可回补
            if txn.is_internal_transfer_out() {
                if let Some(related_id) = txn.related_transaction_id {
                    if let Some(companion) =
                        StockTransactionRepository::find_by_id_tx(&conn, related_id)?
                    {
                        if companion.is_locked {
                            return Err(ApiError::Validation(format!(
                                "调拨自动入库单 {} 仍处于锁定状态,请先解锁",
                                companion.transaction_code
                            )));
                        }
                    }
                }
            }

            let now = Utc::now();
            let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
            match effect {
                LedgerEffect::CreateBatch => {
                    let entries = InventoryLedgerRepository::find_by_transaction_tx(&tx, id)?;
                    for entry in &entries {
                        if entry.is_touched()
                            || BatchMappingRepository::exists_for_ledger_tx(&tx, entry.id)?
                        {
                            return Err(ApiError::BatchInUse(format!(
                                "批次 {} (物料 {})",
                                entry.display_batch_code(),
                                self.lookup.material_name(entry.material_id)
                            )));
                        }
                    }
                    InventoryLedgerRepository::delete_by_transaction_tx(&tx, id)?;
                }
                LedgerEffect::ConsumeFifo => {
                    let mappings = BatchMappingRepository::find_by_transaction_tx(&tx, id)?;
                    for mapping in &mappings {
                        let entry = InventoryLedgerRepository::find_by_id_tx(&tx, mapping.ledger_id)?
                            .ok_or_else(|| ApiError::NotFound {
                                entity: "inventory_ledger".to_string(),
                                id: mapping.ledger_id.to_string(),
                            })?;
                        InventoryLedgerRepository::set_remaining_tx(
                            &tx,
                            mapping.ledger_id,
                            entry.remaining_quantity + mapping.quantity_used,
                        )?;
                    }
                    BatchMappingRepository::delete_by_transaction_tx(&tx, id)?;
                    StockTransactionRepository::clear_item_cost_tx(&tx, id)?;
                    StockTransactionRepository::set_total_tx(&tx, id, 0.0, now)?;
                }
                LedgerEffect::TargetedMutate => unreachable!("盘点调整单在前置校验已拒绝"),
            }
            StockTransactionRepository::set_locked_tx(&tx, id, false, Some(actor), now)?;
            tx.commit().map_err(RepositoryError::from)?;

            tracing::info!(code = %txn.transaction_code, effect = ?effect, "解锁单据,台账已回退");
            return Ok(());
        }
    }

    // ==========================================
    // 预演与读路径
    // ==========================================

    /// 预演草稿单据锁定后的台账作用(不落库)
    ///
    /// 与 lock() 共用同一规划函数;库存不足不报错,
    /// 返回逐行缺口供操作员先行补货
    pub fn preview(&self, id: Uuid) -> ApiResult<LedgerPreview> {
        let conn = self.get_conn()?;
        let (txn, items) = Self::load_tx(&conn, id)?;
        if txn.is_locked {
            return Err(ApiError::AlreadyLocked(txn.transaction_code));
        }
        let effect = LedgerEffect::for_transaction(&txn).map_err(ApiError::Validation)?;

        let mut preview_items = Vec::with_capacity(items.len());
        for item in &items {
            let preview_item = match effect {
                LedgerEffect::CreateBatch => {
                    let unit_price = if txn.adjustment_type == Some(AdjustmentType::Increase) {
                        0.0
                    } else {
                        item.unit_price.unwrap_or(0.0)
                    };
                    LedgerPreviewItem {
                        item_id: item.id,
                        material_id: item.material_id,
                        material_name: self.lookup.material_name(item.material_id),
                        requested: item.quantity,
                        shortage: 0.0,
                        batches: vec![LedgerPreviewBatch {
                            ledger_id: None,
                            batch_code: txn.transaction_code.clone(),
                            transaction_date: Some(txn.transaction_date),
                            quantity: item.quantity,
                            unit_price,
                            line_cost: self.settings.round_price(item.quantity * unit_price),
                            remaining_after: item.quantity,
                        }],
                    }
                }
                LedgerEffect::ConsumeFifo => {
                    let batches = InventoryLedgerRepository::find_available_batches_tx(
                        &conn,
                        txn.warehouse_id,
                        item.material_id,
                    )?;
                    let dates: HashMap<Uuid, chrono::DateTime<Utc>> = batches
                        .iter()
                        .map(|b| (b.id, b.transaction_date))
                        .collect();
                    let plan = fifo::plan_partial(&batches, item.quantity);
                    LedgerPreviewItem {
                        item_id: item.id,
                        material_id: item.material_id,
                        material_name: self.lookup.material_name(item.material_id),
                        requested: item.quantity,
                        shortage: plan.shortage(),
                        batches: plan
                            .allocations
                            .iter()
                            .map(|alloc| LedgerPreviewBatch {
                                ledger_id: Some(alloc.ledger_id),
                                batch_code: alloc.batch_code.clone(),
                                transaction_date: dates.get(&alloc.ledger_id).copied(),
                                quantity: alloc.quantity_taken,
                                unit_price: alloc.unit_price,
                                line_cost: self.settings.round_price(alloc.cost()),
                                remaining_after: alloc.remaining_after,
                            })
                            .collect(),
                    }
                }
                LedgerEffect::TargetedMutate => {
                    let ledger_id = item.target_ledger_id.ok_or_else(|| {
                        ApiError::Validation(format!(
                            "盘点调整行缺少目标批次: item_id={}",
                            item.id
                        ))
                    })?;
                    let delta = item.signed_delta.unwrap_or(0.0);
                    let entry = InventoryLedgerRepository::find_by_id_tx(&conn, ledger_id)?
                        .ok_or_else(|| ApiError::NotFound {
                            entity: "inventory_ledger".to_string(),
                            id: ledger_id.to_string(),
                        })?;
                    LedgerPreviewItem {
                        item_id: item.id,
                        material_id: item.material_id,
                        material_name: self.lookup.material_name(item.material_id),
                        requested: delta.abs(),
                        shortage: 0.0,
                        batches: vec![LedgerPreviewBatch {
                            ledger_id: Some(entry.id),
                            batch_code: entry.display_batch_code().to_string(),
                            transaction_date: Some(entry.transaction_date),
                            quantity: delta,
                            unit_price: entry.unit_price,
                            line_cost: self.settings.round_price(delta * entry.unit_price),
                            remaining_after: entry.remaining_quantity + delta,
                        }],
                    }
                }
            };
            preview_items.push(preview_item);
        }

        Ok(LedgerPreview {
            transaction_id: id,
            items: preview_items,
        })
    }

    /// 查询单据(附主数据名称)
    pub fn get(&self, id: Uuid) -> ApiResult<TransactionView> {
        let conn = self.get_conn()?;
        let (txn, items) = Self::load_tx(&conn, id)?;
        let warehouse_name = self.lookup.warehouse_name(txn.warehouse_id);
        let items = items
            .into_iter()
            .map(|item| TransactionItemView {
                material_name: self.lookup.material_name(item.material_id),
                unit_name: self.lookup.unit_name(item.unit_id),
                item,
            })
            .collect();
        Ok(TransactionView {
            transaction: txn,
            warehouse_name,
            items,
        })
    }

    /// 某仓库的单据列表
    pub fn list_by_warehouse(&self, warehouse_id: Uuid) -> ApiResult<Vec<StockTransaction>> {
        let repo = StockTransactionRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.list_by_warehouse(warehouse_id)?)
    }

    /// (仓库, 物料) 可用库存合计
    pub fn available_stock(&self, warehouse_id: Uuid, material_id: Uuid) -> ApiResult<f64> {
        let conn = self.get_conn()?;
        Ok(InventoryLedgerRepository::available_stock_tx(
            &conn,
            warehouse_id,
            material_id,
        )?)
    }

    // ==========================================
    // 内部工具
    // ==========================================

    /// 锁定/解锁触及的全部 (仓库, 物料) 键
    ///
    /// 调拨出库连目的仓一并纳入,配对入库与源仓回补同窗口
    fn stock_keys(txn: &StockTransaction, items: &[TransactionItem]) -> Vec<StockKey> {
        let mut keys: Vec<StockKey> = items
            .iter()
            .map(|item| (txn.warehouse_id, item.material_id))
            .collect();
        if txn.is_internal_transfer_out() {
            if let Some(dest) = txn.destination_warehouse_id {
                keys.extend(items.iter().map(|item| (dest, item.material_id)));
            }
        }
        keys
    }

    /// 由草稿行构造行项目并做作用特定校验
    fn build_items(
        txn: &StockTransaction,
        effect: LedgerEffect,
        drafts: &[ItemDraft],
    ) -> ApiResult<Vec<TransactionItem>> {
        let now = Utc::now();
        let mut items = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let item = TransactionItem {
                id: Uuid::new_v4(),
                transaction_id: txn.id,
                material_id: draft.material_id,
                unit_id: draft.unit_id,
                quantity: draft.quantity,
                unit_price: draft.unit_price,
                total_amount: draft
                    .unit_price
                    .map(|price| price * draft.quantity),
                target_ledger_id: draft.target_ledger_id,
                signed_delta: draft.signed_delta,
                notes: draft.notes.clone(),
                created_at: now,
            };
            item.validate().map_err(ApiError::Validation)?;

            match effect {
                LedgerEffect::CreateBatch => {
                    if txn.kind == TransactionKind::StockIn && item.unit_price.is_none() {
                        return Err(ApiError::Validation(format!(
                            "入库行项目必须填写成本单价: material_id={}",
                            item.material_id
                        )));
                    }
                }
                LedgerEffect::TargetedMutate => {
                    if item.target_ledger_id.is_none() || item.signed_delta.is_none() {
                        return Err(ApiError::Validation(format!(
                            "盘点调整行必须指定目标批次与带符号差异: material_id={}",
                            item.material_id
                        )));
                    }
                }
                LedgerEffect::ConsumeFifo => {}
            }
            items.push(item);
        }
        Ok(items)
    }

    /// 草稿总金额估算(出库行在锁定核算前无价,记 0)
    fn estimated_total(items: &[TransactionItem]) -> f64 {
        items
            .iter()
            .map(|item| item.unit_price.unwrap_or(0.0) * item.quantity)
            .sum()
    }

    /// 出库草稿的库存预警日志(不拦截)
    fn warn_on_shortage(
        &self,
        txn: &StockTransaction,
        items: &[TransactionItem],
    ) -> ApiResult<()> {
        let conn = self.get_conn()?;
        for item in items {
            let available = InventoryLedgerRepository::available_stock_tx(
                &conn,
                txn.warehouse_id,
                item.material_id,
            )?;
            if available + QUANTITY_EPSILON < item.quantity {
                tracing::warn!(
                    material = %self.lookup.material_name(item.material_id),
                    available,
                    requested = item.quantity,
                    "草稿出库数量超过当前可用库存,锁定时将被拒绝"
                );
            }
        }
        Ok(())
    }
}
