// ==========================================
// 单据生命周期集成测试
// ==========================================
// 测试目标: 锁定/解锁互为精确逆操作;
//           调拨配对单与并发锁定的边界行为
// ==========================================


use restaurant_inventory::api::ApiError;
use restaurant_inventory::domain::types::AdjustmentType;
use std::sync::Arc;
use std::thread;
use test_helpers::*;
use uuid::Uuid;

// ==========================================
// 锁定/解锁往返
// ==========================================

#[test]
fn test_stock_in_lock_unlock_round_trip() {
    let env = setup();
    let stock_in = seed_batch(&env, 100.0, 10.0, 0);

    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 100.0).abs() < 1e-9);

    env.stock.unlock(env.actor, stock_in.id).unwrap();
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!(available.abs() < 1e-9);

    // 解锁后可再次锁定,批次重建
    env.stock.lock(env.actor, stock_in.id).unwrap();
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 100.0).abs() < 1e-9);
}

#[test]
fn test_stock_out_unlock_restores_batches() {
    let env = setup();
    let stock_in = seed_batch(&env, 100.0, 10.0, 3);
    let batch = batch_ids_of(&env, stock_in.id)[0];

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 30.0))
        .unwrap();
    env.stock.lock(env.actor, out.id).unwrap();
    assert!((remaining_of(&env, batch) - 70.0).abs() < 1e-9);

    env.stock.unlock(env.actor, out.id).unwrap();
    assert!((remaining_of(&env, batch) - 100.0).abs() < 1e-9);

    // 摊算成本随解锁清除
    let view = env.stock.get(out.id).unwrap();
    assert!(!view.transaction.is_locked);
    assert!(view.items[0].item.unit_price.is_none());
    assert!(view.transaction.total_amount.abs() < 1e-9);
}

#[test]
fn test_double_lock_and_unlock_guards() {
    let env = setup();
    let stock_in = seed_batch(&env, 10.0, 2.0, 0);

    let err = env.stock.lock(env.actor, stock_in.id).unwrap_err();
    assert!(matches!(err, ApiError::AlreadyLocked(_)));

    env.stock.unlock(env.actor, stock_in.id).unwrap();
    let err = env.stock.unlock(env.actor, stock_in.id).unwrap_err();
    assert!(matches!(err, ApiError::NotLocked(_)));
}

#[test]
fn test_batch_in_use_blocks_creator_unlock() {
    let env = setup();
    let stock_in = seed_batch(&env, 100.0, 10.0, 3);

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 30.0))
        .unwrap();
    env.stock.lock(env.actor, out.id).unwrap();

    // 批次已被出库消耗,入库单不可解锁
    let err = env.stock.unlock(env.actor, stock_in.id).unwrap_err();
    assert!(matches!(err, ApiError::BatchInUse(_)));

    // 先解锁出库回补,入库单即可解锁
    env.stock.unlock(env.actor, out.id).unwrap();
    env.stock.unlock(env.actor, stock_in.id).unwrap();
}

// ==========================================
// 草稿编辑守卫
// ==========================================

#[test]
fn test_locked_transaction_rejects_edit_and_delete() {
    let env = setup();
    let stock_in = seed_batch(&env, 10.0, 1.0, 0);

    let err = env
        .stock
        .update_draft(env.actor, stock_in.id, stock_in_draft(&env, 5.0, 1.0, 0))
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyLocked(_)));

    let err = env.stock.delete_draft(stock_in.id).unwrap_err();
    assert!(matches!(err, ApiError::AlreadyLocked(_)));
}

#[test]
fn test_draft_edit_replaces_items() {
    let env = setup();
    let txn = env
        .stock
        .create_draft(env.actor, stock_in_draft(&env, 10.0, 5.0, 0))
        .unwrap();

    env.stock
        .update_draft(env.actor, txn.id, stock_in_draft(&env, 25.0, 4.0, 0))
        .unwrap();

    let view = env.stock.get(txn.id).unwrap();
    assert_eq!(view.items.len(), 1);
    assert!((view.items[0].item.quantity - 25.0).abs() < 1e-9);
    assert!((view.transaction.total_amount - 100.0).abs() < 1e-9);

    env.stock.delete_draft(txn.id).unwrap();
    assert!(matches!(
        env.stock.get(txn.id).unwrap_err(),
        ApiError::NotFound { .. }
    ));
}

#[test]
fn test_transfer_requires_distinct_destination() {
    let env = setup();
    let mut draft = transfer_out_draft(&env, 10.0);
    draft.destination_warehouse_id = Some(env.warehouse_id);
    let err = env.stock.create_draft(env.actor, draft).unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

// ==========================================
// 调整单
// ==========================================

#[test]
fn test_adjustment_increase_creates_zero_price_batch() {
    let env = setup();
    let adj = env
        .stock
        .create_draft(env.actor, adjustment_draft(&env, AdjustmentType::Increase, 50.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, adj.id).unwrap();

    // 调整增的批次单价为零,总额为零
    assert!(locked.total_amount.abs() < 1e-9);
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 50.0).abs() < 1e-9);

    // 消耗零价批次,成本为零
    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 20.0))
        .unwrap();
    let locked_out = env.stock.lock(env.actor, out.id).unwrap();
    assert!(locked_out.total_amount.abs() < 1e-9);
}

#[test]
fn test_adjustment_decrease_consumes_fifo() {
    let env = setup();
    seed_batch(&env, 100.0, 10.0, 2);

    let adj = env
        .stock
        .create_draft(env.actor, adjustment_draft(&env, AdjustmentType::Decrease, 30.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, adj.id).unwrap();

    assert!((locked.total_amount - 300.0).abs() < 1e-6);
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 70.0).abs() < 1e-9);
}

// ==========================================
// 内部调拨
// ==========================================

#[test]
fn test_transfer_lock_creates_locked_companion() {
    let env = setup();
    seed_batch(&env, 100.0, 10.0, 5);
    seed_batch(&env, 50.0, 12.0, 1);

    let out = env
        .stock
        .create_draft(env.actor, transfer_out_draft(&env, 120.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, out.id).unwrap();

    let companion_id = locked.related_transaction_id.expect("应生成配对入库单");
    let companion = env.stock.get(companion_id).unwrap();
    assert!(companion.transaction.is_locked);
    assert!(companion
        .transaction
        .transaction_code
        .starts_with("IN-AUTO-"));
    assert_eq!(companion.transaction.warehouse_id, env.dest_warehouse_id);
    assert_eq!(companion.transaction.related_transaction_id, Some(out.id));

    // 配对入库成本 = 转出加权平均价 1240/120 → 10.33
    assert!((companion.items[0].item.unit_price.unwrap() - 10.33).abs() < 1e-6);

    // 目的仓库存就位,源仓扣减
    let dest_available = env
        .stock
        .available_stock(env.dest_warehouse_id, env.material_id)
        .unwrap();
    assert!((dest_available - 120.0).abs() < 1e-9);
    let src_available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((src_available - 30.0).abs() < 1e-9);
}

#[test]
fn test_transfer_unlock_requires_companion_unlocked_first() {
    let env = setup();
    seed_batch(&env, 100.0, 10.0, 2);

    let out = env
        .stock
        .create_draft(env.actor, transfer_out_draft(&env, 60.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, out.id).unwrap();
    let companion_id = locked.related_transaction_id.unwrap();

    // 配对单仍锁定,转出单解锁被拒
    let err = env.stock.unlock(env.actor, out.id).unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // 先解锁配对单(目的仓批次未消耗,可安全删除),再解锁转出单
    env.stock.unlock(env.actor, companion_id).unwrap();
    env.stock.unlock(env.actor, out.id).unwrap();

    let src_available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((src_available - 100.0).abs() < 1e-9);
    let dest_available = env
        .stock
        .available_stock(env.dest_warehouse_id, env.material_id)
        .unwrap();
    assert!(dest_available.abs() < 1e-9);
}

#[test]
fn test_transfer_companion_unlock_blocked_when_consumed() {
    let env = setup();
    seed_batch(&env, 100.0, 10.0, 2);

    let out = env
        .stock
        .create_draft(env.actor, transfer_out_draft(&env, 60.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, out.id).unwrap();
    let companion_id = locked.related_transaction_id.unwrap();

    // 目的仓出库消耗了调拨批次
    let mut dest_out = sale_out_draft(&env, 10.0);
    dest_out.warehouse_id = env.dest_warehouse_id;
    let dest_out = env.stock.create_draft(env.actor, dest_out).unwrap();
    env.stock.lock(env.actor, dest_out.id).unwrap();

    let err = env.stock.unlock(env.actor, companion_id).unwrap_err();
    assert!(matches!(err, ApiError::BatchInUse(_)));
}

// ==========================================
// 并发锁定
// ==========================================

#[test]
fn test_concurrent_edit_and_lock_consume_one_material() {
    let env = Arc::new(setup());
    let other_material = Uuid::new_v4();

    // 两种物料各备货 100
    seed_batch(&env, 100.0, 10.0, 1);
    let mut other_in = stock_in_draft(&env, 100.0, 8.0, 1);
    other_in.items[0].material_id = other_material;
    let other_in = env.stock.create_draft(env.actor, other_in).unwrap();
    env.stock.lock(env.actor, other_in.id).unwrap();

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 60.0))
        .unwrap();
    let out_id = out.id;

    let mut switched = sale_out_draft(&env, 60.0);
    switched.items[0].material_id = other_material;

    // 一边锁定,一边并发把出库行换成另一物料
    let lock_env = Arc::clone(&env);
    let lock_handle = thread::spawn(move || lock_env.stock.lock(lock_env.actor, out_id));
    let edit_env = Arc::clone(&env);
    let edit_handle =
        thread::spawn(move || edit_env.stock.update_draft(edit_env.actor, out_id, switched));

    let locked = lock_handle.join().unwrap().expect("锁定应成功");
    let edit_result = edit_handle.join().unwrap();
    // 编辑晚于锁定会被拒,两种交错均合法
    assert!(edit_result.is_ok() || matches!(edit_result, Err(ApiError::AlreadyLocked(_))));

    // 消耗必须落在锁定时点的行物料上,另一物料分毫不动
    let view = env.stock.get(locked.id).unwrap();
    let consumed = view.items[0].item.material_id;
    let untouched = if consumed == env.material_id {
        other_material
    } else {
        env.material_id
    };
    let consumed_left = env
        .stock
        .available_stock(env.warehouse_id, consumed)
        .unwrap();
    assert!((consumed_left - 40.0).abs() < 1e-9);
    let untouched_left = env
        .stock
        .available_stock(env.warehouse_id, untouched)
        .unwrap();
    assert!((untouched_left - 100.0).abs() < 1e-9);
}

#[test]
fn test_concurrent_lock_cannot_oversell() {
    let env = Arc::new(setup());
    seed_batch(&env, 100.0, 10.0, 1);

    // 两张 60 的出库单,库存只够一张
    let out_a = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 60.0))
        .unwrap();
    let out_b = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 60.0))
        .unwrap();

    let mut handles = Vec::new();
    for id in [out_a.id, out_b.id] {
        let env = Arc::clone(&env);
        handles.push(thread::spawn(move || env.stock.lock(env.actor, id)));
    }
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(ApiError::InsufficientStock { .. })))
        .count();
    assert_eq!(succeeded, 1, "只允许一张单锁定成功");
    assert_eq!(insufficient, 1, "另一张必须报库存不足");

    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 40.0).abs() < 1e-9);
}
