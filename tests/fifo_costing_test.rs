// ==========================================
// FIFO 成本核算集成测试
// ==========================================
// 测试目标: 出库锁定按最早入库批次摊算成本,
//           不足时整体失败不留半消耗状态
// ==========================================


use restaurant_inventory::api::ApiError;
use test_helpers::*;

#[test]
fn test_fifo_consumes_oldest_batch_first() {
    let env = setup();
    seed_batch(&env, 100.0, 10.0, 5);
    seed_batch(&env, 50.0, 12.0, 1);

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 120.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, out.id).unwrap();

    // 100×10 + 20×12 = 1240
    assert!((locked.total_amount - 1240.0).abs() < 1e-6);
    assert!(locked.is_locked);

    let view = env.stock.get(out.id).unwrap();
    let item = &view.items[0].item;
    assert!((item.total_amount.unwrap() - 1240.0).abs() < 1e-6);
    // 加权平均 1240/120 = 10.3333 → 两位小数
    assert!((item.unit_price.unwrap() - 10.33).abs() < 1e-6);

    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 30.0).abs() < 1e-9);
}

#[test]
fn test_partial_take_keeps_batch_open() {
    let env = setup();
    let stock_in = seed_batch(&env, 100.0, 10.0, 3);
    let batch = batch_ids_of(&env, stock_in.id)[0];

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 30.0))
        .unwrap();
    env.stock.lock(env.actor, out.id).unwrap();

    assert!((remaining_of(&env, batch) - 70.0).abs() < 1e-9);
}

#[test]
fn test_insufficient_stock_fails_atomically() {
    let env = setup();
    seed_batch(&env, 40.0, 10.0, 2);

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 100.0))
        .unwrap();
    let err = env.stock.lock(env.actor, out.id).unwrap_err();
    match err {
        ApiError::InsufficientStock {
            available,
            requested,
            ..
        } => {
            assert!((available - 40.0).abs() < 1e-9);
            assert!((requested - 100.0).abs() < 1e-9);
        }
        other => panic!("预期库存不足错误,实际: {other}"),
    }

    // 整体回滚: 台账未动,单据仍为草稿
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 40.0).abs() < 1e-9);
    let view = env.stock.get(out.id).unwrap();
    assert!(!view.transaction.is_locked);
}

#[test]
fn test_exact_depletion_consumes_everything() {
    let env = setup();
    seed_batch(&env, 60.0, 8.0, 4);
    seed_batch(&env, 40.0, 9.0, 2);

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 100.0))
        .unwrap();
    let locked = env.stock.lock(env.actor, out.id).unwrap();

    assert!((locked.total_amount - (60.0 * 8.0 + 40.0 * 9.0)).abs() < 1e-6);
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!(available.abs() < 1e-9);
}

#[test]
fn test_lock_succeeds_on_floating_point_residual() {
    let env = setup();
    seed_batch(&env, 1000.3, 10.0, 2);

    // 先吃掉 1000.0,批次余量带浮点残差(≈0.3 但非精确)
    let first = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 1000.0))
        .unwrap();
    env.stock.lock(env.actor, first.id).unwrap();

    // 残差在业务零阈值内,按满足处理而非报库存不足
    let second = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 0.3))
        .unwrap();
    env.stock.lock(env.actor, second.id).unwrap();

    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!(available.abs() < 1e-9);
}

#[test]
fn test_preview_matches_lock_allocation() {
    let env = setup();
    seed_batch(&env, 100.0, 10.0, 5);
    seed_batch(&env, 50.0, 12.0, 1);

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 120.0))
        .unwrap();

    let preview = env.stock.preview(out.id).unwrap();
    assert_eq!(preview.items.len(), 1);
    let item = &preview.items[0];
    assert!(item.shortage.abs() < 1e-9);
    assert_eq!(item.batches.len(), 2);
    assert!((item.batches[0].quantity - 100.0).abs() < 1e-9);
    assert!((item.batches[0].unit_price - 10.0).abs() < 1e-9);
    assert!((item.batches[1].quantity - 20.0).abs() < 1e-9);
    assert!((item.batches[1].unit_price - 12.0).abs() < 1e-9);
    let preview_cost: f64 = item.batches.iter().map(|b| b.line_cost).sum();

    // 台账未变,锁定与预演给出同一选择
    let locked = env.stock.lock(env.actor, out.id).unwrap();
    assert!((locked.total_amount - preview_cost).abs() < 1e-6);
}

#[test]
fn test_preview_reports_shortage_without_failing() {
    let env = setup();
    seed_batch(&env, 40.0, 10.0, 2);

    let out = env
        .stock
        .create_draft(env.actor, sale_out_draft(&env, 100.0))
        .unwrap();
    let preview = env.stock.preview(out.id).unwrap();

    let item = &preview.items[0];
    assert!((item.shortage - 60.0).abs() < 1e-9);
    assert_eq!(item.batches.len(), 1);
    assert!((item.batches[0].quantity - 40.0).abs() < 1e-9);

    // 预演不触台账
    let available = env
        .stock
        .available_stock(env.warehouse_id, env.material_id)
        .unwrap();
    assert!((available - 40.0).abs() < 1e-9);
}

#[test]
fn test_preview_of_stock_in_shows_synthetic_batch() {
    let env = setup();
    let draft = stock_in_draft(&env, 80.0, 7.5, 0);
    let txn = env.stock.create_draft(env.actor, draft).unwrap();

    let preview = env.stock.preview(txn.id).unwrap();
    let item = &preview.items[0];
    assert_eq!(item.batches.len(), 1);
    let batch = &item.batches[0];
    assert!(batch.ledger_id.is_none());
    assert!((batch.quantity - 80.0).abs() < 1e-9);
    assert!((batch.unit_price - 7.5).abs() < 1e-9);
    assert!((batch.remaining_after - 80.0).abs() < 1e-9);
}

#[test]
fn test_preview_rejected_for_locked_transaction() {
    let env = setup();
    let stock_in = seed_batch(&env, 10.0, 1.0, 0);
    let err = env.stock.preview(stock_in.id).unwrap_err();
    assert!(matches!(err, ApiError::AlreadyLocked(_)));
}
