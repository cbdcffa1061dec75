// ==========================================
// 单位换算集成测试
// ==========================================
// 测试目标: 直接边解析、反向边级联、一致性容差、
//           物料-单位成员资格守卫
// ==========================================


use chrono::Utc;
use restaurant_inventory::api::{ApiError, ConversionRequest};
use restaurant_inventory::domain::types::{ChangeType, DataStatus};
use restaurant_inventory::domain::UnitConversion;
use restaurant_inventory::repository::UnitConversionRepository;
use uuid::Uuid;

use test_helpers::*;

fn request(from: Uuid, to: Uuid, factor: f64) -> ConversionRequest {
    ConversionRequest {
        from_unit_id: from,
        to_unit_id: to,
        factor,
        reason: None,
    }
}

// ==========================================
// 系数解析
// ==========================================

#[test]
fn test_same_unit_resolves_to_identity() {
    let env = setup();
    let unit = Uuid::new_v4();
    assert_eq!(env.units.resolve_factor(unit, unit).unwrap(), 1.0);
}

#[test]
fn test_create_cascades_auto_reverse() {
    let env = setup();
    let kg = Uuid::new_v4();
    let g = Uuid::new_v4();

    let forward = env
        .units
        .create_conversion(env.actor, request(kg, g, 1000.0))
        .unwrap();

    assert_eq!(env.units.resolve_factor(kg, g).unwrap(), 1000.0);
    // 反向边 = round(1/1000, 6)
    assert!((env.units.resolve_factor(g, kg).unwrap() - 0.001).abs() < 1e-12);
    assert!((env.units.convert_quantity(2.5, kg, g).unwrap() - 2500.0).abs() < 1e-9);

    // 正向历史 CREATE,反向历史 AUTO_CREATE_REVERSE
    let history = env.units.list_history(forward.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, ChangeType::Create);

    let all = env.units.list_conversions().unwrap();
    assert_eq!(all.len(), 2);
    let reverse = all.iter().find(|c| c.from_unit_id == g).unwrap();
    let rev_history = env.units.list_history(reverse.id).unwrap();
    assert_eq!(rev_history[0].change_type, ChangeType::AutoCreateReverse);
}

#[test]
fn test_direct_edge_only_no_transitive_resolution() {
    let env = setup();
    let kg = Uuid::new_v4();
    let g = Uuid::new_v4();
    let mg = Uuid::new_v4();

    env.units
        .create_conversion(env.actor, request(kg, g, 1000.0))
        .unwrap();
    env.units
        .create_conversion(env.actor, request(g, mg, 1000.0))
        .unwrap();

    // kg -> mg 只能经两跳推出,本系统不做传递闭包
    let err = env.units.resolve_factor(kg, mg).unwrap_err();
    assert!(matches!(err, ApiError::ConversionNotFound { .. }));
}

#[test]
fn test_reverse_consistency_tolerance() {
    let env = setup();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    // 预置反向边 b -> a = 0.5(期望正向 2.0)
    {
        let conn = env.conn.lock().unwrap();
        UnitConversionRepository::insert_tx(
            &conn,
            &UnitConversion {
                id: Uuid::new_v4(),
                from_unit_id: b,
                to_unit_id: a,
                factor: 0.5,
                status: DataStatus::Active,
                created_by: env.actor,
                created_at: Utc::now(),
                updated_by: None,
                updated_at: None,
            },
        )
        .unwrap();
    }

    // 偏差 25% > 1% 容差
    let err = env
        .units
        .create_conversion(env.actor, request(a, b, 2.5))
        .unwrap_err();
    match err {
        ApiError::ConversionInconsistent { expected, supplied } => {
            assert!((expected - 2.0).abs() < 1e-9);
            assert!((supplied - 2.5).abs() < 1e-9);
        }
        other => panic!("预期一致性错误,实际: {other}"),
    }

    // 偏差 0.5% 在容差内,创建成功且不再生成反向边
    env.units
        .create_conversion(env.actor, request(a, b, 2.01))
        .unwrap();
    assert_eq!(env.units.list_conversions().unwrap().len(), 2);
}

#[test]
fn test_duplicate_and_invalid_conversions_rejected() {
    let env = setup();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(matches!(
        env.units
            .create_conversion(env.actor, request(a, a, 2.0))
            .unwrap_err(),
        ApiError::Validation(_)
    ));
    assert!(matches!(
        env.units
            .create_conversion(env.actor, request(a, b, 0.0))
            .unwrap_err(),
        ApiError::Validation(_)
    ));

    env.units
        .create_conversion(env.actor, request(a, b, 2.0))
        .unwrap();
    assert!(matches!(
        env.units
            .create_conversion(env.actor, request(a, b, 2.0))
            .unwrap_err(),
        ApiError::Validation(_)
    ));
}

#[test]
fn test_update_cascades_reverse_and_records_history() {
    let env = setup();
    let kg = Uuid::new_v4();
    let jin = Uuid::new_v4();

    let forward = env
        .units
        .create_conversion(env.actor, request(kg, jin, 2.0))
        .unwrap();

    let outcome = env
        .units
        .update_conversion(env.actor, forward.id, 2.2, Some("供应商口径调整".to_string()))
        .unwrap();
    assert!((outcome.conversion.factor - 2.2).abs() < 1e-9);
    assert_eq!(outcome.ledger_rows_with_from_unit, 0);

    assert!((env.units.resolve_factor(kg, jin).unwrap() - 2.2).abs() < 1e-9);
    // 反向边级联为 round(1/2.2, 6)
    assert!((env.units.resolve_factor(jin, kg).unwrap() - 0.454545).abs() < 1e-9);

    let history = env.units.list_history(forward.id).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|h| h.change_type == ChangeType::Update
        && h.old_factor == Some(2.0)
        && h.new_factor == Some(2.2)));
}

#[test]
fn test_delete_soft_when_unit_used_in_ledger() {
    let env = setup();
    // env.unit_id 已被入库台账使用
    seed_batch(&env, 10.0, 5.0, 0);

    let g = Uuid::new_v4();
    let forward = env
        .units
        .create_conversion(env.actor, request(env.unit_id, g, 1000.0))
        .unwrap();

    env.units.delete_conversion(env.actor, forward.id).unwrap();

    // 软删除: ACTIVE 解析失败,历史留痕
    assert!(matches!(
        env.units.resolve_factor(env.unit_id, g).unwrap_err(),
        ApiError::ConversionNotFound { .. }
    ));
    assert!(env.units.list_conversions().unwrap().is_empty());
    let history = env.units.list_history(forward.id).unwrap();
    assert!(history.iter().any(|h| h.change_type == ChangeType::Delete));
}

#[test]
fn test_delete_hard_when_never_used() {
    let env = setup();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let forward = env
        .units
        .create_conversion(env.actor, request(a, b, 3.0))
        .unwrap();

    env.units.delete_conversion(env.actor, forward.id).unwrap();
    assert!(env.units.list_conversions().unwrap().is_empty());
    assert!(matches!(
        env.units.resolve_factor(a, b).unwrap_err(),
        ApiError::ConversionNotFound { .. }
    ));
}

// ==========================================
// 物料-单位成员资格
// ==========================================

#[test]
fn test_first_unit_must_be_base() {
    let env = setup();
    let material = Uuid::new_v4();
    let kg = Uuid::new_v4();

    let err = env
        .units
        .add_unit_to_material(env.actor, material, kg, false)
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let member = env
        .units
        .add_unit_to_material(env.actor, material, kg, true)
        .unwrap();
    assert!(member.is_base_unit);
    assert_eq!(
        env.units.base_unit_of(material).unwrap().unwrap().unit_id,
        kg
    );
}

#[test]
fn test_second_base_rejected_and_state_untouched() {
    let env = setup();
    let material = Uuid::new_v4();
    let kg = Uuid::new_v4();
    let g = Uuid::new_v4();

    env.units
        .add_unit_to_material(env.actor, material, kg, true)
        .unwrap();
    let err = env
        .units
        .add_unit_to_material(env.actor, material, g, true)
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // 原基准不变,新单位未挂接
    assert_eq!(
        env.units.base_unit_of(material).unwrap().unwrap().unit_id,
        kg
    );
    assert_eq!(env.units.units_for_material(material).unwrap().len(), 1);
}

#[test]
fn test_non_base_unit_requires_edge_to_base() {
    let env = setup();
    let material = Uuid::new_v4();
    let kg = Uuid::new_v4();
    let g = Uuid::new_v4();

    env.units
        .add_unit_to_material(env.actor, material, kg, true)
        .unwrap();

    // 无 g -> kg 换算边,挂接被拒并指明缺失的边
    let err = env
        .units
        .add_unit_to_material(env.actor, material, g, false)
        .unwrap_err();
    assert!(matches!(err, ApiError::ConversionNotFound { .. }));

    env.units
        .create_conversion(env.actor, request(g, kg, 0.001))
        .unwrap();
    env.units
        .add_unit_to_material(env.actor, material, g, false)
        .unwrap();
    assert_eq!(env.units.units_for_material(material).unwrap().len(), 2);
}

#[test]
fn test_base_unit_immutable_after_ledger_history() {
    let env = setup();
    let kg = Uuid::new_v4();

    env.units
        .add_unit_to_material(env.actor, env.material_id, env.unit_id, true)
        .unwrap();
    env.units
        .create_conversion(env.actor, request(kg, env.unit_id, 1.0))
        .unwrap();
    env.units
        .add_unit_to_material(env.actor, env.material_id, kg, false)
        .unwrap();

    // 入账前基准可切换
    env.units
        .set_base_unit(env.actor, env.material_id, kg)
        .unwrap();
    env.units
        .set_base_unit(env.actor, env.material_id, env.unit_id)
        .unwrap();

    // 入账后基准锁死
    seed_batch(&env, 10.0, 5.0, 0);
    let err = env
        .units
        .set_base_unit(env.actor, env.material_id, kg)
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[test]
fn test_remove_unit_guards() {
    let env = setup();
    let g = Uuid::new_v4();

    env.units
        .add_unit_to_material(env.actor, env.material_id, env.unit_id, true)
        .unwrap();
    env.units
        .create_conversion(env.actor, request(g, env.unit_id, 0.001))
        .unwrap();
    env.units
        .add_unit_to_material(env.actor, env.material_id, g, false)
        .unwrap();

    // 基准单位不可解绑
    let err = env
        .units
        .remove_unit_from_material(env.actor, env.material_id, env.unit_id)
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    // 非基准且无台账引用,解绑成功
    env.units
        .remove_unit_from_material(env.actor, env.material_id, g)
        .unwrap();
    assert_eq!(env.units.units_for_material(env.material_id).unwrap().len(), 1);
}

#[test]
fn test_remove_unit_blocked_by_ledger_usage() {
    let env = setup();
    let base = Uuid::new_v4();

    env.units
        .add_unit_to_material(env.actor, env.material_id, base, true)
        .unwrap();
    env.units
        .create_conversion(env.actor, request(env.unit_id, base, 1.0))
        .unwrap();
    env.units
        .add_unit_to_material(env.actor, env.material_id, env.unit_id, false)
        .unwrap();

    // env.unit_id 进入台账后不可解绑
    seed_batch(&env, 10.0, 5.0, 0);
    let err = env
        .units
        .remove_unit_from_material(env.actor, env.material_id, env.unit_id)
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}
