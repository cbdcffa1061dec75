// ==========================================
// 餐厅后台库存系统 - 单位换算服务
// ==========================================
// 口径:
// - 仅解析直接换算边,不做传递闭包(A->B, B->C 推不出 A->C)
// - 正反向系数须在 1% 容差内互为倒数,反向边由系统级联维护
// - 已入台账的换算边只软删除,保留历史成本可解释性
// - 每种物料第一个单位必须是基准单位,有台账历史后基准不可变
// ==========================================

use crate::api::dto::{ConversionRequest, ConversionUpdateOutcome};
use crate::api::error::{ApiError, ApiResult};
use crate::api::lookup::MasterDataLookup;
use crate::config::LedgerSettings;
use crate::domain::types::{ChangeType, DataStatus};
use crate::domain::unit::{MaterialUnit, UnitConversion, UnitConversionHistory};
use crate::repository::{
    InventoryLedgerRepository, MaterialUnitRepository, RepositoryError, UnitConversionRepository,
};
use chrono::Utc;
use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// 单位换算服务
pub struct UnitConversionService {
    conn: Arc<Mutex<Connection>>,
    lookup: Arc<dyn MasterDataLookup>,
    settings: LedgerSettings,
}

impl UnitConversionService {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        lookup: Arc<dyn MasterDataLookup>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            conn,
            lookup,
            settings,
        }
    }

    fn get_conn(&self) -> ApiResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::Repository(RepositoryError::LockError(e.to_string())))
    }

    // ==========================================
    // 系数解析
    // ==========================================

    /// 解析换算系数: 同单位恒为 1,否则查 ACTIVE 直接边
    pub fn resolve_factor(&self, from_unit_id: Uuid, to_unit_id: Uuid) -> ApiResult<f64> {
        if from_unit_id == to_unit_id {
            return Ok(1.0);
        }
        let conn = self.get_conn()?;
        let conversion =
            UnitConversionRepository::find_active_pair_tx(&conn, from_unit_id, to_unit_id)?;
        match conversion {
            Some(c) => Ok(c.factor),
            None => Err(ApiError::ConversionNotFound {
                from: self.lookup.unit_name(from_unit_id),
                to: self.lookup.unit_name(to_unit_id),
            }),
        }
    }

    /// 数量换算: qty × factor
    pub fn convert_quantity(
        &self,
        quantity: f64,
        from_unit_id: Uuid,
        to_unit_id: Uuid,
    ) -> ApiResult<f64> {
        let factor = self.resolve_factor(from_unit_id, to_unit_id)?;
        Ok(quantity * factor)
    }

    // ==========================================
    // 换算边维护
    // ==========================================

    /// 创建换算边,并级联维护反向边
    ///
    /// 已存在 ACTIVE 反向边时校验一致性: |f - 1/rev| ≤ 容差 × (1/rev);
    /// 不存在时自动生成 round(1/f, 6) 的反向边
    pub fn create_conversion(
        &self,
        actor: Uuid,
        req: ConversionRequest,
    ) -> ApiResult<UnitConversion> {
        if req.from_unit_id == req.to_unit_id {
            return Err(ApiError::Validation("换算的源单位与目标单位不能相同".to_string()));
        }
        if req.factor <= 0.0 {
            return Err(ApiError::Validation(format!(
                "换算系数必须大于 0: factor={}",
                req.factor
            )));
        }

        let conn = self.get_conn()?;
        if UnitConversionRepository::find_active_pair_tx(&conn, req.from_unit_id, req.to_unit_id)?
            .is_some()
        {
            return Err(ApiError::Validation(format!(
                "换算关系已存在: {} -> {}",
                self.lookup.unit_name(req.from_unit_id),
                self.lookup.unit_name(req.to_unit_id)
            )));
        }

        let reverse =
            UnitConversionRepository::find_active_pair_tx(&conn, req.to_unit_id, req.from_unit_id)?;
        if let Some(rev) = &reverse {
            let expected = 1.0 / rev.factor;
            if (req.factor - expected).abs() > self.settings.conversion_tolerance_ratio * expected {
                return Err(ApiError::ConversionInconsistent {
                    expected,
                    supplied: req.factor,
                });
            }
        }

        let now = Utc::now();
        let forward = UnitConversion {
            id: Uuid::new_v4(),
            from_unit_id: req.from_unit_id,
            to_unit_id: req.to_unit_id,
            factor: req.factor,
            status: DataStatus::Active,
            created_by: actor,
            created_at: now,
            updated_by: None,
            updated_at: None,
        };

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        UnitConversionRepository::insert_tx(&tx, &forward)?;
        UnitConversionRepository::insert_history_tx(
            &tx,
            &UnitConversionHistory {
                id: Uuid::new_v4(),
                conversion_id: forward.id,
                from_unit_id: forward.from_unit_id,
                to_unit_id: forward.to_unit_id,
                old_factor: None,
                new_factor: Some(forward.factor),
                change_type: ChangeType::Create,
                reason: req.reason.clone(),
                changed_by: actor,
                changed_at: now,
            },
        )?;

        if reverse.is_none() {
            let reverse_factor = self.settings.round_factor(1.0 / forward.factor);
            let auto_reverse = UnitConversion {
                id: Uuid::new_v4(),
                from_unit_id: forward.to_unit_id,
                to_unit_id: forward.from_unit_id,
                factor: reverse_factor,
                status: DataStatus::Active,
                created_by: actor,
                created_at: now,
                updated_by: None,
                updated_at: None,
            };
            UnitConversionRepository::insert_tx(&tx, &auto_reverse)?;
            UnitConversionRepository::insert_history_tx(
                &tx,
                &UnitConversionHistory {
                    id: Uuid::new_v4(),
                    conversion_id: auto_reverse.id,
                    from_unit_id: auto_reverse.from_unit_id,
                    to_unit_id: auto_reverse.to_unit_id,
                    old_factor: None,
                    new_factor: Some(reverse_factor),
                    change_type: ChangeType::AutoCreateReverse,
                    reason: req.reason.clone(),
                    changed_by: actor,
                    changed_at: now,
                },
            )?;
        }
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(
            from = %self.lookup.unit_name(forward.from_unit_id),
            to = %self.lookup.unit_name(forward.to_unit_id),
            factor = forward.factor,
            "创建换算关系"
        );
        Ok(forward)
    }

    /// 更新换算系数(单位对不可变),级联更新 ACTIVE 反向边
    ///
    /// 返回值携带仍按旧系数入账的台账行数,历史成本不回溯重算
    pub fn update_conversion(
        &self,
        actor: Uuid,
        conversion_id: Uuid,
        factor: f64,
        reason: Option<String>,
    ) -> ApiResult<ConversionUpdateOutcome> {
        if factor <= 0.0 {
            return Err(ApiError::Validation(format!(
                "换算系数必须大于 0: factor={factor}"
            )));
        }

        let conn = self.get_conn()?;
        let existing = UnitConversionRepository::find_by_id_tx(&conn, conversion_id)?.ok_or_else(
            || ApiError::NotFound {
                entity: "unit_conversion".to_string(),
                id: conversion_id.to_string(),
            },
        )?;
        if existing.status == DataStatus::Deleted {
            return Err(ApiError::Validation("换算关系已删除,无法更新".to_string()));
        }

        let now = Utc::now();
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        UnitConversionRepository::set_factor_tx(&tx, conversion_id, factor, actor, now)?;
        UnitConversionRepository::insert_history_tx(
            &tx,
            &UnitConversionHistory {
                id: Uuid::new_v4(),
                conversion_id,
                from_unit_id: existing.from_unit_id,
                to_unit_id: existing.to_unit_id,
                old_factor: Some(existing.factor),
                new_factor: Some(factor),
                change_type: ChangeType::Update,
                reason: reason.clone(),
                changed_by: actor,
                changed_at: now,
            },
        )?;

        if let Some(rev) = UnitConversionRepository::find_active_pair_tx(
            &tx,
            existing.to_unit_id,
            existing.from_unit_id,
        )? {
            let reverse_factor = self.settings.round_factor(1.0 / factor);
            UnitConversionRepository::set_factor_tx(&tx, rev.id, reverse_factor, actor, now)?;
            UnitConversionRepository::insert_history_tx(
                &tx,
                &UnitConversionHistory {
                    id: Uuid::new_v4(),
                    conversion_id: rev.id,
                    from_unit_id: rev.from_unit_id,
                    to_unit_id: rev.to_unit_id,
                    old_factor: Some(rev.factor),
                    new_factor: Some(reverse_factor),
                    change_type: ChangeType::AutoUpdateReverse,
                    reason,
                    changed_by: actor,
                    changed_at: now,
                },
            )?;
        }

        let ledger_rows =
            InventoryLedgerRepository::count_usage_by_unit_tx(&tx, existing.from_unit_id)?;
        tx.commit().map_err(RepositoryError::from)?;

        if ledger_rows > 0 {
            tracing::warn!(
                conversion_id = %conversion_id,
                ledger_rows,
                "换算系数已更新,既有台账行保持旧系数成本"
            );
        }
        let updated = UnitConversion {
            factor,
            updated_by: Some(actor),
            updated_at: Some(now),
            ..existing
        };
        Ok(ConversionUpdateOutcome {
            conversion: updated,
            ledger_rows_with_from_unit: ledger_rows,
        })
    }

    /// 删除换算边(连同反向边)
    ///
    /// 源单位仍被物料成员资格使用时拒绝;
    /// 台账已引用则软删除,否则物理删除
    pub fn delete_conversion(&self, actor: Uuid, conversion_id: Uuid) -> ApiResult<()> {
        let conn = self.get_conn()?;
        let existing = UnitConversionRepository::find_by_id_tx(&conn, conversion_id)?.ok_or_else(
            || ApiError::NotFound {
                entity: "unit_conversion".to_string(),
                id: conversion_id.to_string(),
            },
        )?;

        if MaterialUnitRepository::unit_in_use_tx(&conn, existing.from_unit_id)? {
            return Err(ApiError::Validation(format!(
                "单位 {} 仍被物料使用,请先解绑后再删除换算关系",
                self.lookup.unit_name(existing.from_unit_id)
            )));
        }

        let used_in_ledger =
            InventoryLedgerRepository::count_usage_by_unit_tx(&conn, existing.from_unit_id)? > 0
                || InventoryLedgerRepository::count_usage_by_unit_tx(&conn, existing.to_unit_id)?
                    > 0;

        let now = Utc::now();
        let reverse = UnitConversionRepository::find_active_pair_tx(
            &conn,
            existing.to_unit_id,
            existing.from_unit_id,
        )?;

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        if used_in_ledger {
            UnitConversionRepository::set_status_tx(
                &tx,
                conversion_id,
                DataStatus::Deleted,
                actor,
                now,
            )?;
        } else {
            UnitConversionRepository::delete_tx(&tx, conversion_id)?;
        }
        UnitConversionRepository::insert_history_tx(
            &tx,
            &UnitConversionHistory {
                id: Uuid::new_v4(),
                conversion_id,
                from_unit_id: existing.from_unit_id,
                to_unit_id: existing.to_unit_id,
                old_factor: Some(existing.factor),
                new_factor: None,
                change_type: ChangeType::Delete,
                reason: None,
                changed_by: actor,
                changed_at: now,
            },
        )?;

        if let Some(rev) = reverse {
            if used_in_ledger {
                UnitConversionRepository::set_status_tx(&tx, rev.id, DataStatus::Deleted, actor, now)?;
            } else {
                UnitConversionRepository::delete_tx(&tx, rev.id)?;
            }
            UnitConversionRepository::insert_history_tx(
                &tx,
                &UnitConversionHistory {
                    id: Uuid::new_v4(),
                    conversion_id: rev.id,
                    from_unit_id: rev.from_unit_id,
                    to_unit_id: rev.to_unit_id,
                    old_factor: Some(rev.factor),
                    new_factor: None,
                    change_type: ChangeType::AutoDeleteReverse,
                    reason: None,
                    changed_by: actor,
                    changed_at: now,
                },
            )?;
        }
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(
            conversion_id = %conversion_id,
            soft = used_in_ledger,
            "删除换算关系(含反向边)"
        );
        Ok(())
    }

    // ==========================================
    // 物料-单位成员资格
    // ==========================================

    /// 为物料挂接单位
    ///
    /// 第一个单位必须是基准单位;非基准单位要求已存在
    /// 该单位 -> 基准单位 的直接换算边
    pub fn add_unit_to_material(
        &self,
        actor: Uuid,
        material_id: Uuid,
        unit_id: Uuid,
        is_base: bool,
    ) -> ApiResult<MaterialUnit> {
        let conn = self.get_conn()?;
        if MaterialUnitRepository::exists_tx(&conn, material_id, unit_id)? {
            return Err(ApiError::Validation(format!(
                "物料 {} 已挂接单位 {}",
                self.lookup.material_name(material_id),
                self.lookup.unit_name(unit_id)
            )));
        }

        let existing_base = MaterialUnitRepository::find_base_unit_tx(&conn, material_id)?;
        let existing_units = MaterialUnitRepository::list_for_material_tx(&conn, material_id)?;

        if existing_units.is_empty() && !is_base {
            return Err(ApiError::Validation(format!(
                "物料 {} 的第一个单位必须设为基准单位",
                self.lookup.material_name(material_id)
            )));
        }
        if is_base {
            if let Some(base) = &existing_base {
                return Err(ApiError::Validation(format!(
                    "物料 {} 已存在基准单位 {},请改用基准切换",
                    self.lookup.material_name(material_id),
                    self.lookup.unit_name(base.unit_id)
                )));
            }
        } else {
            let base = existing_base.as_ref().ok_or_else(|| {
                ApiError::Validation(format!(
                    "物料 {} 尚无基准单位,无法挂接非基准单位",
                    self.lookup.material_name(material_id)
                ))
            })?;
            if UnitConversionRepository::find_active_pair_tx(&conn, unit_id, base.unit_id)?
                .is_none()
            {
                return Err(ApiError::ConversionNotFound {
                    from: self.lookup.unit_name(unit_id),
                    to: self.lookup.unit_name(base.unit_id),
                });
            }
        }

        let member = MaterialUnit {
            id: Uuid::new_v4(),
            material_id,
            unit_id,
            is_base_unit: is_base,
            status: DataStatus::Active,
            created_by: actor,
            created_at: Utc::now(),
        };
        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        MaterialUnitRepository::insert_tx(&tx, &member)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(
            material = %self.lookup.material_name(material_id),
            unit = %self.lookup.unit_name(unit_id),
            is_base,
            "物料挂接单位"
        );
        Ok(member)
    }

    /// 切换物料的基准单位
    ///
    /// 物料一旦有台账历史,基准单位不可变更
    pub fn set_base_unit(&self, actor: Uuid, material_id: Uuid, unit_id: Uuid) -> ApiResult<()> {
        let conn = self.get_conn()?;
        if InventoryLedgerRepository::count_by_material_tx(&conn, material_id)? > 0 {
            return Err(ApiError::Validation(format!(
                "物料 {} 已有台账历史,基准单位不可变更",
                self.lookup.material_name(material_id)
            )));
        }
        if !MaterialUnitRepository::exists_tx(&conn, material_id, unit_id)? {
            return Err(ApiError::NotFound {
                entity: "material_unit_group".to_string(),
                id: format!("material={material_id}, unit={unit_id}"),
            });
        }

        let current_base = MaterialUnitRepository::find_base_unit_tx(&conn, material_id)?;
        if let Some(base) = &current_base {
            if base.unit_id == unit_id {
                return Ok(());
            }
        }

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        if let Some(base) = &current_base {
            MaterialUnitRepository::set_base_flag_tx(&tx, material_id, base.unit_id, false)?;
        }
        MaterialUnitRepository::set_base_flag_tx(&tx, material_id, unit_id, true)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(
            material = %self.lookup.material_name(material_id),
            unit = %self.lookup.unit_name(unit_id),
            operator = %actor,
            "切换基准单位"
        );
        Ok(())
    }

    /// 解绑物料的单位(软删除)
    ///
    /// 基准单位不可解绑;该物料已有该单位的台账行时不可解绑
    pub fn remove_unit_from_material(
        &self,
        actor: Uuid,
        material_id: Uuid,
        unit_id: Uuid,
    ) -> ApiResult<()> {
        let conn = self.get_conn()?;
        if !MaterialUnitRepository::exists_tx(&conn, material_id, unit_id)? {
            return Err(ApiError::NotFound {
                entity: "material_unit_group".to_string(),
                id: format!("material={material_id}, unit={unit_id}"),
            });
        }
        if let Some(base) = MaterialUnitRepository::find_base_unit_tx(&conn, material_id)? {
            if base.unit_id == unit_id {
                return Err(ApiError::Validation(format!(
                    "单位 {} 是物料 {} 的基准单位,不可解绑",
                    self.lookup.unit_name(unit_id),
                    self.lookup.material_name(material_id)
                )));
            }
        }
        if InventoryLedgerRepository::count_usage_by_material_and_unit_tx(
            &conn,
            material_id,
            unit_id,
        )? > 0
        {
            return Err(ApiError::Validation(format!(
                "物料 {} 存在单位 {} 的台账记录,不可解绑",
                self.lookup.material_name(material_id),
                self.lookup.unit_name(unit_id)
            )));
        }

        let tx = conn.unchecked_transaction().map_err(RepositoryError::from)?;
        MaterialUnitRepository::soft_delete_tx(&tx, material_id, unit_id)?;
        tx.commit().map_err(RepositoryError::from)?;

        tracing::info!(
            material = %self.lookup.material_name(material_id),
            unit = %self.lookup.unit_name(unit_id),
            operator = %actor,
            "解绑物料单位"
        );
        Ok(())
    }

    // ==========================================
    // 读路径
    // ==========================================

    pub fn list_conversions(&self) -> ApiResult<Vec<UnitConversion>> {
        let repo = UnitConversionRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.list_active()?)
    }

    pub fn list_history(&self, conversion_id: Uuid) -> ApiResult<Vec<UnitConversionHistory>> {
        let repo = UnitConversionRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.list_history(conversion_id)?)
    }

    pub fn units_for_material(&self, material_id: Uuid) -> ApiResult<Vec<MaterialUnit>> {
        let repo = MaterialUnitRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.list_for_material(material_id)?)
    }

    pub fn base_unit_of(&self, material_id: Uuid) -> ApiResult<Option<MaterialUnit>> {
        let repo = MaterialUnitRepository::from_connection(Arc::clone(&self.conn));
        Ok(repo.find_base_unit(material_id)?)
    }
}
