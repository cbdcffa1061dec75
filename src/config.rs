// ==========================================
// 餐厅后台库存系统 - 核算参数配置
// ==========================================
// 职责: 集中换算一致性容差与舍入口径，避免散落的魔法数字
// ==========================================

use serde::{Deserialize, Serialize};

/// 台账核算参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// 正反向换算系数一致性容差（相对值，默认 1%）
    pub conversion_tolerance_ratio: f64,
    /// 自动生成反向系数时的小数位数
    pub reverse_factor_scale: u32,
    /// 金额（加权平均单价等）的小数位数
    pub price_scale: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            conversion_tolerance_ratio: 0.01,
            reverse_factor_scale: 6,
            price_scale: 2,
        }
    }
}

impl LedgerSettings {
    /// 按 price_scale 四舍五入金额
    pub fn round_price(&self, value: f64) -> f64 {
        let pow = 10f64.powi(self.price_scale as i32);
        (value * pow).round() / pow
    }

    /// 按 reverse_factor_scale 四舍五入换算系数
    pub fn round_factor(&self, value: f64) -> f64 {
        let pow = 10f64.powi(self.reverse_factor_scale as i32);
        (value * pow).round() / pow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_price_half_up() {
        let settings = LedgerSettings::default();
        assert_eq!(settings.round_price(10.006), 10.01);
        assert_eq!(settings.round_price(10.004), 10.0);
    }

    #[test]
    fn test_round_factor_scale() {
        let settings = LedgerSettings::default();
        assert_eq!(settings.round_factor(1.0 / 3.0), 0.333333);
    }
}
