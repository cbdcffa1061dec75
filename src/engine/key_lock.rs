// ==========================================
// 餐厅后台库存系统 - 库存键锁
// ==========================================
// 红线: "检查库存充足 -> FIFO 消耗" 必须在同一 (仓库, 物料)
//       键集的持锁窗口内完成,否则并发锁定会超卖
// 实现: HashSet 登记已持有键 + Condvar 等待;
//       获取前对键集排序去重,保证全序避免交叉死锁
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use uuid::Uuid;

/// (仓库, 物料) 键
pub type StockKey = (Uuid, Uuid);

/// 库存键锁登记处
///
/// 进程内共享一个实例;一次 acquire 拿下整组键,
/// 任一键被他人持有则等待
#[derive(Default)]
pub struct StockKeyLock {
    held: Mutex<HashSet<StockKey>>,
    available: Condvar,
}

impl StockKeyLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 获取一组键,返回 RAII 守卫;守卫析构时释放并唤醒等待者
    ///
    /// 键集内部会排序去重,同键集并发获取不会死锁
    pub fn acquire(self: &Arc<Self>, keys: &[StockKey]) -> StockKeyGuard {
        let mut wanted: Vec<StockKey> = keys.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut held = self
            .held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if wanted.iter().all(|k| !held.contains(k)) {
                for k in &wanted {
                    held.insert(*k);
                }
                return StockKeyGuard {
                    registry: Arc::clone(self),
                    keys: wanted,
                };
            }
            held = self
                .available
                .wait(held)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

/// 持有的键集守卫
pub struct StockKeyGuard {
    registry: Arc<StockKeyLock>,
    keys: Vec<StockKey>,
}

impl StockKeyGuard {
    /// 给定键集是否全部被本守卫持有
    ///
    /// 按探测读取键后须持锁重读,重读结果换了仓库或物料时
    /// 键集不再覆盖,调用方换键重试
    pub fn covers(&self, keys: &[StockKey]) -> bool {
        keys.iter().all(|k| self.keys.contains(k))
    }
}

impl Drop for StockKeyGuard {
    fn drop(&mut self) {
        let mut held = self
            .registry
            .held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for k in &self.keys {
            held.remove(k);
        }
        drop(held);
        self.registry.available.notify_all();
    }
}
