// ==========================================
// 化工批次排产系统 - 资源锁表
// ==========================================
// 职责: 每个争用资源（公用工程 / 设备）一把互斥锁
// 红线: 读取 → 判定 → 提交全程持锁；按键排序加锁，杜绝死锁
// ==========================================

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::UtilityKind;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKey {
    Utility(UtilityKind),
    Equipment(String),
}

#[derive(Debug, Default)]
pub struct ResourceLocks {
    table: Mutex<HashMap<ResourceKey, Arc<Mutex<()>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取出锁句柄（去重并按键排序）
    pub fn handles<I>(&self, keys: I) -> ApiResult<Vec<Arc<Mutex<()>>>>
    where
        I: IntoIterator<Item = ResourceKey>,
    {
        let ordered: BTreeSet<ResourceKey> = keys.into_iter().collect();
        let mut table = self
            .table
            .lock()
            .map_err(|e| ApiError::LockError(e.to_string()))?;

        Ok(ordered
            .into_iter()
            .map(|key| Arc::clone(table.entry(key).or_default()))
            .collect())
    }

    /// 按句柄顺序逐个加锁
    pub fn lock_all(handles: &[Arc<Mutex<()>>]) -> ApiResult<Vec<MutexGuard<'_, ()>>> {
        handles
            .iter()
            .map(|h| h.lock().map_err(|e| ApiError::LockError(e.to_string())))
            .collect()
    }
}
