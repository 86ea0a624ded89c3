//! 作用域边界：实例存取契约与作用域注册表。
//!
//! # 教案式概览
//! - **意图（Why）**：作用域的生命周期管理（激活、失效、销毁）属于外围子系统，
//!   引擎只消费“取既有实例 / 在创建上下文中造新实例”两个动作，以及一个
//!   激活判定；把这条边界固化为 [`Scope`] 契约，外围实现可自由替换；
//! - **契约（What）**：
//!   - `get` 只读取，绝不触发创建；
//!   - `create` 在调用方压好的创建帧内执行，自身不操作创建栈；
//!   - 未激活的作用域由调用方（定位器）判定并报 `ScopeInactive`，实现只需
//!     如实回答 `is_active`；
//! - **风险（Trade-offs）**：`Scope` 对象安全意味着 `get` 返回克隆的 `Arc`；
//!   实现内部如何缓存（分片、弱引用等）对引擎不可见。

use std::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::RwLock;

use crate::bean::{BeanId, ScopeId};
use crate::error::DispatchResult;
use crate::invocation::Dispatchable;
use crate::locator::CreationalContext;

/// 作用域的实例存取契约（外围子系统提供）。
pub trait Scope: Send + Sync + 'static {
    /// 作用域标识。
    fn id(&self) -> &ScopeId;

    /// 当前调用线上该作用域是否激活。
    fn is_active(&self) -> bool;

    /// 取既有实例；不存在返回 `None`，绝不创建。
    fn get(&self, bean: &BeanId) -> Option<Arc<dyn Dispatchable>>;

    /// 在给定创建上下文中为 Bean 造一个新实例并登记。
    fn create(
        &self,
        bean: &BeanId,
        creational: &mut CreationalContext<'_>,
    ) -> DispatchResult<Arc<dyn Dispatchable>>;
}

/// 作用域标识 → 实现 的注册表。
///
/// 读多写少：注册发生在装配期，分发热路径上只有读。
pub struct ScopeRegistry {
    scopes: RwLock<BTreeMap<ScopeId, Arc<dyn Scope>>>,
}

impl ScopeRegistry {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self {
            scopes: RwLock::new(BTreeMap::new()),
        }
    }

    /// 注册作用域实现；同标识的旧实现被替换并返回。
    pub fn register(&self, scope: Arc<dyn Scope>) -> Option<Arc<dyn Scope>> {
        self.scopes.write().insert(scope.id().clone(), scope)
    }

    /// 按标识检索。
    pub fn get(&self, id: &ScopeId) -> Option<Arc<dyn Scope>> {
        self.scopes.read().get(id).map(Arc::clone)
    }

    /// 已注册的作用域标识（确定性顺序，诊断用）。
    pub fn ids(&self) -> Vec<ScopeId> {
        self.scopes.read().keys().cloned().collect()
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.ids())
            .finish()
    }
}

/// 常驻作用域的参考实现：进程内缓存，激活状态可显式切换。
///
/// # 教案式说明
/// - **意图（Why）**：引擎自带一个最小可用的共享作用域，既服务单例型部署，
///   也让未激活路径（`ScopeInactive`）在测试里可重演；
/// - **契约（What）**：
///   - 并发首次创建同一 Bean 时，后到者收敛到先到者的实例（插入口径与
///     Bean 注册表一致）；
///   - [`set_active`](StaticScope::set_active) 仅翻转激活位，不清空缓存；
///     失效期间的实例去留由宿主决定。
pub struct StaticScope {
    id: ScopeId,
    active: AtomicBool,
    instances: DashMap<BeanId, Arc<dyn Dispatchable>>,
}

impl StaticScope {
    /// 以标识创建（初始为激活态）。
    pub fn new(id: ScopeId) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            instances: DashMap::new(),
        }
    }

    /// 切换激活状态。
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// 丢弃某个 Bean 的缓存实例（诊断/回收路径）。
    pub fn evict(&self, bean: &BeanId) -> Option<Arc<dyn Dispatchable>> {
        self.instances.remove(bean).map(|(_, instance)| instance)
    }
}

impl Scope for StaticScope {
    fn id(&self) -> &ScopeId {
        &self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn get(&self, bean: &BeanId) -> Option<Arc<dyn Dispatchable>> {
        self.instances.get(bean).map(|entry| Arc::clone(entry.value()))
    }

    fn create(
        &self,
        bean: &BeanId,
        creational: &mut CreationalContext<'_>,
    ) -> DispatchResult<Arc<dyn Dispatchable>> {
        let instance = creational.instantiate()?;
        match self.instances.entry(bean.clone()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&instance));
                Ok(instance)
            }
        }
    }
}

impl fmt::Debug for StaticScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticScope")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("instances", &self.instances.len())
            .finish()
    }
}
