//! 上下文实例定位器：按 Bean 标识解析/创建真实后备实例。
//!
//! # 教案式概览
//! - **意图（Why）**：按作用域取实例的代理在每次调用时都要找到“当前的”后备
//!   实例；定位器把 `元数据查询 → 作用域判定 → 既有实例 → 受控创建` 的
//!   流程集中在一处，并维护嵌套创建栈的压弹纪律；
//! - **架构定位（Where）**：被 [`TargetBinding::Contextual`](crate::router::TargetBinding)
//!   在分发热路径上逐调用使用，也被装配期的依赖解析复用；
//! - **契约（What）**：
//!   - 解析在一次创建内幂等：同一 Bean 的重复解析命中帧缓存，不二次创建；
//!   - 作用域未激活统一报 [`ScopeInactive`](crate::error::DispatchError::ScopeInactive)；
//!     唯一的本地恢复点是显式标注的诊断入口 [`probe_instance`](ContextualInstanceLocator::probe_instance)，
//!     它把这一种错误翻译为“无实例”，其余错误照常上抛；
//!   - 创建帧在正常返回与错误路径上都保证弹出；
//! - **风险（Trade-offs）**：每次上下文解析都有一次元数据与作用域查表；两者
//!   都是无锁/读锁热路径，实测开销远低于一次动态分发。

use std::sync::Arc;

use tracing::trace;

use crate::bean::{BeanId, BeanMetadata, BeanRegistry};
use crate::context::{CreationalFrame, DispatchContext, InjectionPointMarker};
use crate::error::{DispatchError, DispatchResult};
use crate::invocation::Dispatchable;
use crate::scope::ScopeRegistry;

/// 一次受控创建的上下文视图。
///
/// # 教案式说明
/// - **契约（What）**：存在即代表定位器已为当前 Bean 压好创建帧；
///   [`dependency`](CreationalContext::dependency) 解析级联依赖（参与循环判定），
///   [`instantiate`](CreationalContext::instantiate) 执行当前 Bean 的工厂；
/// - **风险（Trade-offs）**：视图借用分发上下文的独占引用，作用域实现不得
///   把它带出 `create` 的调用栈。
pub struct CreationalContext<'a> {
    locator: &'a ContextualInstanceLocator,
    dispatch: &'a mut DispatchContext,
    metadata: &'a Arc<BeanMetadata>,
}

impl CreationalContext<'_> {
    /// 当前创建中的 Bean 元数据。
    pub fn metadata(&self) -> &BeanMetadata {
        self.metadata
    }

    /// 解析当前 Bean 的一个级联依赖（以注入标记进入，参与循环判定）。
    pub fn dependency(&mut self, bean: &BeanId) -> DispatchResult<Arc<dyn Dispatchable>> {
        let marker = InjectionPointMarker::Injected {
            requested_by: self.metadata.id().clone(),
        };
        self.locator.resolve(self.dispatch, bean, marker)
    }

    /// 执行当前 Bean 的实例化工厂。
    ///
    /// 工厂缺失在此兑现为配置缺陷——这正是“目标不可实例化”的运行期表现。
    pub fn instantiate(&mut self) -> DispatchResult<Arc<dyn Dispatchable>> {
        let instantiator = self
            .metadata
            .instantiator()
            .cloned()
            .ok_or_else(|| DispatchError::Configuration {
                bean: self.metadata.id().clone(),
                reason: "bean has no usable instantiator".into(),
            })?;
        instantiator(self)
    }
}

/// 上下文实例定位器。
pub struct ContextualInstanceLocator {
    registry: Arc<BeanRegistry>,
    scopes: Arc<ScopeRegistry>,
}

impl ContextualInstanceLocator {
    /// 组装定位器。
    pub fn new(registry: Arc<BeanRegistry>, scopes: Arc<ScopeRegistry>) -> Self {
        Self { registry, scopes }
    }

    /// 底层 Bean 注册表。
    pub fn registry(&self) -> &Arc<BeanRegistry> {
        &self.registry
    }

    /// 作用域注册表。
    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    /// 解析 Bean 的当前实例：既有实例优先，否则在新建创建帧内受控创建。
    ///
    /// 直接（非注入）查找入口：以中性注入点标记进入，不会被误判为循环创建。
    pub fn instance(
        &self,
        ctx: &mut DispatchContext,
        bean: &BeanId,
    ) -> DispatchResult<Arc<dyn Dispatchable>> {
        self.resolve(ctx, bean, InjectionPointMarker::Neutral)
    }

    /// 诊断/巡检入口：作用域未激活翻译为“无实例”，其余错误照常上抛。
    ///
    /// 这是 `ScopeInactive` 唯一允许被就地消化的位置；一般分发路径必须
    /// 让它原样传播。
    pub fn probe_instance(&self, bean: &BeanId) -> DispatchResult<Option<Arc<dyn Dispatchable>>> {
        match self.existing(bean) {
            Ok(found) => Ok(found),
            Err(DispatchError::ScopeInactive { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// 只查既有实例，不创建；作用域未激活按统一策略上报。
    fn existing(&self, bean: &BeanId) -> DispatchResult<Option<Arc<dyn Dispatchable>>> {
        let metadata = self.registry.metadata(bean)?;
        let scope = self
            .scopes
            .get(metadata.scope())
            .ok_or_else(|| DispatchError::Configuration {
                bean: bean.clone(),
                reason: format!("scope `{}` is not registered", metadata.scope()),
            })?;
        if !scope.is_active() {
            return Err(DispatchError::ScopeInactive {
                scope: metadata.scope().clone(),
                bean: bean.clone(),
            });
        }
        Ok(scope.get(bean))
    }

    fn resolve(
        &self,
        ctx: &mut DispatchContext,
        bean: &BeanId,
        marker: InjectionPointMarker,
    ) -> DispatchResult<Arc<dyn Dispatchable>> {
        // 一次创建内的幂等解析：命中帧缓存直接返回。
        if let Some(cached) = ctx.creational().cached(bean) {
            return Ok(cached);
        }
        let metadata = self.registry.metadata(bean)?;
        let scope = self
            .scopes
            .get(metadata.scope())
            .ok_or_else(|| DispatchError::Configuration {
                bean: bean.clone(),
                reason: format!("scope `{}` is not registered", metadata.scope()),
            })?;
        if !scope.is_active() {
            return Err(DispatchError::ScopeInactive {
                scope: metadata.scope().clone(),
                bean: bean.clone(),
            });
        }
        if let Some(existing) = scope.get(bean) {
            ctx.creational_mut().remember(bean.clone(), Arc::clone(&existing));
            return Ok(existing);
        }

        trace!(bean = %bean, scope = %metadata.scope(), "creating contextual instance");
        ctx.creational_mut()
            .push(CreationalFrame::new(bean.clone(), marker))?;
        let created = scope.create(
            bean,
            &mut CreationalContext {
                locator: self,
                dispatch: &mut *ctx,
                metadata: &metadata,
            },
        );
        // 创建帧在正常与错误路径上都必须弹出。
        let popped = ctx.creational_mut().pop();
        match (created, popped) {
            (Ok(instance), Ok(_)) => {
                ctx.creational_mut().remember(bean.clone(), Arc::clone(&instance));
                Ok(instance)
            }
            (Err(failure), _) => Err(failure),
            (Ok(_), Err(defect)) => Err(defect),
        }
    }
}

impl std::fmt::Debug for ContextualInstanceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextualInstanceLocator")
            .field("registry", &self.registry)
            .finish()
    }
}
