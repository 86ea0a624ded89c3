//! 可序列化的 Router 句柄：跨序列化边界仅保留稳定标识。
//!
//! # 教案式概览
//! - **意图（Why）**：Router 本体持有拦截器链与目标绑定等不可序列化的在存
//!   引用；跨进程/持久化边界可携带的只有 `(Bean 标识, 容器标识)` 二元组，
//!   其余一律在首次使用时按标识重新解析；
//! - **契约（What）**：
//!   - 句柄序列化形态只含两个字符串标识，不保留任何元数据强引用；
//!   - 反序列化后的首次调用触发惰性解析：容器枢纽 → 注册表 → 规范
//!     Router；解析结果缓存，后续调用零查表；
//!   - 解析失败（容器未登记、Bean 无规范 Router）是
//!     [`StateOperation::RouterSlot`] 缺陷——句柄指向了不存在的部署；
//! - **风险（Trade-offs）**：缓存用 `OnceLock`，并发首次解析可能各自查表一
//!   次，最终收敛到同一 `Arc`；不在热路径上加锁。

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::bean::{hub, BeanId, ContextId};
use crate::context::DispatchContext;
use crate::error::{DispatchError, DispatchResult, StateOperation};
use crate::invocation::{CallArgs, CallValue, MethodDescriptor, SuperCall};
use crate::router::Router;

/// 仅凭稳定标识即可重建的 Router 句柄。
#[derive(Serialize, Deserialize)]
pub struct RouterHandle {
    bean: BeanId,
    context: ContextId,
    #[serde(skip)]
    resolved: OnceLock<Arc<dyn Router>>,
}

impl RouterHandle {
    /// 以标识二元组构造句柄。
    pub fn new(bean: BeanId, context: ContextId) -> Self {
        Self {
            bean,
            context,
            resolved: OnceLock::new(),
        }
    }

    /// 目标 Bean 标识。
    pub fn bean(&self) -> &BeanId {
        &self.bean
    }

    /// 容器标识。
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// 是否已完成惰性解析（诊断用）。
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// 解析（并缓存）句柄指向的规范 Router。
    pub fn resolve(&self) -> DispatchResult<Arc<dyn Router>> {
        if let Some(router) = self.resolved.get() {
            return Ok(Arc::clone(router));
        }
        let registry = hub::lookup(&self.context).ok_or_else(|| {
            DispatchError::state(
                StateOperation::RouterSlot,
                format!("container `{}` is not registered in the hub", self.context),
            )
        })?;
        let router = registry.router(&self.bean)?;
        Ok(Arc::clone(self.resolved.get_or_init(|| router)))
    }

    /// 经句柄派发一次调用（等价于先 [`resolve`](Self::resolve) 再 `invoke`）。
    pub fn invoke(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        super_call: Option<SuperCall>,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        self.resolve()?.invoke(ctx, method, super_call, args)
    }
}

impl Clone for RouterHandle {
    fn clone(&self) -> Self {
        // 克隆体重新惰性解析；不跨克隆传播缓存，保持与反序列化路径同构。
        Self {
            bean: self.bean.clone(),
            context: self.context.clone(),
            resolved: OnceLock::new(),
        }
    }
}

impl fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterHandle")
            .field("bean", &self.bean)
            .field("context", &self.context)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl PartialEq for RouterHandle {
    fn eq(&self, other: &Self) -> bool {
        self.bean == other.bean && self.context == other.context
    }
}

impl Eq for RouterHandle {}
