//! 替身外壳：Router 访问器与两阶段延迟绑定。
//!
//! # 教案式概览
//! - **意图（Why）**：替身类型本身由外部生成器产出，本引擎只规定它必须内嵌
//!   的最小状态——一个 Router 引用槽与一个延迟委托槽。原实现经保留的内部
//!   方法名触发惰性绑定；这里改为显式两阶段构造：先造未绑定的外壳，再由
//!   注入机制恰好调用一次 [`bind`](StandInShell::bind)；
//! - **契约（What）**：
//!   - Router 槽在正常运行期恰好写一次（[`attach_router`](StandInShell::attach_router)），
//!     仅反序列化重挂接（[`reattach_router`](StandInShell::reattach_router)）
//!     允许再写一次；
//!   - 第二次 `bind` 是 [`StateOperation::Bind`] 缺陷；
//!   - 私有方法无法经虚分派“调父类”重入：生成物对这类调用必须使用本壳在
//!     构造期存下的 Router 引用，而非动态查找；
//! - **并发策略（Trade-offs）**：一次性改写采用原子交换判负——后到者观察到
//!   先到值即判定违约，恢复先到值并以状态缺陷上报，使“并发首用竞争”与
//!   “顺序性误用”呈现同一种失败；恢复窗口内读侧可能短暂看到后到值，绑定
//!   协议（注入机制串行执行两阶段构造）使该窗口在正常部署中不可达，属于
//!   已接受并记录在案的限制。热路径读槽位是无锁的 `load`。

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::context::DispatchContext;
use crate::error::{DispatchError, DispatchResult, StateOperation};
use crate::invocation::{CallArgs, CallValue, Dispatchable, MethodDescriptor, SuperCall};
use crate::router::Router;

/// Router 槽的定长单元（`ArcSwap` 要求定长指针）。
struct RouterCell(Arc<dyn Router>);

/// 委托槽的定长单元。
struct DelegateCell(Arc<dyn Dispatchable>);

/// 生成的替身内嵌的最小运行期状态。
pub struct StandInShell {
    router: ArcSwapOption<RouterCell>,
    delegate: ArcSwapOption<DelegateCell>,
}

impl StandInShell {
    /// 构造未绑定的外壳（两阶段构造的第一阶段）。
    pub fn unbound() -> Self {
        Self {
            router: ArcSwapOption::const_empty(),
            delegate: ArcSwapOption::const_empty(),
        }
    }

    /// 构造期即挂接 Router 的外壳。
    ///
    /// 这就是“为私有方法显式存下的 Router 引用”——生成物内部的本地调用
    /// 一律走这里，不依赖动态分派。
    pub fn with_router(router: Arc<dyn Router>) -> Self {
        let shell = Self::unbound();
        shell
            .attach_router(router)
            .expect("freshly built shell has an empty router slot");
        shell
    }

    /// 挂接 Router；正常运行期恰好一次。
    pub fn attach_router(&self, router: Arc<dyn Router>) -> DispatchResult<()> {
        let previous = self.router.swap(Some(Arc::new(RouterCell(router))));
        if let Some(previous) = previous {
            // 输掉竞争或重复挂接：恢复先到者并判为缺陷。
            self.router.store(Some(previous));
            return Err(DispatchError::state(
                StateOperation::RouterSlot,
                "router already attached to this stand-in",
            ));
        }
        Ok(())
    }

    /// 反序列化后的重挂接：唯一允许的二次写入路径。
    ///
    /// 调用方（序列化还原逻辑）负责保证这确实是重挂接场景。
    pub fn reattach_router(&self, router: Arc<dyn Router>) {
        self.router.store(Some(Arc::new(RouterCell(router))));
    }

    /// 当前 Router；未挂接是编程缺陷。
    pub fn router(&self) -> DispatchResult<Arc<dyn Router>> {
        self.router
            .load_full()
            .map(|cell| Arc::clone(&cell.0))
            .ok_or_else(|| {
                DispatchError::state(
                    StateOperation::RouterSlot,
                    "stand-in has no router attached",
                )
            })
    }

    /// 是否已挂接 Router。
    pub fn has_router(&self) -> bool {
        self.router.load().is_some()
    }

    /// 延迟绑定真实委托（两阶段构造的第二阶段）；恰好一次。
    pub fn bind(&self, delegate: Arc<dyn Dispatchable>) -> DispatchResult<()> {
        let previous = self.delegate.swap(Some(Arc::new(DelegateCell(delegate))));
        if let Some(previous) = previous {
            self.delegate.store(Some(previous));
            return Err(DispatchError::state(
                StateOperation::Bind,
                "delegate already bound to this stand-in",
            ));
        }
        Ok(())
    }

    /// 是否已完成委托绑定。
    pub fn is_bound(&self) -> bool {
        self.delegate.load().is_some()
    }

    /// 已绑定的委托；未绑定是编程缺陷（注入机制尚未完成第二阶段）。
    pub fn delegate(&self) -> DispatchResult<Arc<dyn Dispatchable>> {
        self.delegate
            .load_full()
            .map(|cell| Arc::clone(&cell.0))
            .ok_or_else(|| {
                DispatchError::state(StateOperation::Bind, "stand-in delegate is not bound yet")
            })
    }

    /// 经当前 Router 派发一次调用。
    pub fn invoke(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        super_call: Option<SuperCall>,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        self.router()?.invoke(ctx, method, super_call, args)
    }
}

impl fmt::Debug for StandInShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandInShell")
            .field("router", &self.has_router())
            .field("bound", &self.is_bound())
            .finish()
    }
}
