//! 装饰器链：定长竞技场、前向委托与单调游标装配。
//!
//! # 教案式概览
//! - **意图（Why）**：装饰器 D1..DN 包裹原始实例 O，Di 转发给 D(i+1)，DN 转发给
//!   O。用整数下标寻址的竞技场取代裸引用链表，前向性由 `下一跳 = 当前 + 1`
//!   这一算术事实保证，环路在构造上不可能出现，也就无需环检测；
//! - **架构定位（Where）**：竞技场由 [`InterceptedRouter`](crate::router::InterceptedRouter)
//!   持有，作为拦截器链之后的终端阶段；装配发生在一个创建上下文内，由
//!   [`DecorationBuilder`] 一次完成并在之后只读共享；
//! - **契约（What）**：
//!   - 链定长、有限、只前向；每个装饰位置在装配期恰好领取一次委托；
//!   - 领取次数越过链长是编程缺陷（[`StateOperation::DecoratorCursor`]），
//!     既不返回空值也绝不回绕到 D1；
//!   - 调用期不匹配的装饰位置被跳过，调用次序恒为 D1→D2→…→DN→O；
//! - **风险（Trade-offs）**：跳过判定（`decorates`）在每跳上执行一次；装饰链
//!   通常很短，线性代价可忽略。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::context::DispatchContext;
use crate::error::{DispatchError, DispatchResult, StateOperation};
use crate::invocation::{CallArgs, CallValue, Dispatchable, MethodDescriptor};

/// 装饰器实现契约。
///
/// # 教案式说明
/// - **契约（What）**：
///   - `decorates` 回答“该方法是否在本装饰器的装饰能力集内”；返回 `false`
///     时本位置被跳过，调用继续向后；
///   - `call` 收到一个指向后继位置的 [`Delegate`]，实现体转发与否自便，
///     但转发只能经由该委托——这是前向性不变式的唯一通道。
pub trait Decorating: Send + Sync + 'static {
    /// 该装饰器是否装饰给定方法。
    fn decorates(&self, method: &MethodDescriptor) -> bool;

    /// 执行装饰逻辑；经 `delegate` 转发到链上的下一站。
    ///
    /// 分发上下文沿链下传，装饰器体内回环进入替身时必须复用它。
    fn call(
        &self,
        ctx: &mut DispatchContext,
        delegate: Delegate<'_>,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue>;

    /// 诊断名，默认匿名。
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("decorator")
    }
}

/// 竞技场中的一个装饰位置。
struct DecoratorLink {
    position: usize,
    instance: Arc<dyn Decorating>,
}

/// 定长装饰器竞技场：按位置寻址，终点是原始实例。
pub struct DecoratorArena {
    links: Vec<DecoratorLink>,
    original: Arc<dyn Dispatchable>,
}

impl DecoratorArena {
    /// 链长（装饰器数量，不含原始实例）。
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// 是否没有任何装饰位置。
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// 链终点的原始实例。
    pub fn original(&self) -> &Arc<dyn Dispatchable> {
        &self.original
    }

    /// 从链首开始派发一次调用。
    pub fn dispatch(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        self.dispatch_from(0, ctx, method, args)
    }

    /// 从给定位置开始派发；不匹配的位置被跳过，越过末尾落到原始实例。
    fn dispatch_from(
        &self,
        start: usize,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        let mut position = start;
        while let Some(link) = self.links.get(position) {
            if link.instance.decorates(method) {
                let delegate = Delegate {
                    arena: self,
                    next: link.position + 1,
                };
                return link.instance.call(ctx, delegate, method, args);
            }
            position += 1;
        }
        self.original.dispatch(ctx, method, args)
    }
}

impl fmt::Debug for DecoratorArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorArena")
            .field("links", &self.links.len())
            .finish()
    }
}

/// 指向链上后继位置的前向委托。
///
/// 只能向后（`next` 恒大于持有者位置），无从构造指回链首的委托。
pub struct Delegate<'a> {
    arena: &'a DecoratorArena,
    next: usize,
}

impl Delegate<'_> {
    /// 把调用转发给链上的下一站（下一个匹配的装饰器，或原始实例）。
    pub fn forward(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        self.arena.dispatch_from(self.next, ctx, method, args)
    }
}

/// 装配期委托领取的答案：后继装饰位置，或原始实例。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DelegateRef {
    /// 指向位置 `0..len` 上的后继装饰器。
    Link(usize),
    /// 链已到末端：委托即原始实例。
    Original,
}

/// 装饰链装配器（单调游标）。
///
/// # 教案式说明
/// - **意图（Why）**：每个装饰器在其自身构造（注入驱动）期间恰好领取一次
///   委托；单调递增的游标让“恰好一次、恰好按序”成为可机械检查的不变式；
/// - **契约（What）**：
///   - 第 k 次 [`next_delegate`](DecorationBuilder::next_delegate)（k 从 1 起）
///     返回 `Link(k)`（k < N）或 `Original`（k == N）；第 N+1 次是
///     [`DispatchError::State`]；
///   - [`push`](DecorationBuilder::push) 按位置顺序登记装饰器实例；
///   - [`build`](DecorationBuilder::build) 校验“每个位置恰好领取一次、恰好
///     登记一个实例”，任何不齐都是装配缺陷；
/// - **生命周期（Lifecycle）**：装配器随一个创建上下文生灭，产物竞技场在
///   之后只读共享。
pub struct DecorationBuilder {
    expected: usize,
    claimed: usize,
    links: Vec<DecoratorLink>,
    original: Arc<dyn Dispatchable>,
}

impl DecorationBuilder {
    /// 为 `expected` 个装饰器与原始实例开始装配。
    pub fn new(expected: usize, original: Arc<dyn Dispatchable>) -> Self {
        Self {
            expected,
            claimed: 0,
            links: Vec::with_capacity(expected),
            original,
        }
    }

    /// 链长。
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// 为“正在构造的下一个装饰器”领取其委托。
    ///
    /// 越过链长既不返回空值也不回绕，而是快速失败。
    pub fn next_delegate(&mut self) -> DispatchResult<DelegateRef> {
        if self.claimed >= self.expected {
            return Err(DispatchError::state(
                StateOperation::DecoratorCursor,
                format!(
                    "delegate {} requested from a chain of length {}",
                    self.claimed + 1,
                    self.expected
                ),
            ));
        }
        self.claimed += 1;
        if self.claimed == self.expected {
            Ok(DelegateRef::Original)
        } else {
            Ok(DelegateRef::Link(self.claimed))
        }
    }

    /// 登记下一个位置的装饰器实例。
    pub fn push(&mut self, instance: Arc<dyn Decorating>) -> DispatchResult<usize> {
        let position = self.links.len();
        if position >= self.expected {
            return Err(DispatchError::state(
                StateOperation::DecoratorCursor,
                format!(
                    "decorator {} pushed onto a chain of length {}",
                    position + 1,
                    self.expected
                ),
            ));
        }
        self.links.push(DecoratorLink { position, instance });
        Ok(position)
    }

    /// 完成装配。位置与领取计数不齐即为装配缺陷。
    pub fn build(self) -> DispatchResult<DecoratorArena> {
        if self.links.len() != self.expected || self.claimed != self.expected {
            return Err(DispatchError::state(
                StateOperation::DecoratorCursor,
                format!(
                    "incomplete decoration: {} of {} decorators pushed, {} delegates claimed",
                    self.links.len(),
                    self.expected,
                    self.claimed
                ),
            ));
        }
        Ok(DecoratorArena {
            links: self.links,
            original: self.original,
        })
    }
}
