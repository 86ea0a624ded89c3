//! 拦截器链：环绕调用契约、方法选择器与推进上下文。
//!
//! # 教案式概览
//! - **意图（Why）**：横切行为（事务、日志、鉴权……）以环绕拦截器表达；链序
//!   由被排除在外的发现子系统按启用优先级预先算好，本模块只负责“忠实地按
//!   固定顺序推进一次调用”；
//! - **架构定位（Where）**：链随代理类型构造一次、之后不可变；推进上下文
//!   [`ProceedContext`] 随调用生灭，承载共享可变的调用记录；
//! - **契约（What）**：
//!   - 拦截器可改写参数、可不调 [`proceed`](ProceedContext::proceed) 短路、
//!     也可调用多次（重试语义）；
//!   - 对被调方法无任何适用拦截器时，调用直落目标/装饰器阶段，零额外开销；
//!   - 链序固定：外部拦截器（启用序）在前，目标类自声明者在后；
//! - **风险（Trade-offs）**：每次调用为适用子集做一次线性过滤并收集；链表
//!   通常短小，换来的是链本体完全只读、可跨线程共享。

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::context::DispatchContext;
use crate::decorator::DecoratorArena;
use crate::error::DispatchResult;
use crate::invocation::{CallArgs, CallValue, Dispatchable, InvocationRecord, MethodDescriptor};

/// 环绕拦截器契约。
///
/// # 教案式说明
/// - **契约（What）**：实现必须 `Send + Sync + 'static`；返回值即本层对调用
///   结果的裁决——转发 [`proceed`](ProceedContext::proceed) 的结果、替换之、
///   或不调 `proceed` 直接短路；
/// - **风险（Trade-offs）**：实现体内的阻塞 I/O 对引擎不可见也不受其管辖，
///   调用线会随之阻塞。
pub trait AroundInvoke: Send + Sync + 'static {
    /// 环绕一次调用。
    fn around_invoke(&self, invocation: &mut ProceedContext<'_>) -> DispatchResult<CallValue>;

    /// 诊断名，默认匿名。
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("interceptor")
    }
}

/// 拦截器对方法的适用范围。
///
/// 目标类自声明的拦截方法本身属于“管线自用”方法，经 `Excluding` 把它们
/// 排除在拦截之外，调用这类方法时直落目标。
#[derive(Clone, Debug)]
pub enum MethodSelector {
    /// 适用于全部方法。
    All,
    /// 仅适用于点名的方法。
    Methods(BTreeSet<Cow<'static, str>>),
    /// 适用于点名之外的全部方法。
    Excluding(BTreeSet<Cow<'static, str>>),
}

impl MethodSelector {
    /// 以方法名列表构造白名单选择器。
    pub fn methods<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        MethodSelector::Methods(names.into_iter().map(Into::into).collect())
    }

    /// 以方法名列表构造黑名单选择器。
    pub fn excluding<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        MethodSelector::Excluding(names.into_iter().map(Into::into).collect())
    }

    /// 该选择器是否覆盖给定方法。
    pub fn applies(&self, method: &MethodDescriptor) -> bool {
        match self {
            MethodSelector::All => true,
            MethodSelector::Methods(names) => names.iter().any(|n| n == method.method_name()),
            MethodSelector::Excluding(names) => !names.iter().any(|n| n == method.method_name()),
        }
    }
}

/// 链内一个拦截位置的来源。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterceptorOrigin {
    /// 外部拦截器 Bean（按启用优先级排序，位于链首段）。
    External,
    /// 目标类自声明的拦截方法（位于链尾段）。
    TargetClass,
}

struct ChainEntry {
    interceptor: Arc<dyn AroundInvoke>,
    selector: MethodSelector,
    label: Cow<'static, str>,
    origin: InterceptorOrigin,
}

/// 某一代理类型的有序不可变拦截器序列。
///
/// 链由排除在外的发现子系统在代理构造期一次性交付；本类型只保存与筛选。
#[derive(Clone)]
pub struct InterceptorChain {
    entries: Arc<[ChainEntry]>,
}

impl InterceptorChain {
    /// 空链。
    pub fn empty() -> Self {
        Self {
            entries: Arc::from(Vec::new().into_boxed_slice()),
        }
    }

    /// 开始装配一条链。
    pub fn builder() -> InterceptorChainBuilder {
        InterceptorChainBuilder::default()
    }

    /// 链上位置总数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 链是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 过滤出对给定方法适用的拦截器（保持链序）。
    pub fn select(&self, method: &MethodDescriptor) -> Vec<Arc<dyn AroundInvoke>> {
        self.entries
            .iter()
            .filter(|entry| entry.selector.applies(method))
            .map(|entry| Arc::clone(&entry.interceptor))
            .collect()
    }

    /// 诊断快照：链上各位置的标签与来源。
    pub fn labels(&self) -> Vec<(String, InterceptorOrigin)> {
        self.entries
            .iter()
            .map(|entry| (entry.label.as_ref().to_owned(), entry.origin))
            .collect()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("entries", &self.labels())
            .finish()
    }
}

/// 链装配器：外部拦截器与目标类拦截方法分段收集，交付时拼接。
///
/// 段内顺序即交付顺序——启用排序是上游发现子系统的职责，这里不再排序。
#[derive(Default)]
pub struct InterceptorChainBuilder {
    external: Vec<ChainEntry>,
    target_class: Vec<ChainEntry>,
}

impl InterceptorChainBuilder {
    /// 追加一个外部拦截器（链首段，按启用序）。
    pub fn external(
        mut self,
        label: impl Into<Cow<'static, str>>,
        selector: MethodSelector,
        interceptor: Arc<dyn AroundInvoke>,
    ) -> Self {
        self.external.push(ChainEntry {
            interceptor,
            selector,
            label: label.into(),
            origin: InterceptorOrigin::External,
        });
        self
    }

    /// 追加一个目标类自声明拦截方法（链尾段）。
    pub fn target_class(
        mut self,
        label: impl Into<Cow<'static, str>>,
        selector: MethodSelector,
        interceptor: Arc<dyn AroundInvoke>,
    ) -> Self {
        self.target_class.push(ChainEntry {
            interceptor,
            selector,
            label: label.into(),
            origin: InterceptorOrigin::TargetClass,
        });
        self
    }

    /// 交付不可变链。
    pub fn build(self) -> InterceptorChain {
        let mut entries = self.external;
        entries.extend(self.target_class);
        InterceptorChain {
            entries: Arc::from(entries.into_boxed_slice()),
        }
    }
}

/// 拦截器链之后的终端阶段。
pub(crate) enum TerminalStage<'call> {
    /// 进入装饰器链（其终点是原始实例）。
    Decorated(&'call DecoratorArena),
    /// 直接派发到本次调用解析出的目标。
    Target,
}

/// 贯穿一次调用的推进上下文。
///
/// # 教案式说明
/// - **契约（What）**：
///   - [`proceed`](ProceedContext::proceed) 把调用推进到下一站：下一个适用
///     拦截器，或终端阶段；每次调用返回后游标复位，允许同一拦截器再次
///     `proceed`（重试语义）；
///   - 经 [`args_mut`](ProceedContext::args_mut) 的改写对后续所有层可见；
/// - **风险（Trade-offs）**：上下文按 `&mut` 独占传递，拦截器不得把它缓存到
///   调用栈之外。
pub struct ProceedContext<'call> {
    ctx: &'call mut DispatchContext,
    record: InvocationRecord<'call>,
    interceptors: Vec<Arc<dyn AroundInvoke>>,
    position: usize,
    terminal: TerminalStage<'call>,
}

impl<'call> ProceedContext<'call> {
    pub(crate) fn new(
        ctx: &'call mut DispatchContext,
        record: InvocationRecord<'call>,
        interceptors: Vec<Arc<dyn AroundInvoke>>,
        terminal: TerminalStage<'call>,
    ) -> Self {
        Self {
            ctx,
            record,
            interceptors,
            position: 0,
            terminal,
        }
    }

    /// 本条调用线的分发上下文；拦截器体内回环进入替身时必须复用它。
    pub fn dispatch_context(&mut self) -> &mut DispatchContext {
        self.ctx
    }

    /// 本次调用的方法描述符。
    pub fn method(&self) -> &MethodDescriptor {
        self.record.method()
    }

    /// 只读访问参数载荷。
    pub fn args(&self) -> &CallArgs {
        self.record.args()
    }

    /// 可变访问参数载荷；改写对下游可见。
    pub fn args_mut(&mut self) -> &mut CallArgs {
        self.record.args_mut()
    }

    /// 本次调用解析出的原始目标。
    pub fn target(&self) -> &dyn Dispatchable {
        self.record.target()
    }

    /// 把调用推进到下一站。
    pub fn proceed(&mut self) -> DispatchResult<CallValue> {
        if self.position < self.interceptors.len() {
            let next = Arc::clone(&self.interceptors[self.position]);
            self.position += 1;
            let outcome = next.around_invoke(self);
            // 游标复位，支持同一层再次 proceed 的重试语义。
            self.position -= 1;
            outcome
        } else {
            match &self.terminal {
                TerminalStage::Decorated(arena) => {
                    let method = self.record.method();
                    arena.dispatch(self.ctx, method, self.record.args_mut())
                }
                TerminalStage::Target => self.record.dispatch_target(self.ctx),
            }
        }
    }
}
