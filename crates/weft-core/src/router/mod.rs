//! Router：替身的每次调用入口与自调用抑制算法。
//!
//! # 教案式概览
//! - **意图（Why）**：横切行为必须对每次“外部进入”的调用恰好生效一次。被
//!   拦截方法在流水线内部回调同一替身时，若再次走完整流水线，拦截器与
//!   装饰器就会重复执行；Router 以“进行中集合”识别这种自调用并旁路之；
//! - **架构定位（Where）**：每个替身恰好引用一个 Router；变体在构造期固定
//!   ——无拦截链的代理用 [`DirectRouter`]，带拦截/装饰流水线的用
//!   [`InterceptedRouter`]；
//! - **算法（How，对应最外层进入）**：
//!   1. 抑制栈为空 ⇒ 压入新帧并记为“外层”；
//!   2. 顶帧已含本 Router 身份 ⇒ 自调用：旁路流水线，直接走
//!      `SuperCall`（缺省时走原始目标）；
//!   3. 否则登记身份、跑完整流水线，并在保证执行的清理步骤中注销；
//!   4. 外层调用在一切退出路径上弹出并销毁该帧；
//! - **契约（What）**：
//!   - 清理只在外层边界做一次，嵌套层不重复做，热路径保持廉价；
//!   - 目标方法的错误原样穿透（见 [`crate::error::DispatchError::Application`]）；
//! - **风险（Trade-offs）**：按调用解析上下文目标（`Contextual` 绑定）每次
//!   多一次定位器查表；换来的是常规作用域语义（实例随作用域更替）。

pub mod handle;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::bean::BeanId;
use crate::context::DispatchContext;
use crate::decorator::DecoratorArena;
use crate::error::{DispatchError, DispatchResult};
use crate::interceptor::{InterceptorChain, ProceedContext, TerminalStage};
use crate::invocation::{CallArgs, CallValue, Dispatchable, InvocationRecord, MethodDescriptor, SuperCall};
use crate::locator::ContextualInstanceLocator;

/// Router 的进程内唯一身份；抑制帧的成员键。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RouterId(u64);

impl RouterId {
    /// 分配下一个身份。
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// 原始数值（日志/诊断用）。
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// 替身调用入口的对象安全契约。
///
/// `args` 以 `&mut` 传入：载荷归调用方所有，拦截器的改写对调用方可见。
pub trait Router: Send + Sync + 'static {
    /// 本 Router 的身份。
    fn id(&self) -> RouterId;

    /// 按抑制算法派发一次调用。
    fn invoke(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        super_call: Option<SuperCall>,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue>;

    /// 诊断名，默认匿名。
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("router")
    }
}

/// 流水线的目标去向。
#[derive(Clone)]
pub enum TargetBinding {
    /// 构造期已物化的实例。
    Bound(Arc<dyn Dispatchable>),
    /// 按调用经定位器解析“当前作用域里的”实例（常规作用域代理路径）。
    Contextual {
        /// 目标 Bean。
        bean: BeanId,
        /// 解析所用定位器。
        locator: Arc<ContextualInstanceLocator>,
    },
}

impl TargetBinding {
    /// 解析本次调用的目标实例。
    pub fn resolve(&self, ctx: &mut DispatchContext) -> DispatchResult<Arc<dyn Dispatchable>> {
        match self {
            TargetBinding::Bound(instance) => Ok(Arc::clone(instance)),
            TargetBinding::Contextual { bean, locator } => locator.instance(ctx, bean),
        }
    }

    /// 代理构造期校验：上下文绑定的 Bean 必须已登记且可实例化。
    fn validate(&self) -> DispatchResult<()> {
        if let TargetBinding::Contextual { bean, locator } = self {
            let metadata = locator.registry().metadata(bean)?;
            if metadata.instantiator().is_none() {
                return Err(DispatchError::Configuration {
                    bean: bean.clone(),
                    reason: "bean has no usable instantiator; a contextual proxy cannot be built"
                        .into(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TargetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetBinding::Bound(_) => f.write_str("TargetBinding::Bound"),
            TargetBinding::Contextual { bean, .. } => {
                write!(f, "TargetBinding::Contextual({bean})")
            }
        }
    }
}

/// 一帧内的派发动作：完整流水线与自调用旁路两条腿。
///
/// 抑制算法对两种 Router 变体一致，差异全部收敛在这个内部契约上。
trait FrameDispatch {
    fn pipeline(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue>;
    fn bypass(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue>;
}

/// 共享的抑制算法（见模块文档的四步描述）。
fn route_with_suppression(
    id: RouterId,
    ctx: &mut DispatchContext,
    dispatch: &mut dyn FrameDispatch,
) -> DispatchResult<CallValue> {
    let outer = ctx.suppression().is_empty();
    if outer {
        ctx.suppression_mut().push();
        trace!(router = id.raw(), "outer dispatch entry");
    }
    let verdict = route_in_frame(id, ctx, dispatch);
    if outer {
        // 外层边界的配平清理：一切退出路径上恰好执行一次。
        match ctx.suppression_mut().pop() {
            Ok(_) => trace!(router = id.raw(), "outer dispatch exit"),
            Err(defect) => {
                if verdict.is_ok() {
                    return Err(defect);
                }
            }
        }
    }
    verdict
}

fn route_in_frame(
    id: RouterId,
    ctx: &mut DispatchContext,
    dispatch: &mut dyn FrameDispatch,
) -> DispatchResult<CallValue> {
    if ctx.suppression().peek()?.contains(id) {
        trace!(router = id.raw(), "self-invocation bypass");
        return dispatch.bypass(ctx);
    }
    ctx.suppression_mut().peek_mut()?.register(id)?;
    let outcome = dispatch.pipeline(ctx);
    // 注销是保证执行的清理步骤；流水线的错误优先于清理缺陷上抛。
    let cleanup = ctx
        .suppression_mut()
        .peek_mut()
        .and_then(|frame| frame.deregister(id));
    match cleanup {
        Ok(()) => outcome,
        Err(defect) => outcome.and(Err(defect)),
    }
}

/// 无拦截链的直达 Router。
///
/// 流水线即“解析目标并派发”；仍参与抑制登记，使同一替身上的混合调用图
/// 在自调用判定上行为一致。
pub struct DirectRouter {
    id: RouterId,
    binding: TargetBinding,
}

impl DirectRouter {
    /// 构造直达 Router；上下文绑定在此做构造期校验。
    pub fn new(binding: TargetBinding) -> DispatchResult<Arc<Self>> {
        binding.validate()?;
        Ok(Arc::new(Self {
            id: RouterId::next(),
            binding,
        }))
    }

    /// 目标绑定。
    pub fn binding(&self) -> &TargetBinding {
        &self.binding
    }
}

struct DirectDispatch<'a> {
    binding: &'a TargetBinding,
    method: &'a MethodDescriptor,
    super_call: Option<SuperCall>,
    args: &'a mut CallArgs,
}

impl FrameDispatch for DirectDispatch<'_> {
    fn pipeline(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue> {
        let target = self.binding.resolve(ctx)?;
        target.dispatch(ctx, self.method, self.args)
    }

    fn bypass(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue> {
        if let Some(super_call) = self.super_call.take() {
            return super_call.invoke(self.args);
        }
        self.pipeline(ctx)
    }
}

impl Router for DirectRouter {
    fn id(&self) -> RouterId {
        self.id
    }

    fn invoke(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        super_call: Option<SuperCall>,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        let mut dispatch = DirectDispatch {
            binding: &self.binding,
            method,
            super_call,
            args,
        };
        route_with_suppression(self.id, ctx, &mut dispatch)
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("direct-router")
    }
}

/// 带拦截器链（及可选装饰器链）的完整流水线 Router。
pub struct InterceptedRouter {
    id: RouterId,
    chain: InterceptorChain,
    decorators: Option<DecoratorArena>,
    binding: TargetBinding,
}

impl InterceptedRouter {
    /// 以目标绑定开始装配。
    pub fn builder(binding: TargetBinding) -> InterceptedRouterBuilder {
        InterceptedRouterBuilder {
            chain: InterceptorChain::empty(),
            decorators: None,
            binding,
        }
    }

    /// 拦截器链（诊断用）。
    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// 目标绑定。
    pub fn binding(&self) -> &TargetBinding {
        &self.binding
    }

    fn run_pipeline(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        let target = self.binding.resolve(ctx)?;
        let selected = self.chain.select(method);
        if selected.is_empty() {
            // 无适用拦截器：直落装饰器/目标阶段。
            return match &self.decorators {
                Some(arena) => arena.dispatch(ctx, method, args),
                None => target.dispatch(ctx, method, args),
            };
        }
        let terminal = match &self.decorators {
            Some(arena) => TerminalStage::Decorated(arena),
            None => TerminalStage::Target,
        };
        let record = InvocationRecord::new(method, args, &*target);
        let mut proceed = ProceedContext::new(ctx, record, selected, terminal);
        proceed.proceed()
    }
}

/// [`InterceptedRouter`] 的装配器。
///
/// 拦截/装饰序列由排除在外的发现子系统预先算好后整体交付；装配器只负责
/// 构造期校验与拼装，不做任何排序。
pub struct InterceptedRouterBuilder {
    chain: InterceptorChain,
    decorators: Option<DecoratorArena>,
    binding: TargetBinding,
}

impl InterceptedRouterBuilder {
    /// 安装拦截器链。
    pub fn chain(mut self, chain: InterceptorChain) -> Self {
        self.chain = chain;
        self
    }

    /// 安装装饰器链。
    pub fn decorators(mut self, arena: DecoratorArena) -> Self {
        self.decorators = Some(arena);
        self
    }

    /// 交付 Router；配置缺陷在此兑现并回报给请求构造代理的一方。
    pub fn build(self) -> DispatchResult<Arc<InterceptedRouter>> {
        self.binding.validate()?;
        Ok(Arc::new(InterceptedRouter {
            id: RouterId::next(),
            chain: self.chain,
            decorators: self.decorators,
            binding: self.binding,
        }))
    }
}

struct InterceptedDispatch<'a> {
    router: &'a InterceptedRouter,
    method: &'a MethodDescriptor,
    super_call: Option<SuperCall>,
    args: &'a mut CallArgs,
}

impl FrameDispatch for InterceptedDispatch<'_> {
    fn pipeline(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue> {
        self.router.run_pipeline(ctx, self.method, self.args)
    }

    fn bypass(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue> {
        if let Some(super_call) = self.super_call.take() {
            return super_call.invoke(self.args);
        }
        // 抽象/接口方法没有父类实现：旁路终点退化为原始目标。
        let target = self.router.binding.resolve(ctx)?;
        target.dispatch(ctx, self.method, self.args)
    }
}

impl Router for InterceptedRouter {
    fn id(&self) -> RouterId {
        self.id
    }

    fn invoke(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        super_call: Option<SuperCall>,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        let mut dispatch = InterceptedDispatch {
            router: self,
            method,
            super_call,
            args,
        };
        route_with_suppression(self.id, ctx, &mut dispatch)
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("intercepted-router")
    }
}

impl fmt::Debug for InterceptedRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedRouter")
            .field("id", &self.id)
            .field("chain", &self.chain.len())
            .field("decorated", &self.decorators.is_some())
            .field("binding", &self.binding)
            .finish()
    }
}
