//! 调用模型：方法描述符、类型擦除的参数载荷与目标调用能力。
//!
//! # 教案式概览
//! - **意图（Why）**：替身（stand-in）如何生成不属于本引擎的职责，引擎只约定
//!   “一次调用长什么样”。方法用稳定描述符标识，参数以类型擦除的载荷传递，
//!   目标以对象安全的 [`Dispatchable`] 呈现，三者共同构成 Router 契约的输入面；
//! - **契约（What）**：
//!   - [`MethodDescriptor`] 序列化稳定，可跨进程／持久化边界往返；
//!   - [`CallArgs`] 在整条流水线中是同一份可变载荷，拦截器的改写对下游可见；
//!   - [`SuperCall`] 至多被消费一次，对应替身的“调父类实现”路径；
//! - **权衡（Trade-offs）**：`Box<dyn Any + Send>` 牺牲静态类型换取对象安全与
//!   跨层传递；具体类型在流水线两端用 `downcast` 恢复。

use std::any::Any;
use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::DispatchContext;
use crate::error::DispatchResult;

/// 方法可见性。私有方法无法经由虚分派的“调父类”路径重入，
/// 替身必须使用构造期存下的 Router 引用完成本地调用。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum MethodVisibility {
    /// 普通可虚分派方法。
    #[default]
    Public,
    /// 私有方法：不存在可用的 `SuperCall`，旁路只能落到原始目标。
    Private,
}

/// 序列化稳定的方法描述符。
///
/// # 教案式说明
/// - **意图（Why）**：拦截器选择器与装饰器匹配都以方法为粒度，必须有一个独立于
///   内存布局的标识；`类型名 + 方法名` 足以在单一代理类型的能力集内定界；
/// - **契约（What）**：`Display` 形如 `Type::method`；相同内容的描述符相等，
///   可作为 `BTreeSet`/`BTreeMap` 的键参与确定性迭代。
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    type_name: Cow<'static, str>,
    method_name: Cow<'static, str>,
    visibility: MethodVisibility,
}

impl MethodDescriptor {
    /// 以静态字符串构造描述符，适合替身生成物中的常量表。
    pub const fn of(type_name: &'static str, method_name: &'static str) -> Self {
        Self {
            type_name: Cow::Borrowed(type_name),
            method_name: Cow::Borrowed(method_name),
            visibility: MethodVisibility::Public,
        }
    }

    /// 标记为私有方法。
    pub const fn private(mut self) -> Self {
        self.visibility = MethodVisibility::Private;
        self
    }

    /// 所属类型名。
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 方法名。
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// 可见性。
    pub fn visibility(&self) -> MethodVisibility {
        self.visibility
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.method_name)
    }
}

/// 类型擦除的单个调用值（参数或返回值）。
pub type CallValue = Box<dyn Any + Send>;

/// 一次调用的参数载荷；整条流水线共享同一份可变实例。
pub type CallArgs = Vec<CallValue>;

/// 将具体值装入载荷。
pub fn into_value<T: Any + Send>(value: T) -> CallValue {
    Box::new(value)
}

/// 以具体类型借用载荷中的值；类型不符返回 `None`。
pub fn value_ref<T: Any>(value: &CallValue) -> Option<&T> {
    value.downcast_ref::<T>()
}

/// 以具体类型可变借用载荷中的值。
pub fn value_mut<T: Any>(value: &mut CallValue) -> Option<&mut T> {
    value.downcast_mut::<T>()
}

/// 取回返回值的具体类型；类型不符返回 `None`。
///
/// 需要在类型不符时保留载荷的调用方，应先用 [`value_ref`] 探测再取回。
pub fn take_value<T: Any>(value: CallValue) -> Option<T> {
    value.downcast::<T>().ok().map(|boxed| *boxed)
}

/// 替身“调父类实现”的一次性可调用体。
///
/// # 教案式说明
/// - **意图（Why）**：自调用旁路需要绕开整条流水线直达父类实现；抽象/接口方法
///   没有父类实现，此时该值缺省，旁路终点退化为原始目标；
/// - **契约（What）**：至多消费一次（`invoke` 按值接收 `self`）；实现体内
///   不得再次进入同一 Router，否则属于替身生成物的缺陷。
pub struct SuperCall(Box<dyn FnOnce(&mut CallArgs) -> DispatchResult<CallValue> + Send>);

impl SuperCall {
    /// 从闭包构造。
    pub fn new(call: impl FnOnce(&mut CallArgs) -> DispatchResult<CallValue> + Send + 'static) -> Self {
        Self(Box::new(call))
    }

    /// 消费并执行。
    pub fn invoke(self, args: &mut CallArgs) -> DispatchResult<CallValue> {
        (self.0)(args)
    }
}

impl fmt::Debug for SuperCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SuperCall")
    }
}

/// 原始目标的调用能力：拦截器与装饰器链的最终去向。
///
/// # 教案式说明
/// - **意图（Why）**：无论目标是手写实现、生成物还是延迟绑定的委托，流水线只
///   依赖“按描述符派发一次调用”这一个动作；
/// - **契约（What）**：
///   - 实现必须 `Send + Sync + 'static`，同一实例可被多条调用路径并发使用；
///   - 分发上下文沿流水线逐层下传到目标：方法体内回环进入同一替身
///     （自调用）时必须复用收到的 `ctx`，抑制判定才能看到完整的调用线；
///   - 目标方法的业务失败以 [`DispatchError::Application`](crate::error::DispatchError)
///     返回，引擎保证原始类型穿透；
///   - 对未知描述符返回何种错误由实现自定，推荐 `Application` 承载领域错误。
pub trait Dispatchable: Send + Sync + 'static {
    /// 按描述符派发一次调用。
    fn dispatch(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue>;

    /// 诊断用途的实现名，默认匿名。
    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("dispatchable")
    }
}

/// 贯穿拦截器链的共享调用记录。
///
/// # 教案式说明
/// - **契约（What）**：`method` 在一次调用内不变；`args` 的改写对后续拦截器与
///   最终目标可见；`target` 是本次调用解析出的原始目标（非装饰器替身）。
pub struct InvocationRecord<'call> {
    method: &'call MethodDescriptor,
    args: &'call mut CallArgs,
    target: &'call dyn Dispatchable,
}

impl<'call> InvocationRecord<'call> {
    /// 组装一条调用记录。
    pub fn new(
        method: &'call MethodDescriptor,
        args: &'call mut CallArgs,
        target: &'call dyn Dispatchable,
    ) -> Self {
        Self {
            method,
            args,
            target,
        }
    }

    /// 本次调用的方法描述符。
    ///
    /// 返回值生命周期与调用本身绑定，不与记录的借用纠缠，便于在持有
    /// 可变参数借用的同时引用方法元信息。
    pub fn method(&self) -> &'call MethodDescriptor {
        self.method
    }

    /// 只读访问参数载荷。
    pub fn args(&self) -> &CallArgs {
        self.args
    }

    /// 可变访问参数载荷；改写对下游可见。
    pub fn args_mut(&mut self) -> &mut CallArgs {
        self.args
    }

    /// 本次调用解析出的原始目标。
    pub fn target(&self) -> &dyn Dispatchable {
        self.target
    }

    pub(crate) fn dispatch_target(&mut self, ctx: &mut DispatchContext) -> DispatchResult<CallValue> {
        self.target.dispatch(ctx, self.method, self.args)
    }
}
