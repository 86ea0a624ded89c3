//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为分发引擎对外暴露的错误语义提供集中定义：配置缺陷、目标方法自身的失败、
//!   栈/游标误用以及作用域未激活四类，彼此边界清晰，便于上层做精确的告警与恢复决策；
//! - 目标方法抛出的错误必须以原始类型穿透整条流水线（引擎绝不额外包裹一层自有语义），
//!   因此应用错误以透明变体承载，保留 `downcast` 能力。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，满足 `Send + Sync + 'static`；
//! - 每个变体对应一个稳定错误码（见 [`codes`]），命名遵循 `<领域>.<语义>` 约定；
//! - `State` 类错误表达编程缺陷：快速失败，调用方不得重试或吞掉；
//! - `ScopeInactive` 是唯一允许局部恢复的类别，且恢复点仅限定位器的探测入口。
//!
//! ## 扩展建议（How）
//! - 新增变体时同步补充 [`codes`] 常量与 [`DispatchError::code`] 分支；
//! - 携带上下文时优先选用稳定标识（Bean/作用域标识）而非内存引用，保证日志可序列化。

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::bean::{BeanId, ScopeId};

/// 分发路径的统一结果别名。
pub type DispatchResult<T> = Result<T, DispatchError>;

/// 稳定错误码表。
///
/// # 教案式说明
/// - **意图（Why）**：日志、指标与自动化治理依赖机器可读的错误分类，字符串码在
///   序列化边界上比枚举序号更稳定；
/// - **契约（What）**：常量一经发布不得改值；新增常量遵循 `<领域>.<语义>` 命名。
pub mod codes {
    /// 代理构造期配置缺陷（目标不可实例化、元数据缺失等）。
    pub const CONFIGURATION_INVALID: &str = "weft.configuration.invalid";
    /// 目标方法自身抛出的应用级错误。
    pub const INVOCATION_APPLICATION: &str = "weft.invocation.application";
    /// 抑制栈、创建栈或装饰器游标被误用的编程缺陷。
    pub const DISPATCH_STATE: &str = "weft.dispatch.state";
    /// 请求的作用域当前未激活。
    pub const SCOPE_INACTIVE: &str = "weft.scope.inactive";
}

/// 发生栈/游标误用的具体操作，用于 `State` 变体的上下文定位。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateOperation {
    /// 对空抑制栈执行 `pop`/`peek`。
    SuppressionStack,
    /// 同一 Router 在一个抑制帧内重复登记或注销缺失。
    SuppressionFrame,
    /// 对空创建栈执行 `pop`，或检测到循环创建。
    CreationalStack,
    /// 装饰器委托游标越过链长，或装饰链装配不完整。
    DecoratorCursor,
    /// 延迟绑定被执行了第二次。
    Bind,
    /// Router 访问器在未绑定时被读取，或反序列化句柄无法重新挂接。
    RouterSlot,
}

impl fmt::Display for StateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StateOperation::SuppressionStack => "suppression-stack",
            StateOperation::SuppressionFrame => "suppression-frame",
            StateOperation::CreationalStack => "creational-stack",
            StateOperation::DecoratorCursor => "decorator-cursor",
            StateOperation::Bind => "bind",
            StateOperation::RouterSlot => "router-slot",
        };
        f.write_str(label)
    }
}

/// 承载目标方法原始错误的透明信封。
///
/// # 教案式说明
/// - **意图（Why）**：契约要求“目标抛出 E，调用方收到的就是 E”。信封只负责在
///   `DispatchError` 枚举内占位，`Display`/`source` 全部委托给内部错误，
///   并保留 [`downcast_ref`](ApplicationError::downcast_ref) 还原具体类型的能力；
/// - **契约（What)**：内部错误满足 `Error + Send + Sync + 'static`；信封自身
///   不得追加任何文案或语义；
/// - **风险（Trade-offs）**：一次 `Box` 分配换取对象安全；热路径上仅在错误分支触发。
pub struct ApplicationError(Box<dyn StdError + Send + Sync + 'static>);

impl ApplicationError {
    /// 包装目标方法抛出的错误。
    pub fn new(inner: impl StdError + Send + Sync + 'static) -> Self {
        Self(Box::new(inner))
    }

    /// 从已装箱的错误构造，避免二次分配。
    pub fn from_boxed(inner: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self(inner)
    }

    /// 尝试以具体类型访问原始错误。
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// 判断原始错误是否为指定类型。
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    /// 取回原始装箱错误，交还调用方全权处置。
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.0
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl StdError for ApplicationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

/// 分发引擎核心错误域。
///
/// # 教案式说明
/// - **意图（Why）**：把分发路径上所有可观察的失败合流为一个稳定枚举，拦截器、
///   装饰器与定位器共享同一错误面，`?` 传播不丢失任何语义；
/// - **契约（What）**：
///   - 所有变体满足 `Send + Sync + 'static`，可安全跨线程传播；
///   - [`code`](DispatchError::code) 返回稳定错误码，供日志与指标分类；
///   - `Application` 变体对 `Display`/`source` 完全透明，调用方可经
///     [`as_application`](DispatchError::as_application) 还原目标错误的具体类型；
/// - **传播策略（How）**：除定位器探测入口对 `ScopeInactive` 做本地翻译外，
///   分发路径上的一切错误都终止当前调用并原样上抛到替身的调用方。
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 代理构造期的致命配置缺陷；不重试，直接回报给请求构造代理的一方。
    #[error("bean `{bean}` cannot be proxied: {reason}")]
    Configuration {
        /// 受影响的 Bean 标识。
        bean: BeanId,
        /// 人类可读的缺陷描述，不含敏感信息。
        reason: String,
    },

    /// 目标方法自身抛出的错误，原样穿透。
    #[error(transparent)]
    Application(ApplicationError),

    /// 抑制栈/创建栈/装饰器游标误用——编程缺陷，快速失败。
    #[error("dispatch state violated during {operation}: {reason}")]
    State {
        /// 被误用的具体操作。
        operation: StateOperation,
        /// 违约描述。
        reason: String,
    },

    /// 请求的作用域当前未激活；与“实例不存在”是两回事。
    #[error("scope `{scope}` is not active (bean `{bean}`)")]
    ScopeInactive {
        /// 未激活的作用域标识。
        scope: ScopeId,
        /// 触发查询的 Bean 标识。
        bean: BeanId,
    },
}

impl DispatchError {
    /// 构造应用错误变体，保持原始类型可还原。
    pub fn application(inner: impl StdError + Send + Sync + 'static) -> Self {
        DispatchError::Application(ApplicationError::new(inner))
    }

    /// 构造状态缺陷变体。
    pub fn state(operation: StateOperation, reason: impl Into<String>) -> Self {
        DispatchError::State {
            operation,
            reason: reason.into(),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Configuration { .. } => codes::CONFIGURATION_INVALID,
            DispatchError::Application(_) => codes::INVOCATION_APPLICATION,
            DispatchError::State { .. } => codes::DISPATCH_STATE,
            DispatchError::ScopeInactive { .. } => codes::SCOPE_INACTIVE,
        }
    }

    /// 若为应用错误，返回透明信封以便还原具体类型。
    pub fn as_application(&self) -> Option<&ApplicationError> {
        match self {
            DispatchError::Application(inner) => Some(inner),
            _ => None,
        }
    }

    /// 是否属于快速失败的编程缺陷。
    pub fn is_state_defect(&self) -> bool {
        matches!(self, DispatchError::State { .. })
    }
}
