//! # weft-core Prelude
//!
//! ## 教案级说明（Why）
//! - **统一导入面**：上层组件（拦截器库、宿主装配代码、测试）最常用的契约
//!   集中在此，`use weft_core::prelude::*;` 即可获得完整的分发工作面，避免
//!   业务代码里铺满 `weft_core::interceptor::...` 式的深路径；
//! - **收录口径**：仅收录稳定契约；装配器等一次性类型按需从具体模块导入。

pub use crate::bean::{hub, BeanId, BeanMetadata, BeanRegistry, ContextId, ScopeId};
pub use crate::context::DispatchContext;
pub use crate::decorator::{Decorating, DecorationBuilder, DecoratorArena, Delegate, DelegateRef};
pub use crate::error::{codes, ApplicationError, DispatchError, DispatchResult, StateOperation};
pub use crate::interceptor::{AroundInvoke, InterceptorChain, MethodSelector, ProceedContext};
pub use crate::invocation::{
    into_value, take_value, value_mut, value_ref, CallArgs, CallValue, Dispatchable,
    MethodDescriptor, MethodVisibility, SuperCall,
};
pub use crate::locator::{ContextualInstanceLocator, CreationalContext};
pub use crate::router::{
    handle::RouterHandle, DirectRouter, InterceptedRouter, Router, RouterId, TargetBinding,
};
pub use crate::scope::{Scope, ScopeRegistry, StaticScope};
pub use crate::standin::StandInShell;
