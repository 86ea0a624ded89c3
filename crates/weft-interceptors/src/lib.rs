//! weft-interceptors: 面向 `weft-core` 分发流水线的可复用横切拦截器组件库。
//!
//! # 教案式概览
//! - **意图（Why）**：为应用与平台团队提供现成的调用日志与调用指标拦截器，
//!   避免各工程重复手写同样的环绕样板；
//! - **结构（How）**：按关注点拆分为 [`logging`] 与 [`metrics`] 两个模块，
//!   每个模块都实现 [`weft_core::interceptor::AroundInvoke`] 契约，可直接
//!   交给链装配器按启用序挂入；
//! - **契约（What）**：两个拦截器都不改写参数、不吞错误——观察到的结果
//!   原样向上传递，应用错误的具体类型不受影响；
//! - **风险提示（Trade-offs）**：日志拦截器在高频链路上可能产生日志风暴，
//!   请结合配置下调级别或在订阅端采样。

pub mod logging;
pub mod metrics;

pub use logging::{CallLoggingConfig, CallLoggingInterceptor};
pub use metrics::{CallMetricsInterceptor, CallMetricsSnapshot};
