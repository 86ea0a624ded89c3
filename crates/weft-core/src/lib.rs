#![deny(unsafe_code)]

//! # weft-core
//!
//! ## 定位与职责（Why）
//! - 作为代理对象（替身）的运行期分发引擎，把替身上的每次调用导入
//!   `拦截器 → 装饰器 → 真实目标` 的有序流水线，并保证横切行为对每次外部
//!   进入恰好生效一次；
//! - 识别并旁路自调用（流水线内部回环进入同一替身的调用），支持真实目标的
//!   延迟/两阶段绑定，且跨序列化边界不保留任何不稳定的在存引用。
//!
//! ## 架构嵌入（Where）
//! - `router` 模块是替身的调用入口，组合抑制栈、拦截器链与可选的装饰器链；
//! - `locator` 模块按 Bean 标识解析/创建上下文实例，维护自己的嵌套创建栈；
//! - 替身类型的生成、注解驱动的发现与启用排序、依赖注入装配均由外部子系统
//!   承担，本 crate 只在 `invocation`/`scope` 模块固化与它们的边界契约。
//!
//! ## 并发与执行模型（What）
//! - 完全同步：一次逻辑调用及其全部流水线都在调用线上执行，引擎内部不做
//!   任何线程/任务切换，也没有可挂起点；
//! - 抑制栈与创建栈都封装在显式传递的 [`context::DispatchContext`] 中，每条
//!   调用线独占一份，无锁也无线程本地存储；
//! - 跨线程共享的只有注册表类状态（Bean 元数据、容器枢纽、一次性改写的
//!   绑定槽），分别由 `dashmap` 与 `arc-swap` 承担并发语义。
//!
//! ## 风险提示（Trade-offs）
//! - 拦截器内的阻塞 I/O 对引擎不可见，调用线将随之阻塞；
//! - 取消未建模：错误是唯一的中止机制，沿流水线逐层展开，配平清理只在最
//!   外层边界执行一次。

/// 错误域：配置缺陷、应用错误穿透、状态缺陷与作用域未激活。
pub mod error;

/// 调用模型：方法描述符、类型擦除载荷、目标调用能力与调用记录。
pub mod invocation;

/// 显式分发上下文：抑制栈与创建栈。
pub mod context;

/// Bean 标识、元数据、注册表与进程级容器枢纽。
pub mod bean;

/// 作用域边界契约与常驻作用域参考实现。
pub mod scope;

/// 上下文实例定位器与受控创建上下文。
pub mod locator;

/// 拦截器链：环绕契约、方法选择器与推进上下文。
pub mod interceptor;

/// 装饰器链：竞技场、前向委托与单调游标装配。
pub mod decorator;

/// Router：调用入口、自调用抑制与可序列化句柄。
pub mod router;

/// 替身外壳：Router 访问器与两阶段延迟绑定。
pub mod standin;

/// 常用契约组合包。
pub mod prelude;

pub use error::{DispatchError, DispatchResult};
pub use router::{Router, RouterId};
