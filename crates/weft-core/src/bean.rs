//! Bean 标识、元数据与注册表。
//!
//! # 教案式概览
//! - **意图（Why）**：分发引擎与外围子系统（作用域、注入装配、序列化）之间只以
//!   不透明且序列化稳定的标识沟通，绝不跨边界传递内存引用；注册表是这些标识
//!   到元数据的唯一权威映射；
//! - **架构定位（Where）**：位于引擎最底层，被 Router、定位器与序列化句柄共同
//!   依赖；进程级 [`hub`] 以容器标识索引注册表，支撑反序列化后的重新挂接；
//! - **契约（What）**：
//!   - 元数据存储支持无锁“不存在则插入、存在则返回既有值”，并发注册的线程
//!     收敛到同一份 `Arc`；
//!   - 每个 Bean 至多安装一个规范 Router，重复安装是编程缺陷；
//! - **风险提示（Trade-offs）**：`DashMap` 的 guard 在持有期间会阻塞同分片写
//!   操作，访问器一律返回克隆的 `Arc` 而不外借 guard。

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult, StateOperation};
use crate::locator::CreationalContext;
use crate::invocation::Dispatchable;
use crate::router::Router;

/// Bean 的不透明稳定标识。
///
/// 内部以 `Arc<str>` 驻留，克隆零拷贝；序列化形态是纯字符串。
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BeanId(Arc<str>);

/// 容器（部署单元）的稳定标识，反序列化重挂接的检索键。
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContextId(Arc<str>);

/// 作用域的稳定标识。
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ScopeId(Arc<str>);

macro_rules! token_impls {
    ($name:ident) => {
        impl $name {
            /// 以字符串内容构造标识。
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(Arc::from(value.as_ref()))
            }

            /// 标识的字符串形态。
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(Arc::from(value.as_str()))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.as_ref().to_owned()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(Arc::from(value))
            }
        }
    };
}

token_impls!(BeanId);
token_impls!(ContextId);
token_impls!(ScopeId);

/// 在新建或级联的创建上下文中产出一个实例的工厂。
pub type Instantiator =
    Arc<dyn Fn(&mut CreationalContext<'_>) -> DispatchResult<Arc<dyn Dispatchable>> + Send + Sync>;

/// Bean 元数据：作用域归属与实例化方式。
///
/// # 教案式说明
/// - **契约（What）**：
///   - `instantiator` 缺失意味着该 Bean 无法被引擎实例化；当一个需要按作用域
///     取实例的代理在构造期发现这一点，即构成配置缺陷（见
///     [`DispatchError::Configuration`]）；
///   - 元数据在注册后不可变，跨线程以 `Arc` 共享。
#[derive(Clone)]
pub struct BeanMetadata {
    id: BeanId,
    scope: ScopeId,
    description: Cow<'static, str>,
    instantiator: Option<Instantiator>,
}

impl BeanMetadata {
    /// 构造带实例化工厂的元数据。
    pub fn new(
        id: BeanId,
        scope: ScopeId,
        instantiator: impl Fn(&mut CreationalContext<'_>) -> DispatchResult<Arc<dyn Dispatchable>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id,
            scope,
            description: Cow::Borrowed(""),
            instantiator: Some(Arc::new(instantiator)),
        }
    }

    /// 构造不可实例化的元数据（仅作登记，代理构造期会被拒绝）。
    pub fn opaque(id: BeanId, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            description: Cow::Borrowed(""),
            instantiator: None,
        }
    }

    /// 附加诊断描述。
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Bean 标识。
    pub fn id(&self) -> &BeanId {
        &self.id
    }

    /// 归属的作用域。
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// 诊断描述。
    pub fn description(&self) -> &str {
        &self.description
    }

    /// 实例化工厂；`None` 表示该 Bean 不可由引擎实例化。
    pub fn instantiator(&self) -> Option<&Instantiator> {
        self.instantiator.as_ref()
    }
}

impl fmt::Debug for BeanMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanMetadata")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("instantiable", &self.instantiator.is_some())
            .finish()
    }
}

/// 注册表的可枚举诊断快照条目。
#[derive(Clone, Debug)]
pub struct BeanDescriptor {
    /// Bean 标识。
    pub bean: BeanId,
    /// 作用域标识。
    pub scope: ScopeId,
    /// 诊断描述。
    pub description: String,
    /// 是否已安装规范 Router。
    pub has_router: bool,
}

/// Bean 标识 → 元数据/规范 Router 的权威映射。
///
/// # 教案式说明
/// - **意图（Why）**：并发首次使用同一个 Bean 的多个线程必须收敛到同一份元数据，
///   因此注册走“不存在则插入、存在则返回既有值”的原子入口，不加全局锁；
/// - **契约（What）**：
///   - [`register`](BeanRegistry::register) 幂等：后到的注册拿到先到者的 `Arc`；
///   - [`install_router`](BeanRegistry::install_router) 每个 Bean 仅允许一次，
///     重复安装是编程缺陷；
///   - 访问器返回 `Arc` 克隆，绝不外借内部 guard；
/// - **风险（Trade-offs）**：注册表只增不减（append-mostly），不提供删除；
///   卸载整个容器时应丢弃注册表本身并从 [`hub`] 注销。
pub struct BeanRegistry {
    context: ContextId,
    metadata: DashMap<BeanId, Arc<BeanMetadata>>,
    routers: DashMap<BeanId, Arc<dyn Router>>,
}

impl BeanRegistry {
    /// 以容器标识创建空注册表。
    pub fn new(context: ContextId) -> Self {
        Self {
            context,
            metadata: DashMap::new(),
            routers: DashMap::new(),
        }
    }

    /// 所属容器标识。
    pub fn context_id(&self) -> &ContextId {
        &self.context
    }

    /// 注册元数据；已存在时返回既有份。
    pub fn register(&self, metadata: BeanMetadata) -> Arc<BeanMetadata> {
        match self.metadata.entry(metadata.id().clone()) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(vacant) => {
                let shared = Arc::new(metadata);
                vacant.insert(Arc::clone(&shared));
                shared
            }
        }
    }

    /// 查询元数据；未注册的 Bean 是配置缺陷。
    pub fn metadata(&self, bean: &BeanId) -> DispatchResult<Arc<BeanMetadata>> {
        self.metadata
            .get(bean)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DispatchError::Configuration {
                bean: bean.clone(),
                reason: "bean is not registered".into(),
            })
    }

    /// 为 Bean 安装规范 Router（反序列化重挂接的解析终点）。
    pub fn install_router(&self, bean: BeanId, router: Arc<dyn Router>) -> DispatchResult<()> {
        match self.routers.entry(bean) {
            Entry::Occupied(existing) => Err(DispatchError::state(
                StateOperation::RouterSlot,
                format!(
                    "canonical router already installed for bean `{}`",
                    existing.key()
                ),
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(router);
                Ok(())
            }
        }
    }

    /// 取出 Bean 的规范 Router。
    pub fn router(&self, bean: &BeanId) -> DispatchResult<Arc<dyn Router>> {
        self.routers
            .get(bean)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                DispatchError::state(
                    StateOperation::RouterSlot,
                    format!("no canonical router installed for bean `{bean}`"),
                )
            })
    }

    /// 诊断快照：当前登记的全部 Bean。迭代顺序不做保证。
    pub fn descriptors(&self) -> Vec<BeanDescriptor> {
        self.metadata
            .iter()
            .map(|entry| BeanDescriptor {
                bean: entry.key().clone(),
                scope: entry.value().scope().clone(),
                description: entry.value().description().to_owned(),
                has_router: self.routers.contains_key(entry.key()),
            })
            .collect()
    }
}

impl fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("context", &self.context)
            .field("beans", &self.metadata.len())
            .field("routers", &self.routers.len())
            .finish()
    }
}

/// 进程级容器枢纽：容器标识 → 注册表。
///
/// # 教案式说明
/// - **意图（Why）**：序列化契约要求 Router 仅凭 `(Bean 标识, 容器标识)` 即可
///   重建，不得跨边界保留元数据强引用；枢纽提供反序列化后按容器标识重新找到
///   注册表的唯一通道；
/// - **契约（What）**：同一容器标识重复注册收敛到先注册者；注销是显式操作，
///   由容器生命周期管理方负责。
pub mod hub {
    use super::*;

    fn table() -> &'static DashMap<ContextId, Arc<BeanRegistry>> {
        static HUB: OnceLock<DashMap<ContextId, Arc<BeanRegistry>>> = OnceLock::new();
        HUB.get_or_init(DashMap::new)
    }

    /// 登记注册表；已存在时返回既有份。
    pub fn register(registry: Arc<BeanRegistry>) -> Arc<BeanRegistry> {
        match table().entry(registry.context_id().clone()) {
            Entry::Occupied(existing) => Arc::clone(existing.get()),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&registry));
                registry
            }
        }
    }

    /// 按容器标识检索注册表。
    pub fn lookup(context: &ContextId) -> Option<Arc<BeanRegistry>> {
        table().get(context).map(|entry| Arc::clone(entry.value()))
    }

    /// 注销容器。返回被移除的注册表（若存在）。
    pub fn deregister(context: &ContextId) -> Option<Arc<BeanRegistry>> {
        table().remove(context).map(|(_, registry)| registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_serde_round_trip() {
        let id = BeanId::new("billing/ledger");
        let json = serde_json::to_string(&id).expect("序列化");
        assert_eq!(json, "\"billing/ledger\"");
        let back: BeanId = serde_json::from_str(&json).expect("反序列化");
        assert_eq!(back, id);
    }

    #[test]
    fn register_converges_on_first_entry() {
        let registry = BeanRegistry::new(ContextId::new("ctx"));
        let first = registry.register(
            BeanMetadata::opaque(BeanId::new("a"), ScopeId::new("singleton"))
                .with_description("first"),
        );
        let second = registry.register(
            BeanMetadata::opaque(BeanId::new("a"), ScopeId::new("singleton"))
                .with_description("second"),
        );
        assert!(Arc::ptr_eq(&first, &second), "并发注册必须收敛到同一份元数据");
        assert_eq!(second.description(), "first");
    }

    #[test]
    fn unknown_bean_is_a_configuration_error() {
        let registry = BeanRegistry::new(ContextId::new("ctx"));
        let err = registry.metadata(&BeanId::new("ghost")).unwrap_err();
        assert!(matches!(err, DispatchError::Configuration { .. }));
    }
}
