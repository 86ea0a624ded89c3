//! Router 序列化契约测试。
//!
//! # 教案级注释概览
//! - **核心目标（Why）**：序列化产物只允许携带 `(Bean 标识, 容器标识)`；
//!   反序列化后的句柄必须经容器枢纽惰性解析出等价的后备实例，并对相同输入
//!   产出与序列化前完全一致的结果；
//! - **手法（How）**：用 `serde_json` 做往返（与生产序列化介质无关），以
//!   `StaticScope` 托底保证两个句柄命中同一个作用域实例。

use std::sync::Arc;

use weft_core::prelude::*;

const DOUBLE: MethodDescriptor = MethodDescriptor::of("Doubler", "double");

struct Doubler;

impl Dispatchable for Doubler {
    fn dispatch(
        &self,
        _ctx: &mut DispatchContext,
        _method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        let input = *value_ref::<i64>(&args[0]).expect("i64 arg");
        Ok(into_value(input * 2))
    }
}

/// 装配一个完整容器：注册表、作用域、上下文 Router，并登记到进程枢纽。
fn deploy(context: &str, bean: &str) -> (ContextId, BeanId) {
    let context_id = ContextId::new(context);
    let bean_id = BeanId::new(bean);

    let registry = Arc::new(BeanRegistry::new(context_id.clone()));
    let scopes = Arc::new(ScopeRegistry::new());
    scopes.register(Arc::new(StaticScope::new(ScopeId::new("shared"))) as Arc<dyn Scope>);
    registry.register(BeanMetadata::new(
        bean_id.clone(),
        ScopeId::new("shared"),
        |_creational: &mut CreationalContext<'_>| Ok(Arc::new(Doubler) as Arc<dyn Dispatchable>),
    ));
    let locator = Arc::new(ContextualInstanceLocator::new(
        Arc::clone(&registry),
        scopes,
    ));
    let router = InterceptedRouter::builder(TargetBinding::Contextual {
        bean: bean_id.clone(),
        locator,
    })
    .build()
    .expect("router builds");
    registry
        .install_router(bean_id.clone(), router)
        .expect("single canonical router");
    hub::register(registry);

    (context_id, bean_id)
}

fn invoke_through(handle: &RouterHandle, input: i64) -> DispatchResult<i64> {
    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(input)];
    handle
        .invoke(&mut ctx, &DOUBLE, None, &mut args)
        .map(|value| take_value::<i64>(value).expect("i64 result"))
}

#[test]
fn handle_round_trip_produces_identical_results() {
    let (context_id, bean_id) = deploy("deployment-rt", "doubler-rt");

    let original = RouterHandle::new(bean_id.clone(), context_id.clone());
    let before = invoke_through(&original, 21).unwrap();
    assert_eq!(before, 42);

    let json = serde_json::to_string(&original).expect("serialize");
    let restored: RouterHandle = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored, original, "序列化形态只含标识二元组");
    assert!(!restored.is_resolved(), "反序列化后必须处于未解析状态");

    let after = invoke_through(&restored, 21).unwrap();
    assert_eq!(after, before, "相同输入必须产出与序列化前一致的结果");
    assert!(restored.is_resolved(), "首次使用后完成惰性解析");
}

#[test]
fn serialized_form_carries_no_metadata_references() {
    let (context_id, bean_id) = deploy("deployment-form", "doubler-form");
    let handle = RouterHandle::new(bean_id, context_id);
    // 解析后再序列化：缓存不得进入序列化形态。
    handle.resolve().expect("resolvable");
    let json = serde_json::to_string(&handle).expect("serialize");
    assert_eq!(
        json, r#"{"bean":"doubler-form","context":"deployment-form"}"#,
        "序列化产物只含两个稳定标识"
    );
}

#[test]
fn handle_to_an_unknown_container_fails_fast() {
    let handle = RouterHandle::new(BeanId::new("ghost"), ContextId::new("never-registered"));
    assert!(
        matches!(handle.resolve(), Err(err) if err.is_state_defect()),
        "指向不存在部署的句柄是状态缺陷"
    );
}

#[test]
fn clone_re_resolves_like_a_deserialized_handle() {
    let (context_id, bean_id) = deploy("deployment-clone", "doubler-clone");
    let handle = RouterHandle::new(bean_id, context_id);
    handle.resolve().expect("resolvable");
    let clone = handle.clone();
    assert!(!clone.is_resolved(), "克隆体与反序列化路径同构：重新惰性解析");
    assert_eq!(invoke_through(&clone, 4).unwrap(), 8);
}
