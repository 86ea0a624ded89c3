//! 分发流水线契约测试。
//!
//! # 教案级注释概览
//! - **核心目标（Why）**：验证分发引擎的全部外部可观察性质——自调用幂等、
//!   栈配平、装饰器次序、链越界快速失败、应用错误穿透，以及“前后日志”
//!   场景（含错误分支）；
//! - **手法（How）**：与生产代码同构的最小替身：目标实现 `Dispatchable`，
//!   需要回环的目标经 `OnceLock` 注入自己的外壳引用；全部次序断言走共享
//!   有序日志（`Arc<Mutex<Vec<String>>>`）。

use std::sync::{Arc, Mutex, OnceLock};

use weft_core::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().expect("log lock").push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

fn expect_err<T>(outcome: DispatchResult<T>) -> DispatchError {
    match outcome {
        Ok(_) => panic!("expected the dispatch to fail"),
        Err(err) => err,
    }
}

const OUTER: MethodDescriptor = MethodDescriptor::of("Chatty", "outer");
const INNER: MethodDescriptor = MethodDescriptor::of("Chatty", "inner");
const DOUBLE: MethodDescriptor = MethodDescriptor::of("Doubler", "double");

/// 记录前后次序的环绕拦截器。
struct Recording {
    name: &'static str,
    log: Log,
}

impl AroundInvoke for Recording {
    fn around_invoke(&self, invocation: &mut ProceedContext<'_>) -> DispatchResult<CallValue> {
        let method = invocation.method().method_name().to_owned();
        push(&self.log, format!("{}:before:{}", self.name, method));
        let outcome = invocation.proceed();
        if outcome.is_ok() {
            push(&self.log, format!("{}:after:{}", self.name, method));
        }
        outcome
    }
}

/// `outer` 方法体内经自己的替身回环调用 `inner` 的目标。
struct Chatty {
    log: Log,
    shell: OnceLock<Arc<StandInShell>>,
}

impl Chatty {
    fn new(log: Log) -> Arc<Self> {
        Arc::new(Self {
            log,
            shell: OnceLock::new(),
        })
    }
}

impl Dispatchable for Chatty {
    fn dispatch(
        &self,
        ctx: &mut DispatchContext,
        method: &MethodDescriptor,
        _args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        match method.method_name() {
            "outer" => {
                push(&self.log, "outer:body");
                let shell = self.shell.get().expect("shell wired");
                let mut inner_args: CallArgs = Vec::new();
                // 自调用：复用同一条调用线的分发上下文。
                shell.invoke(ctx, &INNER, None, &mut inner_args)
            }
            "inner" => {
                push(&self.log, "inner:body");
                Ok(into_value(7i64))
            }
            other => panic!("unexpected method {other}"),
        }
    }
}

fn chatty_fixture(log: &Log) -> (Arc<Chatty>, Arc<StandInShell>) {
    let target = Chatty::new(Arc::clone(log));
    let chain = InterceptorChain::builder()
        .external(
            "recording",
            MethodSelector::All,
            Arc::new(Recording {
                name: "I",
                log: Arc::clone(log),
            }),
        )
        .build();
    let router = InterceptedRouter::builder(TargetBinding::Bound(
        Arc::clone(&target) as Arc<dyn Dispatchable>
    ))
    .chain(chain)
    .build()
    .expect("router builds");
    let shell = Arc::new(StandInShell::with_router(router));
    target
        .shell
        .set(Arc::clone(&shell))
        .ok()
        .expect("shell set once");
    (target, shell)
}

#[test]
fn self_invocation_runs_interceptors_once_per_external_entry() {
    let log: Log = Arc::default();
    let (_target, shell) = chatty_fixture(&log);
    let mut ctx = DispatchContext::new();

    let mut args: CallArgs = Vec::new();
    let value = shell.invoke(&mut ctx, &OUTER, None, &mut args).unwrap();
    assert_eq!(take_value::<i64>(value).unwrap(), 7);
    assert_eq!(
        entries(&log),
        [
            "I:before:outer",
            "outer:body",
            "inner:body",
            "I:after:outer"
        ],
        "内部回环不得再次触发拦截器"
    );
    assert!(ctx.is_balanced(), "外层调用返回后抑制栈必须为空");
}

#[test]
fn separate_external_entries_each_get_interception() {
    let log: Log = Arc::default();
    let (_target, shell) = chatty_fixture(&log);
    let mut ctx = DispatchContext::new();

    let mut args: CallArgs = Vec::new();
    shell.invoke(&mut ctx, &OUTER, None, &mut args).unwrap();
    let mut args: CallArgs = Vec::new();
    shell.invoke(&mut ctx, &INNER, None, &mut args).unwrap();

    let recorded = entries(&log);
    assert_eq!(
        recorded,
        [
            "I:before:outer",
            "outer:body",
            "inner:body",
            "I:after:outer",
            "I:before:inner",
            "inner:body",
            "I:after:inner"
        ],
        "同线程的后续外部调用是新的外层进入，拦截器重新生效"
    );
    assert!(ctx.is_balanced());
}

#[test]
fn self_invocation_bypass_prefers_super_call() {
    let log: Log = Arc::default();

    struct SuperChatty {
        log: Log,
        shell: OnceLock<Arc<StandInShell>>,
    }

    impl Dispatchable for SuperChatty {
        fn dispatch(
            &self,
            ctx: &mut DispatchContext,
            method: &MethodDescriptor,
            _args: &mut CallArgs,
        ) -> DispatchResult<CallValue> {
            match method.method_name() {
                "outer" => {
                    let shell = self.shell.get().expect("shell wired");
                    let log = Arc::clone(&self.log);
                    let super_call = SuperCall::new(move |_args| {
                        log.lock().unwrap().push("super:inner".into());
                        Ok(into_value(1i64))
                    });
                    let mut inner_args: CallArgs = Vec::new();
                    shell.invoke(ctx, &INNER, Some(super_call), &mut inner_args)
                }
                "inner" => {
                    push(&self.log, "virtual:inner");
                    Ok(into_value(0i64))
                }
                other => panic!("unexpected method {other}"),
            }
        }
    }

    let target = Arc::new(SuperChatty {
        log: Arc::clone(&log),
        shell: OnceLock::new(),
    });
    let router = InterceptedRouter::builder(TargetBinding::Bound(
        Arc::clone(&target) as Arc<dyn Dispatchable>
    ))
    .build()
    .unwrap();
    let shell = Arc::new(StandInShell::with_router(router));
    target.shell.set(Arc::clone(&shell)).ok().expect("once");

    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = Vec::new();
    let value = shell.invoke(&mut ctx, &OUTER, None, &mut args).unwrap();
    assert_eq!(take_value::<i64>(value).unwrap(), 1);
    assert_eq!(entries(&log), ["super:inner"], "旁路应走 SuperCall 而非虚分派");
    assert!(ctx.is_balanced());
}

/// `x * 2` 目标；`x == 5` 时按需抛出应用错误。
struct Doubler {
    explode_on_five: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("illegal state: refusing input 5")]
struct IllegalState;

impl Dispatchable for Doubler {
    fn dispatch(
        &self,
        _ctx: &mut DispatchContext,
        _method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        let input = *value_ref::<i64>(&args[0]).expect("i64 arg");
        if self.explode_on_five && input == 5 {
            return Err(DispatchError::application(IllegalState));
        }
        Ok(into_value(input * 2))
    }
}

fn doubler_shell(log: &Log, explode_on_five: bool) -> Arc<StandInShell> {
    let chain = InterceptorChain::builder()
        .external(
            "recording",
            MethodSelector::All,
            Arc::new(Recording {
                name: "I",
                log: Arc::clone(log),
            }),
        )
        .build();
    let router = InterceptedRouter::builder(TargetBinding::Bound(Arc::new(Doubler {
        explode_on_five,
    })))
    .chain(chain)
    .build()
    .unwrap();
    Arc::new(StandInShell::with_router(router))
}

#[test]
fn scenario_before_call_after() {
    let log: Log = Arc::default();
    let shell = doubler_shell(&log, false);
    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(5i64)];
    let value = shell.invoke(&mut ctx, &DOUBLE, None, &mut args).unwrap();
    assert_eq!(take_value::<i64>(value).unwrap(), 10);
    assert_eq!(entries(&log), ["I:before:double", "I:after:double"]);
    assert!(ctx.is_balanced());
}

#[test]
fn scenario_error_logs_before_only_and_still_cleans_up() {
    let log: Log = Arc::default();
    let shell = doubler_shell(&log, true);
    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(5i64)];
    let err = expect_err(shell.invoke(&mut ctx, &DOUBLE, None, &mut args));
    assert!(
        err.as_application()
            .is_some_and(|app| app.is::<IllegalState>()),
        "应用错误必须以原始类型穿透"
    );
    assert_eq!(entries(&log), ["I:before:double"], "拦截器自己的 after 不应出现");
    assert!(ctx.is_balanced(), "Router 层的配平清理仍须执行");
}

#[test]
fn application_error_type_survives_every_layer() {
    let log: Log = Arc::default();
    let shell = doubler_shell(&log, true);
    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(5i64)];
    let err = expect_err(shell.invoke(&mut ctx, &DOUBLE, None, &mut args));
    match err {
        DispatchError::Application(app) => {
            assert_eq!(app.to_string(), "illegal state: refusing input 5");
            assert!(app.is::<IllegalState>());
        }
        other => panic!("expected Application, got {other:?}"),
    }
}

#[test]
fn stack_stays_balanced_across_error_and_success_sequences() {
    let log: Log = Arc::default();
    let shell = doubler_shell(&log, true);
    let mut ctx = DispatchContext::new();
    for round in 0..8 {
        let input = if round % 2 == 0 { 5i64 } else { 3i64 };
        let mut args: CallArgs = vec![into_value(input)];
        let outcome = shell.invoke(&mut ctx, &DOUBLE, None, &mut args);
        assert_eq!(outcome.is_err(), input == 5);
        assert!(ctx.is_balanced(), "第 {round} 轮之后栈未配平");
    }
}

/// 写入共享日志的装饰器。
struct Logging {
    name: &'static str,
    log: Log,
}

impl Decorating for Logging {
    fn decorates(&self, method: &MethodDescriptor) -> bool {
        method.method_name() == "double"
    }

    fn call(
        &self,
        ctx: &mut DispatchContext,
        delegate: Delegate<'_>,
        method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        push(&self.log, format!("{}:enter", self.name));
        let outcome = delegate.forward(ctx, method, args);
        push(&self.log, format!("{}:exit", self.name));
        outcome
    }
}

struct LoggingOriginal {
    log: Log,
}

impl Dispatchable for LoggingOriginal {
    fn dispatch(
        &self,
        _ctx: &mut DispatchContext,
        _method: &MethodDescriptor,
        args: &mut CallArgs,
    ) -> DispatchResult<CallValue> {
        push(&self.log, "original");
        let input = *value_ref::<i64>(&args[0]).expect("i64 arg");
        Ok(into_value(input * 2))
    }
}

#[test]
fn decorators_run_in_construction_order() {
    let log: Log = Arc::default();
    let original: Arc<dyn Dispatchable> = Arc::new(LoggingOriginal {
        log: Arc::clone(&log),
    });

    let mut builder = DecorationBuilder::new(3, Arc::clone(&original));
    for name in ["D1", "D2", "D3"] {
        // 每个装饰器在其自身构造期间恰好领取一次委托。
        builder.next_delegate().unwrap();
        builder
            .push(Arc::new(Logging {
                name,
                log: Arc::clone(&log),
            }))
            .unwrap();
    }
    let arena = builder.build().unwrap();

    let router = InterceptedRouter::builder(TargetBinding::Bound(original))
        .decorators(arena)
        .build()
        .unwrap();
    let shell = StandInShell::with_router(router);

    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(4i64)];
    let value = shell.invoke(&mut ctx, &DOUBLE, None, &mut args).unwrap();
    assert_eq!(take_value::<i64>(value).unwrap(), 8);
    assert_eq!(
        entries(&log),
        [
            "D1:enter", "D2:enter", "D3:enter", "original", "D3:exit", "D2:exit", "D1:exit"
        ],
        "装饰次序必须是 D1→D2→D3→O"
    );
    assert!(ctx.is_balanced());
}

#[test]
fn delegate_cursor_overrun_is_a_state_error() {
    let original: Arc<dyn Dispatchable> = Arc::new(LoggingOriginal { log: Arc::default() });
    let mut builder = DecorationBuilder::new(2, original);
    assert_eq!(builder.next_delegate().unwrap(), DelegateRef::Link(1));
    assert_eq!(builder.next_delegate().unwrap(), DelegateRef::Original);
    let err = builder.next_delegate().unwrap_err();
    assert!(err.is_state_defect(), "第 N+1 次领取既不得返回空值也不得回绕");
}

#[test]
fn contextual_binding_resolves_per_call_and_respects_scope_state() {
    let registry = Arc::new(BeanRegistry::new(ContextId::new("deployment-a")));
    let scopes = Arc::new(ScopeRegistry::new());
    let scope = Arc::new(StaticScope::new(ScopeId::new("session")));
    scopes.register(Arc::clone(&scope) as Arc<dyn Scope>);

    let bean = BeanId::new("doubler");
    registry.register(BeanMetadata::new(
        bean.clone(),
        ScopeId::new("session"),
        |_creational: &mut CreationalContext<'_>| {
            Ok(Arc::new(Doubler {
                explode_on_five: false,
            }) as Arc<dyn Dispatchable>)
        },
    ));
    let locator = Arc::new(ContextualInstanceLocator::new(
        Arc::clone(&registry),
        Arc::clone(&scopes),
    ));

    let router = InterceptedRouter::builder(TargetBinding::Contextual {
        bean: bean.clone(),
        locator: Arc::clone(&locator),
    })
    .build()
    .unwrap();
    let shell = StandInShell::with_router(router);

    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(6i64)];
    let value = shell.invoke(&mut ctx, &DOUBLE, None, &mut args).unwrap();
    assert_eq!(take_value::<i64>(value).unwrap(), 12);
    assert!(ctx.is_balanced());
    assert!(
        scope.get(&bean).is_some(),
        "首次调用应在作用域中物化实例"
    );

    // 作用域失效后：统一上报 ScopeInactive，探测入口翻译为“无实例”。
    scope.set_active(false);
    let mut args: CallArgs = vec![into_value(6i64)];
    let err = expect_err(shell.invoke(&mut ctx, &DOUBLE, None, &mut args));
    assert!(matches!(err, DispatchError::ScopeInactive { .. }));
    assert!(ctx.is_balanced(), "错误路径同样要配平");
    assert!(
        locator.probe_instance(&bean).unwrap().is_none(),
        "探测入口把 ScopeInactive 翻译为无实例"
    );
}

#[test]
fn unproxyable_bean_fails_at_construction_time() {
    let registry = Arc::new(BeanRegistry::new(ContextId::new("deployment-b")));
    let scopes = Arc::new(ScopeRegistry::new());
    scopes.register(Arc::new(StaticScope::new(ScopeId::new("session"))) as Arc<dyn Scope>);
    let bean = BeanId::new("opaque");
    registry.register(BeanMetadata::opaque(bean.clone(), ScopeId::new("session")));
    let locator = Arc::new(ContextualInstanceLocator::new(registry, scopes));

    let err = InterceptedRouter::builder(TargetBinding::Contextual {
        bean,
        locator,
    })
    .build()
    .unwrap_err();
    assert!(
        matches!(err, DispatchError::Configuration { .. }),
        "不可实例化的 Bean 必须在代理构造期被拒绝"
    );
}

#[test]
fn direct_router_dispatches_and_balances() {
    let router = DirectRouter::new(TargetBinding::Bound(Arc::new(Doubler {
        explode_on_five: false,
    })))
    .unwrap();
    let mut ctx = DispatchContext::new();
    let mut args: CallArgs = vec![into_value(9i64)];
    let value = router.invoke(&mut ctx, &DOUBLE, None, &mut args).unwrap();
    assert_eq!(take_value::<i64>(value).unwrap(), 18);
    assert!(ctx.is_balanced());
}
