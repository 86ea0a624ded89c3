//! 调用指标拦截器：无锁计数每次被拦截调用的结果。

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use weft_core::error::DispatchResult;
use weft_core::interceptor::{AroundInvoke, ProceedContext};
use weft_core::invocation::CallValue;

/// 某一时刻的计数快照。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CallMetricsSnapshot {
    /// 经过本拦截器的调用总数。
    pub invocations: u64,
    /// 以错误结束的调用数（含应用错误与引擎错误）。
    pub failures: u64,
}

/// 原子计数的环绕拦截器。
///
/// # 教案式说明
/// - **意图（Why）**：最常见的观测诉求只是“多少次、多少失败”；在拦截器内
///   用两枚原子计数器承载，避免为个位数指标引入完整观测栈；
/// - **契约（What）**：
///   - 计数在 `proceed` 前后就地完成，结果原样上传；
///   - [`snapshot`](CallMetricsInterceptor::snapshot) 读数采用宽松序——两枚
///     计数间不保证瞬时一致，只保证各自单调；
/// - **风险（Trade-offs）**：实例按链共享，跨链聚合由调用方自理。
#[derive(Debug, Default)]
pub struct CallMetricsInterceptor {
    invocations: AtomicU64,
    failures: AtomicU64,
}

impl CallMetricsInterceptor {
    /// 构造零计数实例。
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取当前计数。
    pub fn snapshot(&self) -> CallMetricsSnapshot {
        CallMetricsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl AroundInvoke for CallMetricsInterceptor {
    fn around_invoke(&self, invocation: &mut ProceedContext<'_>) -> DispatchResult<CallValue> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let outcome = invocation.proceed();
        if outcome.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Borrowed("call-metrics")
    }
}
