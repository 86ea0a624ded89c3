//! 调用日志拦截器：以结构化事件记录每次被拦截的调用。

use std::borrow::Cow;

use tracing::{debug, warn};

use weft_core::error::DispatchResult;
use weft_core::interceptor::{AroundInvoke, ProceedContext};
use weft_core::invocation::CallValue;

/// 日志拦截器配置。
///
/// # 教案式说明
/// - **意图（Why）**：不同链路对日志的标签与详略要求不同，配置外部化让
///   拦截器本体保持无状态、可跨链复用；
/// - **契约（What）**：
///   - `label`：低基数标识，随每条事件输出，建议与链装配时的注册标签一致；
///   - `log_arguments`：是否附带参数个数（出于脱敏考虑，从不输出参数内容）。
#[derive(Clone, Debug)]
pub struct CallLoggingConfig {
    pub label: Cow<'static, str>,
    pub log_arguments: bool,
}

impl Default for CallLoggingConfig {
    fn default() -> Self {
        Self {
            label: Cow::Borrowed("call-logging"),
            log_arguments: false,
        }
    }
}

/// 记录“进入/返回/出错”三类事件的环绕拦截器。
///
/// # 教案式说明
/// - **契约（What）**：进入事件在 `proceed` 之前发出；返回事件仅在成功路径
///   发出；错误路径发出告警事件后把错误原样上抛——绝不改变错误类型，也
///   不吞掉任何结果；
/// - **风险（Trade-offs）**：事件级别固定为 `DEBUG`/`WARN`；需要更细分级
///   时应在订阅端过滤，而不是在拦截器里塞策略。
#[derive(Clone, Debug, Default)]
pub struct CallLoggingInterceptor {
    config: CallLoggingConfig,
}

impl CallLoggingInterceptor {
    /// 基于给定配置构造拦截器。
    pub fn new(config: CallLoggingConfig) -> Self {
        Self { config }
    }
}

impl AroundInvoke for CallLoggingInterceptor {
    fn around_invoke(&self, invocation: &mut ProceedContext<'_>) -> DispatchResult<CallValue> {
        let method = invocation.method().to_string();
        if self.config.log_arguments {
            debug!(
                label = %self.config.label,
                method = %method,
                arguments = invocation.args().len(),
                "call entering"
            );
        } else {
            debug!(
                label = %self.config.label,
                method = %method,
                "call entering"
            );
        }
        match invocation.proceed() {
            Ok(value) => {
                debug!(
                    label = %self.config.label,
                    method = %method,
                    "call returning"
                );
                Ok(value)
            }
            Err(error) => {
                warn!(
                    label = %self.config.label,
                    method = %method,
                    code = error.code(),
                    "call failed"
                );
                Err(error)
            }
        }
    }

    fn describe(&self) -> Cow<'static, str> {
        self.config.label.clone()
    }
}
