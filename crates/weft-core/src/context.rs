//! 分发上下文：抑制栈与创建栈的显式载体。
//!
//! # 教案式概览
//! - **意图（Why）**：自调用检测与嵌套创建原本都是“每线程”状态；把它们收进一个
//!   显式传递的 [`DispatchContext`] 值，调用方以 `&mut` 沿流水线逐层下传，
//!   并发与重入语义不再依赖真实线程身份，可在单线程测试里完整重演；
//! - **架构定位（Where）**：每个逻辑调用线各持一份，Router 入口、定位器与
//!   创建工厂共享同一个可变借用；跨线程移动整个值是安全的，共享则被借用规则
//!   天然禁止；
//! - **契约（What）**：
//!   - 两条栈都满足严格配平：外层调用返回时（无论正常或出错）必须回到进入前
//!     的深度；
//!   - 对空栈执行 `pop`/`peek` 是编程缺陷，快速失败，不重试；
//!   - 栈清空后释放底层堆存储，而不是留着空容器；
//! - **风险（Trade-offs）**：显式传参让每个入口多一个参数；换来的是无锁、
//!   无线程本地存储、可确定性测试的重入语义。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bean::BeanId;
use crate::error::{DispatchError, DispatchResult, StateOperation};
use crate::invocation::Dispatchable;
use crate::router::RouterId;

/// 一次最外层调用的抑制帧：记录“进行中”的 Router 身份集合。
///
/// 集合极小（通常 1~3 个），线性查找优于哈希结构。
#[derive(Debug, Default)]
pub struct SuppressionFrame {
    routers: Vec<RouterId>,
}

impl SuppressionFrame {
    /// 该 Router 是否已在本帧登记。
    pub fn contains(&self, id: RouterId) -> bool {
        self.routers.contains(&id)
    }

    /// 登记 Router；同一 Router 在一帧内至多出现一次。
    pub fn register(&mut self, id: RouterId) -> DispatchResult<()> {
        if self.contains(id) {
            return Err(DispatchError::state(
                StateOperation::SuppressionFrame,
                format!("router {id:?} registered twice in one suppression frame"),
            ));
        }
        self.routers.push(id);
        Ok(())
    }

    /// 注销 Router；注销未登记者是编程缺陷。
    pub fn deregister(&mut self, id: RouterId) -> DispatchResult<()> {
        match self.routers.iter().rposition(|entry| *entry == id) {
            Some(index) => {
                self.routers.swap_remove(index);
                Ok(())
            }
            None => Err(DispatchError::state(
                StateOperation::SuppressionFrame,
                format!("router {id:?} deregistered without prior registration"),
            )),
        }
    }

    /// 当前登记数量。
    pub fn len(&self) -> usize {
        self.routers.len()
    }

    /// 本帧是否为空。
    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }
}

/// 抑制栈：每个最外层（外部进入的）调用对应一帧。
#[derive(Debug, Default)]
pub struct SuppressionStack {
    frames: Vec<SuppressionFrame>,
}

impl SuppressionStack {
    /// 压入新的空帧，返回新深度。
    pub fn push(&mut self) -> usize {
        self.frames.push(SuppressionFrame::default());
        self.frames.len()
    }

    /// 弹出顶帧。空栈弹出是编程缺陷。
    pub fn pop(&mut self) -> DispatchResult<SuppressionFrame> {
        let frame = self.frames.pop().ok_or_else(|| {
            DispatchError::state(
                StateOperation::SuppressionStack,
                "pop on an empty suppression stack",
            )
        })?;
        if self.frames.is_empty() {
            // 清空即释放存储，不保留空容器。
            self.frames = Vec::new();
        }
        Ok(frame)
    }

    /// 只读访问顶帧。
    pub fn peek(&self) -> DispatchResult<&SuppressionFrame> {
        self.frames.last().ok_or_else(|| {
            DispatchError::state(
                StateOperation::SuppressionStack,
                "peek on an empty suppression stack",
            )
        })
    }

    /// 可变访问顶帧。
    pub fn peek_mut(&mut self) -> DispatchResult<&mut SuppressionFrame> {
        self.frames.last_mut().ok_or_else(|| {
            DispatchError::state(
                StateOperation::SuppressionStack,
                "peek on an empty suppression stack",
            )
        })
    }

    /// 栈是否为空（即当前不处于任何外层调用之内）。
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 当前深度。
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// 创建帧的进入方式。
///
/// 直接（非注入）查找以 [`Neutral`](InjectionPointMarker::Neutral) 标记进入，
/// 不参与循环创建判定；级联依赖以 [`Injected`](InjectionPointMarker::Injected)
/// 标记进入并参与判定。
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InjectionPointMarker {
    /// 中性标记：直接查找，不代表任何注入点。
    Neutral,
    /// 注入标记：由 `requested_by` 的创建过程级联触发。
    Injected {
        /// 发起依赖解析的 Bean。
        requested_by: BeanId,
    },
}

/// 一层进行中的创建。
pub struct CreationalFrame {
    bean: BeanId,
    marker: InjectionPointMarker,
    resolved: BTreeMap<BeanId, Arc<dyn Dispatchable>>,
}

impl std::fmt::Debug for CreationalFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationalFrame")
            .field("bean", &self.bean)
            .field("marker", &self.marker)
            .field("resolved", &self.resolved.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CreationalFrame {
    /// 组装一层创建帧。
    pub fn new(bean: BeanId, marker: InjectionPointMarker) -> Self {
        Self {
            bean,
            marker,
            resolved: BTreeMap::new(),
        }
    }

    /// 本帧正在创建的 Bean。
    pub fn bean(&self) -> &BeanId {
        &self.bean
    }

    /// 进入方式标记。
    pub fn marker(&self) -> &InjectionPointMarker {
        &self.marker
    }
}

/// 创建栈：定位器的嵌套创建上下文，遵循与抑制栈相同的压弹纪律。
#[derive(Debug, Default)]
pub struct CreationalStack {
    frames: Vec<CreationalFrame>,
}

impl CreationalStack {
    /// 压入一层创建帧，返回新深度。
    ///
    /// 循环创建在此拦截：以注入方式进入、且目标 Bean 已在栈上创建中，判为
    /// 缺陷；直接（中性）查找不参与判定——这正是中性注入点标记存在的意义。
    pub fn push(&mut self, frame: CreationalFrame) -> DispatchResult<usize> {
        let circular = !matches!(frame.marker(), InjectionPointMarker::Neutral)
            && self
                .frames
                .iter()
                .any(|existing| existing.bean() == frame.bean());
        if circular {
            return Err(DispatchError::state(
                StateOperation::CreationalStack,
                format!("circular creation detected for bean `{}`", frame.bean()),
            ));
        }
        self.frames.push(frame);
        Ok(self.frames.len())
    }

    /// 弹出顶帧。空栈弹出是编程缺陷。
    pub fn pop(&mut self) -> DispatchResult<CreationalFrame> {
        let frame = self.frames.pop().ok_or_else(|| {
            DispatchError::state(
                StateOperation::CreationalStack,
                "pop on an empty creational stack",
            )
        })?;
        if self.frames.is_empty() {
            self.frames = Vec::new();
        }
        Ok(frame)
    }

    /// 自顶向下查询本轮创建内已解析过的实例（幂等解析缓存）。
    pub fn cached(&self, bean: &BeanId) -> Option<Arc<dyn Dispatchable>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.resolved.get(bean).map(Arc::clone))
    }

    /// 把解析结果记入顶帧缓存；栈为空时静默忽略（没有创建在进行）。
    pub fn remember(&mut self, bean: BeanId, instance: Arc<dyn Dispatchable>) {
        if let Some(top) = self.frames.last_mut() {
            top.resolved.insert(bean, instance);
        }
    }

    /// 栈是否为空。
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 当前深度。
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// 一条逻辑调用线的全部分发状态。
///
/// # 教案式说明
/// - **契约（What）**：每条调用线独占一份；Router 入口按 `&mut` 下传，不跨线程
///   共享；两条栈的配平由各自的使用方（Router、定位器）负责，违约以
///   [`DispatchError::State`] 暴露。
#[derive(Debug, Default)]
pub struct DispatchContext {
    suppression: SuppressionStack,
    creational: CreationalStack,
}

impl DispatchContext {
    /// 创建空上下文。
    pub fn new() -> Self {
        Self::default()
    }

    /// 抑制栈只读视图。
    pub fn suppression(&self) -> &SuppressionStack {
        &self.suppression
    }

    /// 抑制栈可变视图。
    pub fn suppression_mut(&mut self) -> &mut SuppressionStack {
        &mut self.suppression
    }

    /// 创建栈只读视图。
    pub fn creational(&self) -> &CreationalStack {
        &self.creational
    }

    /// 创建栈可变视图。
    pub fn creational_mut(&mut self) -> &mut CreationalStack {
        &mut self.creational
    }

    /// 两条栈是否都已配平（外层调用边界上的期望状态）。
    pub fn is_balanced(&self) -> bool {
        self.suppression.is_empty() && self.creational.is_empty()
    }
}
