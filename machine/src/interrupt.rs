/// 中断开关的两个状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrLevel {
    /// 屏蔽中断。
    Off,
    /// 放行中断。
    On,
}

/// 中断控制器。
///
/// 单处理器协作式调度下它只是把临界区显式写出来：
/// 关中断进临界区，退出时恢复旧状态。
pub struct Interrupt {
    level: IntrLevel,
}

impl Interrupt {
    pub(crate) const fn new() -> Self {
        Self {
            level: IntrLevel::On,
        }
    }

    /// 设置中断状态，返回旧状态。
    #[inline]
    pub fn set_level(&mut self, level: IntrLevel) -> IntrLevel {
        core::mem::replace(&mut self.level, level)
    }

    /// 当前中断状态。
    #[inline]
    pub fn level(&self) -> IntrLevel {
        self.level
    }
}
