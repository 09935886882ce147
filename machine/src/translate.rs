/// 线性页表的一项，按虚页号做下标。
///
/// 页表归地址空间所有；机器只通过发布出来的指针读它、改它的
/// use / dirty 位。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TranslationEntry {
    /// 虚页号，恒等于自己的下标，留给 TLB 场景。
    pub virtual_page: usize,
    /// 驻留的物理页帧号。恒满足 `valid == physical_page.is_some()`。
    pub physical_page: Option<usize>,
    /// 页是否驻留。
    pub valid: bool,
    /// 引用位。任何访问置位，时钟类置换算法负责清零。
    pub used: bool,
    /// 脏位。写访问置位，换出时决定要不要回写，换入时清零。
    pub dirty: bool,
    /// 只读页。翻译时检查，本内核不主动设置。
    pub read_only: bool,
}

impl TranslationEntry {
    /// 一项还没有驻留过的页表项。
    pub const fn invalid(virtual_page: usize) -> Self {
        Self {
            virtual_page,
            physical_page: None,
            valid: false,
            used: false,
            dirty: false,
            read_only: false,
        }
    }
}

/// 用户态访存陷入内核的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    /// 页不在内存里，携带出错虚地址。
    PageFault(usize),
    /// 虚地址越界或未按访问宽度对齐。
    AddressError(usize),
    /// 对只读页写入。
    ReadOnly(usize),
}
