/// 内核运行统计。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// 缺页次数。
    pub num_page_faults: usize,
    /// 脏页回写次数。
    pub num_page_writes: usize,
}
