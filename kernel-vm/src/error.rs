use core::fmt;

/// 虚存子系统的错误。
///
/// 构造类错误保证不留下半初始化的地址空间；不变式类错误说明内核自身
/// 出了 bug，两类都由最外层的调用者决定要不要结束当前进程，深处的
/// 代码只负责把错误递上去。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmError {
    /// 打不开可执行文件。
    ExecMissing,
    /// 可执行文件的魔数两种字节序都对不上。
    BadMagic,
    /// 帧窗口超过物理页数或当前空闲帧数。
    TooBig,
    /// 交换文件创建失败。
    SwapCreate,
    /// 交换文件打开失败。
    SwapOpen,
    /// 引用串文件打开或创建失败。
    RefStrOpen,
    /// 二进制引用串文件长度不是偶数。
    RefStrOdd,
    /// 记录引用串和 OPT 回放同时打开。
    RecordUnderOpt,
    /// 进程号用尽。
    OutOfSpaceIds,
    /// 空闲物理页帧用尽。
    OutOfFrames,
    /// 文件读写返回了短计数。
    ShortIo,
    /// OPT 回放把引用串用完了。
    RefStrExhausted,
    /// OPT 回放和实际引用序列对不上。
    RefStrMismatch {
        /// 出错的引用串下标。
        at: usize,
        /// 引用串里的期望页号。
        expect: usize,
        /// 实际访问的页号。
        got: usize,
    },
    /// LRU 栈里找不到应当驻留的页。
    LruMissing(usize),
    /// 置换算法没能选出牺牲页。
    NoVictim,
    /// 算法选中的牺牲页并不驻留。
    VictimInvalid(usize),
    /// 虚地址越界或未对齐。
    AddressError(usize),
    /// 对只读页写入。
    ReadOnly(usize),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecMissing => write!(f, "can't open executable"),
            Self::BadMagic => write!(f, "executable is not in NOFF format"),
            Self::TooBig => write!(f, "frame window exceeds available physical memory"),
            Self::SwapCreate => write!(f, "can't create swap file"),
            Self::SwapOpen => write!(f, "can't open swap file"),
            Self::RefStrOpen => write!(f, "can't open reference string file"),
            Self::RefStrOdd => write!(f, "binary reference string length must be even"),
            Self::RecordUnderOpt => write!(f, "can't record a reference string while replaying one"),
            Self::OutOfSpaceIds => write!(f, "out of process ids"),
            Self::OutOfFrames => write!(f, "out of physical memory"),
            Self::ShortIo => write!(f, "short file read or write"),
            Self::RefStrExhausted => write!(f, "ran out of reference string"),
            Self::RefStrMismatch { at, expect, got } => write!(
                f,
                "reference string item #{at} mismatch, expect {expect}, is {got}"
            ),
            Self::LruMissing(vpn) => write!(f, "page {vpn} not in LRU stack"),
            Self::NoVictim => write!(f, "failed to pick a victim frame"),
            Self::VictimInvalid(vpn) => write!(f, "victim page {vpn} is not resident"),
            Self::AddressError(addr) => write!(f, "bad virtual address {addr:#x}"),
            Self::ReadOnly(addr) => write!(f, "write to read-only address {addr:#x}"),
        }
    }
}
