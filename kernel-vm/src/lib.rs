//! 按需调页的进程虚存管理。
//!
//! [`AddressSpace`] 拥有自己的页表、一个交换文件和一份置换算法状态；
//! 物理页帧和进程号是内核级资源，以位图的形式由调用者借给它。
//! 文件系统只以 [`SwapStore`] 这一道缝隙出现，机器只以
//! `machine::Machine` 的引用出现，这里没有全局量。

#![no_std]
#![deny(warnings)]

mod error;
mod policy;
mod refstr;
mod space;
mod store;

extern crate alloc;

pub use error::VmError;
pub use policy::{Policy, PolicyKind};
pub use refstr::{RefRecorder, RefString};
pub use space::AddressSpace;
pub use store::{BackingFile, SwapStore};

/// 用户栈字节数，计入地址空间大小。
pub const USER_STACK_SIZE: usize = 1024;

/// 一个进程的调页配置，exec 时定死。
#[derive(Clone, Copy, Debug)]
pub struct PagingPolicy {
    /// 置换算法。
    pub kind: PolicyKind,
    /// 是否记录引用串。OPT 回放时必须关掉。
    pub record: bool,
    /// Random 算法的种子，同一种子同一结果。
    pub rng_seed: u64,
}

impl PagingPolicy {
    /// `kind` 算法、不记引用串的配置。
    pub const fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            record: false,
            rng_seed: 0,
        }
    }

    /// 在本配置上打开引用串记录。
    pub fn recording(mut self) -> Self {
        self.record = true;
        self
    }
}
