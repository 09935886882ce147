//! 进程：一个地址空间加一份下台时保存的用户寄存器。

use crate::fs::SwapFile;
use kernel_vm::AddressSpace;
use machine::NUM_TOTAL_REGS;

/// 用户进程。
pub struct Process {
    /// 虚地址空间。
    pub space: AddressSpace<SwapFile>,
    /// 换下处理器时保存的用户寄存器。
    pub user_registers: [u32; NUM_TOTAL_REGS],
}

impl Process {
    /// 包住一个刚建好的地址空间。
    pub fn new(space: AddressSpace<SwapFile>) -> Self {
        Self {
            space,
            user_registers: [0; NUM_TOTAL_REGS],
        }
    }
}
