//! 模拟的用户态机器：寄存器堆、物理内存和线性页表 MMU。
//!
//! 页表不归机器所有。地址空间在上台时把页表指针和长度发布进来，
//! 之后每次访存都经 [`Machine::translate`] 走一遍这张表。

#![no_std]
#![deny(warnings)]

mod interrupt;
mod stats;
mod translate;

extern crate alloc;

pub use interrupt::{Interrupt, IntrLevel};
pub use stats::Stats;
pub use translate::{Exception, TranslationEntry};

use alloc::{vec, vec::Vec};
use core::ptr::NonNull;

/// 页大小（字节）。与磁盘扇区等长，一页换入换出恰好整扇区。
pub const PAGE_SIZE: usize = 128;
/// 物理页帧总数。
pub const NUM_PHYS_PAGES: usize = 32;
/// 物理内存字节数。
pub const MEMORY_SIZE: usize = NUM_PHYS_PAGES * PAGE_SIZE;

/// 通用寄存器个数。
pub const NUM_GP_REGS: usize = 32;
/// 栈指针寄存器。
pub const STACK_REG: usize = 29;
/// 返回地址寄存器。
pub const RET_ADDR_REG: usize = 31;
/// 乘除结果高位。
pub const HI_REG: usize = 32;
/// 乘除结果低位。
pub const LO_REG: usize = 33;
/// 当前指令地址。
pub const PC_REG: usize = 34;
/// 下一条指令地址，迁就 MIPS 的分支延迟槽。
pub const NEXT_PC_REG: usize = 35;
/// 上一条指令地址。
pub const PREV_PC_REG: usize = 36;
/// 延迟装载的目标寄存器号。
pub const LOAD_REG: usize = 37;
/// 延迟装载的值。
pub const LOAD_VALUE_REG: usize = 38;
/// 最近一次出错的虚地址。
pub const BAD_VADDR_REG: usize = 39;
/// 寄存器堆总长。
pub const NUM_TOTAL_REGS: usize = 40;

/// 模拟机器。
pub struct Machine {
    registers: [u32; NUM_TOTAL_REGS],
    main_memory: Vec<u8>,
    page_table: Option<(NonNull<TranslationEntry>, usize)>,
    /// 中断控制器。
    pub interrupt: Interrupt,
}

impl Machine {
    /// 一台内存清零、页表未发布的机器。
    pub fn new() -> Self {
        Self {
            registers: [0; NUM_TOTAL_REGS],
            main_memory: vec![0; MEMORY_SIZE],
            page_table: None,
            interrupt: Interrupt::new(),
        }
    }

    /// 读寄存器。
    #[inline]
    pub fn read_register(&self, r: usize) -> u32 {
        self.registers[r]
    }

    /// 写寄存器。
    #[inline]
    pub fn write_register(&mut self, r: usize, value: u32) {
        self.registers[r] = value;
    }

    /// 发布一张页表。指针在下一次发布或 [`clear_page_table`](Machine::clear_page_table) 前必须有效。
    #[inline]
    pub fn set_page_table(&mut self, table: NonNull<TranslationEntry>, len: usize) {
        self.page_table = Some((table, len));
    }

    /// 撤下当前页表。进程退出时调用。
    #[inline]
    pub fn clear_page_table(&mut self) {
        self.page_table = None;
    }

    /// 翻译一个虚地址。
    ///
    /// 成功时置页表项的 use 位（写访问再置 dirty 位）并返回物理地址；
    /// 失败时把出错地址记进 [`BAD_VADDR_REG`] 并返回陷入原因。
    pub fn translate(&mut self, vaddr: usize, write: bool) -> Result<usize, Exception> {
        let (table, len) = match self.page_table {
            Some(t) => t,
            None => return Err(Exception::AddressError(vaddr)),
        };
        let vpn = vaddr / PAGE_SIZE;
        if vpn >= len {
            self.registers[BAD_VADDR_REG] = vaddr as u32;
            return Err(Exception::AddressError(vaddr));
        }
        let entry = unsafe { &mut *table.as_ptr().add(vpn) };
        let frame = match entry.physical_page {
            Some(frame) if entry.valid => frame,
            _ => {
                self.registers[BAD_VADDR_REG] = vaddr as u32;
                return Err(Exception::PageFault(vaddr));
            }
        };
        if write && entry.read_only {
            self.registers[BAD_VADDR_REG] = vaddr as u32;
            return Err(Exception::ReadOnly(vaddr));
        }
        debug_assert!(frame < NUM_PHYS_PAGES);
        entry.used = true;
        if write {
            entry.dirty = true;
        }
        Ok(frame * PAGE_SIZE + vaddr % PAGE_SIZE)
    }

    /// 从虚地址读 `size`（1/2/4）字节，小端。
    pub fn read_mem(&mut self, vaddr: usize, size: usize) -> Result<u32, Exception> {
        self.check_align(vaddr, size)?;
        let paddr = self.translate(vaddr, false)?;
        let m = &self.main_memory;
        Ok(match size {
            1 => m[paddr] as u32,
            2 => u16::from_le_bytes([m[paddr], m[paddr + 1]]) as u32,
            _ => u32::from_le_bytes([m[paddr], m[paddr + 1], m[paddr + 2], m[paddr + 3]]),
        })
    }

    /// 向虚地址写 `size`（1/2/4）字节，小端。
    pub fn write_mem(&mut self, vaddr: usize, size: usize, value: u32) -> Result<(), Exception> {
        self.check_align(vaddr, size)?;
        let paddr = self.translate(vaddr, true)?;
        let m = &mut self.main_memory;
        match size {
            1 => m[paddr] = value as u8,
            2 => m[paddr..paddr + 2].copy_from_slice(&(value as u16).to_le_bytes()),
            _ => m[paddr..paddr + 4].copy_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    }

    /// `frame` 号页帧的内存。
    #[inline]
    pub fn frame(&self, frame: usize) -> &[u8] {
        &self.main_memory[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]
    }

    /// `frame` 号页帧的可写内存，换入时整页覆盖。
    #[inline]
    pub fn frame_mut(&mut self, frame: usize) -> &mut [u8] {
        &mut self.main_memory[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]
    }

    #[inline]
    fn check_align(&mut self, vaddr: usize, size: usize) -> Result<(), Exception> {
        debug_assert!(matches!(size, 1 | 2 | 4));
        if vaddr % size != 0 {
            self.registers[BAD_VADDR_REG] = vaddr as u32;
            return Err(Exception::AddressError(vaddr));
        }
        Ok(())
    }
}
