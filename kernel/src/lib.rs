//! 把各个子系统拼成一台最小的分时内核。
//!
//! [`Kernel`] 集中持有文件系统、模拟机器、物理页帧位图和进程号位图，
//! 需要它们的代码都从这里借，整个内核没有全局单例。缺页的路径是：
//! 访存翻译失败抛 `PageFault`，内核把它交给当前进程地址空间的
//! `replace_page`，重新发布页表后重试同一次访问。

#![no_std]
#![deny(warnings)]

mod fs;
mod process;

extern crate alloc;

pub use fs::{FileSystem, SwapFile};
pub use kernel_vm::{
    AddressSpace, BackingFile, PagingPolicy, PolicyKind, SwapStore, VmError, USER_STACK_SIZE,
};
pub use machine::{Machine, Stats, NUM_PHYS_PAGES, PAGE_SIZE};
pub use process::Process;

use alloc::{sync::Arc, vec::Vec};
use idx_alloc::Bitmap;
use machine::{Exception, IntrLevel};
use tiny_fs::BlockDevice;

/// 单处理器内核。
pub struct Kernel {
    /// 文件系统。
    pub fs: FileSystem,
    /// 模拟机器。
    pub machine: Machine,
    /// 运行统计。
    pub stats: Stats,
    frame_map: Bitmap,
    proc_map: Bitmap,
    procs: Vec<Option<Process>>,
    current: Option<usize>,
    max_frames: usize,
}

impl Kernel {
    /// 在一块空设备上启动。`max_frames` 是每个进程的驻留帧窗口。
    pub fn new(device: Arc<dyn BlockDevice>, max_frames: usize) -> Self {
        Self::with_fs(FileSystem::format(device), max_frames)
    }

    /// 挂载带着旧文件的设备启动，跨代回放引用串用。
    pub fn mount(device: Arc<dyn BlockDevice>, max_frames: usize) -> Self {
        Self::with_fs(FileSystem::mount(device), max_frames)
    }

    fn with_fs(fs: FileSystem, max_frames: usize) -> Self {
        assert!(max_frames >= 1 && max_frames <= NUM_PHYS_PAGES);
        let mut procs = Vec::new();
        procs.resize_with(NUM_PHYS_PAGES, || None);
        Self {
            fs,
            machine: Machine::new(),
            stats: Stats::default(),
            frame_map: Bitmap::new(NUM_PHYS_PAGES),
            proc_map: Bitmap::new(NUM_PHYS_PAGES),
            procs,
            current: None,
            max_frames,
        }
    }

    /// 把一个 NOFF 映像部署进文件系统。
    pub fn install(&self, name: &str, image: &[u8]) -> bool {
        self.fs.install(name, image)
    }

    /// 跑起一个用户进程并切换到它，返回进程号。
    ///
    /// 任何一步失败都不会留下半个进程，借出去的进程号也收回来。
    pub fn exec(&mut self, exe_name: &str, paging: &PagingPolicy) -> Result<usize, VmError> {
        let old = self.machine.interrupt.set_level(IntrLevel::Off);
        let result = self.exec_locked(exe_name, paging);
        self.machine.interrupt.set_level(old);
        result
    }

    fn exec_locked(&mut self, exe_name: &str, paging: &PagingPolicy) -> Result<usize, VmError> {
        let space_id = self.proc_map.find().ok_or(VmError::OutOfSpaceIds)?;
        let space = match AddressSpace::new(
            &self.fs,
            exe_name,
            space_id,
            self.max_frames,
            paging,
            &self.frame_map,
        ) {
            Ok(space) => space,
            Err(e) => {
                self.proc_map.clear(space_id);
                log::error!("exec \"{exe_name}\" failed: {e}");
                return Err(e);
            }
        };
        self.park_current();
        let proc = self.procs[space_id].insert(Process::new(space));
        proc.space.init_registers(&mut self.machine);
        proc.space.restore_state(&mut self.machine);
        self.current = Some(space_id);
        log::info!("exec \"{exe_name}\" as process {space_id}");
        Ok(space_id)
    }

    /// 切换到进程 `space_id`，不存在就返回 `false`。
    pub fn switch_to(&mut self, space_id: usize) -> bool {
        if self.current == Some(space_id) {
            return true;
        }
        if self
            .procs
            .get(space_id)
            .and_then(|slot| slot.as_ref())
            .is_none()
        {
            return false;
        }
        self.park_current();
        let Some(proc) = self.procs[space_id].as_mut() else {
            return false;
        };
        for (r, value) in proc.user_registers.iter().enumerate() {
            self.machine.write_register(r, *value);
        }
        proc.space.restore_state(&mut self.machine);
        self.current = Some(space_id);
        log::debug!("switch to process {space_id}");
        true
    }

    /// 结束进程：归还页帧和进程号。交换文件留在盘上。
    pub fn exit(&mut self, space_id: usize) {
        let Some(proc) = self.procs.get_mut(space_id).and_then(|slot| slot.take()) else {
            return;
        };
        let old = self.machine.interrupt.set_level(IntrLevel::Off);
        proc.space.release(&mut self.frame_map);
        self.proc_map.clear(space_id);
        self.machine.interrupt.set_level(old);
        if self.current == Some(space_id) {
            self.machine.clear_page_table();
            self.current = None;
        }
        log::info!("process {space_id} exited");
    }

    /// 当前在台上的进程号。
    #[inline]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// 看一个进程的地址空间，诊断和测试用。
    pub fn space(&self, space_id: usize) -> Option<&AddressSpace<SwapFile>> {
        self.procs
            .get(space_id)?
            .as_ref()
            .map(|proc| &proc.space)
    }

    /// 读当前进程的一个字节，缺页自动换页重试。
    pub fn load_byte(&mut self, vaddr: usize) -> Result<u8, VmError> {
        self.access(vaddr, None).map(|value| value as u8)
    }

    /// 写当前进程的一个字节，缺页自动换页重试。
    pub fn store_byte(&mut self, vaddr: usize, value: u8) -> Result<(), VmError> {
        self.access(vaddr, Some(value)).map(|_| ())
    }

    /// 访存主循环：翻译，缺页就让地址空间换页后重试；
    /// 每次成功翻译之后恰好调用一次 `update_page`。
    fn access(&mut self, vaddr: usize, write: Option<u8>) -> Result<u32, VmError> {
        let current = self.current.ok_or(VmError::AddressError(vaddr))?;
        loop {
            let outcome = match write {
                Some(value) => self
                    .machine
                    .write_mem(vaddr, 1, value as u32)
                    .map(|_| value as u32),
                None => self.machine.read_mem(vaddr, 1),
            };
            match outcome {
                Ok(value) => {
                    let Some(proc) = self.procs[current].as_mut() else {
                        return Err(VmError::AddressError(vaddr));
                    };
                    proc.space.update_page(vaddr / PAGE_SIZE)?;
                    return Ok(value);
                }
                Err(Exception::PageFault(bad_vaddr)) => {
                    let old = self.machine.interrupt.set_level(IntrLevel::Off);
                    let Some(proc) = self.procs[current].as_mut() else {
                        self.machine.interrupt.set_level(old);
                        return Err(VmError::AddressError(vaddr));
                    };
                    let handled = proc.space.replace_page(
                        bad_vaddr,
                        &mut self.frame_map,
                        &mut self.machine,
                        &mut self.stats,
                    );
                    if handled.is_ok() {
                        proc.space.restore_state(&mut self.machine);
                    }
                    self.machine.interrupt.set_level(old);
                    handled?;
                }
                Err(Exception::AddressError(addr)) => return Err(VmError::AddressError(addr)),
                Err(Exception::ReadOnly(addr)) => return Err(VmError::ReadOnly(addr)),
            }
        }
    }

    /// 把台上进程的寄存器收进它自己的进程块。
    fn park_current(&mut self) {
        if let Some(current) = self.current {
            if let Some(proc) = self.procs[current].as_mut() {
                proc.space.save_state();
                for (r, slot) in proc.user_registers.iter_mut().enumerate() {
                    *slot = self.machine.read_register(r);
                }
            }
        }
    }
}

// 交换是整页进整页出，页和扇区必须同长。
const _: () = assert!(PAGE_SIZE == tiny_fs::SECTOR_SIZE);
