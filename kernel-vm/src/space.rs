use crate::{
    policy::{Policy, PolicyKind},
    refstr::{RefRecorder, RefString},
    store::{BackingFile, SwapStore},
    PagingPolicy, VmError, USER_STACK_SIZE,
};
use alloc::{boxed::Box, format, vec, vec::Vec};
use core::{fmt, ptr::NonNull};
use idx_alloc::Bitmap;
use machine::{
    Machine, Stats, TranslationEntry, NEXT_PC_REG, NUM_PHYS_PAGES, NUM_TOTAL_REGS, PAGE_SIZE,
    PC_REG, STACK_REG,
};
use noff::{NoffHeader, NoffSegment, HEADER_BYTES};

/// 一个用户进程的虚地址空间。
///
/// 页的权威内容住在交换文件里：页表项无效时，页就在交换文件
/// `vpn * PAGE_SIZE` 处；有效时在它指向的物理页帧里，脏了由换出
/// 写回。交换文件建好就是全零再叠上代码段和数据段，所以未初始化
/// 数据天然清零。
pub struct AddressSpace<F: BackingFile> {
    space_id: usize,
    page_table: Box<[TranslationEntry]>,
    swap: F,
    /// 驻留页窗口，槽位含义由置换算法解释。
    pages_in_mem: Box<[Option<usize>]>,
    policy: Policy,
    recorder: Option<RefRecorder<F>>,
}

impl<F: BackingFile> AddressSpace<F> {
    /// 从 NOFF 可执行文件建立地址空间。
    ///
    /// 交换文件叫 `SWAP{space_id}`；记录模式建 `REFSTR{space_id}`
    /// （小端 u16）和 `REFSTR{space_id}.TXT`，OPT 回放从前者加载。
    /// 失败不会留下半初始化的地址空间，但已创建的文件留在盘上。
    pub fn new<S: SwapStore<File = F>>(
        fs: &S,
        exe_name: &str,
        space_id: usize,
        max_frames: usize,
        paging: &PagingPolicy,
        frames: &Bitmap,
    ) -> Result<Self, VmError> {
        let exe = fs.open(exe_name).ok_or(VmError::ExecMissing)?;

        let mut raw = [0u8; HEADER_BYTES];
        if exe.read_at(&mut raw, 0) != HEADER_BYTES {
            return Err(VmError::BadMagic);
        }
        let noff = NoffHeader::decode(&raw).map_err(|_| VmError::BadMagic)?;

        let mem_size = noff.mem_size(USER_STACK_SIZE);
        let num_pages = (mem_size + PAGE_SIZE - 1) / PAGE_SIZE;

        if max_frames > NUM_PHYS_PAGES || max_frames > frames.num_clear() {
            return Err(VmError::TooBig);
        }

        log::info!(
            "space {space_id}: \"{exe_name}\", {num_pages} pages ({} bytes), {max_frames} frame window, {:?}",
            num_pages * PAGE_SIZE,
            paging.kind,
        );

        let page_table: Box<[TranslationEntry]> = (0..num_pages)
            .map(TranslationEntry::invalid)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let swap_name = format!("SWAP{space_id}");
        if !fs.create(&swap_name, num_pages * PAGE_SIZE) {
            return Err(VmError::SwapCreate);
        }
        let swap = fs.open(&swap_name).ok_or(VmError::SwapOpen)?;

        // 先整体清零，再叠上两个程序段。
        let zero = [0u8; PAGE_SIZE];
        for p in 0..num_pages {
            if swap.write_at(&zero, p * PAGE_SIZE) != PAGE_SIZE {
                return Err(VmError::ShortIo);
            }
        }
        copy_segment(&exe, &swap, &noff.code, "code")?;
        copy_segment(&exe, &swap, &noff.init_data, "data")?;

        let (policy, recorder) = if paging.record {
            if paging.kind == PolicyKind::Opt {
                return Err(VmError::RecordUnderOpt);
            }
            let bin_name = format!("REFSTR{space_id}");
            let txt_name = format!("{bin_name}.TXT");
            if !fs.create(&bin_name, 0) || !fs.create(&txt_name, 0) {
                return Err(VmError::RefStrOpen);
            }
            let bin = fs.open(&bin_name).ok_or(VmError::RefStrOpen)?;
            let txt = fs.open(&txt_name).ok_or(VmError::RefStrOpen)?;
            (
                Policy::new(paging.kind, paging.rng_seed, None)?,
                Some(RefRecorder::new(bin, txt)),
            )
        } else if paging.kind == PolicyKind::Opt {
            let bin_name = format!("REFSTR{space_id}");
            let bin = fs.open(&bin_name).ok_or(VmError::RefStrOpen)?;
            let refs = RefString::load(&bin)?;
            log::info!("space {space_id}: replaying {} reference items", refs.len());
            (Policy::new(paging.kind, paging.rng_seed, Some(refs))?, None)
        } else {
            (Policy::new(paging.kind, paging.rng_seed, None)?, None)
        };

        Ok(Self {
            space_id,
            page_table,
            swap,
            pages_in_mem: vec![None; max_frames].into_boxed_slice(),
            policy,
            recorder,
        })
    }

    /// 进程号。
    #[inline]
    pub fn space_id(&self) -> usize {
        self.space_id
    }

    /// 地址空间的页数。
    #[inline]
    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    /// 页表，测试和诊断用。
    #[inline]
    pub fn page_table(&self) -> &[TranslationEntry] {
        &self.page_table
    }

    /// 驻留页窗口的原始槽位。
    #[inline]
    pub fn pages_in_mem(&self) -> &[Option<usize>] {
        &self.pages_in_mem
    }

    /// LRU 栈从栈底到栈顶的页号；其他算法没有这个视图。
    pub fn lru_stack(&self) -> Option<Vec<usize>> {
        match self.policy {
            Policy::Lru { bottom, count } => {
                let cap = self.pages_in_mem.len();
                Some(
                    (0..count)
                        .filter_map(|i| self.pages_in_mem[(bottom + i) % cap])
                        .collect(),
                )
            }
            _ => None,
        }
    }

    /// 处理一次缺页：挑牺牲页，脏的先回写，再从交换文件读进页帧。
    ///
    /// 返回后出错页驻留、use 置位、dirty 清零，重试同一条指令即可命中。
    /// 页表动过了，调用者记得重新 [`restore_state`](AddressSpace::restore_state)。
    pub fn replace_page(
        &mut self,
        bad_vaddr: usize,
        frames: &mut Bitmap,
        machine: &mut Machine,
        stats: &mut Stats,
    ) -> Result<(), VmError> {
        stats.num_page_faults += 1;
        let in_page = bad_vaddr / PAGE_SIZE;
        if in_page >= self.page_table.len() {
            return Err(VmError::AddressError(bad_vaddr));
        }

        let victim =
            self.policy
                .find_victim(&mut self.pages_in_mem, &mut self.page_table, in_page)?;

        let frame = match victim {
            None => {
                let frame = frames.find().ok_or(VmError::OutOfFrames)?;
                log::debug!("space {}: demand page {in_page} in (frame {frame})", self.space_id);
                frame
            }
            Some(out_page) => {
                let frame = self.page_table[out_page]
                    .physical_page
                    .ok_or(VmError::VictimInvalid(out_page))?;
                log::debug!(
                    "space {}: swap page {out_page} out, demand page {in_page} in (frame {frame})",
                    self.space_id,
                );
                self.write_back(out_page, machine, stats)?;
                let out = &mut self.page_table[out_page];
                out.valid = false;
                out.physical_page = None;
                frame
            }
        };

        let entry = &mut self.page_table[in_page];
        entry.physical_page = Some(frame);
        entry.valid = true;
        entry.used = true;
        entry.dirty = false;

        if self.swap.read_at(machine.frame_mut(frame), in_page * PAGE_SIZE) != PAGE_SIZE {
            return Err(VmError::ShortIo);
        }
        log::trace!("{}", self);
        Ok(())
    }

    /// 每次成功翻译后调用恰好一次：维护算法结构，顺带记录引用串。
    pub fn update_page(&mut self, vpn: usize) -> Result<(), VmError> {
        self.policy.update(&mut self.pages_in_mem, vpn)?;
        if let Some(recorder) = &mut self.recorder {
            recorder.record(vpn);
        }
        Ok(())
    }

    /// 设置用户态初始寄存器：全部清零，PC 指向 0，下一条指令在 4
    /// （分支延迟槽），栈顶在地址空间末端回退 16 字节。
    pub fn init_registers(&self, machine: &mut Machine) {
        for r in 0..NUM_TOTAL_REGS {
            machine.write_register(r, 0);
        }
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, 4);
        let sp = self.page_table.len() * PAGE_SIZE - 16;
        machine.write_register(STACK_REG, sp as u32);
        log::debug!("space {}: stack register {sp:#x}", self.space_id);
    }

    /// 换下处理器时无事可做，页表始终由 [`restore_state`](AddressSpace::restore_state) 发布。
    pub fn save_state(&self) {}

    /// 把页表发布给 MMU。进程上台和页表改动之后都要走一遍。
    pub fn restore_state(&mut self, machine: &mut Machine) {
        let len = self.page_table.len();
        machine.set_page_table(NonNull::from(&mut self.page_table[0]), len);
    }

    /// 归还占用的物理页帧。文件句柄随自身一起关闭，交换文件留在盘上。
    pub fn release(mut self, frames: &mut Bitmap) {
        for entry in self.page_table.iter_mut() {
            if entry.valid {
                if let Some(frame) = entry.physical_page.take() {
                    frames.clear(frame);
                }
                entry.valid = false;
            }
        }
    }

    /// 脏的牺牲页写回交换文件里它自己的位置；干净页什么都不用做。
    fn write_back(
        &mut self,
        victim: usize,
        machine: &Machine,
        stats: &mut Stats,
    ) -> Result<(), VmError> {
        let entry = &self.page_table[victim];
        if !entry.dirty {
            return Ok(());
        }
        let frame = entry
            .physical_page
            .ok_or(VmError::VictimInvalid(victim))?;
        log::debug!("space {}: write back victim page {victim}", self.space_id);
        if self.swap.write_at(machine.frame(frame), victim * PAGE_SIZE) != PAGE_SIZE {
            return Err(VmError::ShortIo);
        }
        stats.num_page_writes += 1;
        Ok(())
    }
}

impl<F: BackingFile> fmt::Display for AddressSpace<F> {
    /// 页表转储：一页一行。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "space {}: {} pages\n page frame valid  use dirty",
            self.space_id,
            self.page_table.len(),
        )?;
        for entry in self.page_table.iter() {
            writeln!(
                f,
                "{:5} {:5} {:5} {:4} {:5}",
                entry.virtual_page,
                entry.physical_page.map_or(-1, |frame| frame as isize),
                entry.valid as u8,
                entry.used as u8,
                entry.dirty as u8,
            )?;
        }
        Ok(())
    }
}

/// 把可执行文件的一个程序段拷进交换文件的虚地址处，空段跳过。
fn copy_segment<F: BackingFile>(
    exe: &F,
    swap: &F,
    seg: &NoffSegment,
    what: &str,
) -> Result<(), VmError> {
    if seg.size == 0 {
        return Ok(());
    }
    log::debug!(
        "loading {what} segment, {} bytes at {:#x}",
        seg.size,
        seg.virtual_addr,
    );
    let mut buf = vec![0u8; seg.size as usize];
    if exe.read_at(&mut buf, seg.in_file_addr as usize) != buf.len() {
        return Err(VmError::ShortIo);
    }
    if swap.write_at(&buf, seg.virtual_addr as usize) != buf.len() {
        return Err(VmError::ShortIo);
    }
    Ok(())
}
