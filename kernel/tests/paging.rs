//! 端到端调页场景：一块 RAM 盘、一台内核、几个用户进程。
//!
//! 驱动方式都一样：`load_byte`/`store_byte` 走翻译，缺页由内核换页后
//! 重试，断言落在页表、驻留窗口、统计计数和交换文件内容上。

mod common;

use common::{init_logging, noff_image};
use kernel::{
    BackingFile, Kernel, PagingPolicy, PolicyKind, SwapStore, VmError, NUM_PHYS_PAGES, PAGE_SIZE,
};
use machine::{NEXT_PC_REG, PC_REG, STACK_REG};
use tiny_fs::MemDisk;

fn boot(max_frames: usize) -> Kernel {
    init_logging();
    Kernel::new(MemDisk::new(), max_frames)
}

fn resident_pages(kernel: &Kernel, pid: usize) -> Vec<(usize, usize)> {
    kernel
        .space(pid)
        .unwrap()
        .page_table()
        .iter()
        .filter(|e| e.valid)
        .map(|e| (e.virtual_page, e.physical_page.unwrap()))
        .collect()
}

#[test]
fn fifo_follows_the_classic_trace() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(0)));
    let pid = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();

    for vpn in [0usize, 1, 2, 3, 0, 1] {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }

    assert_eq!(kernel.stats.num_page_faults, 6);
    assert_eq!(kernel.stats.num_page_writes, 0);
    // 0、1 两页最后换进来，各自占回最初的两个帧
    assert_eq!(resident_pages(&kernel, pid), vec![(0, 0), (1, 1)]);
}

#[test]
fn lru_keeps_the_working_set() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(0)));
    let pid = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Lru))
        .unwrap();

    for vpn in [0usize, 1, 0, 2, 1, 2] {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }

    assert_eq!(kernel.stats.num_page_faults, 4);
    let space = kernel.space(pid).unwrap();
    assert_eq!(space.lru_stack(), Some(vec![1, 2]));
    let resident: Vec<usize> = resident_pages(&kernel, pid).iter().map(|r| r.0).collect();
    assert_eq!(resident, vec![1, 2]);
}

#[test]
fn second_chance_clears_use_bits_on_its_way() {
    let mut kernel = boot(3);
    assert!(kernel.install("prog", &noff_image(0)));
    let pid = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::SecondChance))
        .unwrap();

    for vpn in 0..3 {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }
    // 三页 use 位全在，时钟转一整圈逐个没收，回到 0 号页把它换掉
    kernel.load_byte(3 * PAGE_SIZE).unwrap();

    assert_eq!(kernel.stats.num_page_faults, 4);
    let table = kernel.space(pid).unwrap().page_table();
    assert!(!table[0].valid);
    assert!(table[1].valid && !table[1].used);
    assert!(table[2].valid && !table[2].used);
    assert!(table[3].valid && table[3].used);
}

#[test]
fn enhanced_clock_writes_back_dirty_victims() {
    let mut kernel = boot(3);
    assert!(kernel.install("prog", &noff_image(256)));
    let pid = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::EnhancedSecondChance))
        .unwrap();

    for vpn in 0..3usize {
        kernel.store_byte(vpn * PAGE_SIZE + 5, 0xa0 + vpn as u8).unwrap();
    }
    let frame0 = kernel.space(pid).unwrap().page_table()[0]
        .physical_page
        .unwrap();
    let snapshot = kernel.machine.frame(frame0).to_vec();

    // 三页都是脏页，第 4 页进场换掉 0 号页
    kernel.load_byte(3 * PAGE_SIZE).unwrap();

    assert_eq!(kernel.stats.num_page_writes, 1);
    let table = kernel.space(pid).unwrap().page_table();
    assert!(!table[0].valid);
    assert!(table[3].valid && table[3].used && !table[3].dirty);

    // 回写区域和牺牲那一刻的帧内容一字不差
    let swap = kernel.fs.open("SWAP0").unwrap();
    let mut region = vec![0u8; PAGE_SIZE];
    assert_eq!(swap.read_at(&mut region, 0), PAGE_SIZE);
    assert_eq!(region, snapshot);
    assert_eq!(region[5], 0xa0);
}

#[test]
fn clean_evictions_leave_swap_alone() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(256)));
    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();

    assert_eq!(kernel.load_byte(5).unwrap(), 5);
    assert_eq!(kernel.load_byte(PAGE_SIZE + 2).unwrap(), 130);
    kernel.load_byte(2 * PAGE_SIZE).unwrap(); // 0 号页干净出局

    assert_eq!(kernel.stats.num_page_writes, 0);
    let swap = kernel.fs.open("SWAP0").unwrap();
    let mut region = vec![0u8; PAGE_SIZE];
    assert_eq!(swap.read_at(&mut region, 0), PAGE_SIZE);
    let expect: Vec<u8> = (0..PAGE_SIZE).map(|i| i as u8).collect();
    assert_eq!(region, expect);
}

#[test]
fn a_page_faults_only_on_first_touch() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(0)));
    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();

    assert_eq!(kernel.load_byte(0).unwrap(), 0);
    assert_eq!(kernel.stats.num_page_faults, 1);
    for _ in 0..3 {
        kernel.load_byte(0).unwrap();
        kernel.load_byte(16).unwrap();
    }
    assert_eq!(kernel.stats.num_page_faults, 1);
}

#[test]
fn swap_is_zero_filled_beyond_the_image() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(100)));
    let pid = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();

    // 100 字节代码加 1024 字节栈，凑不满的尾页补零
    assert_eq!(kernel.space(pid).unwrap().num_pages(), 9);
    assert_eq!(kernel.load_byte(99).unwrap(), 99);
    assert_eq!(kernel.load_byte(100).unwrap(), 0);
    assert_eq!(kernel.load_byte(8 * PAGE_SIZE + 127).unwrap(), 0);
    assert_eq!(
        kernel.load_byte(9 * PAGE_SIZE),
        Err(VmError::AddressError(9 * PAGE_SIZE))
    );
}

#[test]
fn byte_swapped_images_load_all_the_same() {
    let mut kernel = boot(2);
    let mut image = noff_image(256);
    for chunk in image[..40].chunks_exact_mut(4) {
        chunk.reverse();
    }
    assert!(kernel.install("prog", &image));
    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();
    assert_eq!(kernel.load_byte(PAGE_SIZE + 2).unwrap(), 130);
}

#[test]
fn registers_follow_the_mips_convention() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(0)));
    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();

    assert_eq!(kernel.machine.read_register(PC_REG), 0);
    assert_eq!(kernel.machine.read_register(NEXT_PC_REG), 4);
    assert_eq!(
        kernel.machine.read_register(STACK_REG),
        (8 * PAGE_SIZE - 16) as u32
    );
}

#[test]
fn frames_never_alias_across_processes() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(0)));
    let a = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();
    let b = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Lru))
        .unwrap();
    assert_eq!((a, b), (0, 1));

    // b 在台上，先把它的窗口占满
    kernel.load_byte(0).unwrap();
    kernel.load_byte(PAGE_SIZE).unwrap();
    assert!(kernel.switch_to(a));
    kernel.load_byte(0).unwrap();
    kernel.load_byte(PAGE_SIZE).unwrap();
    assert!(kernel.switch_to(b));
    kernel.load_byte(2 * PAGE_SIZE).unwrap();

    let frames_a: Vec<usize> = resident_pages(&kernel, a).iter().map(|r| r.1).collect();
    let frames_b: Vec<usize> = resident_pages(&kernel, b).iter().map(|r| r.1).collect();
    assert_eq!(frames_a.len(), 2);
    assert_eq!(frames_b.len(), 2);
    assert!(frames_a.iter().all(|f| !frames_b.contains(f)));

    // 退出归还帧和进程号
    kernel.exit(a);
    let c = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();
    assert_eq!(c, 0);
}

#[test]
fn random_policy_stays_inside_its_budget() {
    let mut kernel = boot(2);
    assert!(kernel.install("prog", &noff_image(0)));
    let paging = PagingPolicy {
        kind: PolicyKind::Random,
        record: false,
        rng_seed: 7,
    };
    let pid = kernel.exec("prog", &paging).unwrap();

    for (i, vpn) in [0usize, 1, 2, 3, 4, 0, 1, 2].into_iter().enumerate() {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
        let resident = resident_pages(&kernel, pid).len();
        assert!(resident <= 2, "step {i}: {resident} resident pages");
    }
    assert!(kernel.stats.num_page_faults >= 5);
}

#[test]
fn frame_budget_is_checked_at_exec() {
    let mut kernel = boot(NUM_PHYS_PAGES);
    assert!(kernel.install("prog", &noff_image(0)));
    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo))
        .unwrap();
    kernel.load_byte(0).unwrap();

    // 空闲帧已经不够第二个满窗口进程
    assert_eq!(
        kernel.exec("prog", &PagingPolicy::new(PolicyKind::Fifo)),
        Err(VmError::TooBig)
    );
}

#[test]
fn construction_failures_leak_nothing() {
    let mut kernel = boot(2);
    assert_eq!(
        kernel.exec("ghost", &PagingPolicy::new(PolicyKind::Fifo)),
        Err(VmError::ExecMissing)
    );
    assert!(kernel.install("junk", b"this is not an executable"));
    assert_eq!(
        kernel.exec("junk", &PagingPolicy::new(PolicyKind::Fifo)),
        Err(VmError::BadMagic)
    );
    // OPT 回放没有录好的引用串可用
    assert!(kernel.install("prog", &noff_image(0)));
    assert_eq!(
        kernel.exec("prog", &PagingPolicy::new(PolicyKind::Opt)),
        Err(VmError::RefStrOpen)
    );
    // 进程号一个都没漏
    assert_eq!(
        kernel.exec("prog", &PagingPolicy::new(PolicyKind::Fifo)),
        Ok(0)
    );
}
