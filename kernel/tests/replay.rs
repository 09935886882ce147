//! 引用串的录制与 OPT 回放，包括跨一次"重启"的回放。

mod common;

use common::{init_logging, noff_image};
use kernel::{BackingFile, Kernel, PagingPolicy, PolicyKind, SwapStore, PAGE_SIZE};
use tiny_fs::MemDisk;

#[test]
fn record_then_replay_with_opt() {
    init_logging();
    let mut kernel = Kernel::new(MemDisk::new(), 3);
    assert!(kernel.install("prog", &noff_image(0)));

    let seq = [7usize, 0, 1, 2, 0, 3, 0, 4, 2, 3, 0, 3, 2];
    let a = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo).recording())
        .unwrap();
    for &vpn in &seq {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }
    kernel.exit(a);

    // 二进制文件是小端 u16 的去重序列，文本文件一行一个页号
    let bin = kernel.fs.open("REFSTR0").unwrap();
    let mut raw = vec![0u8; bin.length()];
    assert_eq!(bin.read_at(&mut raw, 0), raw.len());
    let recorded: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let expect: Vec<u16> = seq.iter().map(|&v| v as u16).collect();
    assert_eq!(recorded, expect);

    let txt = kernel.fs.open("REFSTR0.TXT").unwrap();
    let mut raw = vec![0u8; txt.length()];
    assert_eq!(txt.read_at(&mut raw, 0), raw.len());
    assert_eq!(
        String::from_utf8(raw).unwrap(),
        "7\n0\n1\n2\n0\n3\n0\n4\n2\n3\n0\n3\n2\n"
    );

    // 同一程序同一序列换 OPT 回放：进程号回收成 0，正好对上 REFSTR0。
    // 这是 Belady 的经典例子，三帧恰好 7 次缺页。
    let b = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Opt))
        .unwrap();
    assert_eq!(b, 0);
    let before = kernel.stats.num_page_faults;
    for &vpn in &seq {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }
    assert_eq!(kernel.stats.num_page_faults - before, 7);
}

#[test]
fn replay_survives_a_reboot() {
    init_logging();
    let disk = MemDisk::new();
    let seq = [0usize, 1, 2, 0, 1, 3];
    {
        let mut kernel = Kernel::new(disk.clone(), 2);
        assert!(kernel.install("prog", &noff_image(0)));
        let pid = kernel
            .exec("prog", &PagingPolicy::new(PolicyKind::Lru).recording())
            .unwrap();
        for &vpn in &seq {
            kernel.load_byte(vpn * PAGE_SIZE).unwrap();
        }
        kernel.exit(pid);
    }

    // 旧盘重新挂载，引用串还在，OPT 照常回放
    let mut kernel = Kernel::mount(disk, 2);
    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Opt))
        .unwrap();
    for &vpn in &seq {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }
    assert_eq!(kernel.stats.num_page_faults, 6);
}

#[test]
fn replay_diverging_from_the_string_is_fatal() {
    init_logging();
    let mut kernel = Kernel::new(MemDisk::new(), 2);
    assert!(kernel.install("prog", &noff_image(0)));

    let pid = kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Fifo).recording())
        .unwrap();
    for vpn in [0usize, 1, 2] {
        kernel.load_byte(vpn * PAGE_SIZE).unwrap();
    }
    kernel.exit(pid);

    kernel
        .exec("prog", &PagingPolicy::new(PolicyKind::Opt))
        .unwrap();
    kernel.load_byte(0).unwrap();
    // 录的是 0,1,2，现在却去摸 5 号页
    let err = kernel.load_byte(5 * PAGE_SIZE).unwrap_err();
    assert!(matches!(err, kernel::VmError::RefStrMismatch { got: 5, .. }));
}

#[test]
fn recording_under_opt_is_refused() {
    init_logging();
    let mut kernel = Kernel::new(MemDisk::new(), 2);
    assert!(kernel.install("prog", &noff_image(0)));
    assert_eq!(
        kernel.exec("prog", &PagingPolicy::new(PolicyKind::Opt).recording()),
        Err(kernel::VmError::RecordUnderOpt)
    );
}
