//! 场景测试共用的小工具：宿主机控制台和合成的 NOFF 映像。

use noff::{NoffHeader, NoffSegment, HEADER_BYTES};

struct StdConsole;

impl console::Console for StdConsole {
    fn put_char(&self, c: u8) {
        print!("{}", c as char);
    }
}

/// 把日志接到宿主机标准输出上；级别跟 `LOG` 环境变量走。
pub fn init_logging() {
    console::init_console(&StdConsole);
    console::set_log_level(std::env::var("LOG").ok().as_deref());
}

/// 合成一个 NOFF 映像：代码段从虚地址 0 开始，内容是下标的低八位。
pub fn noff_image(code_len: usize) -> Vec<u8> {
    let header = NoffHeader {
        code: NoffSegment {
            size: code_len as u32,
            virtual_addr: 0,
            in_file_addr: HEADER_BYTES as u32,
        },
        init_data: NoffSegment {
            size: 0,
            virtual_addr: code_len as u32,
            in_file_addr: 0,
        },
        uninit_data: NoffSegment {
            size: 0,
            virtual_addr: code_len as u32,
            in_file_addr: 0,
        },
    };
    let mut image = header.encode().to_vec();
    image.extend((0..code_len).map(|i| i as u8));
    image
}
