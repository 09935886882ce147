//! 内核控制台：`print!`、`println!` 与分级日志。
//!
//! 内核各处只面向 `log` 写日志；真正的输出方式由嵌入方实现
//! [`Console`] 并在启动时安装。没装控制台时日志静默丢弃。

#![no_std]
#![deny(warnings)]

use core::fmt::{self, Write};
use spin::Once;

/// 向用户提供 `log`。
pub extern crate log;

/// 输出字节流的最小能力。
pub trait Console: Sync {
    /// 输出一个字节。
    fn put_char(&self, c: u8);

    /// 输出一段字符串。逐字节转发，内部带锁的实现可以覆盖掉它少拿几次锁。
    #[inline]
    fn put_str(&self, s: &str) {
        for c in s.bytes() {
            self.put_char(c);
        }
    }
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// 安装控制台并注册日志实现。只有第一次调用生效。
pub fn init_console(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
    let _ = log::set_logger(&Logger);
}

/// 设置日志级别；解析失败或没给就回落到 `Info`。
pub fn set_log_level(level: Option<&str>) {
    use log::LevelFilter;
    let lv = level
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    log::set_max_level(lv);
}

/// 给宏用的，用户不直接调它。
#[doc(hidden)]
#[inline]
pub fn _print(args: fmt::Arguments) {
    let _ = Logger.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::_print(core::format_args!($($arg)*));
    }
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {{
        $crate::_print(core::format_args!($($arg)*));
        $crate::println!();
    }}
}

struct Logger;

impl Write for Logger {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(console) = CONSOLE.get() {
            console.put_str(s);
        }
        Ok(())
    }
}

impl log::Log for Logger {
    #[inline]
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        CONSOLE.get().is_some()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        use log::Level::*;
        let color: u8 = match record.level() {
            Error => 31,
            Warn => 93,
            Info => 34,
            Debug => 32,
            Trace => 90,
        };
        println!(
            "\x1b[{color}m[{:>5}] {}\x1b[0m",
            record.level(),
            record.args(),
        );
    }

    fn flush(&self) {}
}
