//! 引用串的记录与回放。
//!
//! 引用串是相邻去重后的虚页号序列。二进制文件是小端 u16，一项一个
//! 页号；文本文件一行一个十进制页号，顺序相同。读写两端都按小端来，
//! 文件因此可以跨机器搬运。

use crate::{store::BackingFile, VmError};
use alloc::{format, vec, vec::Vec};

/// 追加式引用串记录器，一边写二进制一边写文本。
pub struct RefRecorder<F: BackingFile> {
    last: Option<usize>,
    bin: F,
    txt: F,
    bin_pos: usize,
    txt_pos: usize,
}

impl<F: BackingFile> RefRecorder<F> {
    /// 接管两个新建的空文件。
    pub fn new(bin: F, txt: F) -> Self {
        Self {
            last: None,
            bin,
            txt,
            bin_pos: 0,
            txt_pos: 0,
        }
    }

    /// 记录一次访问；和上一次相同的页号直接合并掉。
    ///
    /// 页号超出 16 位的记不进二进制文件，告警后只记文本。
    pub fn record(&mut self, vpn: usize) {
        if self.last == Some(vpn) {
            return;
        }
        self.last = Some(vpn);
        if vpn > i16::MAX as usize {
            log::warn!("can't record page {vpn}, page number must fit in 16 bits");
        } else {
            let word = (vpn as u16).to_le_bytes();
            if self.bin.write_at(&word, self.bin_pos) == word.len() {
                self.bin_pos += word.len();
            }
        }
        let line = format!("{vpn}\n");
        if self.txt.write_at(line.as_bytes(), self.txt_pos) == line.len() {
            self.txt_pos += line.len();
        }
    }
}

/// 预先录好的引用串，OPT 回放时从左到右消费。
pub struct RefString {
    items: Vec<u16>,
    idx: usize,
}

impl RefString {
    /// 从二进制文件整条加载。文件长度必须是偶数。
    pub fn load<F: BackingFile>(file: &F) -> Result<Self, VmError> {
        let len = file.length();
        if len % 2 != 0 {
            return Err(VmError::RefStrOdd);
        }
        let mut raw = vec![0u8; len];
        if file.read_at(&mut raw, 0) != len {
            return Err(VmError::ShortIo);
        }
        let items = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(Self { items, idx: 0 })
    }

    /// 直接用内存里的序列构造，模拟和测试场景用。
    pub fn from_items(items: Vec<u16>) -> Self {
        Self { items, idx: 0 }
    }

    /// 引用串总项数。
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 引用串是否为空。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 确认一次访问。同一页的重复访问不动游标；页号换了游标恰好进一格，
    /// 对不上或串用完都是致命错误。
    pub fn advance(&mut self, vpn: usize) -> Result<(), VmError> {
        if self.items.get(self.idx).map(|&v| v as usize) == Some(vpn) {
            return Ok(());
        }
        self.idx += 1;
        match self.items.get(self.idx) {
            None => Err(VmError::RefStrExhausted),
            Some(&v) if v as usize != vpn => Err(VmError::RefStrMismatch {
                at: self.idx,
                expect: v as usize,
                got: vpn,
            }),
            Some(_) => {
                if self.idx == self.items.len() - 1 {
                    log::info!("reached the last reference string item");
                }
                Ok(())
            }
        }
    }

    /// 从游标处（含）往后，`vpn` 下一次出现的下标；不再出现返回 `None`。
    pub fn next_use(&self, vpn: usize) -> Option<usize> {
        self.items[self.idx..]
            .iter()
            .position(|&v| v as usize == vpn)
            .map(|off| self.idx + off)
    }
}
