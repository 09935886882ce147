/// 交换文件和引用串文件的最小读写能力。
///
/// 偏移都由调用方给出，句柄本身没有游标。
pub trait BackingFile {
    /// 从 `offset` 读，返回实际读到的字节数。
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize;

    /// 向 `offset` 写，必要时文件就地变长，返回实际写入的字节数。
    fn write_at(&self, buf: &[u8], offset: usize) -> usize;

    /// 当前文件长度。
    fn length(&self) -> usize;
}

/// 地址空间向文件系统索取的全部能力，和内核文件系统接口一一对应。
pub trait SwapStore {
    /// 打开后得到的文件句柄。
    type File: BackingFile;

    /// 创建 `size` 字节的文件，同名旧文件被整个替换。
    fn create(&self, name: &str, size: usize) -> bool;

    /// 打开既有文件做读写。
    fn open(&self, name: &str) -> Option<Self::File>;
}
