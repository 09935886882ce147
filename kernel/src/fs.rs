//! 文件系统在内核里的样子：包一层 tiny-fs，向虚存子系统供文件。

use alloc::sync::Arc;
use kernel_vm::{BackingFile, SwapStore};
use tiny_fs::{BlockDevice, OpenFile, OpenFlags, TinyFs};

/// 内核文件系统。
pub struct FileSystem {
    fs: Arc<TinyFs>,
}

impl FileSystem {
    /// 在空设备上新建文件系统。
    pub fn format(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            fs: TinyFs::format(device),
        }
    }

    /// 挂载已经带着文件的设备。
    pub fn mount(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            fs: TinyFs::mount(device),
        }
    }

    /// 把一个完整映像写进文件系统，部署用户程序用。
    pub fn install(&self, name: &str, image: &[u8]) -> bool {
        if !self.fs.create(name, image.len()) {
            return false;
        }
        match TinyFs::open(&self.fs, name, OpenFlags::RDWR) {
            Some(file) => file.write_at(image, 0) == image.len(),
            None => false,
        }
    }

    /// 删除一个文件，比如回收用完的交换文件。
    pub fn remove(&self, name: &str) -> bool {
        self.fs.remove(name)
    }
}

/// 虚存子系统拿到的文件句柄。
pub struct SwapFile(OpenFile);

impl BackingFile for SwapFile {
    #[inline]
    fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.0.read_at(buf, offset)
    }

    #[inline]
    fn write_at(&self, buf: &[u8], offset: usize) -> usize {
        self.0.write_at(buf, offset)
    }

    #[inline]
    fn length(&self) -> usize {
        self.0.length()
    }
}

impl SwapStore for FileSystem {
    type File = SwapFile;

    fn create(&self, name: &str, size: usize) -> bool {
        self.fs.create(name, size)
    }

    fn open(&self, name: &str) -> Option<SwapFile> {
        TinyFs::open(&self.fs, name, OpenFlags::RDWR).map(SwapFile)
    }
}
