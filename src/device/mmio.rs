use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{fence, Ordering};

use log::trace;
use memmap2::{MmapMut, MmapOptions};

use super::{BlockCompute, BlockShape};
use crate::error::{OffloadError, Result};

/// Value written to the completion word to start a block; the device overwrites it when done.
pub const START_SENTINEL: u32 = 0x5555;

/// Accelerator reached through physical memory windows.
///
/// Data region layout (i32 words): `[0, v_size)` vector, `[v_size, (m_size+1)*v_size)` matrix.
/// Results are read back from words `[0, m_size)` of the same region. The mappings and the file
/// are released on drop.
pub struct MmioBlock {
    shape: BlockShape,
    data: MmapMut,
    output: MmapMut,
    _file: File,
}

impl MmioBlock {
    pub fn open(path: &Path, data_addr: u64, output_addr: u64, shape: BlockShape) -> Result<Self> {
        let unavailable = |source: io::Error| OffloadError::DeviceUnavailable { path: path.to_path_buf(), source };
        if data_addr % 4 != 0 || output_addr % 4 != 0 {
            return Err(unavailable(io::Error::new(io::ErrorKind::InvalidInput, "region address not word aligned")));
        }
        let file = OpenOptions::new().read(true).write(true).open(path).map_err(unavailable)?;
        let data_words = (shape.m_size + 1) * shape.v_size;
        // Character devices like /dev/mem report length 0; only regular files can be too short.
        let meta = file.metadata().map_err(unavailable)?;
        let needed = (data_addr + (data_words * 4) as u64).max(output_addr + 4);
        if meta.file_type().is_file() && meta.len() < needed {
            return Err(unavailable(io::Error::new(io::ErrorKind::UnexpectedEof,
                format!("device file is {} bytes, regions need {}", meta.len(), needed))));
        }
        // SAFETY: the regions are device windows shared with hardware; every access below goes
        // through volatile reads/writes and the mappings never outlive `file`.
        let data = unsafe {
            MmapOptions::new().offset(data_addr).len(data_words * 4).map_mut(&file)
        }.map_err(unavailable)?;
        let output = unsafe {
            MmapOptions::new().offset(output_addr).len(4).map_mut(&file)
        }.map_err(unavailable)?;
        Ok(Self { shape, data, output, _file: file })
    }

    fn data_ptr(&mut self) -> *mut i32 { self.data.as_mut_ptr() as *mut i32 }

    fn status_ptr(&mut self) -> *mut u32 { self.output.as_mut_ptr() as *mut u32 }
}

impl BlockCompute for MmioBlock {
    fn name(&self) -> &'static str { "mmio" }

    fn shape(&self) -> BlockShape { self.shape }

    fn compute_quantized(&mut self, vector: &[i32], matrix: &[i32], out: &mut [i32]) -> Result<()> {
        let (m, v) = (self.shape.m_size, self.shape.v_size);
        let data = self.data_ptr();
        let status = self.status_ptr();
        // SAFETY: the data mapping holds (m+1)*v words and the status mapping one word.
        unsafe {
            for (k, &x) in vector.iter().take(v).enumerate() { ptr::write_volatile(data.add(k), x); }
            for (k, &w) in matrix.iter().take(m * v).enumerate() { ptr::write_volatile(data.add(v + k), w); }
            fence(Ordering::SeqCst);
            ptr::write_volatile(status, START_SENTINEL);
            // No timeout: a device that never answers stalls the caller.
            let mut spins: u64 = 0;
            while ptr::read_volatile(status) == START_SENTINEL {
                std::hint::spin_loop();
                spins += 1;
            }
            fence(Ordering::SeqCst);
            for (k, y) in out.iter_mut().take(m).enumerate() { *y = ptr::read_volatile(data.add(k)); }
            trace!("mmio block done after {} spins", spins);
        }
        Ok(())
    }
}
