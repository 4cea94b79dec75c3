//! Services the video pipeline consumes from the owning driver: buffer
//! objects, the scratch state region, the batch stream and draw
//! synchronization. The driver's real submission machinery implements [`Gpu`];
//! tests use [`RecordingGpu`].

use std::collections::HashMap;

use crate::regs::DomainFlags;
use crate::VideoError;

/// Lightweight handle to a driver-owned buffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoId(pub u32);

/// Which pipeline configuration last touched the 3D engine. Other blit paths
/// record their own mode so each can skip redundant invariant-state uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode3d {
    Other,
    Video,
}

pub trait Gpu {
    /// Allocate a buffer object for pipeline state.
    fn alloc(&mut self, tag: &'static str, size: u64, align: u64) -> Result<BoId, VideoError>;

    /// Map, copy, unmap.
    fn bo_write(&mut self, bo: BoId, offset: u32, data: &[u8]);

    /// Record a relocation inside a state object and return the target's
    /// current absolute address plus `target_offset`, the value to stuff
    /// into the patched field until submission rewrites it.
    fn bo_reloc(
        &mut self,
        bo: BoId,
        offset: u32,
        target: BoId,
        target_offset: u32,
        read_domains: DomainFlags,
        write_domain: DomainFlags,
    ) -> u32;

    fn bo_unreference(&mut self, bo: BoId);

    /// Absolute offset of the scratch state region. Must be 64-byte aligned
    /// so the kernel-start pointers derived from it stay encodable.
    fn scratch_base(&self) -> u32;

    /// CPU view of the scratch state region.
    fn scratch_mut(&mut self) -> &mut [u8];

    /// Open a command block of exactly `n_dwords` dwords.
    fn batch_begin(&mut self, n_dwords: usize);

    fn batch_emit(&mut self, dword: u32);

    /// Emit one relocated dword pointing `delta` bytes into `target`.
    fn batch_reloc(
        &mut self,
        target: BoId,
        read_domains: DomainFlags,
        write_domain: DomainFlags,
        delta: u32,
    );

    /// Close the current command block; the emitted dword count must match
    /// what `batch_begin` declared.
    fn batch_advance(&mut self);

    /// Block until the most recently marked draw has retired.
    fn wait_for_prior_draw(&mut self);

    /// Mark a sync point after a draw.
    fn mark_draw_point(&mut self);

    fn note_3d_mode(&mut self, mode: Mode3d);
}

/// In-memory [`Gpu`] that records everything it is asked to do.
///
/// Relocations resolve against a synthetic address space (each buffer object
/// gets a fixed 64 KiB-spaced address) so tests can check patched values
/// exactly.
#[derive(Debug)]
pub struct RecordingGpu {
    scratch_base: u32,
    pub scratch: Vec<u8>,
    next_bo: u32,
    /// Force the next `alloc` to fail, for error-path tests.
    pub fail_next_alloc: bool,
    pub allocs: Vec<(&'static str, u64, u64)>,
    pub bo_data: HashMap<BoId, Vec<u8>>,
    pub bo_relocs: Vec<BoRelocRecord>,
    pub unreferenced: Vec<BoId>,
    pub batches: Vec<Vec<u32>>,
    pub batch_relocs: Vec<BatchRelocRecord>,
    pub waits: u32,
    pub marks: u32,
    pub modes: Vec<Mode3d>,
    open: Option<OpenBatch>,
}

#[derive(Debug)]
struct OpenBatch {
    declared: usize,
    dwords: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoRelocRecord {
    pub bo: BoId,
    pub offset: u32,
    pub target: BoId,
    pub target_offset: u32,
    pub read_domains: DomainFlags,
    pub write_domain: DomainFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRelocRecord {
    pub batch: usize,
    pub dword: usize,
    pub target: BoId,
    pub read_domains: DomainFlags,
    pub write_domain: DomainFlags,
    pub delta: u32,
}

impl RecordingGpu {
    pub fn new(scratch_base: u32, scratch_len: usize) -> RecordingGpu {
        assert_eq!(scratch_base & 63, 0);
        RecordingGpu {
            scratch_base,
            scratch: vec![0; scratch_len],
            next_bo: 0,
            fail_next_alloc: false,
            allocs: Vec::new(),
            bo_data: HashMap::new(),
            bo_relocs: Vec::new(),
            unreferenced: Vec::new(),
            batches: Vec::new(),
            batch_relocs: Vec::new(),
            waits: 0,
            marks: 0,
            modes: Vec::new(),
            open: None,
        }
    }

    /// Synthetic GTT address of a recorded buffer object.
    pub fn bo_addr(&self, bo: BoId) -> u32 {
        0x1000_0000 + bo.0 * 0x1_0000
    }

    /// Dwords of the recorded batch `index`.
    pub fn batch(&self, index: usize) -> &[u32] {
        &self.batches[index]
    }
}

impl Gpu for RecordingGpu {
    fn alloc(&mut self, tag: &'static str, size: u64, align: u64) -> Result<BoId, VideoError> {
        if self.fail_next_alloc {
            self.fail_next_alloc = false;
            return Err(VideoError::Alloc { tag });
        }
        let bo = BoId(self.next_bo);
        self.next_bo += 1;
        self.allocs.push((tag, size, align));
        self.bo_data.insert(bo, Vec::new());
        Ok(bo)
    }

    fn bo_write(&mut self, bo: BoId, offset: u32, data: &[u8]) {
        let buf = self.bo_data.get_mut(&bo).expect("write to unknown bo");
        let end = offset as usize + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
    }

    fn bo_reloc(
        &mut self,
        bo: BoId,
        offset: u32,
        target: BoId,
        target_offset: u32,
        read_domains: DomainFlags,
        write_domain: DomainFlags,
    ) -> u32 {
        self.bo_relocs.push(BoRelocRecord {
            bo,
            offset,
            target,
            target_offset,
            read_domains,
            write_domain,
        });
        self.bo_addr(target) + target_offset
    }

    fn bo_unreference(&mut self, bo: BoId) {
        self.unreferenced.push(bo);
    }

    fn scratch_base(&self) -> u32 {
        self.scratch_base
    }

    fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    fn batch_begin(&mut self, n_dwords: usize) {
        assert!(self.open.is_none(), "batch_begin while a batch is open");
        self.open = Some(OpenBatch {
            declared: n_dwords,
            dwords: Vec::with_capacity(n_dwords),
        });
    }

    fn batch_emit(&mut self, dword: u32) {
        let open = self.open.as_mut().expect("batch_emit outside a batch");
        assert!(
            open.dwords.len() < open.declared,
            "batch overflows its declared {} dwords",
            open.declared
        );
        open.dwords.push(dword);
    }

    fn batch_reloc(
        &mut self,
        target: BoId,
        read_domains: DomainFlags,
        write_domain: DomainFlags,
        delta: u32,
    ) {
        let patched = self.bo_addr(target) + delta;
        let batch = self.batches.len();
        let open = self.open.as_mut().expect("batch_reloc outside a batch");
        let dword = open.dwords.len();
        self.batch_relocs.push(BatchRelocRecord {
            batch,
            dword,
            target,
            read_domains,
            write_domain,
            delta,
        });
        assert!(open.dwords.len() < open.declared);
        open.dwords.push(patched);
    }

    fn batch_advance(&mut self) {
        let open = self.open.take().expect("batch_advance outside a batch");
        assert_eq!(
            open.dwords.len(),
            open.declared,
            "batch emitted {} of {} declared dwords",
            open.dwords.len(),
            open.declared
        );
        self.batches.push(open.dwords);
    }

    fn wait_for_prior_draw(&mut self) {
        self.waits += 1;
    }

    fn mark_draw_point(&mut self) {
        self.marks += 1;
    }

    fn note_3d_mode(&mut self, mode: Mode3d) {
        self.modes.push(mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_bookkeeping_round_trips() {
        let mut gpu = RecordingGpu::new(0, 64);
        gpu.batch_begin(2);
        gpu.batch_emit(0xdead_beef);
        gpu.batch_emit(0);
        gpu.batch_advance();
        assert_eq!(gpu.batch(0), &[0xdead_beef, 0]);
    }

    #[test]
    #[should_panic(expected = "declared")]
    fn short_batch_panics_on_advance() {
        let mut gpu = RecordingGpu::new(0, 64);
        gpu.batch_begin(2);
        gpu.batch_emit(1);
        gpu.batch_advance();
    }

    #[test]
    fn reloc_resolves_to_synthetic_address() {
        let mut gpu = RecordingGpu::new(0, 64);
        let a = gpu.alloc("a", 4096, 4096).unwrap();
        let b = gpu.alloc("b", 4096, 4096).unwrap();
        let patched = gpu.bo_reloc(a, 16, b, 8, DomainFlags::INSTRUCTION, DomainFlags::empty());
        assert_eq!(patched, gpu.bo_addr(b) + 8);
        assert_eq!(gpu.bo_relocs.len(), 1);
    }
}
