//! Fixed-function state object encoding.
//!
//! Each hardware state object is a plain field struct plus an `encode` that
//! packs it into its dword image through a per-object field table. The tables
//! are the single source of truth for (dword, shift, width) of every field the
//! blit path programs; nothing else in the crate composes state bits.

use crate::regs::{
    SurfaceFormat, BLENDFACTOR_ONE, BLENDFUNCTION_ADD, CULLMODE_NONE, LOGICOP_WHITE,
    MAPFILTER_LINEAR, SURFACE_2D, SURFACE_RETURN_FLOAT32, TEXCOORDMODE_CLAMP,
};

/// One packed field inside a state object's dword image.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Field {
    pub dword: usize,
    pub shift: u32,
    pub width: u32,
}

impl Field {
    pub(crate) const fn new(dword: usize, shift: u32, width: u32) -> Field {
        Field { dword, shift, width }
    }

    pub(crate) fn mask(self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    pub(crate) fn set(self, dwords: &mut [u32], value: u32) {
        debug_assert!(
            value <= self.mask(),
            "value {value:#x} does not fit a {}-bit field",
            self.width
        );
        dwords[self.dword] |= (value & self.mask()) << self.shift;
    }

    #[cfg(test)]
    pub(crate) fn get(self, dwords: &[u32]) -> u32 {
        (dwords[self.dword] >> self.shift) & self.mask()
    }
}

/* ------------------------------ SURFACE_STATE ----------------------------- */

pub const SURFACE_STATE_DWORDS: usize = 6;
pub const SURFACE_STATE_BYTES: u32 = (SURFACE_STATE_DWORDS * 4) as u32;

mod ss {
    use super::Field;

    pub const SURFACE_TYPE: Field = Field::new(0, 29, 3);
    pub const DATA_RETURN_FORMAT: Field = Field::new(0, 27, 1);
    pub const SURFACE_FORMAT: Field = Field::new(0, 18, 9);
    pub const COLOR_BLEND: Field = Field::new(0, 13, 1);

    pub const BASE_ADDR: Field = Field::new(1, 0, 32);

    pub const HEIGHT: Field = Field::new(2, 19, 13);
    pub const WIDTH: Field = Field::new(2, 6, 13);

    pub const PITCH: Field = Field::new(3, 0, 18);
    pub const TILE_WALK: Field = Field::new(3, 19, 1);
    pub const TILED_SURFACE: Field = Field::new(3, 20, 1);
}

/// 2D surface descriptor, used for both the render target and the source
/// planes. Width/height/pitch are programmed minus one.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceState {
    pub format: SurfaceFormat,
    pub base_addr: u32,
    pub width: u16,
    pub height: u16,
    pub pitch: u32,
    pub tiled: bool,
    /// Render targets return float32 to the color calculator.
    pub render_target: bool,
}

impl SurfaceState {
    pub fn encode(&self) -> [u32; SURFACE_STATE_DWORDS] {
        let mut dw = [0u32; SURFACE_STATE_DWORDS];
        ss::SURFACE_TYPE.set(&mut dw, SURFACE_2D);
        if self.render_target {
            ss::DATA_RETURN_FORMAT.set(&mut dw, SURFACE_RETURN_FLOAT32);
        }
        ss::SURFACE_FORMAT.set(&mut dw, self.format as u32);
        ss::COLOR_BLEND.set(&mut dw, 1);
        ss::BASE_ADDR.set(&mut dw, self.base_addr);
        ss::WIDTH.set(&mut dw, u32::from(self.width) - 1);
        ss::HEIGHT.set(&mut dw, u32::from(self.height) - 1);
        ss::PITCH.set(&mut dw, self.pitch - 1);
        ss::TILED_SURFACE.set(&mut dw, self.tiled as u32);
        // Tile walk stays X-major; the scanout pixmap is never tiled Y.
        ss::TILE_WALK.set(&mut dw, 0);
        dw
    }
}

/* ------------------------------ SAMPLER_STATE ----------------------------- */

pub const SAMPLER_STATE_DWORDS: usize = 4;
pub const SAMPLER_STATE_BYTES: u32 = (SAMPLER_STATE_DWORDS * 4) as u32;

mod samp {
    use super::Field;

    pub const MIN_FILTER: Field = Field::new(0, 14, 3);
    pub const MAG_FILTER: Field = Field::new(0, 17, 3);

    pub const R_WRAP: Field = Field::new(1, 0, 3);
    pub const T_WRAP: Field = Field::new(1, 3, 3);
    pub const S_WRAP: Field = Field::new(1, 6, 3);
}

/// The one sampler configuration video uses: bilinear, clamped on all axes.
pub fn encode_sampler_state() -> [u32; SAMPLER_STATE_DWORDS] {
    let mut dw = [0u32; SAMPLER_STATE_DWORDS];
    samp::MIN_FILTER.set(&mut dw, MAPFILTER_LINEAR);
    samp::MAG_FILTER.set(&mut dw, MAPFILTER_LINEAR);
    samp::R_WRAP.set(&mut dw, TEXCOORDMODE_CLAMP);
    samp::S_WRAP.set(&mut dw, TEXCOORDMODE_CLAMP);
    samp::T_WRAP.set(&mut dw, TEXCOORDMODE_CLAMP);
    dw
}

/* ----------------------- Shared unit-state thread words ------------------- */

mod thread {
    use super::Field;

    // thread0
    pub const KERNEL_START_POINTER: Field = Field::new(0, 6, 26);
    pub const GRF_REG_COUNT: Field = Field::new(0, 1, 3);

    // thread1
    pub const SINGLE_PROGRAM_FLOW: Field = Field::new(1, 31, 1);
    pub const BINDING_TABLE_ENTRY_COUNT: Field = Field::new(1, 18, 8);
    pub const ILLEGAL_OP_EXCEPTION_ENABLE: Field = Field::new(1, 4, 1);
    pub const MASK_STACK_EXCEPTION_ENABLE: Field = Field::new(1, 2, 1);
    pub const SW_EXCEPTION_ENABLE: Field = Field::new(1, 1, 1);

    // thread3
    pub const CONST_URB_ENTRY_READ_LENGTH: Field = Field::new(3, 0, 6);
    pub const CONST_URB_ENTRY_READ_OFFSET: Field = Field::new(3, 6, 6);
    pub const URB_ENTRY_READ_LENGTH: Field = Field::new(3, 12, 6);
    pub const URB_ENTRY_READ_OFFSET: Field = Field::new(3, 18, 6);
    pub const DISPATCH_GRF_START_REG: Field = Field::new(3, 24, 4);

    // thread4
    pub const STATS_ENABLE: Field = Field::new(4, 0, 1);
    pub const NR_URB_ENTRIES: Field = Field::new(4, 4, 7);
    pub const URB_ENTRY_ALLOCATION_SIZE: Field = Field::new(4, 11, 5);
    pub const MAX_THREADS: Field = Field::new(4, 25, 7);
}

/// GRF register allocation is granted in blocks of 16.
pub const fn grf_blocks(nreg: u32) -> u32 {
    (nreg + 15) / 16 - 1
}

/* ------------------------------ VS unit state ----------------------------- */

pub const VS_UNIT_DWORDS: usize = 7;
pub const VS_UNIT_BYTES: u32 = (VS_UNIT_DWORDS * 4) as u32;

mod vs {
    use super::Field;

    pub const VS_ENABLE: Field = Field::new(6, 0, 1);
    pub const VERT_CACHE_DISABLE: Field = Field::new(6, 1, 1);
}

/// Disabled-passthrough vertex shader. The URB allocation still has to be
/// real: the VS wants 8 entries even when it never runs a thread.
#[derive(Clone, Copy, Debug)]
pub struct VsUnitState {
    pub nr_urb_entries: u32,
    pub urb_entry_size: u32,
}

impl VsUnitState {
    pub fn encode(&self) -> [u32; VS_UNIT_DWORDS] {
        let mut dw = [0u32; VS_UNIT_DWORDS];
        thread::NR_URB_ENTRIES.set(&mut dw, self.nr_urb_entries);
        thread::URB_ENTRY_ALLOCATION_SIZE.set(&mut dw, self.urb_entry_size - 1);
        vs::VS_ENABLE.set(&mut dw, 0);
        vs::VERT_CACHE_DISABLE.set(&mut dw, 1);
        dw
    }
}

/* ------------------------------ SF unit state ----------------------------- */

pub const SF_UNIT_DWORDS: usize = 8;
pub const SF_UNIT_BYTES: u32 = (SF_UNIT_DWORDS * 4) as u32;

pub const SF_KERNEL_GRF: u32 = 16;
pub const SF_MAX_THREADS: u32 = 1;

mod sf {
    use super::Field;

    pub const VIEWPORT_TRANSFORM: Field = Field::new(5, 0, 1);

    pub const CULL_MODE: Field = Field::new(6, 28, 2);
    pub const SCISSOR: Field = Field::new(6, 0, 1);
    pub const DEST_ORG_VBIAS: Field = Field::new(6, 9, 4);
    pub const DEST_ORG_HBIAS: Field = Field::new(6, 13, 4);

    pub const TRIFAN_PV: Field = Field::new(7, 0, 2);
}

/// Strip/setup stage: runs the interpolation-coefficient kernel, one thread,
/// no viewport transform, no culling.
#[derive(Clone, Copy, Debug)]
pub struct SfUnitState {
    /// Absolute address of the uploaded SF kernel; must be 64-byte aligned.
    pub kernel_addr: u32,
    pub nr_urb_entries: u32,
    pub urb_entry_size: u32,
}

impl SfUnitState {
    pub fn encode(&self) -> [u32; SF_UNIT_DWORDS] {
        debug_assert_eq!(self.kernel_addr & 63, 0);
        let mut dw = [0u32; SF_UNIT_DWORDS];
        thread::KERNEL_START_POINTER.set(&mut dw, self.kernel_addr >> 6);
        thread::GRF_REG_COUNT.set(&mut dw, grf_blocks(SF_KERNEL_GRF));
        thread::SINGLE_PROGRAM_FLOW.set(&mut dw, 1);
        thread::ILLEGAL_OP_EXCEPTION_ENABLE.set(&mut dw, 1);
        thread::MASK_STACK_EXCEPTION_ENABLE.set(&mut dw, 1);
        thread::SW_EXCEPTION_ENABLE.set(&mut dw, 1);
        thread::CONST_URB_ENTRY_READ_LENGTH.set(&mut dw, 0);
        thread::CONST_URB_ENTRY_READ_OFFSET.set(&mut dw, 0);
        thread::URB_ENTRY_READ_LENGTH.set(&mut dw, 1);
        thread::URB_ENTRY_READ_OFFSET.set(&mut dw, 0);
        thread::DISPATCH_GRF_START_REG.set(&mut dw, 3);
        thread::MAX_THREADS.set(&mut dw, SF_MAX_THREADS - 1);
        thread::NR_URB_ENTRIES.set(&mut dw, self.nr_urb_entries);
        thread::URB_ENTRY_ALLOCATION_SIZE.set(&mut dw, self.urb_entry_size - 1);
        thread::STATS_ENABLE.set(&mut dw, 1);
        sf::VIEWPORT_TRANSFORM.set(&mut dw, 0);
        sf::CULL_MODE.set(&mut dw, CULLMODE_NONE);
        sf::SCISSOR.set(&mut dw, 0);
        // Half-pixel destination origin bias, both axes.
        sf::DEST_ORG_VBIAS.set(&mut dw, 0x8);
        sf::DEST_ORG_HBIAS.set(&mut dw, 0x8);
        sf::TRIFAN_PV.set(&mut dw, 2);
        dw
    }
}

/* ------------------------------ WM unit state ----------------------------- */

pub const WM_UNIT_DWORDS: usize = 8;
pub const WM_UNIT_BYTES: u32 = (WM_UNIT_DWORDS * 4) as u32;

pub const PS_KERNEL_GRF: u32 = 32;
pub const PS_MAX_THREADS: u32 = 32;

mod wm {
    use super::Field;

    pub const STATS_ENABLE: Field = Field::new(4, 0, 1);
    pub const SAMPLER_COUNT: Field = Field::new(4, 2, 3);
    pub const SAMPLER_STATE_POINTER: Field = Field::new(4, 5, 27);

    pub const ENABLE_8_PIX: Field = Field::new(5, 0, 1);
    pub const ENABLE_16_PIX: Field = Field::new(5, 1, 1);
    pub const EARLY_DEPTH_TEST: Field = Field::new(5, 2, 1);
    pub const THREAD_DISPATCH_ENABLE: Field = Field::new(5, 16, 1);
    pub const MAX_THREADS: Field = Field::new(5, 25, 7);
}

/// Pixel shader stage, pointed at one of the YUV->RGB kernels.
#[derive(Clone, Copy, Debug)]
pub struct WmUnitState {
    /// Absolute address of the uploaded PS kernel; must be 64-byte aligned.
    pub kernel_addr: u32,
    /// Absolute address of the first sampler state; must be 32-byte aligned.
    pub sampler_addr: u32,
    pub binding_table_entry_count: u32,
}

impl WmUnitState {
    pub fn encode(&self) -> [u32; WM_UNIT_DWORDS] {
        debug_assert_eq!(self.kernel_addr & 63, 0);
        debug_assert_eq!(self.sampler_addr & 31, 0);
        let mut dw = [0u32; WM_UNIT_DWORDS];
        thread::KERNEL_START_POINTER.set(&mut dw, self.kernel_addr >> 6);
        thread::GRF_REG_COUNT.set(&mut dw, grf_blocks(PS_KERNEL_GRF));
        thread::SINGLE_PROGRAM_FLOW.set(&mut dw, 1);
        thread::BINDING_TABLE_ENTRY_COUNT.set(&mut dw, self.binding_table_entry_count);
        thread::CONST_URB_ENTRY_READ_LENGTH.set(&mut dw, 0);
        thread::CONST_URB_ENTRY_READ_OFFSET.set(&mut dw, 0);
        thread::URB_ENTRY_READ_LENGTH.set(&mut dw, 1);
        thread::URB_ENTRY_READ_OFFSET.set(&mut dw, 0);
        thread::DISPATCH_GRF_START_REG.set(&mut dw, 3);
        wm::STATS_ENABLE.set(&mut dw, 1);
        wm::SAMPLER_STATE_POINTER.set(&mut dw, self.sampler_addr >> 5);
        wm::SAMPLER_COUNT.set(&mut dw, 1);
        wm::MAX_THREADS.set(&mut dw, PS_MAX_THREADS - 1);
        wm::THREAD_DISPATCH_ENABLE.set(&mut dw, 1);
        wm::ENABLE_16_PIX.set(&mut dw, 1);
        wm::ENABLE_8_PIX.set(&mut dw, 0);
        wm::EARLY_DEPTH_TEST.set(&mut dw, 1);
        dw
    }
}

/* ------------------------------ CC unit state ----------------------------- */

pub const CC_UNIT_DWORDS: usize = 8;
pub const CC_UNIT_BYTES: u32 = (CC_UNIT_DWORDS * 4) as u32;

/// Byte offset of the dword carrying the viewport pointer; the relocation for
/// the viewport object lands here.
pub const CC_VIEWPORT_POINTER_OFFSET: u32 = 4 * 4;

mod cc {
    use super::Field;

    pub const STENCIL_ENABLE: Field = Field::new(0, 31, 1);

    pub const DEPTH_TEST: Field = Field::new(2, 31, 1);
    pub const LOGICOP_ENABLE: Field = Field::new(2, 0, 1);

    pub const ALPHA_TEST: Field = Field::new(3, 8, 1);
    pub const BLEND_ENABLE: Field = Field::new(3, 9, 1);
    pub const IA_BLEND_ENABLE: Field = Field::new(3, 10, 1);

    pub const VIEWPORT_STATE_OFFSET: Field = Field::new(4, 5, 27);

    pub const IA_DEST_BLEND_FACTOR: Field = Field::new(5, 1, 5);
    pub const IA_SRC_BLEND_FACTOR: Field = Field::new(5, 6, 5);
    pub const IA_BLEND_FUNCTION: Field = Field::new(5, 11, 3);
    pub const STATISTICS_ENABLE: Field = Field::new(5, 14, 1);
    pub const LOGICOP_FUNC: Field = Field::new(5, 15, 4);
    pub const DITHER_ENABLE: Field = Field::new(5, 31, 1);
}

/// Color calculator: everything off except a WHITE logic op and an additive
/// independent-alpha blend.
#[derive(Clone, Copy, Debug)]
pub struct CcUnitState {
    /// Relocated absolute address of the CC viewport object.
    pub viewport_addr: u32,
}

impl CcUnitState {
    pub fn encode(&self) -> [u32; CC_UNIT_DWORDS] {
        debug_assert_eq!(self.viewport_addr & 31, 0);
        let mut dw = [0u32; CC_UNIT_DWORDS];
        cc::STENCIL_ENABLE.set(&mut dw, 0);
        cc::DEPTH_TEST.set(&mut dw, 0);
        cc::LOGICOP_ENABLE.set(&mut dw, 1);
        cc::IA_BLEND_ENABLE.set(&mut dw, 1);
        cc::BLEND_ENABLE.set(&mut dw, 0);
        cc::ALPHA_TEST.set(&mut dw, 0);
        cc::VIEWPORT_STATE_OFFSET.set(&mut dw, self.viewport_addr >> 5);
        cc::DITHER_ENABLE.set(&mut dw, 0);
        cc::LOGICOP_FUNC.set(&mut dw, LOGICOP_WHITE);
        cc::STATISTICS_ENABLE.set(&mut dw, 1);
        cc::IA_BLEND_FUNCTION.set(&mut dw, BLENDFUNCTION_ADD);
        cc::IA_SRC_BLEND_FACTOR.set(&mut dw, BLENDFACTOR_ONE);
        cc::IA_DEST_BLEND_FACTOR.set(&mut dw, BLENDFACTOR_ONE);
        dw
    }
}

/* ------------------------------- CC viewport ------------------------------ */

pub const CC_VIEWPORT_DWORDS: usize = 2;
pub const CC_VIEWPORT_BYTES: u32 = (CC_VIEWPORT_DWORDS * 4) as u32;

/// Depth range wide enough to never clip: the pipeline draws flat rectangles.
pub fn encode_cc_viewport() -> [u32; CC_VIEWPORT_DWORDS] {
    [(-1e35f32).to_bits(), 1e35f32.to_bits()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_set_masks_and_shifts() {
        let mut dw = [0u32; 2];
        Field::new(1, 18, 8).set(&mut dw, 7);
        assert_eq!(dw, [0, 7 << 18]);
    }

    #[test]
    fn grf_blocks_rounds_to_16() {
        assert_eq!(grf_blocks(16), 0);
        assert_eq!(grf_blocks(17), 1);
        assert_eq!(grf_blocks(32), 1);
    }

    #[test]
    fn dst_surface_state_programs_minus_one_geometry() {
        let dw = SurfaceState {
            format: SurfaceFormat::B8G8R8A8Unorm,
            base_addr: 0x0070_0000,
            width: 1024,
            height: 768,
            pitch: 4096,
            tiled: true,
            render_target: true,
        }
        .encode();

        assert_eq!(ss::SURFACE_TYPE.get(&dw), SURFACE_2D);
        assert_eq!(ss::SURFACE_FORMAT.get(&dw), SurfaceFormat::B8G8R8A8Unorm as u32);
        assert_eq!(ss::COLOR_BLEND.get(&dw), 1);
        assert_eq!(dw[1], 0x0070_0000);
        assert_eq!(ss::WIDTH.get(&dw), 1023);
        assert_eq!(ss::HEIGHT.get(&dw), 767);
        assert_eq!(ss::PITCH.get(&dw), 4095);
        assert_eq!(ss::TILED_SURFACE.get(&dw), 1);
        assert_eq!(ss::TILE_WALK.get(&dw), 0);
    }

    #[test]
    fn sampler_state_is_bilinear_clamped() {
        let dw = encode_sampler_state();
        assert_eq!(samp::MIN_FILTER.get(&dw), MAPFILTER_LINEAR);
        assert_eq!(samp::MAG_FILTER.get(&dw), MAPFILTER_LINEAR);
        assert_eq!(samp::R_WRAP.get(&dw), TEXCOORDMODE_CLAMP);
        assert_eq!(samp::S_WRAP.get(&dw), TEXCOORDMODE_CLAMP);
        assert_eq!(samp::T_WRAP.get(&dw), TEXCOORDMODE_CLAMP);
        assert_eq!(dw[2], 0);
        assert_eq!(dw[3], 0);
    }

    #[test]
    fn vs_unit_is_disabled_with_real_urb_allocation() {
        let dw = VsUnitState {
            nr_urb_entries: 8,
            urb_entry_size: 1,
        }
        .encode();
        assert_eq!(thread::NR_URB_ENTRIES.get(&dw), 8);
        assert_eq!(thread::URB_ENTRY_ALLOCATION_SIZE.get(&dw), 0);
        assert_eq!(vs::VS_ENABLE.get(&dw), 0);
        assert_eq!(vs::VERT_CACHE_DISABLE.get(&dw), 1);
    }

    #[test]
    fn sf_unit_points_at_kernel() {
        let dw = SfUnitState {
            kernel_addr: 0x1_0040,
            nr_urb_entries: 1,
            urb_entry_size: 2,
        }
        .encode();
        assert_eq!(thread::KERNEL_START_POINTER.get(&dw), 0x1_0040 >> 6);
        assert_eq!(thread::MAX_THREADS.get(&dw), 0);
        assert_eq!(thread::URB_ENTRY_ALLOCATION_SIZE.get(&dw), 1);
        assert_eq!(sf::DEST_ORG_VBIAS.get(&dw), 0x8);
        assert_eq!(sf::DEST_ORG_HBIAS.get(&dw), 0x8);
        assert_eq!(sf::TRIFAN_PV.get(&dw), 2);
        assert_eq!(sf::CULL_MODE.get(&dw), CULLMODE_NONE);
    }

    #[test]
    fn wm_unit_counts_binding_table_entries() {
        let dw = WmUnitState {
            kernel_addr: 0x2_0000,
            sampler_addr: 0x2_0400,
            binding_table_entry_count: 7,
        }
        .encode();
        assert_eq!(thread::BINDING_TABLE_ENTRY_COUNT.get(&dw), 7);
        assert_eq!(wm::SAMPLER_STATE_POINTER.get(&dw), 0x2_0400 >> 5);
        assert_eq!(wm::SAMPLER_COUNT.get(&dw), 1);
        assert_eq!(wm::MAX_THREADS.get(&dw), PS_MAX_THREADS - 1);
        assert_eq!(wm::ENABLE_16_PIX.get(&dw), 1);
        assert_eq!(wm::ENABLE_8_PIX.get(&dw), 0);
    }

    #[test]
    fn cc_unit_encodes_white_logicop_and_additive_alpha() {
        let dw = CcUnitState {
            viewport_addr: 0x3_0020,
        }
        .encode();
        assert_eq!(cc::LOGICOP_ENABLE.get(&dw), 1);
        assert_eq!(cc::LOGICOP_FUNC.get(&dw), LOGICOP_WHITE);
        assert_eq!(cc::IA_BLEND_ENABLE.get(&dw), 1);
        assert_eq!(cc::IA_BLEND_FUNCTION.get(&dw), BLENDFUNCTION_ADD);
        assert_eq!(cc::IA_SRC_BLEND_FACTOR.get(&dw), BLENDFACTOR_ONE);
        assert_eq!(cc::IA_DEST_BLEND_FACTOR.get(&dw), BLENDFACTOR_ONE);
        assert_eq!(cc::VIEWPORT_STATE_OFFSET.get(&dw), 0x3_0020 >> 5);
        assert_eq!(cc::DEPTH_TEST.get(&dw), 0);
        assert_eq!(cc::STENCIL_ENABLE.get(&dw), 0);
    }

    #[test]
    fn cc_viewport_is_wide_open() {
        let dw = encode_cc_viewport();
        assert_eq!(f32::from_bits(dw[0]), -1e35);
        assert_eq!(f32::from_bits(dw[1]), 1e35);
    }
}
