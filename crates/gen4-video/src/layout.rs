//! Scratch-region layout for the per-draw state objects.
//!
//! Placement is a single greedy pass in hardware dependency order; every
//! offset is the previous entry's end rounded up to that entry's alignment.
//! The layout depends on the format plan only, never on the destination.

use crate::format::FormatPlan;
use crate::kernels::{self, SF_KERNEL, SIP_KERNEL};
use crate::state::{SAMPLER_STATE_BYTES, SURFACE_STATE_BYTES, WM_UNIT_BYTES};

/// Round `value` up to the nearest multiple of `alignment`.
pub(crate) fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Bytes per vertex: x, y, s, t as f32.
pub const VERTEX_STRIDE: u32 = 16;
/// The shared vertex buffer holds one rectangle (allocated for four corners,
/// three written).
pub const VERTEX_BUFFER_BYTES: u32 = 4 * VERTEX_STRIDE;

/// Byte offsets of every state object inside the scratch region.
#[derive(Clone, Debug)]
pub struct StateLayout {
    pub wm_unit: u32,
    pub sf_kernel: u32,
    pub ps_kernel: u32,
    pub sip_kernel: u32,
    pub samplers: Vec<u32>,
    pub vertex_buffer: u32,
    pub dst_surface: u32,
    pub src_surfaces: Vec<u32>,
    pub binding_table: u32,
    total: u32,
}

impl StateLayout {
    pub fn compute(plan: &FormatPlan) -> StateLayout {
        let n_src = plan.surface_count();
        let mut next = 0u32;
        let mut place = |size: u32, align: u32| {
            let offset = align_up(next, align);
            next = offset + size;
            offset
        };

        // Unit state first, then the kernel binaries it points at.
        let wm_unit = place(WM_UNIT_BYTES, 32);
        let sf_kernel = place(kernels::kernel_size(&SF_KERNEL), 64);
        let ps_kernel = place(kernels::kernel_size(kernels::ps_kernel(plan.kernel)), 64);
        let sip_kernel = place(kernels::kernel_size(&SIP_KERNEL), 64);

        let samplers = (0..n_src).map(|_| place(SAMPLER_STATE_BYTES, 32)).collect();

        // Align the vertex data to the native element size.
        let vertex_buffer = place(VERTEX_BUFFER_BYTES, 8);

        let dst_surface = place(SURFACE_STATE_BYTES, 32);
        let src_surfaces = (0..n_src).map(|_| place(SURFACE_STATE_BYTES, 32)).collect();

        let binding_table = place(plan.binding_table_entries() as u32 * 4, 32);

        StateLayout {
            wm_unit,
            sf_kernel,
            ps_kernel,
            sip_kernel,
            samplers,
            vertex_buffer,
            dst_surface,
            src_surfaces,
            binding_table,
            total: next,
        }
    }

    /// Total scratch bytes the layout occupies.
    pub fn total_size(&self) -> u32 {
        self.total
    }

    /// Offsets in declaration order, for bounds and monotonicity checks.
    pub fn entries(&self) -> Vec<(&'static str, u32)> {
        let mut out = vec![
            ("wm_unit", self.wm_unit),
            ("sf_kernel", self.sf_kernel),
            ("ps_kernel", self.ps_kernel),
            ("sip_kernel", self.sip_kernel),
        ];
        out.extend(self.samplers.iter().map(|&o| ("sampler", o)));
        out.push(("vertex_buffer", self.vertex_buffer));
        out.push(("dst_surface", self.dst_surface));
        out.extend(self.src_surfaces.iter().map(|&o| ("src_surface", o)));
        out.push(("binding_table", self.binding_table));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FourCc, FormatPlan, PlaneOffsets};

    #[test]
    fn align_up_is_identity_on_aligned_values() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
    }

    #[test]
    fn kernels_are_64_byte_aligned_and_ordered() {
        let plan = FormatPlan::select(FourCc::I420, 320, 240, 320, PlaneOffsets::default());
        let layout = StateLayout::compute(&plan);

        assert_eq!(layout.wm_unit, 0);
        assert_eq!(layout.sf_kernel % 64, 0);
        assert_eq!(layout.ps_kernel % 64, 0);
        assert_eq!(layout.sip_kernel % 64, 0);
        assert!(layout.sf_kernel >= WM_UNIT_BYTES);
        assert!(layout.ps_kernel > layout.sf_kernel);
        assert!(layout.sip_kernel > layout.ps_kernel);
        assert_eq!(layout.samplers.len(), 6);
        assert_eq!(layout.src_surfaces.len(), 6);
    }
}
