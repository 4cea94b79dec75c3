//! The textured video blit: lay out and upload pipeline state into the
//! scratch region, then emit the command stream that installs it and draws
//! one rectangle list per destination box.
//!
//! The caller must have idled any concurrent 3D consumer before calling in;
//! command emission here is fire-and-forget.

use tracing::{debug, trace};

use crate::format::{FourCc, FormatPlan, PlaneOffsets};
use crate::gpu::{BoId, Gpu, Mode3d};
use crate::kernels;
use crate::layout::{StateLayout, VERTEX_STRIDE};
use crate::regs::*;
use crate::state::{
    encode_cc_viewport, encode_sampler_state, CcUnitState, SfUnitState, SurfaceState,
    VsUnitState, WmUnitState, CC_VIEWPORT_POINTER_OFFSET,
};
use crate::VideoError;

/* ------------------------------ URB partition ----------------------------- */

// The VS must have 8, 12, 16, 24 or 32 VUEs allocated even when disabled. A
// VUE here is a 256-bit vertex header plus 4 floats of vertex data: one
// 512-bit URB entry.
const URB_VS_ENTRIES: u32 = 8;
const URB_VS_ENTRY_SIZE: u32 = 1;

const URB_GS_ENTRIES: u32 = 0;
const URB_GS_ENTRY_SIZE: u32 = 0;

const URB_CLIP_ENTRIES: u32 = 0;
const URB_CLIP_ENTRY_SIZE: u32 = 0;

// The SF kernel outputs four 256-bit registers per vertex: entry size 2. One
// entry suffices; the rectangles are large and WM threads on different
// rectangles buy nothing.
const URB_SF_ENTRIES: u32 = 1;
const URB_SF_ENTRY_SIZE: u32 = 2;

const URB_CS_ENTRIES: u32 = 0;

/* ------------------------------- Caller data ------------------------------ */

/// Destination pixmap as the render cache sees it.
#[derive(Clone, Copy, Debug)]
pub struct Pixmap {
    /// Device byte offset of the pixel data.
    pub offset: u32,
    pub pitch: u32,
    pub tiled: bool,
    pub bits_per_pixel: u8,
    /// Screen-to-pixmap translation when the pixmap is a redirected window.
    pub origin: (i16, i16),
}

#[derive(Clone, Copy, Debug)]
pub struct ScreenInfo {
    pub width: u16,
    pub height: u16,
    /// G4x parts renumbered PIPELINE_SELECT.
    pub g4x: bool,
}

/// One decoded frame in the source buffer object.
#[derive(Clone, Copy, Debug)]
pub struct VideoFrame {
    pub fourcc: u32,
    pub width: u16,
    pub height: u16,
    pub pitch: u32,
    pub planes: PlaneOffsets,
}

/// Destination box, exclusive on x2/y2, screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DstBox {
    pub x1: i16,
    pub y1: i16,
    pub x2: i16,
    pub y2: i16,
}

/* -------------------------------- Pipeline -------------------------------- */

/// Owns the resolution-independent pipeline state objects, created lazily on
/// first draw and held until [`VideoPipeline::release`]. Format or geometry
/// changes never invalidate them.
#[derive(Debug, Default)]
pub struct VideoPipeline {
    vs_bo: Option<BoId>,
    sf_bo: Option<BoId>,
    cc_bo: Option<BoId>,
    cc_vp_bo: Option<BoId>,
}

impl VideoPipeline {
    pub fn new() -> VideoPipeline {
        VideoPipeline::default()
    }

    /// Draw `frame`, scaled from a `src_w`x`src_h` window of it onto a
    /// `drw_w`x`drw_h` destination, clipped to `region`.
    ///
    /// Unknown fourcc codes draw nothing and succeed; upstream negotiation
    /// has already rejected them, so this is a belt check, not an error.
    ///
    /// Panics if the computed state layout exceeds the scratch region: that
    /// capacity is a build-time contract, not a runtime condition.
    #[allow(clippy::too_many_arguments)]
    pub fn render<G: Gpu>(
        &mut self,
        gpu: &mut G,
        frame: &VideoFrame,
        dst: &Pixmap,
        screen: &ScreenInfo,
        region: &[DstBox],
        src_w: u16,
        src_h: u16,
        drw_w: u16,
        drw_h: u16,
    ) -> Result<(), VideoError> {
        let Some(fourcc) = FourCc::from_u32(frame.fourcc) else {
            debug!(fourcc = frame.fourcc, "unknown video fourcc, skipping blit");
            return Ok(());
        };

        let plan = FormatPlan::select(fourcc, frame.width, frame.height, frame.pitch, frame.planes);
        let layout = StateLayout::compute(&plan);

        let scratch_base = gpu.scratch_base();
        assert_eq!(scratch_base & 63, 0, "scratch base must be 64-byte aligned");

        write_states(gpu, &layout, &plan, dst, screen, scratch_base);
        self.ensure_persistent(gpu, scratch_base + layout.sf_kernel)?;

        gpu.note_3d_mode(Mode3d::Video);
        self.emit_invariant_state(gpu, screen, scratch_base, &layout);
        self.emit_pipeline_state(gpu, screen, scratch_base, &layout);

        // Texture coordinates are normalized: source-window fraction per
        // destination pixel, over the input dimension.
        let src_scale_x = (f32::from(src_w) / f32::from(frame.width)) / f32::from(drw_w);
        let src_scale_y = (f32::from(src_h) / f32::from(frame.height)) / f32::from(drw_h);

        let dxo = region.iter().map(|b| b.x1).min().unwrap_or(0);
        let dyo = region.iter().map(|b| b.y1).min().unwrap_or(0);

        for (i, b) in region.iter().enumerate() {
            if i != 0 {
                // One little vertex buffer is reused for every rectangle;
                // the GPU must be done reading it before we scribble the
                // next three vertices.
                gpu.wait_for_prior_draw();
            }

            trace!(?b, "video rectangle");
            write_rect_vertices(
                gpu.scratch_mut(),
                layout.vertex_buffer,
                b,
                (dxo, dyo),
                dst.origin,
                src_scale_x,
                src_scale_y,
            );

            gpu.batch_begin(6);
            gpu.batch_emit(
                CMD_3DPRIMITIVE
                    | PRIM_VERTEX_SEQUENTIAL
                    | (PRIM_RECTLIST << PRIM_TOPOLOGY_SHIFT)
                    | 4,
            );
            gpu.batch_emit(3); // vertex count per instance
            gpu.batch_emit(0); // start vertex offset
            gpu.batch_emit(1); // single instance
            gpu.batch_emit(0); // start instance location
            gpu.batch_emit(0); // index buffer offset, ignored
            gpu.batch_advance();

            gpu.mark_draw_point();
        }

        Ok(())
    }

    /// Drop the persistent state objects. The next draw recreates them.
    pub fn release<G: Gpu>(&mut self, gpu: &mut G) {
        for bo in [
            self.vs_bo.take(),
            self.sf_bo.take(),
            self.cc_bo.take(),
            self.cc_vp_bo.take(),
        ]
        .into_iter()
        .flatten()
        {
            gpu.bo_unreference(bo);
        }
    }

    fn ensure_persistent<G: Gpu>(
        &mut self,
        gpu: &mut G,
        sf_kernel_addr: u32,
    ) -> Result<(), VideoError> {
        if self.vs_bo.is_none() {
            let bo = gpu.alloc("textured video vs state", 4096, 4096)?;
            let dw = VsUnitState {
                nr_urb_entries: URB_VS_ENTRIES,
                urb_entry_size: URB_VS_ENTRY_SIZE,
            }
            .encode();
            gpu.bo_write(bo, 0, dword_bytes(&dw).as_slice());
            self.vs_bo = Some(bo);
        }

        if self.sf_bo.is_none() {
            let bo = gpu.alloc("textured video sf state", 4096, 4096)?;
            let dw = SfUnitState {
                kernel_addr: sf_kernel_addr,
                nr_urb_entries: URB_SF_ENTRIES,
                urb_entry_size: URB_SF_ENTRY_SIZE,
            }
            .encode();
            gpu.bo_write(bo, 0, dword_bytes(&dw).as_slice());
            self.sf_bo = Some(bo);
        }

        if self.cc_bo.is_none() {
            let vp = gpu.alloc("textured video cc viewport", 4096, 4096)?;
            gpu.bo_write(vp, 0, dword_bytes(&encode_cc_viewport()).as_slice());

            let cc = gpu.alloc("textured video cc state", 4096, 4096)?;
            let viewport_addr = gpu.bo_reloc(
                cc,
                CC_VIEWPORT_POINTER_OFFSET,
                vp,
                0,
                DomainFlags::INSTRUCTION,
                DomainFlags::empty(),
            );
            let dw = CcUnitState { viewport_addr }.encode();
            gpu.bo_write(cc, 0, dword_bytes(&dw).as_slice());

            self.cc_vp_bo = Some(vp);
            self.cc_bo = Some(cc);
        }

        Ok(())
    }

    /// Cache flush, pipeline select, base addresses, system instruction
    /// pointer. Zeroed base addresses make every state offset absolute.
    fn emit_invariant_state<G: Gpu>(
        &self,
        gpu: &mut G,
        screen: &ScreenInfo,
        scratch_base: u32,
        layout: &StateLayout,
    ) {
        gpu.batch_begin(2);
        gpu.batch_emit(MI_FLUSH | MI_STATE_INSTRUCTION_CACHE_FLUSH | MI_GLOBAL_SNAPSHOT_RESET);
        gpu.batch_emit(MI_NOOP);
        gpu.batch_advance();

        gpu.batch_begin(12);
        if screen.g4x {
            gpu.batch_emit(PIPELINE_SELECT_G4X | PIPELINE_SELECT_3D);
        } else {
            gpu.batch_emit(PIPELINE_SELECT | PIPELINE_SELECT_3D);
        }

        gpu.batch_emit(CS_URB_STATE | 0);
        gpu.batch_emit(0); // no constant URBs

        gpu.batch_emit(STATE_BASE_ADDRESS | 4);
        gpu.batch_emit(0 | BASE_ADDRESS_MODIFY); // general state base
        gpu.batch_emit(0 | BASE_ADDRESS_MODIFY); // surface state base
        gpu.batch_emit(0 | BASE_ADDRESS_MODIFY); // media state base
        gpu.batch_emit(BASE_ADDRESS_BOUND_DISABLED | BASE_ADDRESS_MODIFY);
        gpu.batch_emit(BASE_ADDRESS_BOUND_DISABLED | BASE_ADDRESS_MODIFY);

        gpu.batch_emit(STATE_SIP | 0);
        gpu.batch_emit(scratch_base + layout.sip_kernel);

        gpu.batch_emit(MI_NOOP);
        gpu.batch_advance();
    }

    /// The per-call pipeline programming block: binding table, drawing
    /// rectangle, stage pointers, URB fence, vertex buffer and elements.
    fn emit_pipeline_state<G: Gpu>(
        &self,
        gpu: &mut G,
        screen: &ScreenInfo,
        scratch_base: u32,
        layout: &StateLayout,
    ) {
        let urb_vs_start = 0;
        let urb_vs_size = URB_VS_ENTRIES * URB_VS_ENTRY_SIZE;
        let urb_gs_start = urb_vs_start + urb_vs_size;
        let urb_gs_size = URB_GS_ENTRIES * URB_GS_ENTRY_SIZE;
        let urb_clip_start = urb_gs_start + urb_gs_size;
        let urb_clip_size = URB_CLIP_ENTRIES * URB_CLIP_ENTRY_SIZE;
        let urb_sf_start = urb_clip_start + urb_clip_size;
        let urb_sf_size = URB_SF_ENTRIES * URB_SF_ENTRY_SIZE;
        let urb_cs_start = urb_sf_start + urb_sf_size;

        let vs_bo = self.vs_bo.expect("persistent state created before emission");
        let sf_bo = self.sf_bo.expect("persistent state created before emission");
        let cc_bo = self.cc_bo.expect("persistent state created before emission");

        gpu.batch_begin(42);

        gpu.batch_emit(CMD_3DSTATE_VF_STATISTICS | 1);

        gpu.batch_emit(CMD_PIPE_CONTROL | PIPE_CONTROL_NOWRITE | PIPE_CONTROL_IS_FLUSH | 2);
        gpu.batch_emit(0); // destination address
        gpu.batch_emit(0); // immediate data low
        gpu.batch_emit(0); // immediate data high

        // Only the pixel shader reads surfaces.
        gpu.batch_emit(CMD_3DSTATE_BINDING_TABLE_POINTERS | 4);
        gpu.batch_emit(0); // vs
        gpu.batch_emit(0); // gs
        gpu.batch_emit(0); // clip
        gpu.batch_emit(0); // sf
        gpu.batch_emit(scratch_base + layout.binding_table);

        // Magenta, so a blend-constant leak is visible immediately.
        gpu.batch_emit(CMD_3DSTATE_CONSTANT_COLOR | 3);
        gpu.batch_emit(1.0f32.to_bits());
        gpu.batch_emit(0.0f32.to_bits());
        gpu.batch_emit(1.0f32.to_bits());
        gpu.batch_emit(1.0f32.to_bits());

        // The drawing rectangle always clips; spanning the screen makes it
        // a no-op.
        gpu.batch_emit(CMD_3DSTATE_DRAWING_RECTANGLE | 2);
        gpu.batch_emit(0); // ymin, xmin
        gpu.batch_emit(
            u32::from(screen.width - 1) | (u32::from(screen.height - 1) << 16),
        );
        gpu.batch_emit(0); // yorigin, xorigin

        gpu.batch_emit(CMD_3DSTATE_PIPELINED_POINTERS | 5);
        gpu.batch_reloc(vs_bo, DomainFlags::INSTRUCTION, DomainFlags::empty(), 0);
        gpu.batch_emit(GS_DISABLE); // passthrough
        gpu.batch_emit(CLIP_DISABLE); // passthrough
        gpu.batch_reloc(sf_bo, DomainFlags::INSTRUCTION, DomainFlags::empty(), 0);
        gpu.batch_emit(scratch_base + layout.wm_unit);
        gpu.batch_reloc(cc_bo, DomainFlags::INSTRUCTION, DomainFlags::empty(), 0);

        gpu.batch_emit(
            URB_FENCE
                | UF0_CS_REALLOC
                | UF0_SF_REALLOC
                | UF0_CLIP_REALLOC
                | UF0_GS_REALLOC
                | UF0_VS_REALLOC
                | 1,
        );
        gpu.batch_emit(
            ((urb_clip_start + urb_clip_size) << UF1_CLIP_FENCE_SHIFT)
                | ((urb_gs_start + urb_gs_size) << UF1_GS_FENCE_SHIFT)
                | ((urb_vs_start + urb_vs_size) << UF1_VS_FENCE_SHIFT),
        );
        gpu.batch_emit(
            (urb_cs_start << UF2_CS_FENCE_SHIFT) | ((urb_sf_start + urb_sf_size) << UF2_SF_FENCE_SHIFT),
        );

        gpu.batch_emit(CS_URB_STATE | 0);
        gpu.batch_emit(URB_CS_ENTRIES); // no constant URBs

        gpu.batch_emit(CMD_3DSTATE_VERTEX_BUFFERS | 2);
        gpu.batch_emit(
            (0 << VB0_BUFFER_INDEX_SHIFT) | VB0_VERTEXDATA | (VERTEX_STRIDE << VB0_PITCH_SHIFT),
        );
        gpu.batch_emit(scratch_base + layout.vertex_buffer);
        gpu.batch_emit(3); // three corners of the rectangle

        gpu.batch_emit(CMD_3DSTATE_VERTEX_ELEMENTS | 3);
        // offset 0: X, Y -> {X, Y, 1.0, 1.0}
        gpu.batch_emit(
            (0 << VE0_VERTEX_BUFFER_INDEX_SHIFT)
                | VE0_VALID
                | ((SurfaceFormat::R32G32Float as u32) << VE0_FORMAT_SHIFT)
                | (0 << VE0_OFFSET_SHIFT),
        );
        gpu.batch_emit(
            (VFCOMPONENT_STORE_SRC << VE1_COMPONENT_0_SHIFT)
                | (VFCOMPONENT_STORE_SRC << VE1_COMPONENT_1_SHIFT)
                | (VFCOMPONENT_STORE_1_FLT << VE1_COMPONENT_2_SHIFT)
                | (VFCOMPONENT_STORE_1_FLT << VE1_COMPONENT_3_SHIFT)
                | (0 << VE1_DEST_OFFSET_SHIFT),
        );
        // offset 8: S0, T0 -> {S0, T0, 1.0, 1.0}
        gpu.batch_emit(
            (0 << VE0_VERTEX_BUFFER_INDEX_SHIFT)
                | VE0_VALID
                | ((SurfaceFormat::R32G32Float as u32) << VE0_FORMAT_SHIFT)
                | (8 << VE0_OFFSET_SHIFT),
        );
        gpu.batch_emit(
            (VFCOMPONENT_STORE_SRC << VE1_COMPONENT_0_SHIFT)
                | (VFCOMPONENT_STORE_SRC << VE1_COMPONENT_1_SHIFT)
                | (VFCOMPONENT_STORE_1_FLT << VE1_COMPONENT_2_SHIFT)
                | (VFCOMPONENT_STORE_1_FLT << VE1_COMPONENT_3_SHIFT)
                | (4 << VE1_DEST_OFFSET_SHIFT),
        );

        gpu.batch_emit(MI_NOOP); // pad to quadword
        gpu.batch_advance();
    }
}

/* ------------------------------ Scratch writes ---------------------------- */

fn dword_bytes<const N: usize>(dwords: &[u32; N]) -> Vec<u8> {
    let mut out = Vec::with_capacity(N * 4);
    for dw in dwords {
        out.extend_from_slice(&dw.to_le_bytes());
    }
    out
}

fn write_dwords(scratch: &mut [u8], offset: u32, dwords: &[u32]) {
    let mut at = offset as usize;
    for dw in dwords {
        scratch[at..at + 4].copy_from_slice(&dw.to_le_bytes());
        at += 4;
    }
}

fn write_bytes(scratch: &mut [u8], offset: u32, bytes: &[u8]) {
    scratch[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
}

/// Populate the scratch region per the layout: kernels, surface and sampler
/// states, the WM unit and the binding table. All offsets written into state
/// are absolute (scratch base added).
fn write_states<G: Gpu>(
    gpu: &mut G,
    layout: &StateLayout,
    plan: &FormatPlan,
    dst: &Pixmap,
    screen: &ScreenInfo,
    scratch_base: u32,
) {
    let scratch = gpu.scratch_mut();
    let total = layout.total_size() as usize;
    assert!(
        total <= scratch.len(),
        "state layout needs {total} bytes, scratch region holds {}",
        scratch.len()
    );
    scratch[..total].fill(0);

    write_bytes(scratch, layout.sip_kernel, kernels::kernel_bytes(&kernels::SIP_KERNEL));
    write_bytes(scratch, layout.sf_kernel, kernels::kernel_bytes(&kernels::SF_KERNEL));
    write_bytes(
        scratch,
        layout.ps_kernel,
        kernels::kernel_bytes(kernels::ps_kernel(plan.kernel)),
    );

    let dst_format = if dst.bits_per_pixel == 16 {
        SurfaceFormat::B5G6R5Unorm
    } else {
        SurfaceFormat::B8G8R8A8Unorm
    };
    write_dwords(
        scratch,
        layout.dst_surface,
        &SurfaceState {
            format: dst_format,
            base_addr: dst.offset,
            width: screen.width,
            height: screen.height,
            pitch: dst.pitch,
            tiled: dst.tiled,
            render_target: true,
        }
        .encode(),
    );

    for (surface, &offset) in plan.surfaces.iter().zip(&layout.src_surfaces) {
        write_dwords(
            scratch,
            offset,
            &SurfaceState {
                format: plan.surface_format,
                base_addr: surface.base_offset,
                width: surface.width,
                height: surface.height,
                pitch: surface.pitch,
                tiled: false,
                render_target: false,
            }
            .encode(),
        );
    }

    for &offset in &layout.samplers {
        write_dwords(scratch, offset, &encode_sampler_state());
    }

    let mut binding = vec![scratch_base + layout.dst_surface];
    binding.extend(layout.src_surfaces.iter().map(|&o| scratch_base + o));
    write_dwords(scratch, layout.binding_table, &binding);

    write_dwords(
        scratch,
        layout.wm_unit,
        &WmUnitState {
            kernel_addr: scratch_base + layout.ps_kernel,
            sampler_addr: scratch_base + layout.samplers[0],
            binding_table_entry_count: plan.binding_table_entries() as u32,
        }
        .encode(),
    );
}

/// Three corners suffice for a rectangle list: bottom-right, bottom-left,
/// top-left, each (s, t, x, y).
fn write_rect_vertices(
    scratch: &mut [u8],
    vb_offset: u32,
    b: &DstBox,
    dest_origin: (i16, i16),
    pix_origin: (i16, i16),
    src_scale_x: f32,
    src_scale_y: f32,
) {
    let (dxo, dyo) = dest_origin;
    let (pix_xoff, pix_yoff) = pix_origin;

    let tex_x = |x: i16| f32::from(x - dxo) * src_scale_x;
    let tex_y = |y: i16| f32::from(y - dyo) * src_scale_y;
    let dst_x = |x: i16| f32::from(x + pix_xoff);
    let dst_y = |y: i16| f32::from(y + pix_yoff);

    let verts: [f32; 12] = [
        tex_x(b.x2), tex_y(b.y2), dst_x(b.x2), dst_y(b.y2),
        tex_x(b.x1), tex_y(b.y2), dst_x(b.x1), dst_y(b.y2),
        tex_x(b.x1), tex_y(b.y1), dst_x(b.x1), dst_y(b.y1),
    ];

    let mut at = vb_offset as usize;
    for v in verts {
        scratch[at..at + 4].copy_from_slice(&v.to_bits().to_le_bytes());
        at += 4;
    }
}
