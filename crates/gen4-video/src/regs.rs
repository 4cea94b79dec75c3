//! Gen4 command opcodes and register field encodings.
//!
//! Everything the batch emitter and the state encoders need to speak to the
//! fixed-function 3D pipeline lives here, so the values exist in exactly one
//! place and the tests can decode what the emitter wrote.

use bitflags::bitflags;

/* ------------------------------- MI commands ------------------------------ */

// MI command opcode lives in bits 28:23.
pub const MI_NOOP: u32 = 0;
pub const MI_FLUSH: u32 = 0x04 << 23;

pub const MI_STATE_INSTRUCTION_CACHE_FLUSH: u32 = 1 << 0;
pub const MI_GLOBAL_SNAPSHOT_RESET: u32 = 1 << 3;

/* ----------------------- Non-pipelined state commands --------------------- */

pub const URB_FENCE: u32 = 0x6000 << 16;
pub const CS_URB_STATE: u32 = 0x6001 << 16;

pub const STATE_BASE_ADDRESS: u32 = 0x6101 << 16;
pub const STATE_SIP: u32 = 0x6102 << 16;
pub const PIPELINE_SELECT: u32 = 0x6104 << 16;
// G4x moved PIPELINE_SELECT; the old encoding raises an undefined-opcode
// interrupt there.
pub const PIPELINE_SELECT_G4X: u32 = 0x6904 << 16;
pub const PIPELINE_SELECT_3D: u32 = 0;

pub const BASE_ADDRESS_MODIFY: u32 = 1 << 0;
// Access upper bound of 0 would bound-check every state fetch; this sentinel
// disables the check.
pub const BASE_ADDRESS_BOUND_DISABLED: u32 = 0x1000_0000;

/* -------------------------- URB fence partitions -------------------------- */

pub const UF0_CS_REALLOC: u32 = 1 << 13;
pub const UF0_VFE_REALLOC: u32 = 1 << 12;
pub const UF0_SF_REALLOC: u32 = 1 << 11;
pub const UF0_CLIP_REALLOC: u32 = 1 << 10;
pub const UF0_GS_REALLOC: u32 = 1 << 9;
pub const UF0_VS_REALLOC: u32 = 1 << 8;

pub const UF1_CLIP_FENCE_SHIFT: u32 = 20;
pub const UF1_GS_FENCE_SHIFT: u32 = 10;
pub const UF1_VS_FENCE_SHIFT: u32 = 0;
pub const UF2_CS_FENCE_SHIFT: u32 = 20;
pub const UF2_SF_FENCE_SHIFT: u32 = 10;

/* --------------------------- Pipelined 3D state --------------------------- */

pub const CMD_3DSTATE_PIPELINED_POINTERS: u32 = 0x7800 << 16;
pub const CMD_3DSTATE_BINDING_TABLE_POINTERS: u32 = 0x7801 << 16;
pub const CMD_3DSTATE_VERTEX_BUFFERS: u32 = 0x7808 << 16;
pub const CMD_3DSTATE_VERTEX_ELEMENTS: u32 = 0x7809 << 16;
pub const CMD_3DSTATE_VF_STATISTICS: u32 = 0x780b << 16;
pub const CMD_3DSTATE_DRAWING_RECTANGLE: u32 = 0x7900 << 16;
pub const CMD_3DSTATE_CONSTANT_COLOR: u32 = 0x7901 << 16;

// Pipelined-pointer slots 1 (GS) and 2 (CLIP) take an enable bit instead of a
// state address when the stage is passed through.
pub const GS_DISABLE: u32 = 0;
pub const CLIP_DISABLE: u32 = 0;

pub const CMD_PIPE_CONTROL: u32 = 0x7a00 << 16;
pub const PIPE_CONTROL_NOWRITE: u32 = 0 << 14;
pub const PIPE_CONTROL_IS_FLUSH: u32 = 1 << 11;

pub const CMD_3DPRIMITIVE: u32 = 0x7b00 << 16;
pub const PRIM_VERTEX_SEQUENTIAL: u32 = 0 << 15;
pub const PRIM_TOPOLOGY_SHIFT: u32 = 10;
pub const PRIM_RECTLIST: u32 = 0x0f;

/* ----------------------------- Vertex fetch ------------------------------- */

pub const VB0_BUFFER_INDEX_SHIFT: u32 = 27;
pub const VB0_VERTEXDATA: u32 = 0 << 26;
pub const VB0_PITCH_SHIFT: u32 = 0;

pub const VE0_VERTEX_BUFFER_INDEX_SHIFT: u32 = 27;
pub const VE0_VALID: u32 = 1 << 26;
pub const VE0_FORMAT_SHIFT: u32 = 16;
pub const VE0_OFFSET_SHIFT: u32 = 0;

pub const VE1_COMPONENT_0_SHIFT: u32 = 28;
pub const VE1_COMPONENT_1_SHIFT: u32 = 24;
pub const VE1_COMPONENT_2_SHIFT: u32 = 20;
pub const VE1_COMPONENT_3_SHIFT: u32 = 16;
pub const VE1_DEST_OFFSET_SHIFT: u32 = 0;

pub const VFCOMPONENT_NOSTORE: u32 = 0;
pub const VFCOMPONENT_STORE_SRC: u32 = 1;
pub const VFCOMPONENT_STORE_0: u32 = 2;
pub const VFCOMPONENT_STORE_1_FLT: u32 = 3;

/* ----------------------------- Surface formats ---------------------------- */

/// Surface format encodings understood by the sampler and render cache.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceFormat {
    R32G32Float = 0x085,
    B8G8R8A8Unorm = 0x0c0,
    B5G6R5Unorm = 0x108,
    R8Unorm = 0x140,
    YCrCbNormal = 0x182,
    YCrCbSwapY = 0x190,
}

pub const SURFACE_2D: u32 = 1;
pub const SURFACE_RETURN_FLOAT32: u32 = 0;

pub const MAPFILTER_LINEAR: u32 = 1;
pub const TEXCOORDMODE_CLAMP: u32 = 2;

pub const CULLMODE_NONE: u32 = 1;

pub const BLENDFUNCTION_ADD: u32 = 0;
pub const BLENDFACTOR_ONE: u32 = 1;

// Logic op raster function table index: fill with all-ones.
pub const LOGICOP_WHITE: u32 = 0xc;

bitflags! {
    /// GEM memory domains named in relocation requests.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DomainFlags: u32 {
        const CPU = 1 << 0;
        const RENDER = 1 << 1;
        const SAMPLER = 1 << 2;
        const COMMAND = 1 << 3;
        const INSTRUCTION = 1 << 4;
        const VERTEX = 1 << 5;
        const GTT = 1 << 6;
    }
}
