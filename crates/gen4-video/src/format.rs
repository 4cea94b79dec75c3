//! Source pixel formats and the per-surface sampling plan derived from them.

use crate::regs::SurfaceFormat;

/// Byte offsets of the decoded video planes inside the source buffer object.
///
/// Packed formats only use `y`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneOffsets {
    pub y: u32,
    pub u: u32,
    pub v: u32,
}

/// Which pixel-shader binary the plan samples with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelVariant {
    /// Interleaved Y/Cb/Cr in a single surface.
    Packed,
    /// Separate 8-bit luma/chroma planes, sampled as R8.
    Planar,
}

/// Video fourcc codes the blit path understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FourCc {
    Uyvy,
    Yuy2,
    I420,
    Yv12,
}

impl FourCc {
    /// Decode a little-endian packed ASCII fourcc. Unknown codes are the
    /// caller's cue to skip drawing entirely.
    pub fn from_u32(id: u32) -> Option<Self> {
        match &id.to_le_bytes() {
            b"UYVY" => Some(Self::Uyvy),
            b"YUY2" => Some(Self::Yuy2),
            b"I420" => Some(Self::I420),
            b"YV12" => Some(Self::Yv12),
            _ => None,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(self, Self::I420 | Self::Yv12)
    }
}

/// Geometry of one source surface slot as the sampler will see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceSurface {
    pub base_offset: u32,
    pub width: u16,
    pub height: u16,
    pub pitch: u32,
}

/// Everything about the source that the state builder needs, fully determined
/// by the fourcc and the input geometry.
#[derive(Clone, Debug)]
pub struct FormatPlan {
    pub fourcc: FourCc,
    pub surface_format: SurfaceFormat,
    pub kernel: KernelVariant,
    pub surfaces: Vec<SourceSurface>,
}

impl FormatPlan {
    /// Build the sampling plan for a frame.
    ///
    /// Planar frames fan out into six surface slots: the luma plane twice at
    /// full size with doubled pitch (two lines of the plane per surface row),
    /// then the V and U planes twice each at floor(w/2) x floor(h/2). The
    /// duplicate slots feed the planar kernel's paired sample messages and
    /// must stay geometry-identical.
    pub fn select(
        fourcc: FourCc,
        width: u16,
        height: u16,
        pitch: u32,
        planes: PlaneOffsets,
    ) -> FormatPlan {
        let packed = |surface_format| FormatPlan {
            fourcc,
            surface_format,
            kernel: KernelVariant::Packed,
            surfaces: vec![SourceSurface {
                base_offset: planes.y,
                width,
                height,
                pitch,
            }],
        };

        match fourcc {
            FourCc::Uyvy => packed(SurfaceFormat::YCrCbSwapY),
            FourCc::Yuy2 => packed(SurfaceFormat::YCrCbNormal),
            FourCc::I420 | FourCc::Yv12 => {
                let luma = SourceSurface {
                    base_offset: planes.y,
                    width,
                    height,
                    pitch: pitch * 2,
                };
                let chroma = |base_offset| SourceSurface {
                    base_offset,
                    width: width / 2,
                    height: height / 2,
                    pitch,
                };
                FormatPlan {
                    fourcc,
                    surface_format: SurfaceFormat::R8Unorm,
                    kernel: KernelVariant::Planar,
                    surfaces: vec![
                        luma,
                        luma,
                        chroma(planes.v),
                        chroma(planes.v),
                        chroma(planes.u),
                        chroma(planes.u),
                    ],
                }
            }
        }
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Binding table slots: one render target plus one slot per source
    /// surface.
    pub fn binding_table_entries(&self) -> usize {
        1 + self.surfaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets() -> PlaneOffsets {
        PlaneOffsets {
            y: 0,
            u: 0x4_b000,
            v: 0x5_e000,
        }
    }

    #[test]
    fn fourcc_decodes_known_codes() {
        assert_eq!(FourCc::from_u32(u32::from_le_bytes(*b"YUY2")), Some(FourCc::Yuy2));
        assert_eq!(FourCc::from_u32(u32::from_le_bytes(*b"YV12")), Some(FourCc::Yv12));
        assert_eq!(FourCc::from_u32(u32::from_le_bytes(*b"NV12")), None);
    }

    #[test]
    fn packed_plan_is_one_full_size_surface() {
        let plan = FormatPlan::select(FourCc::Uyvy, 720, 576, 1440, offsets());
        assert_eq!(plan.kernel, KernelVariant::Packed);
        assert_eq!(plan.surface_format, SurfaceFormat::YCrCbSwapY);
        assert_eq!(
            plan.surfaces,
            vec![SourceSurface {
                base_offset: 0,
                width: 720,
                height: 576,
                pitch: 1440,
            }]
        );
    }

    #[test]
    fn planar_plan_duplicates_planes_in_y_v_u_order() {
        let plan = FormatPlan::select(FourCc::I420, 720, 576, 720, offsets());
        assert_eq!(plan.kernel, KernelVariant::Planar);
        assert_eq!(plan.surface_count(), 6);
        assert_eq!(plan.binding_table_entries(), 7);

        assert_eq!(plan.surfaces[0], plan.surfaces[1]);
        assert_eq!(plan.surfaces[0].pitch, 1440);
        assert_eq!(plan.surfaces[0].width, 720);

        assert_eq!(plan.surfaces[2], plan.surfaces[3]);
        assert_eq!(plan.surfaces[4], plan.surfaces[5]);
        assert_eq!(plan.surfaces[2].base_offset, 0x5_e000);
        assert_eq!(plan.surfaces[4].base_offset, 0x4_b000);
        assert_eq!(plan.surfaces[2].width, 360);
        assert_eq!(plan.surfaces[2].height, 288);
        assert_eq!(plan.surfaces[2].pitch, 720);
    }

    #[test]
    fn odd_planar_dimensions_floor_divide() {
        let plan = FormatPlan::select(FourCc::Yv12, 639, 479, 640, offsets());
        assert_eq!(plan.surfaces[2].width, 319);
        assert_eq!(plan.surfaces[2].height, 239);
    }
}
