//! Hand-assembled gen4 EU kernel binaries for the video blit path.
//!
//! These are opaque instruction blobs: the pipeline uploads them, aligns them
//! to 64 bytes and points unit state at them, nothing more. One instruction is
//! four dwords.

use crate::format::KernelVariant;

/// System instruction pointer kernel: park any exception thread on a wait.
pub static SIP_KERNEL: [[u32; 4]; 10] = [
    /* wait (1) a0<1>UW a145<0,1,0>UW */
    [0x0000_0030, 0x2000_0108, 0x0000_1220, 0x0000_0000],
    /* nop (4) g0<1>UD */
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
    [0x0040_007e, 0x2000_0c21, 0x0069_0000, 0x0000_0000],
];

/// Setup kernel: computes dA/dx and dA/dy interpolation coefficients for the
/// texture coordinate attribute and hands them back to the SF unit. Uses 16
/// GRF registers.
pub static SF_KERNEL: [[u32; 4]; 14] = [
    [0x0060_0001, 0x2004_021e, 0x008d_0000, 0x0000_0000],
    [0x0060_0001, 0x2024_021e, 0x008d_0040, 0x0000_0000],
    [0x0040_0040, 0x20e0_77bd, 0x0069_0080, 0x0069_40a0],
    [0x0040_0040, 0x2100_77bd, 0x0069_0080, 0x0069_40c0],
    [0x0060_0031, 0x2160_1fbd, 0x008d_00e0, 0x0111_0001],
    [0x0060_0031, 0x2180_1fbd, 0x008d_0100, 0x0111_0001],
    [0x0040_0041, 0x21a0_77bd, 0x0069_0120, 0x0000_0160],
    [0x0040_0041, 0x21c0_77bd, 0x0069_0140, 0x0000_0180],
    [0x0040_0048, 0x21e0_77bd, 0x0069_0160, 0x0069_41a0],
    [0x0040_0048, 0x2200_77bd, 0x0069_0180, 0x0069_41c0],
    [0x0060_0001, 0x204c_00be, 0x008d_01e0, 0x0000_0000],
    [0x0060_0001, 0x206c_00be, 0x008d_0200, 0x0000_0000],
    [0x0060_0001, 0x208c_00be, 0x008d_0220, 0x0000_0000],
    [0x0060_0031, 0x2000_1fbc, 0x008d_0040, 0x8640_c800],
];

/// Packed-format pixel kernel: per-pixel coordinate setup, affine texcoord
/// interpolation, one ARGB sample of the interleaved surface, YUV->RGB color
/// conversion, framebuffer write. Uses under 32 GRF registers.
pub static PS_KERNEL_PACKED: [[u32; 4]; 30] = [
    [0x0080_0040, 0x2400_77bd, 0x008d_0200, 0x008d_0280],
    [0x0080_0040, 0x2440_77bd, 0x008d_0240, 0x008d_02c0],
    [0x0060_0001, 0x2480_01a2, 0x008d_0400, 0x0000_0000],
    [0x0060_0001, 0x24a0_01a2, 0x008d_0440, 0x0000_0000],
    [0x0080_0059, 0x2500_77bd, 0x0000_0060, 0x008d_2400],
    [0x0080_0059, 0x2540_77bd, 0x0000_0064, 0x008d_2440],
    [0x0080_0048, 0x2580_77bd, 0x008d_2500, 0x0000_0068],
    [0x0080_0048, 0x25c0_77bd, 0x008d_2540, 0x0000_006c],
    [0x0060_0001, 0x2600_0022, 0x008d_0000, 0x0000_0000],
    [0x0080_0001, 0x2640_01e2, 0x008d_2580, 0x0000_0000],
    [0x0080_0001, 0x2680_01e2, 0x008d_25c0, 0x0000_0000],
    [0x0060_0031, 0x2700_1fa9, 0x008d_2600, 0x0282_1001],
    [0x0080_0040, 0x2800_4629, 0x008d_2700, 0xfffe_fffe],
    [0x0080_0041, 0x2840_75bd, 0x008d_2800, 0x0000_00a0],
    [0x0080_0040, 0x2880_4629, 0x008d_2740, 0xffd8_ffd8],
    [0x0080_0041, 0x28c0_75bd, 0x008d_2880, 0x0000_00a4],
    [0x0080_0048, 0x2900_77bd, 0x008d_2840, 0x0000_00a8],
    [0x0080_0048, 0x2940_77bd, 0x008d_28c0, 0x0000_00ac],
    [0x0080_0048, 0x2980_77bd, 0x008d_2900, 0x0000_00b0],
    [0x0080_0048, 0x29c0_77bd, 0x008d_2940, 0x0000_00b4],
    [0x0080_0001, 0x2a00_01e0, 0x008d_2980, 0x0000_0000],
    [0x0080_0001, 0x2a40_01e0, 0x008d_29c0, 0x0000_0000],
    [0x0080_0001, 0x2a80_01e0, 0x008d_2900, 0x0000_0000],
    [0x0080_0001, 0x2ac0_0de0, 0x0000_0000, 0x3f80_0000],
    [0x0080_0001, 0x2b00_01e0, 0x008d_2a00, 0x0000_0000],
    [0x0080_0001, 0x2b40_01e0, 0x008d_2a40, 0x0000_0000],
    [0x0080_0001, 0x2b80_01e0, 0x008d_2a80, 0x0000_0000],
    [0x0080_0001, 0x2bc0_01e0, 0x008d_2ac0, 0x0000_0000],
    [0x0060_0001, 0x2c00_0022, 0x008d_0000, 0x0000_0000],
    [0x0080_0031, 0x2000_1fbc, 0x008d_2c00, 0x8511_0005],
];

/// Planar-format pixel kernel: same structure as the packed variant but with
/// three paired R8 sample messages (luma plus duplicated half-resolution
/// chroma planes) feeding the color conversion.
pub static PS_KERNEL_PLANAR: [[u32; 4]; 38] = [
    [0x0080_0040, 0x2400_77bd, 0x008d_0200, 0x008d_0280],
    [0x0080_0040, 0x2440_77bd, 0x008d_0240, 0x008d_02c0],
    [0x0060_0001, 0x2480_01a2, 0x008d_0400, 0x0000_0000],
    [0x0060_0001, 0x24a0_01a2, 0x008d_0440, 0x0000_0000],
    [0x0080_0059, 0x2500_77bd, 0x0000_0060, 0x008d_2400],
    [0x0080_0059, 0x2540_77bd, 0x0000_0064, 0x008d_2440],
    [0x0080_0048, 0x2580_77bd, 0x008d_2500, 0x0000_0068],
    [0x0080_0048, 0x25c0_77bd, 0x008d_2540, 0x0000_006c],
    [0x0060_0001, 0x2600_0022, 0x008d_0000, 0x0000_0000],
    [0x0080_0001, 0x2640_01e2, 0x008d_2580, 0x0000_0000],
    [0x0080_0001, 0x2680_01e2, 0x008d_25c0, 0x0000_0000],
    [0x0060_0031, 0x2700_1fa9, 0x008d_2600, 0x0182_1001],
    [0x0080_0041, 0x2740_75bd, 0x008d_2580, 0x0000_0070],
    [0x0080_0041, 0x2780_75bd, 0x008d_25c0, 0x0000_0074],
    [0x0060_0001, 0x27c0_0022, 0x008d_0000, 0x0000_0000],
    [0x0080_0001, 0x2800_01e2, 0x008d_2740, 0x0000_0000],
    [0x0080_0001, 0x2840_01e2, 0x008d_2780, 0x0000_0000],
    [0x0060_0031, 0x2900_1fa9, 0x008d_27c0, 0x0182_1003],
    [0x0060_0031, 0x2940_1fa9, 0x008d_27c0, 0x0182_1005],
    [0x0080_0040, 0x2a00_4629, 0x008d_2700, 0xfff0_fff0],
    [0x0080_0041, 0x2a40_75bd, 0x008d_2a00, 0x0000_00a0],
    [0x0080_0040, 0x2a80_4629, 0x008d_2900, 0xff80_ff80],
    [0x0080_0040, 0x2ac0_4629, 0x008d_2940, 0xff80_ff80],
    [0x0080_0041, 0x2b00_75bd, 0x008d_2a80, 0x0000_00a4],
    [0x0080_0041, 0x2b40_75bd, 0x008d_2ac0, 0x0000_00a8],
    [0x0080_0048, 0x2b80_77bd, 0x008d_2a40, 0x0000_00ac],
    [0x0080_0048, 0x2bc0_77bd, 0x008d_2b00, 0x0000_00b0],
    [0x0080_0048, 0x2c00_77bd, 0x008d_2b40, 0x0000_00b4],
    [0x0080_0048, 0x2c40_77bd, 0x008d_2b80, 0x0000_00b8],
    [0x0080_0001, 0x2d00_01e0, 0x008d_2bc0, 0x0000_0000],
    [0x0080_0001, 0x2d40_01e0, 0x008d_2c00, 0x0000_0000],
    [0x0080_0001, 0x2d80_01e0, 0x008d_2c40, 0x0000_0000],
    [0x0080_0001, 0x2dc0_0de0, 0x0000_0000, 0x3f80_0000],
    [0x0080_0001, 0x2e00_01e0, 0x008d_2d00, 0x0000_0000],
    [0x0080_0001, 0x2e40_01e0, 0x008d_2d40, 0x0000_0000],
    [0x0080_0001, 0x2e80_01e0, 0x008d_2d80, 0x0000_0000],
    [0x0060_0001, 0x2f00_0022, 0x008d_0000, 0x0000_0000],
    [0x0080_0031, 0x2000_1fbc, 0x008d_2f00, 0x8511_0005],
];

/// The PS binary for a sampling plan.
pub fn ps_kernel(variant: KernelVariant) -> &'static [[u32; 4]] {
    match variant {
        KernelVariant::Packed => &PS_KERNEL_PACKED,
        KernelVariant::Planar => &PS_KERNEL_PLANAR,
    }
}

/// Instruction blob as upload bytes.
pub fn kernel_bytes(kernel: &'static [[u32; 4]]) -> &'static [u8] {
    bytemuck::cast_slice(kernel)
}

pub fn kernel_size(kernel: &'static [[u32; 4]]) -> u32 {
    (kernel.len() * 16) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_bytes_are_little_endian_dwords() {
        let bytes = kernel_bytes(&SIP_KERNEL);
        assert_eq!(bytes.len(), 160);
        assert_eq!(&bytes[0..4], &0x0000_0030u32.to_le_bytes());
        assert_eq!(kernel_size(&SIP_KERNEL), 160);
    }

    #[test]
    fn planar_kernel_is_the_larger_variant() {
        assert!(kernel_size(&PS_KERNEL_PLANAR) > kernel_size(&PS_KERNEL_PACKED));
    }
}
