use gen4_video::format::{FourCc, FormatPlan, PlaneOffsets};
use gen4_video::gpu::{Mode3d, RecordingGpu};
use gen4_video::layout::StateLayout;
use gen4_video::pipeline::{DstBox, Pixmap, ScreenInfo, VideoFrame, VideoPipeline};
use gen4_video::regs::{CMD_3DPRIMITIVE, PRIM_RECTLIST, PRIM_TOPOLOGY_SHIFT, SurfaceFormat};

const SCRATCH_BASE: u32 = 0x0100_0000;

fn gpu() -> RecordingGpu {
    RecordingGpu::new(SCRATCH_BASE, 8192)
}

fn yuy2_frame(width: u16, height: u16) -> VideoFrame {
    VideoFrame {
        fourcc: u32::from_le_bytes(*b"YUY2"),
        width,
        height,
        pitch: u32::from(width) * 2,
        planes: PlaneOffsets::default(),
    }
}

fn screen() -> ScreenInfo {
    ScreenInfo {
        width: 1024,
        height: 768,
        g4x: false,
    }
}

fn pixmap() -> Pixmap {
    Pixmap {
        offset: 0x0020_0000,
        pitch: 4096,
        tiled: false,
        bits_per_pixel: 32,
        origin: (0, 0),
    }
}

fn read_f32(scratch: &[u8], offset: usize) -> f32 {
    f32::from_bits(u32::from_le_bytes(scratch[offset..offset + 4].try_into().unwrap()))
}

fn read_u32(scratch: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(scratch[offset..offset + 4].try_into().unwrap())
}

fn is_draw_batch(batch: &[u32]) -> bool {
    batch.first().is_some_and(|&dw| {
        dw & 0xffff_0000 == CMD_3DPRIMITIVE && (dw >> PRIM_TOPOLOGY_SHIFT) & 0x1f == PRIM_RECTLIST
    })
}

#[test]
fn full_extent_mapping_emits_one_draw_with_unit_texcoords() {
    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    let frame = yuy2_frame(640, 480);
    let region = [DstBox {
        x1: 0,
        y1: 0,
        x2: 640,
        y2: 480,
    }];

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 640, 480, 640, 480)
        .unwrap();

    let draws: Vec<_> = gpu.batches.iter().filter(|b| is_draw_batch(b)).collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0][1], 3, "rectangle list draws three vertices");
    assert_eq!(draws[0][3], 1, "single instance");

    // src_w == drw_w == width, so the three corners map to the normalized
    // full extent: (1,1), (0,1), (0,0).
    let plan = FormatPlan::select(FourCc::Yuy2, 640, 480, 1280, PlaneOffsets::default());
    let vb = StateLayout::compute(&plan).vertex_buffer as usize;

    let vert = |i: usize, c: usize| read_f32(&gpu.scratch, vb + (i * 4 + c) * 4);
    assert_eq!((vert(0, 0), vert(0, 1)), (1.0, 1.0));
    assert_eq!((vert(1, 0), vert(1, 1)), (0.0, 1.0));
    assert_eq!((vert(2, 0), vert(2, 1)), (0.0, 0.0));

    // And the screen positions are the matching rectangle corners.
    assert_eq!((vert(0, 2), vert(0, 3)), (640.0, 480.0));
    assert_eq!((vert(1, 2), vert(1, 3)), (0.0, 480.0));
    assert_eq!((vert(2, 2), vert(2, 3)), (0.0, 0.0));
}

#[test]
fn three_rectangles_sync_between_draws_only() {
    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    let frame = yuy2_frame(320, 240);
    let region = [
        DstBox { x1: 0, y1: 0, x2: 100, y2: 100 },
        DstBox { x1: 200, y1: 0, x2: 300, y2: 100 },
        DstBox { x1: 0, y1: 200, x2: 100, y2: 300 },
    ];

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 300, 300)
        .unwrap();

    // Never before the first rectangle, once before each subsequent one.
    assert_eq!(gpu.waits, 2);
    assert_eq!(gpu.marks, 3);
    assert_eq!(gpu.batches.iter().filter(|b| is_draw_batch(b)).count(), 3);
}

#[test]
fn unknown_fourcc_is_a_silent_no_op() {
    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    let mut frame = yuy2_frame(320, 240);
    frame.fourcc = u32::from_le_bytes(*b"NV12");
    let region = [DstBox { x1: 0, y1: 0, x2: 320, y2: 240 }];

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap();

    assert!(gpu.batches.is_empty());
    assert!(gpu.allocs.is_empty());
    assert_eq!(gpu.waits, 0);
    assert_eq!(gpu.marks, 0);
    assert!(gpu.modes.is_empty());
}

#[test]
fn persistent_state_is_created_once_and_released_together() {
    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    let frame = yuy2_frame(320, 240);
    let region = [DstBox { x1: 0, y1: 0, x2: 320, y2: 240 }];

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap();
    // vs, sf, cc viewport, cc.
    assert_eq!(gpu.allocs.len(), 4);

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap();
    assert_eq!(gpu.allocs.len(), 4, "second draw reuses cached state objects");

    pipeline.release(&mut gpu);
    assert_eq!(gpu.unreferenced.len(), 4);

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap();
    assert_eq!(gpu.allocs.len(), 8, "release forces recreation");

    // Releasing with nothing cached is harmless.
    pipeline.release(&mut gpu);
    pipeline.release(&mut gpu);
    assert_eq!(gpu.unreferenced.len(), 8);
}

#[test]
fn binding_table_points_at_the_laid_out_surfaces() {
    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    let frame = VideoFrame {
        fourcc: u32::from_le_bytes(*b"I420"),
        width: 352,
        height: 288,
        pitch: 352,
        planes: PlaneOffsets {
            y: 0,
            u: 0x2_0000,
            v: 0x2_8000,
        },
    };
    let region = [DstBox { x1: 10, y1: 10, x2: 362, y2: 298 }];

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 352, 288, 352, 288)
        .unwrap();

    let plan = FormatPlan::select(FourCc::I420, 352, 288, 352, frame.planes);
    let layout = StateLayout::compute(&plan);

    let bt = layout.binding_table as usize;
    assert_eq!(read_u32(&gpu.scratch, bt), SCRATCH_BASE + layout.dst_surface);
    for (i, &src) in layout.src_surfaces.iter().enumerate() {
        assert_eq!(read_u32(&gpu.scratch, bt + 4 * (1 + i)), SCRATCH_BASE + src);
    }

    // Source surface states carry the plane base addresses in plan order:
    // Y, Y, V, V, U, U.
    let base_of = |n: usize| read_u32(&gpu.scratch, layout.src_surfaces[n] as usize + 4);
    assert_eq!(base_of(0), 0);
    assert_eq!(base_of(2), 0x2_8000);
    assert_eq!(base_of(4), 0x2_0000);

    assert_eq!(gpu.modes, vec![Mode3d::Video]);
}

#[test]
#[should_panic(expected = "state layout")]
fn undersized_scratch_region_is_a_contract_violation() {
    let mut gpu = RecordingGpu::new(SCRATCH_BASE, 64);
    let mut pipeline = VideoPipeline::new();
    let frame = yuy2_frame(320, 240);
    let region = [DstBox { x1: 0, y1: 0, x2: 320, y2: 240 }];

    let _ = pipeline.render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240);
}

#[test]
fn allocation_failure_propagates() {
    let mut gpu = gpu();
    gpu.fail_next_alloc = true;
    let mut pipeline = VideoPipeline::new();
    let frame = yuy2_frame(320, 240);
    let region = [DstBox { x1: 0, y1: 0, x2: 320, y2: 240 }];

    let err = pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap_err();
    assert!(err.to_string().contains("vs state"));
}

#[test]
fn destination_format_follows_screen_depth() {
    let frame = yuy2_frame(320, 240);
    let region = [DstBox { x1: 0, y1: 0, x2: 320, y2: 240 }];
    let plan = FormatPlan::select(FourCc::Yuy2, 320, 240, 640, PlaneOffsets::default());
    let dst_surface = StateLayout::compute(&plan).dst_surface as usize;
    let format_of = |gpu: &RecordingGpu| (read_u32(&gpu.scratch, dst_surface) >> 18) & 0x1ff;

    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap();
    assert_eq!(format_of(&gpu), SurfaceFormat::B8G8R8A8Unorm as u32);

    let mut gpu = self::gpu();
    let mut pipeline = VideoPipeline::new();
    let mut shallow = pixmap();
    shallow.bits_per_pixel = 16;
    pipeline
        .render(&mut gpu, &frame, &shallow, &screen(), &region, 320, 240, 320, 240)
        .unwrap();
    assert_eq!(format_of(&gpu), SurfaceFormat::B5G6R5Unorm as u32);
}

#[test]
fn pipeline_stage_pointers_are_relocated() {
    let mut gpu = gpu();
    let mut pipeline = VideoPipeline::new();
    let frame = yuy2_frame(320, 240);
    let region = [DstBox { x1: 0, y1: 0, x2: 320, y2: 240 }];

    pipeline
        .render(&mut gpu, &frame, &pixmap(), &screen(), &region, 320, 240, 320, 240)
        .unwrap();

    // VS, SF and CC stage pointers in the pipeline block.
    assert_eq!(gpu.batch_relocs.len(), 3);
    // One state-to-state relocation: the CC unit's viewport pointer.
    assert_eq!(gpu.bo_relocs.len(), 1);
    let cc_vp = gpu.bo_relocs[0];
    assert_eq!(cc_vp.offset, 16);
}
