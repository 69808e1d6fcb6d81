//! Brush kernels: the WGSL shader and its CPU twin.
//!
//! Both versions must produce identical bytes for the same pass. The CPU
//! version backs [`crate::cpu_backend::CpuBackend`] and is what the tests
//! check; the shader is what [`crate::gpu_backend::WgpuBackend`] runs.

use crate::backend::{StrokeKind, StrokeParams};
use crate::cell::{CellBits, TerrainCell, MAX_MAGNITUDE};

/// Fullscreen-triangle brush shader. Reads the tile's read texture, writes
/// the render target bound as its write texture.
pub const BRUSH_SHADER: &str = r"
struct Stroke {
    shape: vec4<f32>,
    op: vec4<u32>,
};

struct BrushUniform {
    header: vec4<i32>,
    strokes: array<Stroke, 256>,
};

@group(0) @binding(0) var<uniform> brush: BrushUniform;
@group(0) @binding(1) var source: texture_2d<u32>;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    return vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
}

fn magnitude_at(p: vec2<i32>) -> u32 {
    let edge = brush.header.w - 1;
    let c = clamp(p, vec2<i32>(0, 0), vec2<i32>(edge, edge));
    return textureLoad(source, c, 0).r & 31u;
}

fn with_magnitude(cell: u32, magnitude: u32) -> u32 {
    return (cell & 0xE0u) | min(magnitude, 31u);
}

@fragment
fn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<u32> {
    let local = vec2<i32>(floor(position.xy));
    let world = vec2<f32>(local + brush.header.xy);
    var value = textureLoad(source, local, 0).r & 0xFFu;
    let count = u32(brush.header.z);

    for (var i = 0u; i < count; i = i + 1u) {
        let stroke = brush.strokes[i];
        let d = world - stroke.shape.xy;
        if (d.x * d.x + d.y * d.y > stroke.shape.z * stroke.shape.z) {
            continue;
        }
        switch stroke.op.x {
            case 0u: {
                value = stroke.op.y;
            }
            case 1u: {
                value = 0x20u;
            }
            case 2u: {
                var sum = 0u;
                for (var dy = -1; dy <= 1; dy = dy + 1) {
                    for (var dx = -1; dx <= 1; dx = dx + 1) {
                        sum = sum + magnitude_at(local + vec2<i32>(dx, dy));
                    }
                }
                value = with_magnitude(value, (sum + 4u) / 9u);
            }
            case 3u: {
                value = with_magnitude(value, (value & 31u) + stroke.op.z);
            }
            case 4u: {
                let m = value & 31u;
                value = with_magnitude(value, select(0u, m - stroke.op.z, m > stroke.op.z));
            }
            default: {}
        }
    }

    return vec4<u32>(value, 0u, 0u, 0u);
}
";

/// Rasterizes one pass on the CPU.
///
/// `src` and `dst` are `size × size` row-major tiles; `origin` is the world
/// coordinate of the tile's top-left cell.
pub fn rasterize_pass(
    src: &[u8],
    dst: &mut [u8],
    size: u32,
    origin: (i32, i32),
    strokes: &[StrokeParams],
) {
    let size_us = size as usize;
    debug_assert_eq!(src.len(), size_us * size_us);
    debug_assert_eq!(dst.len(), size_us * size_us);

    for ly in 0..size_us {
        for lx in 0..size_us {
            let wx = i64::from(origin.0) + lx as i64;
            let wy = i64::from(origin.1) + ly as i64;
            let mut value = TerrainCell(src[ly * size_us + lx]);
            for stroke in strokes.iter().filter(|s| s.covers(wx, wy)) {
                value = apply_stroke(value, stroke, src, size_us, lx, ly);
            }
            dst[ly * size_us + lx] = value.raw();
        }
    }
}

fn apply_stroke(
    cell: TerrainCell,
    stroke: &StrokeParams,
    src: &[u8],
    size: usize,
    lx: usize,
    ly: usize,
) -> TerrainCell {
    let amount = stroke.op[2].min(u32::from(MAX_MAGNITUDE)) as u8;
    match stroke.op[0] {
        StrokeKind::PAINT => TerrainCell(stroke.op[1] as u8),
        StrokeKind::ERASE => TerrainCell::OCEAN,
        StrokeKind::SMOOTH => cell.with_magnitude(smoothed_magnitude(src, size, lx, ly)),
        StrokeKind::RAISE => cell.with_magnitude(cell.magnitude().saturating_add(amount)),
        StrokeKind::LOWER => cell.with_magnitude(cell.magnitude().saturating_sub(amount)),
        _ => cell,
    }
}

/// Rounded mean magnitude of the 3×3 window, clamped at the tile edge.
fn smoothed_magnitude(src: &[u8], size: usize, lx: usize, ly: usize) -> u8 {
    let edge = size as i64 - 1;
    let mut sum = 0u32;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let x = (lx as i64 + dx).clamp(0, edge) as usize;
            let y = (ly as i64 + dy).clamp(0, edge) as usize;
            sum += u32::from(src[y * size + x] & CellBits::MAGNITUDE);
        }
    }
    ((sum + 4) / 9) as u8
}
