//! Pan/zoom view transform and visible-tile culling.
//!
//! The canvas maps to the map with `screen = world * zoom + pan`. Screen
//! origin is top-left and Y grows downward in both spaces.

use glam::Vec2;
use terra_common::{ChunkCoord, ChunkRect, WorldCoord};

use crate::grid::CHUNK_SIZE;

/// Minimum zoom level (zoomed out).
pub const MIN_ZOOM: f32 = 0.05;

/// Maximum zoom level (zoomed in).
pub const MAX_ZOOM: f32 = 64.0;

/// Canvas-to-map affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Canvas position of the map origin, in pixels
    pub pan: Vec2,
    /// Pixels per map cell
    pub zoom: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl ViewTransform {
    /// Creates a transform; zoom is clamped to [`MIN_ZOOM`, `MAX_ZOOM`].
    #[must_use]
    pub fn new(pan: Vec2, zoom: f32) -> Self {
        Self {
            pan,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        }
    }

    /// Converts a canvas point to map coordinates.
    #[must_use]
    pub fn canvas_to_map(&self, screen: Vec2) -> Vec2 {
        (screen - self.pan) / self.zoom
    }

    /// Converts a map point to canvas coordinates.
    #[must_use]
    pub fn map_to_canvas(&self, world: Vec2) -> Vec2 {
        world * self.zoom + self.pan
    }

    /// Moves the view by a canvas-space delta.
    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    /// Zooms by `factor` keeping the map point under `cursor` fixed.
    pub fn zoom_at(&mut self, cursor: Vec2, factor: f32) {
        let anchor = self.canvas_to_map(cursor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.pan = cursor - anchor * self.zoom;
    }
}

/// Chooses which tiles a canvas of a given size can see.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportCuller {
    grid_width: u32,
    grid_height: u32,
}

impl ViewportCuller {
    /// Creates a culler for a grid of `grid_width × grid_height` chunks.
    #[must_use]
    pub const fn new(grid_width: u32, grid_height: u32) -> Self {
        Self {
            grid_width,
            grid_height,
        }
    }

    /// Visible chunk rectangle, or `None` if the view misses the grid.
    #[must_use]
    pub fn visible_rect(
        &self,
        transform: &ViewTransform,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Option<ChunkRect> {
        let corners = [
            Vec2::ZERO,
            Vec2::new(canvas_width as f32, 0.0),
            Vec2::new(0.0, canvas_height as f32),
            Vec2::new(canvas_width as f32, canvas_height as f32),
        ]
        .map(|corner| transform.canvas_to_map(corner));

        let min = corners.iter().copied().fold(Vec2::splat(f32::INFINITY), Vec2::min);
        let max = corners.iter().copied().fold(Vec2::splat(f32::NEG_INFINITY), Vec2::max);
        if !(min.is_finite() && max.is_finite()) {
            return None;
        }
        ChunkRect::from_world_box(
            WorldCoord::from_f32(min.x, min.y),
            WorldCoord::from_f32(max.x, max.y),
            CHUNK_SIZE,
        )
        .clamp_to_grid(self.grid_width, self.grid_height)
    }

    /// Visible chunk coordinates in row-major order; empty if nothing is visible.
    #[must_use]
    pub fn visible_tiles(
        &self,
        transform: &ViewTransform,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Vec<ChunkCoord> {
        self.visible_rect(transform, canvas_width, canvas_height)
            .map(|rect| rect.iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_view() {
        let culler = ViewportCuller::new(16, 16);
        let tiles = culler.visible_tiles(&ViewTransform::default(), 128, 64);
        assert_eq!(tiles.len(), 3 * 2);
        assert_eq!(tiles[0], ChunkCoord::new(0, 0));
        assert_eq!(tiles[5], ChunkCoord::new(2, 1));
    }

    #[test]
    fn test_pan_and_zoom_shift_view() {
        let culler = ViewportCuller::new(16, 16);
        // Map point (256, 128) sits at the canvas origin, two pixels per cell.
        let transform = ViewTransform::new(Vec2::new(-512.0, -256.0), 2.0);
        let rect = culler.visible_rect(&transform, 256, 256).expect("visible");
        assert_eq!(rect.min, ChunkCoord::new(4, 2));
        assert_eq!(rect.max, ChunkCoord::new(6, 4));
    }

    #[test]
    fn test_clamped_to_grid() {
        let culler = ViewportCuller::new(4, 4);
        let transform = ViewTransform::new(Vec2::new(500.0, 500.0), 0.1);
        let rect = culler.visible_rect(&transform, 1000, 1000).expect("visible");
        assert_eq!(rect.min, ChunkCoord::new(0, 0));
        assert_eq!(rect.max, ChunkCoord::new(3, 3));
    }

    #[test]
    fn test_view_off_grid_is_empty() {
        let culler = ViewportCuller::new(4, 4);
        let transform = ViewTransform::new(Vec2::new(5000.0, 0.0), 1.0);
        assert!(culler.visible_tiles(&transform, 100, 100).is_empty());
        let empty = ViewportCuller::default();
        assert!(empty.visible_tiles(&ViewTransform::default(), 100, 100).is_empty());
    }

    #[test]
    fn test_zoom_at_keeps_cursor_fixed() {
        let mut transform = ViewTransform::new(Vec2::new(30.0, -12.0), 1.5);
        let cursor = Vec2::new(400.0, 300.0);
        let before = transform.canvas_to_map(cursor);
        transform.zoom_at(cursor, 2.0);
        assert!((transform.zoom - 3.0).abs() < 1e-6);
        assert!(transform.canvas_to_map(cursor).abs_diff_eq(before, 1e-3));
    }

    #[test]
    fn test_zoom_clamped() {
        let mut transform = ViewTransform::default();
        transform.zoom_at(Vec2::ZERO, 1000.0);
        assert!((transform.zoom - MAX_ZOOM).abs() < f32::EPSILON);
        transform.zoom_at(Vec2::ZERO, 0.0);
        assert!((transform.zoom - MIN_ZOOM).abs() < f32::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_canvas_map_inverse(
            x in -5000.0f32..5000.0,
            y in -5000.0f32..5000.0,
            px in -2000.0f32..2000.0,
            py in -2000.0f32..2000.0,
            zoom in MIN_ZOOM..MAX_ZOOM,
        ) {
            let transform = ViewTransform::new(Vec2::new(px, py), zoom);
            let point = Vec2::new(x, y);
            let back = transform.map_to_canvas(transform.canvas_to_map(point));
            let tolerance = 1e-3 * (1.0 + point.abs().max_element() + px.abs().max(py.abs()));
            prop_assert!(back.abs_diff_eq(point, tolerance), "{back:?} vs {point:?}");
        }

        #[test]
        fn prop_zoom_at_fixed_point(
            cx in 0.0f32..1920.0,
            cy in 0.0f32..1080.0,
            factor in 0.5f32..2.0,
        ) {
            let mut transform = ViewTransform::new(Vec2::new(-100.0, 40.0), 1.0);
            let cursor = Vec2::new(cx, cy);
            let before = transform.canvas_to_map(cursor);
            transform.zoom_at(cursor, factor);
            prop_assert!(transform.canvas_to_map(cursor).abs_diff_eq(before, 1e-2));
        }
    }
}
