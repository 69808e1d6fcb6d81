//! # Terra Common
//!
//! Common types, utilities, and shared abstractions for the Terra map editor.
//!
//! This crate provides foundational types used across all Terra subsystems:
//! - Coordinate types (world, chunk, local, chunk rectangles)
//! - Handle types for GPU-side objects (TargetId, RendererId)
//! - Version information for persisted formats
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_coords_conversion() {
        let world = WorldCoord::new(100, 200);
        let chunk = world.to_chunk_coord(64);
        let local = world.to_local_coord(64);

        assert_eq!(chunk, ChunkCoord::new(1, 3));
        assert_eq!(local, LocalCoord::new(36, 8));
    }

    #[test]
    fn test_negative_world_coords_floor() {
        let world = WorldCoord::from_f32(-0.5, -64.0);
        assert_eq!(world, WorldCoord::new(-1, -64));
        assert_eq!(world.to_chunk_coord(64), ChunkCoord::new(-1, -1));
    }

    #[test]
    fn test_chunk_rect_clamp() {
        let rect = ChunkRect::new(ChunkCoord::new(-2, -1), ChunkCoord::new(1, 5));
        let clamped = rect.clamp_to_grid(4, 3).expect("overlaps grid");
        assert_eq!(clamped.min, ChunkCoord::new(0, 0));
        assert_eq!(clamped.max, ChunkCoord::new(1, 2));
        assert_eq!(clamped.len(), 6);
        assert_eq!(clamped.iter().count(), 6);

        let outside = ChunkRect::new(ChunkCoord::new(5, 0), ChunkCoord::new(6, 1));
        assert!(outside.clamp_to_grid(4, 3).is_none());
    }

    #[test]
    fn test_id_allocator_never_repeats() {
        let mut ids = IdAllocator::new();
        let a = ids.next_target();
        let b = ids.next_target();
        let r = ids.next_renderer();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "target#1");
        assert_eq!(b.to_string(), "target#2");
        assert_eq!(r.to_string(), "renderer#3");
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = SchemaVersion::new(1, 0, 0);
        let v2 = SchemaVersion::new(1, 1, 0);
        let v3 = SchemaVersion::new(2, 0, 0);

        assert!(v1.can_read(&v2));
        assert!(v2.can_read(&v1));
        assert!(!v1.can_read(&v3));
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(SchemaVersion::parse("1.0"), Some(SchemaVersion::new(1, 0, 0)));
        assert_eq!(SchemaVersion::parse("2.3.4"), Some(SchemaVersion::new(2, 3, 4)));
        assert_eq!(SchemaVersion::parse("1.x"), None);
        assert_eq!(SchemaVersion::LOCAL_SAVE.short(), "1.0");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(TerraError::CorruptedData("bad".into()).is_recoverable());
        assert!(TerraError::not_found("map", "atlantis").is_recoverable());
        assert!(!TerraError::Configuration("no adapter".into()).is_recoverable());
        assert_eq!(
            TerraError::not_found("map", "atlantis").to_string(),
            "map not found: atlantis"
        );
    }

    proptest! {
        #[test]
        fn prop_local_index_in_chunk(x in 0u16..64, y in 0u16..64) {
            let index = LocalCoord::new(x, y).to_index(64);
            prop_assert!(index < 64 * 64);
            prop_assert_eq!(index % 64, usize::from(x));
            prop_assert_eq!(index / 64, usize::from(y));
        }

        #[test]
        fn prop_world_splits_into_chunk_and_local(
            x in -10_000i64..10_000,
            y in -10_000i64..10_000,
        ) {
            let world = WorldCoord::new(x, y);
            let chunk = world.to_chunk_coord(64);
            let local = world.to_local_coord(64);
            let origin = chunk.to_world_coord(64);
            prop_assert_eq!(origin.x + i64::from(local.x), x);
            prop_assert_eq!(origin.y + i64::from(local.y), y);
        }
    }
}
