//! Handle types for GPU-side objects.
//!
//! Backends own the real textures and buffers; the rest of the engine only
//! passes these small copyable ids around, which keeps pooling and tile
//! bookkeeping independent of any device API.

use serde::{Deserialize, Serialize};

/// Identifies a square render target (texture plus its framebuffer view).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(u32);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Identifies an offscreen brush renderer (per-draw parameter storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RendererId(u32);

impl std::fmt::Display for RendererId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "renderer#{}", self.0)
    }
}

/// Monotonic id allocator used by backends.
///
/// Ids are never reused, so a stale handle can always be told apart from a
/// live one.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Creates an allocator starting at 1 (0 is never issued).
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    fn next_raw(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        id
    }

    /// Issues a new target id.
    pub fn next_target(&mut self) -> TargetId {
        TargetId(self.next_raw())
    }

    /// Issues a new renderer id.
    pub fn next_renderer(&mut self) -> RendererId {
        RendererId(self.next_raw())
    }
}
