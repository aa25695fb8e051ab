use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Destruction guard for surface handles.
pub mod guard;
/// Host-side surface handle.
pub mod handle;

pub use guard::DestructionGuard;
pub use handle::SurfaceHandle;

/// Unique id of a surface handle, used to tell handles apart in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    /// Create a new unique `SurfaceId` using a random UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SurfaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The foreign object a surface was made from, as passed to its factory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceSource {
    /// HTML canvas, by element id
    Canvas(String),
    /// Texture owned by the host's graphics context
    Texture { id: u32, flip_y: bool },
    /// Frame buffer owned by the host's graphics context
    RenderTarget { id: u32, flip_y: bool },
}

impl Display for SurfaceSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceSource::Canvas(id) => write!(f, "canvas {}", id),
            SurfaceSource::Texture { id, .. } => write!(f, "texture {}", id),
            SurfaceSource::RenderTarget { id, .. } => write!(f, "frame buffer {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_display_names_the_id() {
        assert_eq!(SurfaceSource::Canvas("c1".into()).to_string(), "canvas c1");
        assert_eq!(SurfaceSource::Texture { id: 3, flip_y: true }.to_string(), "texture 3");
        assert_eq!(SurfaceSource::RenderTarget { id: 0, flip_y: false }.to_string(), "frame buffer 0");
    }

    #[test]
    fn surface_ids_are_unique() {
        assert_ne!(SurfaceId::new(), SurfaceId::new());
    }
}
