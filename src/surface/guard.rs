use crate::errors::SurfaceError;
use crate::surface::SurfaceId;

/// Tracks whether a surface has been released. Once set, the flag never clears.
#[derive(Debug, Default)]
pub struct DestructionGuard {
    destroyed: bool,
}

impl DestructionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Rejects `op` on a released surface. Runs before anything else an operation does.
    pub fn check(&self, surface: SurfaceId, op: &'static str) -> Result<(), SurfaceError> {
        if self.destroyed {
            log::error!("Surface[{}]: don't call {} on a surface that is released", surface, op);
            return Err(SurfaceError::UseAfterFree { op });
        }
        Ok(())
    }

    /// Flips the flag. Returns false if it was already set.
    pub fn mark_destroyed(&mut self) -> bool {
        !std::mem::replace(&mut self.destroyed, true)
    }
}
