use crate::surface::SurfaceSource;

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Make surface from {0} failed")]
    Creation(SurfaceSource),

    #[error("Don't call {op} on a surface that is released")]
    UseAfterFree { op: &'static str },

    #[error("Pixel buffer of {requested} bytes exceeds the limit of {limit} bytes")]
    BufferTooLarge { requested: u128, limit: usize },

    #[error("Scratch allocation failed: {0}")]
    ScratchAlloc(anyhow::Error),

    #[error("Scratch copy failed: {0}")]
    ScratchCopy(anyhow::Error),
}
