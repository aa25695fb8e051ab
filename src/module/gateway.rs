use crate::module::rewind::RewindBarrier;
use crate::pixels::{AlphaType, ColorType};

/// Address of a scratch region inside foreign memory. Only meaningful to the module that handed
/// it out, and only until it is freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScratchAddr(pub usize);

/// Per-resource entry points of a surface living inside the foreign module.
///
/// Implementations are driven by [`SurfaceHandle`](crate::surface::SurfaceHandle), which makes
/// sure no method is called after `release` and none runs while the module rewinds.
pub trait ForeignSurface: Send + Sync {
    /// Width of the surface in pixels, as last seen by the foreign side.
    fn width(&self) -> u32;

    /// Height of the surface in pixels, as last seen by the foreign side.
    fn height(&self) -> u32;

    /// Picks up changed backing dimensions and resets any internal render state.
    fn update_size(&self);

    /// Erases all pixels to transparent. Returns true if any pixel changed.
    fn clear_all(&self) -> bool;

    /// Drops caches held for this surface.
    fn free_cache(&self);

    /// Writes the surface pixels into scratch memory at `dst`, `row_bytes` apart. Returns true
    /// if the pixels were written.
    fn read_pixels(&self, color: ColorType, alpha: AlphaType, dst: ScratchAddr, row_bytes: usize) -> bool;

    /// Destroys the foreign resource.
    fn release(self: Box<Self>);

    /// Gives up the host's reference without destroying the foreign resource, which stays
    /// owned by the module.
    fn detach(self: Box<Self>);
}

/// Module-wide entry points of the foreign rendering engine.
///
/// The constructors return `None` when the foreign side could not produce a resource for the
/// given arguments.
pub trait ModuleGateway: Send + Sync {
    fn create_from_canvas(&self, canvas_id: &str) -> Option<Box<dyn ForeignSurface>>;

    fn create_from_texture(
        &self,
        texture_id: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    ) -> Option<Box<dyn ForeignSurface>>;

    fn create_from_render_target(
        &self,
        frame_buffer_id: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    ) -> Option<Box<dyn ForeignSurface>>;

    /// Reserves `len` bytes of foreign scratch memory. The region is never reclaimed by the
    /// foreign side; every successful call must be paired with [`free`](Self::free).
    fn alloc(&self, len: usize) -> anyhow::Result<ScratchAddr>;

    /// Returns a scratch region to the foreign allocator.
    fn free(&self, addr: ScratchAddr);

    /// Copies `dst.len()` bytes from the scratch region at `addr` into host memory.
    fn copy_out(&self, addr: ScratchAddr, dst: &mut [u8]) -> anyhow::Result<()>;

    /// Rewind barrier of this module instance. The foreign side closes it while it
    /// re-initializes; every surface bound to the module waits on it.
    fn barrier(&self) -> &RewindBarrier;
}
