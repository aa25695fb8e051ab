use crate::errors::SurfaceError;
use crate::marshal::read_buffer_from_foreign;
use crate::module::{ForeignSurface, ModuleContext};
use crate::pixels::{AlphaType, ColorType, PixelLayout};
use crate::surface::{DestructionGuard, SurfaceId, SurfaceSource};

/// Host-side handle to a surface living inside the foreign module.
///
/// The handle owns the foreign reference. Every operation first checks that the handle has not
/// been released and then waits out any rewind of the module before calling into it.
/// [`release`](Self::release) is the only way (besides dropping the handle) to give the foreign
/// resource back, and it takes `&mut self`, so it can never race another call on the same
/// handle.
///
/// ```
/// # use std::sync::Arc;
/// # use surface_bridge::module::{InMemoryModule, ModuleContext};
/// # use surface_bridge::surface::SurfaceHandle;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let module = Arc::new(InMemoryModule::new());
/// module.register_canvas("c1", 100, 100);
/// let ctx = ModuleContext::new(module, None);
///
/// let mut surface = SurfaceHandle::from_canvas(&ctx, "c1").unwrap();
/// assert_eq!(surface.width().await.unwrap(), 100);
///
/// surface.release();
/// assert!(surface.width().await.is_err());
/// # }
/// ```
pub struct SurfaceHandle {
    /// Id of this handle, used in log lines
    id: SurfaceId,
    /// What the surface was made from
    source: SurfaceSource,
    /// Module the surface lives in
    ctx: ModuleContext,
    /// Foreign reference; `None` once released
    foreign: Option<Box<dyn ForeignSurface>>,
    guard: DestructionGuard,
}

impl std::fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("destroyed", &self.guard.is_destroyed())
            .finish()
    }
}

impl SurfaceHandle {
    /// Make a surface from a canvas.
    pub fn from_canvas(ctx: &ModuleContext, canvas_id: &str) -> Result<Self, SurfaceError> {
        let foreign = ctx.gateway().create_from_canvas(canvas_id);
        Self::bind(ctx, SurfaceSource::Canvas(canvas_id.to_string()), foreign)
    }

    /// Make a surface from a texture.
    pub fn from_texture(
        ctx: &ModuleContext,
        texture_id: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    ) -> Result<Self, SurfaceError> {
        let foreign = ctx.gateway().create_from_texture(texture_id, width, height, flip_y);
        Self::bind(ctx, SurfaceSource::Texture { id: texture_id, flip_y }, foreign)
    }

    /// Make a surface from a frame buffer.
    pub fn from_render_target(
        ctx: &ModuleContext,
        frame_buffer_id: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    ) -> Result<Self, SurfaceError> {
        let foreign = ctx
            .gateway()
            .create_from_render_target(frame_buffer_id, width, height, flip_y);
        Self::bind(ctx, SurfaceSource::RenderTarget { id: frame_buffer_id, flip_y }, foreign)
    }

    fn bind(
        ctx: &ModuleContext,
        source: SurfaceSource,
        foreign: Option<Box<dyn ForeignSurface>>,
    ) -> Result<Self, SurfaceError> {
        let Some(foreign) = foreign else {
            log::debug!("make surface from {} failed", source);
            return Err(SurfaceError::Creation(source));
        };

        let id = SurfaceId::new();
        log::debug!("Surface[{}]: created from {}", id, source);

        Ok(Self {
            id,
            source,
            ctx: ctx.clone(),
            foreign: Some(foreign),
            guard: DestructionGuard::new(),
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn source(&self) -> &SurfaceSource {
        &self.source
    }

    /// True once [`release`](Self::release) ran. Never fails.
    pub fn is_destroyed(&self) -> bool {
        self.guard.is_destroyed()
    }

    /// Runs the guards in order: destruction check, then rewind wait.
    async fn enter(&self, op: &'static str) -> Result<&dyn ForeignSurface, SurfaceError> {
        self.guard.check(self.id, op)?;
        self.ctx.barrier().wait().await;

        self.foreign
            .as_deref()
            .ok_or(SurfaceError::UseAfterFree { op })
    }

    /// The width of surface in pixels.
    pub async fn width(&self) -> Result<u32, SurfaceError> {
        Ok(self.enter("width").await?.width())
    }

    /// The height of surface in pixels.
    pub async fn height(&self) -> Result<u32, SurfaceError> {
        Ok(self.enter("height").await?.height())
    }

    /// Update the size of surface, and reset the internal surface.
    pub async fn update_size(&self) -> Result<(), SurfaceError> {
        self.enter("update_size").await?.update_size();
        Ok(())
    }

    /// Erases all pixels of this surface with transparent color. Returns true if the content has
    /// changed.
    pub async fn clear_all(&self) -> Result<bool, SurfaceError> {
        Ok(self.enter("clear_all").await?.clear_all())
    }

    /// Free the cache created by the surface immediately. Can be called to reduce memory pressure.
    pub async fn free_cache(&self) -> Result<(), SurfaceError> {
        self.enter("free_cache").await?.free_cache();
        Ok(())
    }

    /// Copies the surface pixels out in the given color and alpha type, tightly packed.
    ///
    /// Returns `Ok(None)` for [`ColorType::Unknown`] and when the foreign side fails to read;
    /// the two cases are not told apart. `Unknown` short-circuits before any guard since it never
    /// touches the foreign side.
    pub async fn read_pixels(
        &self,
        color: ColorType,
        alpha: AlphaType,
    ) -> Result<Option<Vec<u8>>, SurfaceError> {
        if color == ColorType::Unknown {
            return Ok(None);
        }

        let foreign = self.enter("read_pixels").await?;

        let limit = self.ctx.config().max_scratch_bytes;
        let layout = match PixelLayout::for_format(color, foreign.width(), foreign.height()) {
            Some(Ok(layout)) => layout,
            Some(Err(overflow)) => {
                return Err(SurfaceError::BufferTooLarge {
                    requested: overflow.requested,
                    limit,
                })
            }
            None => return Ok(None),
        };

        if layout.length > limit {
            return Err(SurfaceError::BufferTooLarge {
                requested: layout.length as u128,
                limit,
            });
        }

        read_buffer_from_foreign(self.ctx.gateway(), layout.length, |addr| {
            foreign.read_pixels(color, alpha, addr, layout.row_bytes)
        })
    }

    /// Releases the foreign surface. Calling it again does nothing.
    ///
    /// Does not wait for a rewind in flight.
    pub fn release(&mut self) {
        if !self.guard.mark_destroyed() {
            return;
        }

        if let Some(foreign) = self.foreign.take() {
            foreign.release();
        }
        log::debug!("Surface[{}]: released", self.id);
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        let Some(foreign) = self.foreign.take() else {
            return;
        };

        if self.ctx.config().release_on_drop {
            log::warn!("Surface[{}]: dropped without release(), releasing {}", self.id, self.source);
            foreign.release();
        } else {
            log::warn!("Surface[{}]: dropped without release(), leaving {} to the module", self.id, self.source);
            foreign.detach();
        }
    }
}
