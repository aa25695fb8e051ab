//! Moves pixel buffers out of foreign memory.
//!
//! Foreign memory is invisible to Rust ownership and never reclaimed by the foreign side, so
//! every transfer follows the same shape: allocate a scratch region, let the foreign side fill
//! it, copy it out, free it. [`ScratchRegion`] frees on drop, which covers early returns and
//! failed reads alike.

use crate::errors::SurfaceError;
use crate::module::{ModuleGateway, ScratchAddr};

/// A scratch region in foreign memory, freed when dropped.
pub struct ScratchRegion<'a> {
    gateway: &'a dyn ModuleGateway,
    addr: ScratchAddr,
    len: usize,
}

impl<'a> ScratchRegion<'a> {
    /// Reserves `len` bytes of foreign scratch memory.
    pub fn acquire(gateway: &'a dyn ModuleGateway, len: usize) -> Result<Self, SurfaceError> {
        let addr = gateway.alloc(len).map_err(SurfaceError::ScratchAlloc)?;
        log::trace!("scratch region {:?} acquired ({} bytes)", addr, len);

        Ok(Self { gateway, addr, len })
    }

    pub fn addr(&self) -> ScratchAddr {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies the whole region into a freshly allocated host buffer.
    pub fn copy_out(&self) -> Result<Vec<u8>, SurfaceError> {
        let mut data = vec![0u8; self.len];
        self.gateway
            .copy_out(self.addr, &mut data)
            .map_err(SurfaceError::ScratchCopy)?;
        Ok(data)
    }
}

impl Drop for ScratchRegion<'_> {
    fn drop(&mut self) {
        self.gateway.free(self.addr);
        log::trace!("scratch region {:?} freed", self.addr);
    }
}

/// Runs `read` against a fresh scratch region of `len` bytes and copies the result out.
///
/// `read` receives the foreign address and reports whether it filled the region. A failed read
/// yields `Ok(None)`. The region is freed before this returns, on every path.
pub fn read_buffer_from_foreign<F>(
    gateway: &dyn ModuleGateway,
    len: usize,
    read: F,
) -> Result<Option<Vec<u8>>, SurfaceError>
where
    F: FnOnce(ScratchAddr) -> bool,
{
    let region = ScratchRegion::acquire(gateway, len)?;

    if !read(region.addr()) {
        return Ok(None);
    }

    let data = region.copy_out()?;
    Ok(Some(data))
}
