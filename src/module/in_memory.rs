use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Result};

use crate::module::gateway::{ForeignSurface, ModuleGateway, ScratchAddr};
use crate::module::rewind::RewindBarrier;
use crate::pixels::{AlphaType, ColorType};

/// First address handed out by the scratch heap. Zero stays reserved as a null address.
const HEAP_BASE: usize = 0x1000;
/// Gap between two scratch regions so neighbouring regions never share an address.
const HEAP_GUARD: usize = 16;

/// Identifies the backing store a surface draws into.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BackingKey {
    Canvas(String),
    Texture(u32),
    RenderTarget(u32),
}

/// In-process foreign module. Canvases, textures and render targets are plain pixel arrays and
/// scratch memory is a map of byte vectors, with counters for allocations, frees and releases.
///
/// Used by tests and for host-side development without the real engine.
#[derive(Default)]
pub struct InMemoryModule {
    state: Arc<ModuleState>,
}

#[derive(Default)]
struct ModuleState {
    /// Pixel stores (premultiplied RGBA), indexed by their key
    backings: Mutex<HashMap<BackingKey, Backing>>,
    /// Texture ids the module accepts
    textures: Mutex<HashSet<u32>>,
    /// Frame buffer ids the module accepts
    render_targets: Mutex<HashSet<u32>>,
    /// Foreign scratch memory
    heap: Mutex<ScratchHeap>,
    /// Rewind barrier of this module instance
    barrier: RewindBarrier,
    /// Bytes held in per-surface caches
    cached_bytes: AtomicUsize,
    /// Surfaces created so far
    created: AtomicUsize,
    /// Surfaces released so far
    released: AtomicUsize,
    /// Surfaces handed back to the module without being released
    detached: AtomicUsize,
}

/// Pixel store of a canvas, texture or render target. Pixels are allocated on the first paint;
/// until then the store is fully transparent.
struct Backing {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Backing {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Vec::new(),
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height || self.pixels.is_empty() {
            return [0; 4];
        }
        let at = self.offset(x, y);
        [self.pixels[at], self.pixels[at + 1], self.pixels[at + 2], self.pixels[at + 3]]
    }

    fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        if self.pixels.is_empty() {
            let Some(len) = (self.width as usize)
                .checked_mul(self.height as usize)
                .and_then(|n| n.checked_mul(4))
            else {
                return false;
            };
            self.pixels = vec![0u8; len];
        }

        let at = self.offset(x, y);
        self.pixels[at..at + 4].copy_from_slice(&rgba);
        true
    }

    /// Makes the store transparent. Returns false if it already was.
    fn clear(&mut self) -> bool {
        if self.pixels.iter().all(|&byte| byte == 0) {
            return false;
        }
        self.pixels.clear();
        true
    }
}

#[derive(Default)]
struct ScratchHeap {
    next: usize,
    regions: HashMap<usize, Vec<u8>>,
    limit: Option<usize>,
    total_allocations: usize,
    invalid_frees: usize,
}

impl ScratchHeap {
    fn live_bytes(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    fn alloc(&mut self, len: usize) -> Result<ScratchAddr> {
        if let Some(limit) = self.limit {
            let live = self.live_bytes();
            if live.saturating_add(len) > limit {
                bail!("out of scratch memory: {} bytes requested, {} of {} in use", len, live, limit);
            }
        }

        let addr = HEAP_BASE.max(self.next);
        self.next = addr + len.max(1) + HEAP_GUARD;
        self.regions.insert(addr, vec![0u8; len]);
        self.total_allocations += 1;

        Ok(ScratchAddr(addr))
    }

    fn free(&mut self, addr: ScratchAddr) {
        if self.regions.remove(&addr.0).is_none() {
            log::warn!("free of unknown scratch region {:?}", addr);
            self.invalid_frees += 1;
        }
    }

    fn region(&self, addr: ScratchAddr) -> Result<&Vec<u8>> {
        self.regions
            .get(&addr.0)
            .ok_or_else(|| anyhow!("no scratch region at {:?}", addr))
    }

    fn region_mut(&mut self, addr: ScratchAddr) -> Result<&mut Vec<u8>> {
        self.regions
            .get_mut(&addr.0)
            .ok_or_else(|| anyhow!("no scratch region at {:?}", addr))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a module whose scratch heap refuses allocations beyond `limit` live bytes.
    pub fn with_heap_limit(limit: usize) -> Self {
        let module = Self::default();
        lock(&module.state.heap).limit = Some(limit);
        module
    }

    /// Adds a transparent canvas of the given size, replacing any canvas with the same id.
    pub fn register_canvas(&self, canvas_id: &str, width: u32, height: u32) {
        lock(&self.state.backings).insert(BackingKey::Canvas(canvas_id.to_string()), Backing::new(width, height));
    }

    /// Resizes a canvas. Its content is cleared, like a resized HTML canvas. Surfaces bound to it
    /// keep their old size until they are told to update. Returns false for unknown canvases.
    pub fn resize_canvas(&self, canvas_id: &str, width: u32, height: u32) -> bool {
        let mut backings = lock(&self.state.backings);
        match backings.get_mut(&BackingKey::Canvas(canvas_id.to_string())) {
            Some(backing) => {
                *backing = Backing::new(width, height);
                true
            }
            None => false,
        }
    }

    pub fn register_texture(&self, texture_id: u32) {
        lock(&self.state.textures).insert(texture_id);
    }

    pub fn register_render_target(&self, frame_buffer_id: u32) {
        lock(&self.state.render_targets).insert(frame_buffer_id);
    }

    /// Sets one premultiplied RGBA pixel of a backing store. Returns false when the key is
    /// unknown or the pixel lies outside the store.
    pub fn paint(&self, key: &BackingKey, x: u32, y: u32, rgba: [u8; 4]) -> bool {
        let mut backings = lock(&self.state.backings);
        match backings.get_mut(key) {
            Some(backing) => backing.set_pixel(x, y, rgba),
            None => false,
        }
    }

    /// Fills a scratch region from the start with `data`.
    pub fn write_scratch(&self, addr: ScratchAddr, data: &[u8]) -> Result<()> {
        self.state.write_scratch(addr, data)
    }

    /// Scratch regions currently allocated and not yet freed.
    pub fn live_scratch_regions(&self) -> usize {
        lock(&self.state.heap).regions.len()
    }

    /// Scratch regions handed out over the module's lifetime.
    pub fn total_allocations(&self) -> usize {
        lock(&self.state.heap).total_allocations
    }

    /// Frees of addresses that were not allocated (or already freed).
    pub fn invalid_frees(&self) -> usize {
        lock(&self.state.heap).invalid_frees
    }

    /// Bytes held in surface caches across all live surfaces.
    pub fn cached_bytes(&self) -> usize {
        self.state.cached_bytes.load(Ordering::SeqCst)
    }

    pub fn created_surfaces(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn released_surfaces(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub fn detached_surfaces(&self) -> usize {
        self.state.detached.load(Ordering::SeqCst)
    }

    /// Host-side surface objects still holding on to the module.
    pub fn attached_surfaces(&self) -> usize {
        Arc::strong_count(&self.state) - 1
    }

    fn make_surface(&self, key: BackingKey, width: u32, height: u32, flip_y: bool) -> Box<dyn ForeignSurface> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Box::new(InMemorySurface {
            key,
            flip_y,
            size: Mutex::new((width, height)),
            cache: AtomicUsize::new(0),
            state: self.state.clone(),
        })
    }
}

impl ModuleState {
    fn write_scratch(&self, addr: ScratchAddr, data: &[u8]) -> Result<()> {
        let mut heap = lock(&self.heap);
        let region = heap.region_mut(addr)?;
        if region.len() < data.len() {
            bail!("scratch region {:?} holds {} bytes, {} written", addr, region.len(), data.len());
        }
        region[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl ModuleGateway for InMemoryModule {
    fn create_from_canvas(&self, canvas_id: &str) -> Option<Box<dyn ForeignSurface>> {
        let key = BackingKey::Canvas(canvas_id.to_string());
        let (width, height) = {
            let backings = lock(&self.state.backings);
            let backing = backings.get(&key)?;
            (backing.width, backing.height)
        };

        Some(self.make_surface(key, width, height, false))
    }

    fn create_from_texture(
        &self,
        texture_id: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    ) -> Option<Box<dyn ForeignSurface>> {
        if width == 0 || height == 0 || !lock(&self.state.textures).contains(&texture_id) {
            return None;
        }

        let key = BackingKey::Texture(texture_id);
        lock(&self.state.backings)
            .entry(key.clone())
            .or_insert_with(|| Backing::new(width, height));

        Some(self.make_surface(key, width, height, flip_y))
    }

    fn create_from_render_target(
        &self,
        frame_buffer_id: u32,
        width: u32,
        height: u32,
        flip_y: bool,
    ) -> Option<Box<dyn ForeignSurface>> {
        if width == 0 || height == 0 || !lock(&self.state.render_targets).contains(&frame_buffer_id) {
            return None;
        }

        let key = BackingKey::RenderTarget(frame_buffer_id);
        lock(&self.state.backings)
            .entry(key.clone())
            .or_insert_with(|| Backing::new(width, height));

        Some(self.make_surface(key, width, height, flip_y))
    }

    fn alloc(&self, len: usize) -> Result<ScratchAddr> {
        lock(&self.state.heap).alloc(len)
    }

    fn free(&self, addr: ScratchAddr) {
        lock(&self.state.heap).free(addr)
    }

    fn copy_out(&self, addr: ScratchAddr, dst: &mut [u8]) -> Result<()> {
        let heap = lock(&self.state.heap);
        let region = heap.region(addr)?;
        if region.len() < dst.len() {
            bail!("scratch region {:?} holds {} bytes, {} requested", addr, region.len(), dst.len());
        }
        dst.copy_from_slice(&region[..dst.len()]);
        Ok(())
    }

    fn barrier(&self) -> &RewindBarrier {
        &self.state.barrier
    }
}

struct InMemorySurface {
    key: BackingKey,
    flip_y: bool,
    /// Size as last picked up from the backing store
    size: Mutex<(u32, u32)>,
    /// Bytes this surface holds in its render cache
    cache: AtomicUsize,
    state: Arc<ModuleState>,
}

impl InMemorySurface {
    fn drop_cache(&self) {
        let held = self.cache.swap(0, Ordering::SeqCst);
        self.state.cached_bytes.fetch_sub(held, Ordering::SeqCst);
    }

    fn grow_cache(&self, bytes: usize) {
        self.cache.fetch_add(bytes, Ordering::SeqCst);
        self.state.cached_bytes.fetch_add(bytes, Ordering::SeqCst);
    }
}

/// Converts one stored premultiplied RGBA pixel into the requested layout.
fn convert_pixel(rgba: [u8; 4], color: ColorType, alpha: AlphaType, out: &mut Vec<u8>) {
    let [r, g, b, a] = match alpha {
        AlphaType::Premultiplied | AlphaType::Unknown => rgba,
        AlphaType::Opaque => [rgba[0], rgba[1], rgba[2], 255],
        AlphaType::Unpremultiplied => unpremultiply(rgba),
    };

    match color {
        ColorType::Rgba8888 => out.extend_from_slice(&[r, g, b, a]),
        ColorType::Bgra8888 => out.extend_from_slice(&[b, g, r, a]),
        ColorType::Alpha8 => out.push(a),
        ColorType::Unknown => {}
    }
}

fn unpremultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    if a == 0 {
        return [0; 4];
    }
    let scale = |c: u8| ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8;
    [scale(r), scale(g), scale(b), a]
}

impl ForeignSurface for InMemorySurface {
    fn width(&self) -> u32 {
        lock(&self.size).0
    }

    fn height(&self) -> u32 {
        lock(&self.size).1
    }

    fn update_size(&self) {
        if let BackingKey::Canvas(_) = self.key {
            if let Some(backing) = lock(&self.state.backings).get(&self.key) {
                *lock(&self.size) = (backing.width, backing.height);
            }
        }
        self.drop_cache();
    }

    fn clear_all(&self) -> bool {
        let mut backings = lock(&self.state.backings);
        match backings.get_mut(&self.key) {
            Some(backing) => backing.clear(),
            None => false,
        }
    }

    fn free_cache(&self) {
        self.drop_cache();
    }

    fn read_pixels(&self, color: ColorType, alpha: AlphaType, dst: ScratchAddr, row_bytes: usize) -> bool {
        let bpp = color.bytes_per_pixel();
        if bpp == 0 || alpha == AlphaType::Unknown {
            return false;
        }

        let (width, height) = *lock(&self.size);
        let packed = width as usize * bpp;
        if row_bytes < packed {
            return false;
        }

        let mut out = Vec::with_capacity(row_bytes * height as usize);
        {
            let backings = lock(&self.state.backings);
            let Some(backing) = backings.get(&self.key) else {
                return false;
            };

            for row in 0..height {
                let y = if self.flip_y { height - 1 - row } else { row };
                for x in 0..width {
                    convert_pixel(backing.pixel(x, y), color, alpha, &mut out);
                }
                out.resize(out.len() + (row_bytes - packed), 0);
            }
        }

        if let Err(e) = self.state.write_scratch(dst, &out) {
            log::debug!("read_pixels into {:?} failed: {}", dst, e);
            return false;
        }

        self.grow_cache(out.len());
        true
    }

    fn release(self: Box<Self>) {
        self.drop_cache();
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }

    fn detach(self: Box<Self>) {
        self.state.detached.fetch_add(1, Ordering::SeqCst);
    }
}
