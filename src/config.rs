/// Default upper bound for a single pixel transfer through foreign scratch memory.
const DEFAULT_MAX_SCRATCH_BYTES: usize = 256 * 1024 * 1024;

/// Module configuration shared by every surface bound to one foreign module instance.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Largest pixel buffer `read_pixels` will request from the foreign allocator
    pub max_scratch_bytes: usize,
    /// Release the foreign reference when a handle is dropped without `release()`.
    /// When false the reference is handed back to the foreign side untouched.
    pub release_on_drop: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            max_scratch_bytes: DEFAULT_MAX_SCRATCH_BYTES,
            release_on_drop: true,
        }
    }
}
