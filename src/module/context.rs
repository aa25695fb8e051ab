use std::sync::Arc;

use crate::config::ModuleConfig;
use crate::module::gateway::ModuleGateway;
use crate::module::rewind::{RewindBarrier, RewindTicket};

/// Handle on one foreign module instance. Every surface created against a context uses its
/// gateway and configuration, and waits on the module's own rewind barrier, so contexts built
/// over the same gateway pause together.
#[derive(Clone)]
pub struct ModuleContext {
    inner: Arc<ModuleShared>,
}

struct ModuleShared {
    /// Entry points of the foreign module
    gateway: Arc<dyn ModuleGateway>,
    /// Configuration for the module and its surfaces
    config: ModuleConfig,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("gateway", &"Arc<dyn ModuleGateway>")
            .field("barrier", &self.barrier().state())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ModuleContext {
    /// Binds a context to a foreign module.
    ///
    /// If `config` is `None`, [`ModuleConfig::default`] is used.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use surface_bridge::module::{InMemoryModule, ModuleContext};
    /// let module = Arc::new(InMemoryModule::new());
    /// let ctx = ModuleContext::new(module, None);
    /// assert!(!ctx.barrier().is_rewinding());
    /// ```
    pub fn new(gateway: Arc<dyn ModuleGateway>, config: Option<ModuleConfig>) -> Self {
        Self {
            inner: Arc::new(ModuleShared {
                gateway,
                config: config.unwrap_or_default(),
            }),
        }
    }

    pub fn gateway(&self) -> &dyn ModuleGateway {
        self.inner.gateway.as_ref()
    }

    /// Rewind barrier of the underlying module instance.
    pub fn barrier(&self) -> &RewindBarrier {
        self.inner.gateway.barrier()
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.inner.config
    }

    /// Signals that the foreign module started re-initializing. Surface operations on this
    /// module, through any context, suspend until the returned ticket is finished or dropped.
    pub fn begin_rewind(&self) -> RewindTicket {
        self.barrier().begin()
    }

    /// True when both contexts are bound to the same module instance.
    pub fn same_module(&self, other: &ModuleContext) -> bool {
        let this = Arc::as_ptr(&self.inner.gateway) as *const ();
        let that = Arc::as_ptr(&other.inner.gateway) as *const ();
        this == that
    }
}
