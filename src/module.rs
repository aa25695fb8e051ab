//! Foreign module binding.
//!
//! A [`ModuleContext`] ties together the [`ModuleGateway`] of one foreign module instance, its
//! [`RewindBarrier`] and the [`ModuleConfig`](crate::config::ModuleConfig). Surfaces are created
//! against a context and keep a clone of it, so every surface of one module shares the same
//! barrier.
//!
//! [`InMemoryModule`] implements the gateway in plain Rust for tests and host-side development.

/// Shared module state.
pub mod context;
/// Entry points consumed from the foreign module.
pub mod gateway;
/// In-process module implementation.
pub mod in_memory;
/// Rewind barrier.
pub mod rewind;

pub use context::ModuleContext;
pub use gateway::{ForeignSurface, ModuleGateway, ScratchAddr};
pub use in_memory::{BackingKey, InMemoryModule};
pub use rewind::{RewindBarrier, RewindState, RewindTicket};
