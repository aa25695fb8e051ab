pub mod config;
pub mod errors;
pub mod marshal;
pub mod module;
pub mod pixels;
pub mod surface;

pub use config::ModuleConfig;
pub use errors::SurfaceError;
pub use module::ModuleContext;
pub use pixels::{AlphaType, ColorType};
pub use surface::{SurfaceHandle, SurfaceId, SurfaceSource};
