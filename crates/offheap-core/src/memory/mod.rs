pub mod layout;
mod locator;
mod process;
mod region;

#[cfg(test)]
pub mod mock;

pub use layout::{HeaderLayout, ObjectHeader, PointerWidth, payload_pointer};
pub use locator::{DEFAULT_RUNTIME_MODULES, LocatorConfig, ModuleLocator};
pub use process::{LoadedModule, ModuleEnumerator, ProcessModules};
pub use region::MemoryRegion;

#[cfg(test)]
pub use mock::{MockImageBuilder, MockModules};
