//! 浏览器层：驱动抽象、快照构建、元素引用注册表、动作执行器

pub mod driver;
pub mod executor;
pub mod mock;
pub mod registry;
pub mod snapshot;
pub mod types;

pub use driver::{AxNode, BrowserDriver, CheckedState, DriverError, ScrollDirection};
pub use executor::{classify_driver_error, ActionExecutor, ScrollTarget};
pub use mock::{MockDriver, MockPage, RecordedAction};
pub use registry::{parse_handle_index, ElementRegistry};
pub use snapshot::{prune, truncate_name, SnapshotBuilder, SnapshotLimits};
pub use types::{
    BoundingBox, ElementDescriptor, ElementState, Enablement, Handle, Locator, Presence, Snapshot, SnapshotElement,
    Viewport,
};
