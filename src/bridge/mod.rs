//! Lifecycle, cancellation and progress relay between a managed caller and
//! the engine.

mod buffer;
mod error;
mod handle;
mod monitor;
mod state;

pub use buffer::{ImageBuffer, ImageSlot};
pub use error::{BridgeError, Result};
pub use handle::NativeHandle;
pub use state::{ProgressListener, StopHandle};
