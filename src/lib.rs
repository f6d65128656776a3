//! Native side of an OCR engine binding for a managed runtime.
//!
//! [`NativeHandle`] owns one engine instance and the image buffer handed to
//! it, relays throttled progress to a [`ProgressListener`], and lets any thread
//! stop a running recognition call. The [`ext`] module exposes the same surface
//! as a C ABI.

pub mod bridge;
pub mod engine;
pub mod ext;
pub mod logging;
pub mod settings;
mod test_util;

pub use bridge::{BridgeError, NativeHandle, ProgressListener, StopHandle};
pub use engine::{
    BoundingBox, Choice, Engine, EngineMode, ImageView, Monitor, PageIteratorLevel, PageSegMode,
    ProgressUpdate, Rectangle, ResultIterator,
};
pub use settings::{Settings, load_settings};
