//! C ABI consumed by the managed-runtime binding.
//!
//! Every exported function catches panics, reports failures through
//! `tess_bridge_last_error_message`, and treats a null handle as a soft error.
//! Strings returned to the caller are released with `tess_bridge_free_string`.

mod class;
mod error;
mod handle;
mod iterator;
mod recognize;

pub use class::ProgressCallback;
pub use handle::ExtHandle;
pub use iterator::ExtResultIterator;
