//! Native copy of the caller's image.
//!
//! The engine is pointed at the bytes but never owns them, so the slot keeps
//! exactly one buffer alive and frees it on replacement or release.

use super::error::{BridgeError, Result};
use crate::engine::ImageView;

#[derive(Debug)]
pub struct ImageBuffer {
    data: Box<[u8]>,
    width: i32,
    height: i32,
    bytes_per_pixel: i32,
    bytes_per_line: i32,
}

impl ImageBuffer {
    /// Validates the geometry and copies `data` into a buffer owned by the bridge.
    ///
    /// `bytes_per_pixel` follows the engine: 0 for 1-bit images, otherwise 1, 3 or 4.
    pub fn copy_from(
        data: &[u8],
        width: i32,
        height: i32,
        bytes_per_pixel: i32,
        bytes_per_line: i32,
    ) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(BridgeError::InvalidImage(format!(
                "dimensions must be positive ({width}x{height})"
            )));
        }
        let bits_per_pixel = match bytes_per_pixel {
            0 => 1,
            1 | 3 | 4 => bytes_per_pixel as usize * 8,
            other => {
                return Err(BridgeError::InvalidImage(format!(
                    "unsupported bytes per pixel: {other}"
                )));
            }
        };
        let min_line = (width as usize * bits_per_pixel).div_ceil(8);
        if bytes_per_line <= 0 || (bytes_per_line as usize) < min_line {
            return Err(BridgeError::InvalidImage(format!(
                "bytes per line {bytes_per_line} is shorter than a row ({min_line})"
            )));
        }
        let required = bytes_per_line as usize * height as usize;
        if data.len() < required {
            return Err(BridgeError::InvalidImage(format!(
                "buffer holds {} bytes, {required} required",
                data.len()
            )));
        }

        #[cfg(test)]
        tracking::allocated();

        Ok(Self {
            data: data.into(),
            width,
            height,
            bytes_per_pixel,
            bytes_per_line,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            bytes_per_pixel: self.bytes_per_pixel,
            bytes_per_line: self.bytes_per_line,
        }
    }
}

#[cfg(test)]
impl Drop for ImageBuffer {
    fn drop(&mut self) {
        tracking::freed();
    }
}

/// Holds at most one live [`ImageBuffer`].
#[derive(Debug, Default)]
pub struct ImageSlot {
    current: Option<ImageBuffer>,
}

impl ImageSlot {
    /// Installs `next`, lets `attach` point the engine at it, then frees the
    /// previous buffer. The engine never sees a freed buffer.
    pub fn replace<F>(&mut self, next: ImageBuffer, attach: F)
    where
        F: FnOnce(&ImageBuffer),
    {
        let previous = self.current.replace(next);
        if let Some(current) = self.current.as_ref() {
            attach(current);
        }
        drop(previous);
    }

    /// Frees the held buffer, if any.
    pub fn release(&mut self) -> bool {
        self.current.take().is_some()
    }

    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    pub fn get(&self) -> Option<&ImageBuffer> {
        self.current.as_ref()
    }
}

/// Per-thread allocation counters so tests can check that every buffer is
/// freed exactly once.
#[cfg(test)]
pub(crate) mod tracking {
    use std::cell::Cell;

    thread_local! {
        static ALLOCATED: Cell<usize> = const { Cell::new(0) };
        static FREED: Cell<usize> = const { Cell::new(0) };
    }

    pub(crate) fn allocated() {
        ALLOCATED.with(|cell| cell.set(cell.get() + 1));
    }

    pub(crate) fn freed() {
        FREED.with(|cell| cell.set(cell.get() + 1));
    }

    /// (allocated, freed) on the current thread.
    pub(crate) fn counts() -> (usize, usize) {
        (ALLOCATED.with(Cell::get), FREED.with(Cell::get))
    }

    pub(crate) fn live() -> usize {
        let (allocated, freed) = counts();
        allocated - freed
    }
}
