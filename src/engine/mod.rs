//! The recognition engine seen from the bridge: an external collaborator that
//! owns every algorithm. The bridge only forwards to it.

#[cfg(feature = "tesseract")]
pub mod tesseract;

use serde::Serialize;

/// Engine mode passed to initialization. Values follow the engine's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    TesseractOnly = 0,
    LstmOnly = 1,
    TesseractLstmCombined = 2,
    #[default]
    Default = 3,
}

impl TryFrom<i32> for EngineMode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::TesseractOnly),
            1 => Ok(Self::LstmOnly),
            2 => Ok(Self::TesseractLstmCombined),
            3 => Ok(Self::Default),
            other => Err(other),
        }
    }
}

/// Page segmentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSegMode {
    OsdOnly = 0,
    AutoOsd = 1,
    AutoOnly = 2,
    Auto = 3,
    SingleColumn = 4,
    SingleBlockVertText = 5,
    #[default]
    SingleBlock = 6,
    SingleLine = 7,
    SingleWord = 8,
    CircleWord = 9,
    SingleChar = 10,
    SparseText = 11,
    SparseTextOsd = 12,
    RawLine = 13,
}

impl TryFrom<i32> for PageSegMode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let mode = match value {
            0 => Self::OsdOnly,
            1 => Self::AutoOsd,
            2 => Self::AutoOnly,
            3 => Self::Auto,
            4 => Self::SingleColumn,
            5 => Self::SingleBlockVertText,
            6 => Self::SingleBlock,
            7 => Self::SingleLine,
            8 => Self::SingleWord,
            9 => Self::CircleWord,
            10 => Self::SingleChar,
            11 => Self::SparseText,
            12 => Self::SparseTextOsd,
            13 => Self::RawLine,
            other => return Err(other),
        };
        Ok(mode)
    }
}

/// Granularity used when walking results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageIteratorLevel {
    Block = 0,
    Paragraph = 1,
    TextLine = 2,
    Word = 3,
    Symbol = 4,
}

impl TryFrom<i32> for PageIteratorLevel {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Block),
            1 => Ok(Self::Paragraph),
            2 => Ok(Self::TextLine),
            3 => Ok(Self::Word),
            4 => Ok(Self::Symbol),
            other => Err(other),
        }
    }
}

/// Borrowed view of the image the handle owns. The engine reads it during
/// `set_image` and must not keep the slice past that call.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub data: &'a [u8],
    pub width: i32,
    pub height: i32,
    pub bytes_per_pixel: i32,
    pub bytes_per_line: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rectangle {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// One progress notification from the engine. The coordinates describe the
/// region that changed and are all zero when the event carries only a percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressUpdate {
    pub percent: i32,
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl ProgressUpdate {
    pub fn percent(percent: i32) -> Self {
        Self {
            percent,
            ..Self::default()
        }
    }

    pub fn has_region(&self) -> bool {
        self.left != 0 || self.right != 0 || self.top != 0 || self.bottom != 0
    }
}

/// Callback slots handed to a long-running engine call.
///
/// The engine invokes both synchronously, on the thread that made the call.
pub trait Monitor {
    /// Polled by the engine. `words` is the number of words processed so far.
    fn cancel_requested(&self, words: i32) -> bool;

    fn progress(&self, update: ProgressUpdate);
}

/// A recognition alternative for the current element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub text: String,
    pub confidence: f32,
}

/// Walks the results of the last recognition.
pub trait ResultIterator {
    fn begin(&mut self);

    /// Moves to the next element at `level`; false once exhausted.
    fn next(&mut self, level: PageIteratorLevel) -> bool;

    fn utf8_text(&self, level: PageIteratorLevel) -> Option<String>;

    /// Mean confidence of the current element, 0 to 100.
    fn confidence(&self, level: PageIteratorLevel) -> f32;

    fn bounding_box(&self, level: PageIteratorLevel) -> Option<BoundingBox>;

    /// Alternatives at the current position. Produced for every `level`; the
    /// engine reports those of the symbol under the iterator.
    fn choices(&self, level: PageIteratorLevel) -> Vec<Choice>;
}

/// Operations the bridge forwards to the engine.
pub trait Engine: Send {
    /// Loads language data. Returns false when the engine rejects the request.
    fn init(&mut self, datapath: &str, language: &str, mode: EngineMode) -> bool;

    fn init_languages(&self) -> Option<String>;

    fn set_image(&mut self, image: ImageView<'_>);

    fn set_rectangle(&mut self, rect: Rectangle);

    fn utf8_text(&mut self, monitor: &dyn Monitor) -> Option<String>;

    fn hocr_text(&mut self, page: i32, monitor: &dyn Monitor) -> Option<String>;

    fn box_text(&mut self, page: i32) -> Option<String>;

    fn mean_text_conf(&mut self) -> i32;

    fn all_word_confidences(&mut self) -> Option<Vec<i32>>;

    fn set_variable(&mut self, name: &str, value: &str) -> bool;

    fn page_seg_mode(&self) -> PageSegMode;

    fn set_page_seg_mode(&mut self, mode: PageSegMode);

    /// Iterator over the current results. It reads engine state directly and
    /// must be dropped before the engine's results change.
    fn result_iterator(&mut self) -> Option<Box<dyn ResultIterator + Send>>;

    fn set_input_name(&mut self, name: &str);

    fn set_output_name(&mut self, name: &str);

    fn read_config_file(&mut self, path: &str);

    fn clear(&mut self);

    fn clear_adaptive_classifier(&mut self);

    fn end(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_mode_rejects_out_of_range_values() {
        assert_eq!(EngineMode::try_from(1), Ok(EngineMode::LstmOnly));
        assert_eq!(EngineMode::try_from(4), Err(4));
        assert_eq!(EngineMode::try_from(-1), Err(-1));
    }

    #[test]
    fn page_seg_mode_covers_engine_range() {
        for value in 0..=13 {
            let mode = PageSegMode::try_from(value).expect("valid mode");
            assert_eq!(mode as i32, value);
        }
        assert_eq!(PageSegMode::try_from(14), Err(14));
    }

    #[test]
    fn progress_region_detection() {
        assert!(!ProgressUpdate::percent(40).has_region());
        let update = ProgressUpdate {
            percent: 0,
            left: 0,
            right: 12,
            top: 0,
            bottom: 0,
        };
        assert!(update.has_region());
    }
}
