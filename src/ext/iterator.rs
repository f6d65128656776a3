use std::os::raw::{c_char, c_float, c_int};
use std::ptr;

use super::error::{guarded, into_c_string, record_error};
use super::handle::{ExtHandle, handle_ref};
use crate::engine::{PageIteratorLevel, ResultIterator};

/// Caller-owned iterator over the last recognition of a handle.
pub struct ExtResultIterator {
    inner: Box<dyn ResultIterator + Send>,
}

fn iterator_mut<'a>(iterator: *mut ExtResultIterator) -> Option<&'a mut ExtResultIterator> {
    let iterator = unsafe { iterator.as_mut() };
    if iterator.is_none() {
        record_error("iterator is null");
    }
    iterator
}

fn level_from(level: c_int) -> Option<PageIteratorLevel> {
    match PageIteratorLevel::try_from(level) {
        Ok(level) => Some(level),
        Err(value) => {
            record_error(format!("invalid iterator level: {value}"));
            None
        }
    }
}

/// Hands the caller an iterator over the current results, or null before any
/// recognition. Free it with `tess_bridge_iterator_free` before the handle's
/// next set-image, rectangle, clear, end, recognition or finalize.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_get_result_iterator(
    handle: *const ExtHandle,
) -> *mut ExtResultIterator {
    guarded(ptr::null_mut(), || {
        let Some(handle) = handle_ref(handle) else {
            return ptr::null_mut();
        };
        // The caller owns the iterator and the ordering contract above.
        match unsafe { handle.result_iterator() } {
            Some(inner) => Box::into_raw(Box::new(ExtResultIterator { inner })),
            None => {
                record_error("no recognition results");
                ptr::null_mut()
            }
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_free(iterator: *mut ExtResultIterator) {
    if iterator.is_null() {
        return;
    }
    guarded((), || unsafe {
        drop(Box::from_raw(iterator));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_begin(iterator: *mut ExtResultIterator) {
    guarded((), || {
        if let Some(iterator) = iterator_mut(iterator) {
            iterator.inner.begin();
        }
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_next(iterator: *mut ExtResultIterator, level: c_int) -> bool {
    guarded(false, || {
        let (Some(iterator), Some(level)) = (iterator_mut(iterator), level_from(level)) else {
            return false;
        };
        iterator.inner.next(level)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_utf8_text(
    iterator: *mut ExtResultIterator,
    level: c_int,
) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let (Some(iterator), Some(level)) = (iterator_mut(iterator), level_from(level)) else {
            return ptr::null_mut();
        };
        match iterator.inner.utf8_text(level) {
            Some(text) => into_c_string(&text),
            None => ptr::null_mut(),
        }
    })
}

/// Confidence (0-100) of the current element, or -1 on bad arguments.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_confidence(
    iterator: *mut ExtResultIterator,
    level: c_int,
) -> c_float {
    guarded(-1.0, || {
        let (Some(iterator), Some(level)) = (iterator_mut(iterator), level_from(level)) else {
            return -1.0;
        };
        iterator.inner.confidence(level)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_bounding_box(
    iterator: *mut ExtResultIterator,
    level: c_int,
    left: *mut c_int,
    top: *mut c_int,
    right: *mut c_int,
    bottom: *mut c_int,
) -> bool {
    guarded(false, || {
        let (Some(iterator), Some(level)) = (iterator_mut(iterator), level_from(level)) else {
            return false;
        };
        let Some(bbox) = iterator.inner.bounding_box(level) else {
            return false;
        };
        for (out, value) in [(left, bbox.left), (top, bbox.top), (right, bbox.right), (bottom, bbox.bottom)] {
            if let Some(out) = unsafe { out.as_mut() } {
                *out = value;
            }
        }
        true
    })
}

/// Alternatives for the current element as a JSON array of
/// `{"text": ..., "confidence": ...}` objects.
#[unsafe(no_mangle)]
pub extern "C" fn tess_bridge_iterator_choices_json(
    iterator: *mut ExtResultIterator,
    level: c_int,
) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let (Some(iterator), Some(level)) = (iterator_mut(iterator), level_from(level)) else {
            return ptr::null_mut();
        };
        match serde_json::to_string(&iterator.inner.choices(level)) {
            Ok(json) => into_c_string(&json),
            Err(err) => {
                record_error(format!("failed to encode choices: {err}"));
                ptr::null_mut()
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::class::testing;
    use crate::ext::error::{last_error, read_c_str, tess_bridge_free_string};
    use crate::ext::handle::{construct_with, tess_bridge_finalize, tess_bridge_init};
    use crate::ext::recognize::tess_bridge_get_utf8_text;
    use crate::test_util::{ScriptStep, ScriptedEngine};
    use std::ffi::CString;

    const WORD: c_int = PageIteratorLevel::Word as c_int;

    fn recognized(text: &'static str) -> *mut ExtHandle {
        testing::bind();
        let (engine, _) = ScriptedEngine::new(vec![ScriptStep::Text(text)]);
        let handle = construct_with(Box::new(engine));
        let language = CString::new("eng").unwrap();
        assert!(tess_bridge_init(handle, ptr::null(), language.as_ptr()));
        assert!(tess_bridge_get_result_iterator(handle).is_null());
        assert_eq!(last_error().as_deref(), Some("no recognition results"));
        tess_bridge_free_string(tess_bridge_get_utf8_text(handle, ptr::null_mut()));
        handle
    }

    fn take(text: *mut c_char) -> Option<String> {
        let value = read_c_str(text);
        tess_bridge_free_string(text);
        value
    }

    #[test]
    fn walks_words_with_boxes_and_confidence() {
        let handle = recognized("Hello big world");
        let iterator = tess_bridge_get_result_iterator(handle);
        assert!(!iterator.is_null());
        tess_bridge_iterator_begin(iterator);

        let mut words = Vec::new();
        loop {
            let text = take(tess_bridge_iterator_utf8_text(iterator, WORD)).expect("word");
            let (mut left, mut top, mut right, mut bottom) = (0, 0, 0, 0);
            assert!(tess_bridge_iterator_bounding_box(
                iterator, WORD, &mut left, &mut top, &mut right, &mut bottom
            ));
            words.push(format!("{text}@{left},{top},{right},{bottom}"));
            if !tess_bridge_iterator_next(iterator, WORD) {
                break;
            }
        }
        insta::assert_snapshot!(words.join(" "), @"Hello@0,0,50,20 big@60,0,90,20 world@100,0,150,20");
        assert_eq!(tess_bridge_iterator_confidence(iterator, WORD), 83.0);

        tess_bridge_iterator_begin(iterator);
        assert_eq!(tess_bridge_iterator_confidence(iterator, WORD), 91.0);

        tess_bridge_iterator_free(iterator);
        tess_bridge_finalize(handle);
    }

    #[test]
    fn choices_are_encoded_as_json() {
        let handle = recognized("abc");
        let iterator = tess_bridge_get_result_iterator(handle);
        let json = take(tess_bridge_iterator_choices_json(iterator, WORD)).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value[0]["text"], "abc");
        assert_eq!(value[0]["confidence"], 91.0);
        assert_eq!(value[1]["text"], "ABC");
        assert_eq!(value[1]["confidence"], 12.5);
        tess_bridge_iterator_free(iterator);
        tess_bridge_finalize(handle);
    }

    #[test]
    fn choices_are_available_at_every_level() {
        let handle = recognized("ab cd");
        let iterator = tess_bridge_get_result_iterator(handle);
        for level in [
            PageIteratorLevel::Block,
            PageIteratorLevel::TextLine,
            PageIteratorLevel::Symbol,
        ] {
            let json = take(tess_bridge_iterator_choices_json(iterator, level as c_int))
                .expect("json");
            let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
            assert_eq!(value.as_array().map(Vec::len), Some(2), "{level:?}");
        }
        tess_bridge_iterator_free(iterator);
        tess_bridge_finalize(handle);
    }

    #[test]
    fn bad_level_and_null_iterator_fail_softly() {
        let handle = recognized("abc");
        let iterator = tess_bridge_get_result_iterator(handle);
        assert!(!tess_bridge_iterator_next(iterator, 9));
        assert_eq!(last_error().as_deref(), Some("invalid iterator level: 9"));
        assert_eq!(tess_bridge_iterator_confidence(ptr::null_mut(), WORD), -1.0);
        assert_eq!(last_error().as_deref(), Some("iterator is null"));
        tess_bridge_iterator_free(iterator);
        tess_bridge_iterator_free(ptr::null_mut());
        tess_bridge_finalize(handle);
    }
}
