use std::{borrow::Cow, sync::Arc};

use cesu8_str::java as cesu8_java;

use crate::error::ClassReadError;

/// Decodes a `CONSTANT_Utf8` payload, which is modified UTF-8 rather than UTF-8.
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<Arc<str>, ClassReadError> {
    let java_str = cesu8_java::JavaStr::from_java_cesu8(bytes)
        .map_err(|err| ClassReadError::Utf8Error(format!("{err:?}")))?;
    Ok(match cesu8_java::from_java_cesu8(java_str) {
        Cow::Borrowed(s) => Arc::from(s),
        Cow::Owned(s) => Arc::from(s),
    })
}

pub(crate) fn encode_modified_utf8(s: &str) -> Cow<'_, [u8]> {
    match cesu8_java::from_utf8(s) {
        Cow::Borrowed(b) => Cow::Borrowed(b.as_bytes()),
        Cow::Owned(o) => Cow::Owned(o.into_bytes()),
    }
}
