//! Type-based choice between the document codec and the library codecs.

use std::sync::Arc;

use crate::{codec::Codec, value::TypeKey};

/// Hands out a [`DocumentCodec`](crate::codec::DocumentCodec) for types that carry the
/// persistence marker and defers everything else.
///
/// The answer depends on the type alone. The [`CodecRegistry`](crate::codec::CodecRegistry)
/// memoizes it, so the dispatcher itself keeps no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecDispatcher;

impl CodecDispatcher {
    /// Returns the document codec for persistent types, `None` otherwise.
    pub fn codec_for(&self, key: &TypeKey) -> Option<Arc<dyn Codec>> {
        key.persistent_codec()
    }
}
