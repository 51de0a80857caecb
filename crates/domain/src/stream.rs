use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
///
/// A chat stream yields `Ok` content deltas and terminates after at most
/// one `Err`; downstream handlers forward the deltas as raw chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;
