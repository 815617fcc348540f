//! Type-erased callable used for poller and socket callbacks.
//!
//! The teacher ([`mio`]) keeps registration-time state (tokens, interest
//! bitsets) as plain data and leaves dispatch to the caller re-reading
//! `Events` after `poll()` returns. This runtime instead hands a callback
//! straight to the poller and socket layers (see `spec.md` §4.4/§4.5), so it
//! needs a small boxed-closure wrapper with a name: `Callback`. It is not
//! required to be allocation-free (unlike the C++ original's inline
//! small-buffer-optimized `MethodPointer`), since Rust closures captured by
//! value already avoid a second heap allocation for the captured state in
//! the common case; boxing only erases the type.
pub struct Callback<Args> {
    inner: Box<dyn FnMut(Args) + 'static>,
}

impl<Args> Callback<Args> {
    pub fn new<F>(f: F) -> Callback<Args>
    where
        F: FnMut(Args) + 'static,
    {
        Callback { inner: Box::new(f) }
    }

    pub fn call(&mut self, args: Args) {
        (self.inner)(args)
    }
}

impl<Args> std::fmt::Debug for Callback<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// A no-op callback, useful as a default before a real one is installed.
impl<Args> Default for Callback<Args> {
    fn default() -> Self {
        Callback::new(|_| {})
    }
}
