//! Open read sessions.

/// Text captured when a node was opened.
///
/// Partial reads at increasing offsets all see the same text, whatever
/// happens to the probe after the open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    path: String,
    text: String,
}

impl Session {
    pub(crate) const fn new(path: String, text: String) -> Self {
        Self { path, text }
    }

    /// Path the session was opened on.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The whole captured text.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.text
    }

    /// Copies up to `buf.len()` bytes starting at `offset` and returns the
    /// number copied; zero at or past the end.
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        let bytes = self.text.as_bytes();
        let Some(rest) = bytes.get(offset..) else {
            return 0;
        };
        let count = rest.len().min(buf.len());
        buf[..count].copy_from_slice(&rest[..count]);
        count
    }
}
