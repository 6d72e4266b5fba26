use std::{ops::Deref, sync::Arc};

/// SharedBytes is a reference-counted, sliceable byte buffer.
///
/// Envelopes arrive as one allocation; headers are peeled off and payloads
/// handed around as views into the same `Arc<[u8]>` without copying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedBytes {
    data: Arc<[u8]>,
    start: usize,
    len: usize,
}

impl SharedBytes {
    /// Creates a new SharedBytes from a Vec by taking ownership.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let data: Arc<[u8]> = Arc::from(vec.into_boxed_slice());
        let len = data.len();
        Self { data, start: 0, len }
    }

    /// Creates an empty buffer.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Returns a view of `len` bytes starting at `start`, or None if out of bounds.
    pub fn slice(&self, start: usize, len: usize) -> Option<Self> {
        let end = start.checked_add(len)?;
        if end > self.len {
            return None;
        }
        Some(Self { data: self.data.clone(), start: self.start + start, len })
    }

    /// Returns a view of everything after the first `count` bytes, or None if too short.
    pub fn skip(&self, count: usize) -> Option<Self> {
        self.slice(count, self.len.checked_sub(count)?)
    }

    /// Returns the current view as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    /// Returns the length of the current view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl From<Vec<u8>> for SharedBytes {
    fn from(v: Vec<u8>) -> Self {
        Self::from_vec(v)
    }
}

impl From<&[u8]> for SharedBytes {
    fn from(s: &[u8]) -> Self {
        Self::from_vec(s.to_vec())
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for SharedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}
