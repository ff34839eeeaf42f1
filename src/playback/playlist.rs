//! Bounded FIFO of upcoming sources for one player slot.

use std::collections::VecDeque;

use super::{AudioSource, PlaybackError};

/// Foreground holds at most an alert and one follow-up.
pub const FOREGROUND_CAPACITY: usize = 2;
pub const BACKGROUND_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct Playlist {
    entries: VecDeque<AudioSource>,
    capacity: usize,
}

impl Playlist {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one source.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::PlaylistFull`] when `capacity` entries are queued.
    pub fn push(&mut self, source: AudioSource) -> Result<(), PlaybackError> {
        if self.entries.len() >= self.capacity {
            return Err(PlaybackError::PlaylistFull(self.capacity));
        }
        self.entries.push_back(source);
        Ok(())
    }

    /// Replace the contents with `sources`, keeping the first `capacity`.
    /// Returns how many were queued.
    pub fn replace(&mut self, sources: &[AudioSource]) -> usize {
        if sources.len() > self.capacity {
            log::warn!(
                "playlist: {} sources exceed capacity {}, truncating",
                sources.len(),
                self.capacity
            );
        }
        self.entries.clear();
        self.entries
            .extend(sources.iter().take(self.capacity).cloned());
        self.entries.len()
    }

    /// Pop the next source to play.
    pub fn next(&mut self) -> Option<AudioSource> {
        self.entries.pop_front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the queued sources, next first.
    pub fn entries(&self) -> Vec<AudioSource> {
        self.entries.iter().cloned().collect()
    }
}
