use super::StorageError;
use std::collections::VecDeque;

pub type FrameId = usize;

/// Tracks which frames are evictable and picks victims in
/// least-recently-used order. Every frame starts out evictable; a frame
/// re-enters the queue when its pin count drops to zero and leaves it
/// when pinned or victimized.
pub struct LruReplacer {
    queue: VecDeque<FrameId>,
    in_queue: Vec<bool>,
}

impl LruReplacer {
    pub fn new(size: usize) -> Self {
        Self {
            queue: (0..size).collect(),
            in_queue: vec![true; size],
        }
    }

    /// the frame became unpinned; it moves to the MRU end
    pub fn unpin(&mut self, frame_id: FrameId) {
        assert!(frame_id < self.in_queue.len());
        if !self.in_queue[frame_id] {
            self.in_queue[frame_id] = true;
            self.queue.push_back(frame_id);
        }
    }

    pub fn pin(&mut self, frame_id: FrameId) {
        assert!(frame_id < self.in_queue.len());
        if self.in_queue[frame_id] {
            self.in_queue[frame_id] = false;
            self.queue.retain(|&id| id != frame_id);
        }
    }

    pub fn victim(&mut self) -> Result<FrameId, StorageError> {
        match self.queue.pop_front() {
            Some(frame_id) => {
                self.in_queue[frame_id] = false;
                Ok(frame_id)
            }
            None => Err(StorageError::Internal(
                "all frames are pinned".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_frames_are_evictable() {
        // a new pool must hand out its first frame without any prior unpin
        let mut replacer = LruReplacer::new(2);
        assert_eq!(replacer.victim().unwrap(), 0);
        assert_eq!(replacer.victim().unwrap(), 1);
        assert!(replacer.victim().is_err());
    }

    #[test]
    fn lru_order() {
        let mut replacer = LruReplacer::new(5);
        assert_eq!(replacer.victim().unwrap(), 0);
        assert_eq!(replacer.victim().unwrap(), 1);
        // 2 becomes most recently used again
        replacer.pin(2);
        replacer.unpin(2);
        assert_eq!(replacer.victim().unwrap(), 3);
        assert_eq!(replacer.victim().unwrap(), 4);
        assert_eq!(replacer.victim().unwrap(), 2);
        assert!(replacer.victim().is_err());
    }

    #[test]
    fn pinned_frames_are_skipped() {
        let mut replacer = LruReplacer::new(2);
        replacer.pin(0);
        replacer.pin(1);
        replacer.unpin(1);
        assert_eq!(replacer.victim().unwrap(), 1);
        assert!(replacer.victim().is_err());
    }
}
