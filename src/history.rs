//! history.rs — back/forward stack of opened pages.

/// Pages visited, with a position that `back`/`forward` move along.
///
/// Adding while not at the newest entry drops everything after the current
/// position. When `cap` is exceeded the oldest entries are dropped.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: Vec<T>,
    index: usize,
    cap: usize,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::with_capacity(usize::MAX)
    }
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            cap: cap.max(1),
        }
    }

    pub fn add(&mut self, entry: T) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(entry);
        if self.entries.len() > self.cap {
            let excess = self.entries.len() - self.cap;
            self.entries.drain(0..excess);
        }
        self.index = self.entries.len() - 1;
    }

    pub fn current(&self) -> Option<&T> {
        self.entries.get(self.index)
    }

    /// Step back; stays put on the oldest entry.
    pub fn back(&mut self) -> Option<&T> {
        self.index = self.index.saturating_sub(1);
        self.current()
    }

    /// Step forward; stays put on the newest entry.
    pub fn forward(&mut self) -> Option<&T> {
        if self.index + 1 < self.entries.len() {
            self.index += 1;
        }
        self.current()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_has_no_current() {
        let mut h: History<u32> = History::new();
        assert!(h.is_empty());
        assert!(h.current().is_none());
        assert!(h.back().is_none());
        assert!(h.forward().is_none());
    }

    #[test]
    fn back_and_forward_stop_at_ends() {
        let mut h = History::new();
        h.add("a");
        h.add("b");
        h.add("c");
        assert_eq!(h.back(), Some(&"b"));
        assert_eq!(h.back(), Some(&"a"));
        assert_eq!(h.back(), Some(&"a"));
        assert_eq!(h.forward(), Some(&"b"));
        assert_eq!(h.forward(), Some(&"c"));
        assert_eq!(h.forward(), Some(&"c"));
    }

    #[test]
    fn add_after_back_drops_forward_entries() {
        let mut h = History::new();
        h.add(1);
        h.add(2);
        h.add(3);
        h.back();
        h.back();
        h.add(4);
        assert_eq!(h.len(), 2);
        assert_eq!(h.current(), Some(&4));
        assert_eq!(h.back(), Some(&1));
        h.forward();
        assert_eq!(h.forward(), Some(&4));
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut h = History::with_capacity(2);
        h.add(1);
        h.add(2);
        h.add(3);
        assert_eq!(h.len(), 2);
        assert_eq!(h.current(), Some(&3));
        assert_eq!(h.back(), Some(&2));
        assert_eq!(h.back(), Some(&2));
    }
}
