//! # Feed
//! Sparse, two-directional window of already-fetched items around a cursor.
//!
//! Offsets passed to [`Feed::get`] and friends are relative to the cursor
//! (`0` is the current item, negative is above, positive below). Internally
//! items live at absolute positions strictly between `lower` and `upper`;
//! appending fills from `upper` downward in the list, prepending from `lower`
//! upward, and neither bound ever retreats.

use std::collections::BTreeMap;
use std::fmt;

use crate::item::ItemRef;

pub struct Feed {
    items: BTreeMap<isize, ItemRef>,
    /// Exclusive bounds on populated absolute positions.
    lower: isize,
    upper: isize,
    cursor: isize,
    /// Where the feed was seeded; what `move_to_center` returns to.
    center: isize,
}

impl Feed {
    /// A feed seeded with one item, which becomes both cursor and center.
    pub fn new(seed: ItemRef) -> Self {
        Self {
            items: BTreeMap::from([(0, seed)]),
            lower: -1,
            upper: 1,
            cursor: 0,
            center: 0,
        }
    }

    /// An empty feed; the first appended item lands under the cursor.
    pub fn empty() -> Self {
        Self {
            items: BTreeMap::new(),
            lower: 0,
            upper: 1,
            cursor: 1,
            center: 1,
        }
    }

    /// An unseeded feed holding `items` in order, cursor on the first.
    pub fn from_items(items: Vec<ItemRef>) -> Self {
        let mut feed = Self::empty();
        feed.append(items);
        feed
    }

    /// Extend below the last item, in order.
    pub fn append(&mut self, items: Vec<ItemRef>) {
        for item in items {
            self.items.insert(self.upper, item);
            self.upper += 1;
        }
    }

    /// Extend above the first item; `items[0]` ends up nearest.
    pub fn prepend(&mut self, items: Vec<ItemRef>) {
        for item in items {
            self.items.insert(self.lower, item);
            self.lower -= 1;
        }
    }

    pub fn contains(&self, offset: isize) -> bool {
        let at = self.cursor + offset;
        self.lower < at && at < self.upper
    }

    /// The item `offset` positions from the cursor.
    ///
    /// # Panics
    /// If `offset` is not [`contains`](Self::contains)ed; callers check first.
    pub fn get(&self, offset: isize) -> &ItemRef {
        match self.try_get(offset) {
            Some(item) => item,
            None => panic!(
                "indexing feed at offset {} (absolute {}) whereas populated bounds are ({}, {})",
                offset,
                self.cursor + offset,
                self.lower,
                self.upper
            ),
        }
    }

    pub fn try_get(&self, offset: isize) -> Option<&ItemRef> {
        if !self.contains(offset) {
            return None;
        }
        self.items.get(&(self.cursor + offset))
    }

    pub fn current(&self) -> &ItemRef {
        self.get(0)
    }

    /// Step toward older context (up the screen) if something is there.
    pub fn move_up(&mut self) -> bool {
        if self.contains(-1) {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    /// Step toward newer children (down the screen) if something is there.
    pub fn move_down(&mut self) -> bool {
        if self.contains(1) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Jump back to the seed position, if it is populated.
    pub fn move_to_center(&mut self) -> bool {
        if self.lower < self.center && self.center < self.upper {
            self.cursor = self.center;
            true
        } else {
            false
        }
    }

    /// Whether the item at `offset` sits above the seed (an ancestor).
    pub fn is_parent(&self, offset: isize) -> bool {
        self.cursor + offset < self.center
    }

    /// Whether the item at `offset` sits below the seed (a child).
    pub fn is_child(&self, offset: isize) -> bool {
        self.cursor + offset > self.center
    }

    /// Populated `(offset, item)` pairs within `context` of the cursor.
    pub fn window(&self, context: usize) -> impl Iterator<Item = (isize, &ItemRef)> + '_ {
        let context = isize::try_from(context).unwrap_or(isize::MAX);
        let cursor = self.cursor;
        self.items
            .range(cursor.saturating_sub(context)..=cursor.saturating_add(context))
            .map(move |(at, item)| (at - cursor, item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Exclusive `(lower, upper)` bounds relative to the cursor.
    pub fn bounds(&self) -> (isize, isize) {
        (self.lower - self.cursor, self.upper - self.cursor)
    }
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .field("cursor", &self.cursor)
            .field("center", &self.center)
            .field("len", &self.items.len())
            .finish()
    }
}
