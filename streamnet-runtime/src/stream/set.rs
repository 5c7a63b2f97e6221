//! Stream sets
//!
//! An index-stable arena of descriptors linked in insertion order. Removal
//! unlinks a node and recycles its slot; keys of removed members must not be
//! used again. A set of readers can be polled for the first member with a
//! queued record.

use super::{StreamReader, StreamWriter};
use std::sync::Arc;
use tokio::sync::Notify;

/// A descriptor that can live in a [`StreamSet`]
pub trait Descriptor {
    /// Called when the descriptor joins a set
    fn attach(&mut self, _waker: &Arc<Notify>) {}
}

impl Descriptor for StreamReader {
    fn attach(&mut self, waker: &Arc<Notify>) {
        self.set_waker(waker.clone());
    }
}

impl Descriptor for StreamWriter {}

/// Handle to a member of a [`StreamSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetKey(usize);

struct Node<D> {
    desc: Option<D>,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct StreamSet<D: Descriptor = StreamReader> {
    nodes: Vec<Node<D>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    waker: Arc<Notify>,
    poll_offset: usize,
}

impl<D: Descriptor> Default for StreamSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Descriptor> StreamSet<D> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            waker: Arc::new(Notify::new()),
            poll_offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a member at the end
    pub fn put(&mut self, desc: D) -> SetKey {
        SetKey(self.link_before(None, desc))
    }

    pub fn remove(&mut self, key: SetKey) -> Option<D> {
        let desc = self.nodes.get_mut(key.0)?.desc.take()?;
        self.unlink(key.0);
        Some(desc)
    }

    pub fn get(&self, key: SetKey) -> Option<&D> {
        self.nodes.get(key.0)?.desc.as_ref()
    }

    pub fn get_mut(&mut self, key: SetKey) -> Option<&mut D> {
        self.nodes.get_mut(key.0)?.desc.as_mut()
    }

    pub fn contains(&self, key: SetKey) -> bool {
        self.get(key).is_some()
    }

    pub fn first_key(&self) -> Option<SetKey> {
        self.head.map(SetKey)
    }

    /// Member keys in order
    pub fn keys(&self) -> Vec<SetKey> {
        let mut keys = Vec::with_capacity(self.len);
        let mut node = self.head;
        while let Some(index) = node {
            keys.push(SetKey(index));
            node = self.nodes[index].next;
        }
        keys
    }

    /// Remove every member, in order
    pub fn drain(&mut self) -> Vec<D> {
        let keys = self.keys();
        keys.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    pub fn cursor(&mut self) -> Cursor<'_, D> {
        let next = self.head;
        Cursor {
            set: self,
            current: None,
            next,
        }
    }

    /// Insert before `next` (at the end when `None`); returns the slot index
    fn link_before(&mut self, next: Option<usize>, mut desc: D) -> usize {
        desc.attach(&self.waker);
        let prev = match next {
            Some(n) => self.nodes[n].prev,
            None => self.tail,
        };
        let node = Node {
            desc: Some(desc),
            prev,
            next,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        match prev {
            Some(p) => self.nodes[p].next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(n) => self.nodes[n].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.len += 1;
        index
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = (self.nodes[index].prev, self.nodes[index].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[index].prev = None;
        self.nodes[index].next = None;
        self.free.push(index);
        self.len -= 1;
    }
}

impl StreamSet<StreamReader> {
    /// Wait until a member has a queued record and return it.
    ///
    /// Returns `None` right away for an empty set. Successive calls start
    /// scanning at different members so no ready member starves.
    pub async fn poll(&mut self) -> Option<SetKey> {
        loop {
            let keys = self.keys();
            if keys.is_empty() {
                return None;
            }
            let start = self.poll_offset % keys.len();
            for i in 0..keys.len() {
                let key = keys[(start + i) % keys.len()];
                if self.get(key).is_some_and(StreamReader::has_data) {
                    self.poll_offset = start + i + 1;
                    return Some(key);
                }
            }
            self.waker.notified().await;
        }
    }
}

/// Cursor over a [`StreamSet`] that tolerates removal and insertion while
/// walking
pub struct Cursor<'a, D: Descriptor> {
    set: &'a mut StreamSet<D>,
    current: Option<usize>,
    next: Option<usize>,
}

impl<'a, D: Descriptor> Cursor<'a, D> {
    /// Restart from the first member
    pub fn reset(&mut self) {
        self.current = None;
        self.next = self.set.head;
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Step to the next member
    pub fn move_next(&mut self) -> Option<&mut D> {
        let index = self.next?;
        self.current = Some(index);
        self.next = self.set.nodes[index].next;
        self.set.nodes[index].desc.as_mut()
    }

    pub fn key(&self) -> Option<SetKey> {
        self.current.map(SetKey)
    }

    /// Remove the member last returned by [`move_next`](Self::move_next)
    pub fn remove(&mut self) -> Option<D> {
        let index = self.current.take()?;
        self.set.remove(SetKey(index))
    }

    /// Insert right after the cursor; the new member is visited by the next
    /// call to [`move_next`](Self::move_next)
    pub fn insert_after(&mut self, desc: D) -> SetKey {
        let index = self.set.link_before(self.next, desc);
        self.next = Some(index);
        SetKey(index)
    }
}
