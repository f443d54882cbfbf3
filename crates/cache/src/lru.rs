use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use domain::Order;

use crate::OrderCache;

const NIL: usize = usize::MAX;

struct Node {
    key: String,
    order: Order,
    prev: usize,
    next: usize,
}

/// Hash map from key to slot plus a doubly-linked recency list threaded
/// through a slab of nodes. Head is most recently used, tail is next to be
/// evicted. Freed slots are reused through a free list.
struct Recency {
    map: HashMap<String, usize>,
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl Recency {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = NIL;
        self.nodes[idx].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn evict_tail(&mut self) -> Option<String> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        self.unlink(idx);
        let key = std::mem::take(&mut self.nodes[idx].key);
        self.map.remove(&key);
        self.free.push(idx);
        Some(key)
    }

    fn reset(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }
}

/// Bounded LRU cache of orders.
///
/// A single reader-writer lock guards the whole structure; every mutating
/// operation, including `get` (which promotes the entry), takes the write
/// lock, while `get_all` and `len` take the read lock. All operations are
/// O(1) except `get_all`, which is O(min(limit, len)).
pub struct LruOrderCache {
    capacity: usize,
    inner: RwLock<Recency>,
}

impl LruOrderCache {
    /// A non-positive `capacity` means unlimited.
    pub fn new(capacity: i64) -> Self {
        Self {
            capacity: capacity.max(0) as usize,
            inner: RwLock::new(Recency::new()),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Recency> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, Recency> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OrderCache for LruOrderCache {
    fn set(&self, order_uid: &str, order: Order) {
        let mut inner = self.write();

        if let Some(&idx) = inner.map.get(order_uid) {
            inner.nodes[idx].order = order;
            inner.unlink(idx);
            inner.push_front(idx);
            debug!(order_uid, "order updated in cache");
            return;
        }

        if self.capacity > 0 && inner.map.len() >= self.capacity {
            if let Some(evicted) = inner.evict_tail() {
                debug!(order_uid = %evicted, "cache full, evicted least recently used order");
            }
        }

        let node = Node {
            key: order_uid.to_string(),
            order,
            prev: NIL,
            next: NIL,
        };
        let idx = match inner.free.pop() {
            Some(idx) => {
                inner.nodes[idx] = node;
                idx
            }
            None => {
                inner.nodes.push(node);
                inner.nodes.len() - 1
            }
        };
        inner.map.insert(order_uid.to_string(), idx);
        inner.push_front(idx);
    }

    fn get(&self, order_uid: &str) -> Option<Order> {
        let mut inner = self.write();
        let idx = match inner.map.get(order_uid) {
            Some(&idx) => idx,
            None => return None,
        };
        inner.unlink(idx);
        inner.push_front(idx);
        Some(inner.nodes[idx].order.clone())
    }

    fn delete(&self, order_uid: &str) -> bool {
        let mut inner = self.write();
        match inner.map.remove(order_uid) {
            Some(idx) => {
                inner.unlink(idx);
                inner.nodes[idx].key = String::new();
                inner.free.push(idx);
                debug!(order_uid, "order deleted from cache");
                true
            }
            None => false,
        }
    }

    fn clear(&self) {
        self.write().reset();
        info!("cache cleared");
    }

    fn get_all(&self, limit: i64) -> Vec<Order> {
        if limit <= 0 {
            return Vec::new();
        }
        let inner = self.read();
        let mut orders = Vec::with_capacity((limit as usize).min(inner.map.len()));
        let mut idx = inner.head;
        while idx != NIL && orders.len() < limit as usize {
            orders.push(inner.nodes[idx].order.clone());
            idx = inner.nodes[idx].next;
        }
        orders
    }

    fn len(&self) -> usize {
        self.read().map.len()
    }

    fn shutdown(&self) {
        self.write().reset();
        info!("cache cleared during shutdown");
    }
}
