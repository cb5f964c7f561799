//! Cost-aware LRU (Least Recently Used) list
//!
//! Uses an intrusive linked list over a slab for O(1) touch and eviction.
//! Two limits apply at once: entry count and total cost.

use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    cost: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU list bounded by entry count and total cost
pub struct CostLru<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    max_count: usize,
    max_cost: usize,
    total_cost: usize,
}

impl<K, V> CostLru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty list with the given limits
    pub fn new(max_count: usize, max_cost: usize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(max_count.min(1024), RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            max_count,
            max_cost,
            total_cost: 0,
        }
    }

    /// Get a value and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Get a value without touching recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Insert or replace, evicting least recently used entries to make room
    ///
    /// Returns the number of entries evicted. A single entry costing more
    /// than `max_cost` evicts everything, itself included. Room is made
    /// before the insert, so `total_cost` never exceeds `max_cost` and the
    /// sum cannot overflow.
    pub fn put(&mut self, key: K, value: V, cost: usize) -> usize {
        self.remove(&key);

        if cost > self.max_cost || self.max_count == 0 {
            let evicted = self.map.len() + 1;
            self.clear();
            return evicted;
        }

        let mut evicted = 0;
        while self.map.len() >= self.max_count || self.total_cost > self.max_cost - cost {
            if !self.evict() {
                break;
            }
            evicted += 1;
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            cost,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key, idx);
        self.total_cost += cost;
        evicted
    }

    /// Remove a key
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_node(idx);
        let node = self.nodes[idx].take()?;
        self.total_cost -= node.cost;
        Some(node.value)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of entry costs
    pub fn total_cost(&self) -> usize {
        self.total_cost
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        self.total_cost = 0;
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    fn evict(&mut self) -> bool {
        let Some(tail_idx) = self.tail else {
            return false;
        };

        // Unlink before taking the node so its neighbours can be patched
        self.unlink(tail_idx);
        match self.nodes[tail_idx].take() {
            Some(node) => {
                self.map.remove(&node.key);
                self.total_cost -= node.cost;
                self.free_node(tail_idx);
                true
            }
            None => false,
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}
