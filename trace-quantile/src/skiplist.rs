// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Probabilistic skip-list holding summary entries ordered by value.
//!
//! Nodes live in an index arena so the list needs no unsafe pointer
//! plumbing. The list only ever grows; compression drains it with
//! [`SkipList::take_entries`] and rebuilds it from the merged run.

use crate::entry::Entry;
use rand::Rng;

const MAX_HEIGHT: usize = 16;

#[derive(Debug)]
struct Node {
    entry: Entry,
    // forward links, one per level of this node
    next: Vec<Option<usize>>,
}

#[derive(Debug)]
pub(crate) struct SkipList {
    nodes: Vec<Node>,
    head: [Option<usize>; MAX_HEIGHT],
    tail: Option<usize>,
    height: usize,
    len: usize,
}

impl SkipList {
    pub fn new() -> SkipList {
        SkipList {
            nodes: Vec::new(),
            head: [None; MAX_HEIGHT],
            tail: None,
            height: 1,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<&Entry> {
        self.head[0].map(|i| &self.nodes[i].entry)
    }

    pub fn last(&self) -> Option<&Entry> {
        self.tail.map(|i| &self.nodes[i].entry)
    }

    fn random_height<R: Rng>(rng: &mut R) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen::<bool>() {
            height += 1;
        }
        height
    }

    /// Insert an entry, placed after any entries of equal value.
    pub fn insert(&mut self, entry: Entry) {
        // predecessor per level; None stands for the head
        let mut preds: [Option<usize>; MAX_HEIGHT] = [None; MAX_HEIGHT];
        let mut cur: Option<usize> = None;
        for level in (0..self.height).rev() {
            loop {
                let next = match cur {
                    None => self.head[level],
                    Some(i) => self.nodes[i].next[level],
                };
                match next {
                    Some(j) if self.nodes[j].entry.v <= entry.v => cur = Some(j),
                    _ => break,
                }
            }
            preds[level] = cur;
        }

        let height = Self::random_height(&mut rand::thread_rng());
        let idx = self.nodes.len();
        let mut next = vec![None; height];
        #[allow(clippy::needless_range_loop)]
        for level in 0..height.min(self.height) {
            next[level] = match preds[level] {
                None => self.head[level],
                Some(p) => self.nodes[p].next[level],
            };
        }
        self.nodes.push(Node { entry, next });

        for level in 0..height {
            if level < self.height {
                match preds[level] {
                    None => self.head[level] = Some(idx),
                    Some(p) => self.nodes[p].next[level] = Some(idx),
                }
            } else {
                self.head[level] = Some(idx);
            }
        }

        if self.nodes[idx].next[0].is_none() {
            self.tail = Some(idx);
        }
        self.height = self.height.max(height);
        self.len += 1;
    }

    /// Rebuild a list from an already ordered run of entries.
    pub fn from_sorted(entries: Vec<Entry>) -> SkipList {
        let mut list = SkipList::new();
        let mut rng = rand::thread_rng();
        let mut last: [Option<usize>; MAX_HEIGHT] = [None; MAX_HEIGHT];
        for entry in entries {
            let height = Self::random_height(&mut rng);
            let idx = list.nodes.len();
            list.nodes.push(Node {
                entry,
                next: vec![None; height],
            });
            for level in 0..height {
                match last[level] {
                    None => list.head[level] = Some(idx),
                    Some(p) => list.nodes[p].next[level] = Some(idx),
                }
                last[level] = Some(idx);
            }
            list.height = list.height.max(height);
            list.len += 1;
        }
        list.tail = last[0];
        list
    }

    /// Drain the list into its ordered entries, leaving it empty.
    pub fn take_entries(&mut self) -> Vec<Entry> {
        let mut entries = Vec::with_capacity(self.len);
        let mut cur = self.head[0];
        while let Some(i) = cur {
            entries.push(std::mem::take(&mut self.nodes[i].entry));
            cur = self.nodes[i].next[0];
        }
        *self = SkipList::new();
        entries
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cur: self.head[0],
        }
    }
}

pub(crate) struct Iter<'a> {
    list: &'a SkipList,
    cur: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<&'a Entry> {
        let i = self.cur?;
        let node = &self.list.nodes[i];
        self.cur = node.next[0];
        Some(&node.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn entry(v: f64) -> Entry {
        Entry {
            v,
            g: 1,
            delta: 0,
            samples: vec![v as u64],
        }
    }

    #[test]
    fn test_insert_keeps_value_order() {
        let mut values: Vec<f64> = (0..500).map(|i| i as f64).collect();
        values.shuffle(&mut rand::thread_rng());

        let mut list = SkipList::new();
        for v in &values {
            list.insert(entry(*v));
        }

        assert_eq!(list.len(), 500);
        let collected: Vec<f64> = list.iter().map(|e| e.v).collect();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(collected, sorted);
        assert_eq!(list.first().unwrap().v, 0.0);
        assert_eq!(list.last().unwrap().v, 499.0);
    }

    #[test]
    fn test_equal_values_insert_after() {
        let mut list = SkipList::new();
        list.insert(entry(1.0));
        let mut dup = entry(1.0);
        dup.samples = vec![99];
        list.insert(dup);

        let samples: Vec<&[u64]> = list.iter().map(|e| e.samples.as_slice()).collect();
        assert_eq!(samples, vec![&[1u64][..], &[99u64][..]]);
        assert_eq!(list.last().unwrap().samples, vec![99]);
    }

    #[test]
    fn test_take_and_rebuild() {
        let mut list = SkipList::new();
        for v in [3.0, 1.0, 2.0] {
            list.insert(entry(v));
        }

        let entries = list.take_entries();
        assert!(list.is_empty());
        assert_eq!(entries.iter().map(|e| e.v).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);

        let rebuilt = SkipList::from_sorted(entries);
        assert_eq!(rebuilt.len(), 3);
        assert_eq!(rebuilt.first().unwrap().v, 1.0);
        assert_eq!(rebuilt.last().unwrap().v, 3.0);
    }

    #[test]
    fn test_empty_list() {
        let list = SkipList::new();
        assert!(list.is_empty());
        assert!(list.first().is_none());
        assert!(list.last().is_none());
        assert_eq!(list.iter().count(), 0);
    }
}
