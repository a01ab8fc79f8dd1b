//! Incremental k-way time merge: N statically-known input streams, each
//! non-decreasing in resolved time, merged into one non-decreasing output
//! stream at O(log N) per hit.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, UglcError};
use crate::hit::Hit;
use crate::pipeline::Sink;

/// A merge item: a timestamped hit, or the end-of-stream sentinel that
/// sorts after every real item.
enum Item {
    Real { time: i64, hit: Hit },
    Eos,
}

impl Item {
    /// `true` when this item may be forwarded before `other`. Ties favor
    /// the node consulted first, which keeps the merge order stable.
    fn releases_before(&self, other: &Item) -> bool {
        match (self, other) {
            (Item::Real { time, .. }, Item::Real { time: other, .. }) => time <= other,
            (Item::Real { .. }, Item::Eos) => true,
            (Item::Eos, Item::Real { .. }) => false,
            (Item::Eos, Item::Eos) => true,
        }
    }
}

/// One node of the merge tree. Leaves receive items from the input
/// adapters; internal nodes receive the merged output of their two
/// children. `peer` and `sink` are arena indices.
struct Node {
    label: String,
    buf: VecDeque<Item>,
    peer: usize,
    sink: usize,
    terminal: bool,
    /// leaves only: whether this input already signaled end of stream
    eos_seen: bool,
}

impl Node {
    fn new(label: String) -> Node {
        Node {
            label,
            buf: VecDeque::new(),
            peer: usize::MAX,
            sink: usize::MAX,
            terminal: false,
            eos_seen: false,
        }
    }
}

struct MergeCore {
    name: String,
    nodes: Vec<Node>,
    output: Box<dyn Sink>,
}

impl MergeCore {
    fn new(name: String, leaf_labels: Vec<String>, output: Box<dyn Sink>) -> MergeCore {
        let mut nodes: Vec<Node> = leaf_labels.into_iter().map(Node::new).collect();

        // pair nodes left to right; an odd leftover is re-paired with the
        // last accumulated parent so no node ends up with a single child
        let mut level: Vec<usize> = (0..nodes.len()).collect();
        while level.len() > 1 {
            let mut acc: Vec<usize> = Vec::new();
            let mut index = 0;
            while index < level.len() {
                let first = level[index];
                index += 1;
                let (a, b) = if index < level.len() {
                    let second = level[index];
                    index += 1;
                    (first, second)
                } else {
                    let parent = acc.pop().expect("odd node always follows a paired one");
                    (parent, first)
                };
                let label = format!("{}-{}", nodes[a].label, nodes[b].label);
                let parent = nodes.len();
                nodes.push(Node::new(label));
                nodes[a].peer = b;
                nodes[b].peer = a;
                nodes[a].sink = parent;
                nodes[b].sink = parent;
                acc.push(parent);
            }
            level = acc;
        }
        if let Some(&root) = level.first() {
            nodes[root].terminal = true;
        }

        MergeCore {
            name,
            nodes,
            output,
        }
    }

    fn leaf_stage(&self, leaf: usize) -> String {
        format!("{}[{}]", self.name, self.nodes[leaf].label)
    }

    fn push_hit(&mut self, leaf: usize, hit: Hit) -> Result<()> {
        if self.nodes[leaf].eos_seen {
            return Err(UglcError::EnqueueAfterEos {
                stage: self.leaf_stage(leaf),
            });
        }
        let time = hit.resolved_time();
        self.push_item(leaf, Item::Real { time, hit })
    }

    fn push_eos(&mut self, leaf: usize) -> Result<()> {
        if self.nodes[leaf].eos_seen {
            return Err(UglcError::DuplicateEos {
                stage: self.leaf_stage(leaf),
            });
        }
        self.nodes[leaf].eos_seen = true;
        self.push_item(leaf, Item::Eos)
    }

    /// The root translates items back into the sink vocabulary; every
    /// other node buffers and releases against its peer. Exactly one
    /// sentinel survives each pairing, so the root sees end of stream
    /// exactly once.
    fn push_item(&mut self, index: usize, item: Item) -> Result<()> {
        if self.nodes[index].terminal {
            return match item {
                Item::Real { hit, .. } => self.output.enqueue(hit),
                Item::Eos => self.output.end_of_stream(),
            };
        }
        self.nodes[index].buf.push_back(item);
        self.release(index)
    }

    /// While both this node and its peer hold items, forward the earlier
    /// front to the shared parent.
    fn release(&mut self, index: usize) -> Result<()> {
        let peer = self.nodes[index].peer;
        let parent = self.nodes[index].sink;
        loop {
            let take_own = match (self.nodes[index].buf.front(), self.nodes[peer].buf.front()) {
                (Some(own), Some(other)) => own.releases_before(other),
                _ => return Ok(()),
            };
            let source = if take_own { index } else { peer };
            if let Some(item) = self.nodes[source].buf.pop_front() {
                self.push_item(parent, item)?;
            }
        }
    }
}

/// Merges hits from N keyed input streams into `sink`. Handed-out inputs
/// share the merge tree; the sorter itself may be dropped once plumbed.
pub struct PairHeapSorter<K: Ord + Copy + fmt::Display> {
    core: Rc<RefCell<MergeCore>>,
    leaves: BTreeMap<K, usize>,
}

impl<K: Ord + Copy + fmt::Display> PairHeapSorter<K> {
    /// `keys` must already be in the deterministic plumbing order.
    pub fn new(
        name: impl Into<String>,
        keys: impl IntoIterator<Item = K>,
        sink: Box<dyn Sink>,
    ) -> PairHeapSorter<K> {
        let name = name.into();
        let keys: Vec<K> = keys.into_iter().collect();
        let labels = keys.iter().map(|key| key.to_string()).collect();
        let core = MergeCore::new(name, labels, sink);
        let leaves = keys
            .into_iter()
            .enumerate()
            .map(|(leaf, key)| (key, leaf))
            .collect();
        PairHeapSorter {
            core: Rc::new(RefCell::new(core)),
            leaves,
        }
    }

    pub fn input_for(&self, key: K) -> Result<SorterInput> {
        match self.leaves.get(&key) {
            Some(&leaf) => Ok(SorterInput {
                core: Rc::clone(&self.core),
                leaf,
            }),
            None => Err(UglcError::NotPlumbed {
                stage: self.core.borrow().name.clone(),
                key: key.to_string(),
            }),
        }
    }
}

/// The enqueue/end-of-stream face of one merge input.
pub struct SorterInput {
    core: Rc<RefCell<MergeCore>>,
    leaf: usize,
}

impl Sink for SorterInput {
    fn enqueue(&mut self, hit: Hit) -> Result<()> {
        self.core.borrow_mut().push_hit(self.leaf, hit)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.core.borrow_mut().push_eos(self.leaf)
    }
}
