use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::ModelError;
use super::node::{ModelItem, NgramOrder, Node, SequenceKind};
use super::tree::{CountingTree, MemoryTree};

/// One tree node flattened to an ID-keyed record.
///
/// # Invariants
/// - Ids reachable from a snapshot's root-child ids form exactly one
///   connected acyclic graph mirroring the live tree
/// - No record is unreachable; no id is referenced by more than one parent
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlatRecord<Item> {
	/// Opaque unique id of this node within the snapshot.
	pub id: String,
	/// The node value.
	pub node: Node<Item>,
	/// The node's observation count.
	pub count: f64,
	/// Ids of the node's children, in enumeration order.
	pub child_ids: Vec<String>,
}

/// A whole model flattened for storage: configuration tag plus the record
/// set. No concrete byte encoding is implied by the shape itself; the
/// bundled encoding is postcard, any backend that round-trips this shape
/// losslessly works.
///
/// Snapshots are regenerated in full on every export; there is no
/// incremental diff.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlatSnapshot<Item> {
	pub kind: SequenceKind,
	pub order: NgramOrder,
	/// Ids of the root's direct children (the root itself is never exported).
	pub root_child_ids: Vec<String>,
	pub records: Vec<FlatRecord<Item>>,
}

impl<Item: ModelItem + Serialize> FlatSnapshot<Item> {
	/// Encodes the snapshot to postcard bytes.
	pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
		Ok(postcard::to_stdvec(self)?)
	}
}

impl<Item: ModelItem + DeserializeOwned> FlatSnapshot<Item> {
	/// Decodes a snapshot from postcard bytes.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
		Ok(postcard::from_bytes(bytes)?)
	}
}

/// Flattens a counting tree into an ID-keyed snapshot.
///
/// Breadth-first from the root's direct children; each visited node gets a
/// fresh sequential id. A visited-pointer guard keeps a node from being
/// emitted twice (impossible in a well-formed tree, guarded anyway).
pub fn export<Item, Store>(
	order: NgramOrder,
	kind: SequenceKind,
	root: &Store,
) -> Result<FlatSnapshot<Item>, ModelError>
where
	Item: ModelItem,
	Store: CountingTree<Item>,
{
	let mut records = Vec::new();
	let mut queue: VecDeque<(&Store, String)> = VecDeque::new();
	let mut seen: HashSet<*const Store> = HashSet::new();
	let mut next_id = 0usize;

	let mut root_child_ids = Vec::new();
	for child in root.children()? {
		if !seen.insert(child as *const Store) {
			continue;
		}
		let id = next_id.to_string();
		next_id += 1;
		root_child_ids.push(id.clone());
		queue.push_back((child, id));
	}

	while let Some((tree, id)) = queue.pop_front() {
		let mut child_ids = Vec::new();
		for child in tree.children()? {
			if !seen.insert(child as *const Store) {
				continue;
			}
			let child_id = next_id.to_string();
			next_id += 1;
			child_ids.push(child_id.clone());
			queue.push_back((child, child_id));
		}
		records.push(FlatRecord {
			id,
			node: tree.node().clone(),
			count: tree.count(),
			child_ids,
		});
	}

	Ok(FlatSnapshot { kind, order, root_child_ids, records })
}

/// Reconstructs an in-memory tree from a snapshot.
///
/// Hydration is children-first; children are keyed by node, a duplicate key
/// overwrites the earlier entry. A hydrated node with no children gets a
/// synthesized end-marker child carrying the node's own count, so every
/// leaf stays reachable as a boundary node rather than a dangling count.
///
/// # Errors
/// Strict by policy: a referenced id absent from the record set is
/// `ModelError::MissingRecord`, and an id claimed by more than one parent
/// (or a reference cycle) is `ModelError::DuplicateReference`. No silent
/// partial trees.
pub fn import<Item: ModelItem>(snapshot: &FlatSnapshot<Item>) -> Result<MemoryTree<Item>, ModelError> {
	let by_id: HashMap<&str, &FlatRecord<Item>> = snapshot
		.records
		.iter()
		.map(|record| (record.id.as_str(), record))
		.collect();

	let mut claimed: HashSet<&str> = HashSet::new();
	let mut children = Vec::new();
	for id in &snapshot.root_child_ids {
		let child = hydrate(id, &by_id, &mut claimed, snapshot.kind)?;
		attach(&mut children, child);
	}
	Ok(MemoryTree::from_parts(Node::Root, 0.0, children))
}

fn hydrate<'s, Item: ModelItem>(
	id: &'s str,
	by_id: &HashMap<&str, &'s FlatRecord<Item>>,
	claimed: &mut HashSet<&'s str>,
	kind: SequenceKind,
) -> Result<MemoryTree<Item>, ModelError> {
	if !claimed.insert(id) {
		return Err(ModelError::DuplicateReference(id.to_owned()));
	}
	let record = *by_id
		.get(id)
		.ok_or_else(|| ModelError::MissingRecord(id.to_owned()))?;

	let mut children = Vec::new();
	for child_id in &record.child_ids {
		let child = hydrate(child_id, by_id, claimed, kind)?;
		attach(&mut children, child);
	}
	if children.is_empty() {
		children.push(MemoryTree::from_parts(kind.end_marker(), record.count, Vec::new()));
	}
	Ok(MemoryTree::from_parts(record.node.clone(), record.count, children))
}

// Children are keyed by node; a duplicate key overwrites the earlier entry
fn attach<Item: ModelItem>(children: &mut Vec<MemoryTree<Item>>, child: MemoryTree<Item>) {
	match children.iter_mut().find(|existing| existing.node() == child.node()) {
		Some(existing) => *existing = child,
		None => children.push(child),
	}
}
