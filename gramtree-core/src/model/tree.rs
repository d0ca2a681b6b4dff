use std::sync::mpsc;

use crate::error::ModelError;
use super::node::{ModelItem, Node};

/// A probability distribution over tree nodes.
///
/// List order is load-bearing: it decides tie-break precedence in the
/// walker's weighted sampling, so backends with a stable child enumeration
/// produce reproducible walks under a fixed seed.
pub type Distribution<Item> = Vec<(f64, Node<Item>)>;

/// Contract every counting tree storage backend implements, plus the
/// default algorithms written once on top of it.
///
/// All operations are defined relative to "this node". Counts are real
/// numbers, not integers, so backends may merge fractional counts.
///
/// # Responsibilities (backend side)
/// - Expose the node value and its count
/// - Enumerate children (possibly streamed from persisted storage)
/// - Find a child by node, and create-and-attach a new one
///
/// Backend operations are fallible so persisting backends can propagate
/// their own failures as `ModelError::Backend`; the in-memory backend never
/// errs.
pub trait CountingTree<Item: ModelItem>: Sized {
	/// The node value stored at this tree position.
	fn node(&self) -> &Node<Item>;

	/// The observation count of this node. Never meaningful on the root.
	fn count(&self) -> f64;

	/// Overwrites the observation count.
	fn set_count(&mut self, count: f64) -> Result<(), ModelError>;

	/// Enumerates the children of this node.
	///
	/// The sequence does not have to be materialized eagerly; a backend
	/// holding a large persisted tree may stream it.
	fn children(&self) -> Result<Box<dyn Iterator<Item = &Self> + '_>, ModelError>;

	/// Finds the child holding `node`, if any.
	fn find_child(&self, node: &Node<Item>) -> Result<Option<&Self>, ModelError>;

	/// Mutable variant of [`find_child`](Self::find_child).
	fn find_child_mut(&mut self, node: &Node<Item>) -> Result<Option<&mut Self>, ModelError>;

	/// Creates a new child holding `node`, attaches it and returns it.
	///
	/// # Notes
	/// Not required to be idempotent on repeated calls with the same key;
	/// callers must probe with `find_child` first.
	fn make_child(&mut self, node: Node<Item>) -> Result<&mut Self, ModelError>;

	/// Walks `path` down from this node, creating missing children on the
	/// way, and increments the count of the path's terminal node by 1.
	///
	/// # Errors
	/// - `ModelError::EmptyPath` if `path` is empty.
	/// - `ModelError::PathMismatch` if `path[0]` is not this node.
	fn increment_path(&mut self, path: &[Node<Item>]) -> Result<(), ModelError> {
		let (head, tail) = path.split_first().ok_or(ModelError::EmptyPath)?;
		if head != self.node() {
			return Err(ModelError::PathMismatch);
		}

		let Some(next) = tail.first() else {
			let count = self.count();
			return self.set_count(count + 1.0);
		};

		if self.find_child(next)?.is_none() {
			self.make_child(next.clone())?;
		}
		// Should not panic, the child was found or just created
		let child = self.find_child_mut(next)?.unwrap();
		child.increment_path(tail)
	}

	/// Walks `path` down from this node and returns the probability of each
	/// child of the terminal node, as plain count ratios.
	///
	/// A prefix the tree has never seen yields an empty list, not an error.
	/// No smoothing is applied: unseen items simply do not appear.
	///
	/// # Errors
	/// Same preconditions as [`increment_path`](Self::increment_path);
	/// backend failures propagate.
	fn probabilities_after(&self, path: &[Node<Item>]) -> Result<Distribution<Item>, ModelError> {
		let (head, tail) = path.split_first().ok_or(ModelError::EmptyPath)?;
		if head != self.node() {
			return Err(ModelError::PathMismatch);
		}

		match tail.first() {
			Some(next) => match self.find_child(next)? {
				Some(child) => child.probabilities_after(tail),
				None => Ok(Vec::new()),
			},
			None => {
				let mut total = 0.0;
				for child in self.children()? {
					total += child.count();
				}
				if total <= 0.0 {
					return Ok(Vec::new());
				}
				let mut distribution = Vec::new();
				for child in self.children()? {
					distribution.push((child.count() / total, child.node().clone()));
				}
				Ok(distribution)
			}
		}
	}

	/// Count-ratio distribution over this node's direct children, dropping
	/// boundary-or-root nodes and the `excluding` set from both the
	/// numerator set and the denominator sum.
	///
	/// A zero denominator yields an empty list.
	fn distributions(&self, excluding: &[Node<Item>]) -> Result<Distribution<Item>, ModelError> {
		let mut kept: Vec<(f64, Node<Item>)> = Vec::new();
		let mut total = 0.0;
		for child in self.children()? {
			let node = child.node();
			if node.is_boundary_or_root() || excluding.contains(node) {
				continue;
			}
			total += child.count();
			kept.push((child.count(), node.clone()));
		}
		if total <= 0.0 {
			return Ok(Vec::new());
		}
		Ok(kept.into_iter().map(|(count, node)| (count / total, node)).collect())
	}

	/// Extended contract for backends that complete writes asynchronously:
	/// starts one increment and reports its outcome through `done`.
	///
	/// The provided implementation performs the increment synchronously and
	/// sends the result at once. Asynchronously persisting backends override
	/// this and send on actual completion; callers join by draining the
	/// channel, one message per issued increment. A read issued after a
	/// completed write must observe it (read-your-writes); reads concurrent
	/// with an in-flight write have no defined ordering.
	fn increment_path_deferred(&mut self, path: &[Node<Item>], done: &mpsc::Sender<Result<(), ModelError>>) {
		let result = self.increment_path(path);
		// A disconnected receiver means the caller gave up on the join
		let _ = done.send(result);
	}
}

/// The bundled in-memory counting tree backend.
///
/// Each node exclusively owns its children; there are no back-references.
/// Children are kept in insertion order and found by node equality, so
/// child enumeration (and therefore sampling tie-breaks) is stable.
///
/// # Invariants
/// - Child nodes are unique by `Node` equality
/// - The root's count is never read
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryTree<Item: ModelItem> {
	node: Node<Item>,
	count: f64,
	children: Vec<MemoryTree<Item>>,
}

impl<Item: ModelItem> MemoryTree<Item> {
	/// Creates an empty tree anchored at `Root`.
	pub fn root() -> Self {
		Self::from_parts(Node::Root, 0.0, Vec::new())
	}

	pub(crate) fn from_parts(node: Node<Item>, count: f64, children: Vec<MemoryTree<Item>>) -> Self {
		Self { node, count, children }
	}
}

impl<Item: ModelItem> CountingTree<Item> for MemoryTree<Item> {
	fn node(&self) -> &Node<Item> {
		&self.node
	}

	fn count(&self) -> f64 {
		self.count
	}

	fn set_count(&mut self, count: f64) -> Result<(), ModelError> {
		self.count = count;
		Ok(())
	}

	fn children(&self) -> Result<Box<dyn Iterator<Item = &Self> + '_>, ModelError> {
		Ok(Box::new(self.children.iter()))
	}

	fn find_child(&self, node: &Node<Item>) -> Result<Option<&Self>, ModelError> {
		Ok(self.children.iter().find(|child| child.node == *node))
	}

	fn find_child_mut(&mut self, node: &Node<Item>) -> Result<Option<&mut Self>, ModelError> {
		Ok(self.children.iter_mut().find(|child| child.node == *node))
	}

	fn make_child(&mut self, node: Node<Item>) -> Result<&mut Self, ModelError> {
		self.children.push(Self::from_parts(node, 0.0, Vec::new()));
		// Should not panic, the child was pushed just above
		Ok(self.children.last_mut().unwrap())
	}
}
