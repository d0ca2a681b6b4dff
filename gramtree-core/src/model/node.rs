use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Marker trait for the values a model can observe.
///
/// Blanket-implemented: any cloneable, comparable, hashable and debuggable
/// type qualifies (characters, strings, enums, ...).
pub trait ModelItem: Clone + Eq + std::hash::Hash + std::fmt::Debug {}

impl<T> ModelItem for T where T: Clone + Eq + std::hash::Hash + std::fmt::Debug {}

/// A node of the counting tree.
///
/// `Literal` carries an observed item; the other five variants are the
/// structural vocabulary. Equality and hashing are variant-aware: two
/// `Literal` nodes are equal iff their items are equal, and each non-literal
/// variant is equal to itself only.
///
/// `Root` anchors a tree and is never returned from queries.
/// `SequenceStart`/`SequenceEnd` are the hard boundaries of discrete
/// sequences (e.g. a sentence). `UnseenLeading`/`UnseenTrailing` mark, for
/// continuous sequences, that the sequence continues past the observed
/// sample in an unknown way.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node<Item> {
	Literal(Item),
	Root,
	SequenceStart,
	SequenceEnd,
	UnseenLeading,
	UnseenTrailing,
}

impl<Item> Node<Item> {
	/// True for every variant except `Literal`.
	///
	/// Distribution queries use this to keep only observable items.
	pub fn is_boundary_or_root(&self) -> bool {
		!matches!(self, Node::Literal(_))
	}

	/// True only for `UnseenLeading` and `UnseenTrailing`.
	///
	/// These are the boundaries a continuous-sequence walker can sample and
	/// must retry past.
	pub fn is_observable_boundary(&self) -> bool {
		matches!(self, Node::UnseenLeading | Node::UnseenTrailing)
	}

	/// Returns the carried item for `Literal` nodes, `None` otherwise.
	pub fn literal(&self) -> Option<&Item> {
		match self {
			Node::Literal(item) => Some(item),
			_ => None,
		}
	}
}

/// The order of an n-gram model: the maximum number of context nodes,
/// inclusive of the next node, the model conditions on.
///
/// # Invariants
/// - Always >= 2; construction with a smaller value fails fast.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "usize", into = "usize")]
pub struct NgramOrder(usize);

impl NgramOrder {
	/// Creates an order.
	///
	/// # Errors
	/// Returns `ModelError::InvalidOrder` if `order < 2`.
	pub fn new(order: usize) -> Result<Self, ModelError> {
		if order < 2 {
			return Err(ModelError::InvalidOrder(order));
		}
		Ok(Self(order))
	}

	/// The raw order value.
	pub fn get(self) -> usize {
		self.0
	}

	/// The maximum context length a query can condition on (`order - 1`).
	pub fn context_len(self) -> usize {
		self.0 - 1
	}
}

impl TryFrom<usize> for NgramOrder {
	type Error = ModelError;

	fn try_from(order: usize) -> Result<Self, Self::Error> {
		Self::new(order)
	}
}

impl From<NgramOrder> for usize {
	fn from(order: NgramOrder) -> Self {
		order.0
	}
}

/// Whether observed sequences have meaningful boundaries.
///
/// `Continuous` sequences (e.g. weather over time) run past the observed
/// sample; their boundaries are the "unseen" markers. `Discrete` sequences
/// (e.g. a sentence) start and end hard; their boundaries are terminals.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceKind {
	Continuous,
	Discrete,
}

impl SequenceKind {
	/// The node observed at the start of a sequence of this kind.
	pub fn start_marker<Item>(self) -> Node<Item> {
		match self {
			SequenceKind::Continuous => Node::UnseenLeading,
			SequenceKind::Discrete => Node::SequenceStart,
		}
	}

	/// The node observed at the end of a sequence of this kind.
	pub fn end_marker<Item>(self) -> Node<Item> {
		match self {
			SequenceKind::Continuous => Node::UnseenTrailing,
			SequenceKind::Discrete => Node::SequenceEnd,
		}
	}
}
