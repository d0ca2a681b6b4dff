use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::mpsc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ModelError;
use super::bridge::{self, FlatSnapshot};
use super::node::{ModelItem, NgramOrder, Node, SequenceKind};
use super::tree::{CountingTree, Distribution, MemoryTree};

/// Optional per-item normalization hook, applied before every observation
/// and query. Absence means identity.
pub type Normalizer<Item> = Box<dyn Fn(Item) -> Item + Send + Sync>;

/// An n-gram frequency model over sequences of `Item`.
///
/// Owns the configuration (order, sequence kind, optional normalizer), a
/// counting tree store and a sliding window of the most recently observed
/// nodes. Every observation updates the counts of *all* orders up to the
/// configured maximum simultaneously, so downstream queries can condition on
/// any shorter prefix.
///
/// # Invariants
/// - The window never holds more than `order` nodes (FIFO clamp)
/// - The window is cleared at every sequence boundary
///
/// Not internally thread-safe: concurrent `observe` calls against the same
/// model must be serialized by the caller.
pub struct FrequencyModel<Item: ModelItem, Store: CountingTree<Item> = MemoryTree<Item>> {
	order: NgramOrder,
	kind: SequenceKind,
	normalizer: Option<Normalizer<Item>>,
	store: Store,
	window: VecDeque<Node<Item>>,
}

impl<Item: ModelItem> FrequencyModel<Item, MemoryTree<Item>> {
	/// Creates a model backed by the bundled in-memory tree.
	pub fn new(order: NgramOrder, kind: SequenceKind) -> Self {
		Self::with_store(order, kind, MemoryTree::root())
	}

	/// Loads a model from a flat snapshot file written by
	/// [`save_snapshot`](Self::save_snapshot).
	///
	/// The snapshot carries its own order and sequence kind; the hydrated
	/// model starts with an empty observation window and no normalizer.
	///
	/// # Errors
	/// Fails on I/O, on decoding, and strictly on records referencing
	/// missing or already-claimed child ids.
	pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self, ModelError>
	where
		Item: DeserializeOwned,
	{
		let bytes = std::fs::read(path)?;
		let snapshot = FlatSnapshot::from_bytes(&bytes)?;
		let store = bridge::import(&snapshot)?;
		Ok(Self::with_store(snapshot.order, snapshot.kind, store))
	}
}

impl<Item: ModelItem, Store: CountingTree<Item>> FrequencyModel<Item, Store> {
	/// Creates a model driving the given counting tree store.
	pub fn with_store(order: NgramOrder, kind: SequenceKind, store: Store) -> Self {
		Self {
			order,
			kind,
			normalizer: None,
			store,
			window: VecDeque::with_capacity(order.get()),
		}
	}

	/// Installs the normalization hook.
	pub fn with_normalizer<F>(mut self, normalizer: F) -> Self
	where
		F: Fn(Item) -> Item + Send + Sync + 'static,
	{
		self.normalizer = Some(Box::new(normalizer));
		self
	}

	/// The configured order.
	pub fn order(&self) -> NgramOrder {
		self.order
	}

	/// The configured sequence kind.
	pub fn kind(&self) -> SequenceKind {
		self.kind
	}

	/// Read-only access to the underlying store.
	pub fn store(&self) -> &Store {
		&self.store
	}

	fn normalize(&self, item: Item) -> Item {
		match &self.normalizer {
			Some(normalizer) => normalizer(item),
			None => item,
		}
	}

	/// Begins a new observation sequence: clears the window and observes
	/// the kind-appropriate start marker.
	pub fn start_sequence(&mut self) -> Result<(), ModelError> {
		self.window.clear();
		self.observe_node(self.kind.start_marker())
	}

	/// Observes one item, normalized first.
	pub fn observe(&mut self, item: Item) -> Result<(), ModelError> {
		let item = self.normalize(item);
		self.observe_node(Node::Literal(item))
	}

	/// Ends the current observation sequence: observes the kind-appropriate
	/// end marker, then clears the window.
	pub fn end_sequence(&mut self) -> Result<(), ModelError> {
		self.observe_node(self.kind.end_marker())?;
		self.window.clear();
		Ok(())
	}

	/// Observes a whole bracketed sequence: `start_sequence`, each item in
	/// order, `end_sequence`.
	pub fn observe_sequence<I>(&mut self, items: I) -> Result<(), ModelError>
	where
		I: IntoIterator<Item = Item>,
	{
		self.start_sequence()?;
		for item in items {
			self.observe(item)?;
		}
		self.end_sequence()
	}

	/// Observes a whole sequence against a possibly asynchronous store and
	/// invokes `completed` once **every** underlying increment has finished.
	///
	/// One increment is issued per suffix length per observed node; all of
	/// them are joined over a channel before the callback fires, so callers
	/// may not assume increments complete in window order, only that they
	/// all completed. The callback receives the first error, if any.
	pub fn observe_sequence_completed<I, F>(&mut self, items: I, completed: F)
	where
		I: IntoIterator<Item = Item>,
		F: FnOnce(Result<(), ModelError>),
	{
		let mut nodes = vec![self.kind.start_marker()];
		for item in items {
			let item = self.normalize(item);
			nodes.push(Node::Literal(item));
		}
		nodes.push(self.kind.end_marker());

		let (done, joined) = mpsc::channel();
		let mut issued = 0usize;

		self.window.clear();
		for node in nodes {
			self.push_window(node);
			for path in self.suffix_paths() {
				self.store.increment_path_deferred(&path, &done);
				issued += 1;
			}
		}
		self.window.clear();
		drop(done);

		// Join: one message per issued increment, in completion order
		let mut outcome = Ok(());
		let mut received = 0usize;
		for result in joined.iter() {
			received += 1;
			if let Err(error) = result {
				if outcome.is_ok() {
					outcome = Err(error);
				}
			}
		}
		debug_assert_eq!(received, issued);
		completed(outcome);
	}

	/// The multi-order update: appends `node` to the window, FIFO-clamps it
	/// to `order` entries, then increments every suffix of the window in
	/// one pass, from the unigram up to the configured order.
	fn observe_node(&mut self, node: Node<Item>) -> Result<(), ModelError> {
		self.push_window(node);
		for path in self.suffix_paths() {
			self.store.increment_path(&path)?;
		}
		Ok(())
	}

	fn push_window(&mut self, node: Node<Item>) {
		self.window.push_back(node);
		while self.window.len() > self.order.get() {
			self.window.pop_front();
		}
	}

	/// One root-anchored path per suffix length, shortest first.
	fn suffix_paths(&self) -> Vec<Vec<Node<Item>>> {
		(1..=self.window.len())
			.map(|len| {
				let mut path = Vec::with_capacity(len + 1);
				path.push(Node::Root);
				path.extend(self.window.iter().skip(self.window.len() - len).cloned());
				path
			})
			.collect()
	}

	/// Marginal distribution over the root's literal children, minus
	/// `excluding`.
	pub fn distributions(&self, excluding: &[Node<Item>]) -> Result<Distribution<Item>, ModelError> {
		self.store.distributions(excluding)
	}

	/// Distribution of plausible sequence-starting items.
	///
	/// Continuous sequences have no meaningful start, so the marginal
	/// frequency distribution stands in; discrete sequences condition on
	/// the start marker.
	pub fn starting_items(&self) -> Result<Distribution<Item>, ModelError> {
		match self.kind {
			SequenceKind::Continuous => self.distributions(&[]),
			SequenceKind::Discrete => {
				self.store.probabilities_after(&[Node::Root, Node::SequenceStart])
			}
		}
	}

	/// Probability of each node following the given item sequence.
	///
	/// Items are normalized and wrapped as literals. A prefix longer than
	/// the model's context is silently clamped to its last `order - 1`
	/// items (a warning is logged, the call never fails). An empty prefix
	/// is legal and queries the root's direct children.
	pub fn probabilities_after(&self, items: &[Item]) -> Result<Distribution<Item>, ModelError> {
		let mut nodes: Vec<Node<Item>> = items
			.iter()
			.map(|item| Node::Literal(self.normalize(item.clone())))
			.collect();

		let max_context = self.order.context_len();
		if nodes.len() > max_context {
			log::warn!(
				"query prefix of {} items clamped to the last {} (order {})",
				nodes.len(),
				max_context,
				self.order.get()
			);
			nodes.drain(..nodes.len() - max_context);
		}

		let mut path = Vec::with_capacity(nodes.len() + 1);
		path.push(Node::Root);
		path.extend(nodes);
		self.store.probabilities_after(&path)
	}

	/// Writes the model to a flat snapshot file (postcard-encoded).
	pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError>
	where
		Item: Serialize,
	{
		let snapshot = bridge::export(self.order, self.kind, &self.store)?;
		std::fs::write(path, snapshot.to_bytes()?)?;
		Ok(())
	}
}

impl<Item, Store> fmt::Debug for FrequencyModel<Item, Store>
where
	Item: ModelItem,
	Store: CountingTree<Item> + fmt::Debug,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FrequencyModel")
			.field("order", &self.order)
			.field("kind", &self.kind)
			.field("window", &self.window)
			.field("store", &self.store)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	fn continuous(order: usize) -> FrequencyModel<&'static str> {
		FrequencyModel::new(NgramOrder::new(order).unwrap(), SequenceKind::Continuous)
	}

	fn discrete(order: usize) -> FrequencyModel<&'static str> {
		FrequencyModel::new(NgramOrder::new(order).unwrap(), SequenceKind::Discrete)
	}

	const WEATHER: [&str; 8] = ["🌧", "🌧", "🌧", "🌧", "☀️", "☀️", "☀️", "☀️"];

	#[test]
	fn weather_marginal_distribution() {
		let mut model = continuous(2);
		model.observe_sequence(WEATHER).unwrap();

		let distribution = model.distributions(&[]).unwrap();
		assert_eq!(
			distribution,
			vec![(0.5, Node::Literal("🌧")), (0.5, Node::Literal("☀️"))]
		);
	}

	#[test]
	fn weather_transitions_after_sunny() {
		let mut model = continuous(2);
		model.observe_sequence(WEATHER).unwrap();

		// Three sunny-to-sunny transitions out of four sunny observations,
		// one sunny-to-end-of-sample
		let after_sunny = model.probabilities_after(&["☀️"]).unwrap();
		assert_eq!(
			after_sunny,
			vec![(0.75, Node::Literal("☀️")), (0.25, Node::UnseenTrailing)]
		);
	}

	#[test]
	fn discrete_branches_after_shared_prefix() {
		let mut model = discrete(2);
		model.observe_sequence(["the", "cat"]).unwrap();
		model.observe_sequence(["the", "hat"]).unwrap();

		let after_the = model.probabilities_after(&["the"]).unwrap();
		assert_eq!(
			after_the,
			vec![(0.5, Node::Literal("cat")), (0.5, Node::Literal("hat"))]
		);
	}

	#[test]
	fn every_order_is_updated_per_observation() {
		let mut model = continuous(3);
		model.observe_sequence(["a", "b", "c"]).unwrap();

		// Unigram, bigram and trigram paths were all populated by the
		// single pass
		let root = model.store();
		let b = root.find_child(&Node::Literal("b")).unwrap().unwrap();
		assert_eq!(b.count(), 1.0);
		let ab = root
			.find_child(&Node::Literal("a")).unwrap().unwrap()
			.find_child(&Node::Literal("b")).unwrap().unwrap();
		assert_eq!(ab.count(), 1.0);
		let abc = root
			.find_child(&Node::Literal("a")).unwrap().unwrap()
			.find_child(&Node::Literal("b")).unwrap().unwrap()
			.find_child(&Node::Literal("c")).unwrap().unwrap();
		assert_eq!(abc.count(), 1.0);
	}

	#[test]
	fn starting_items_discrete_conditions_on_start_marker() {
		let mut model = discrete(2);
		model.observe_sequence(["the", "cat"]).unwrap();
		model.observe_sequence(["the", "hat"]).unwrap();

		let starting = model.starting_items().unwrap();
		assert_eq!(starting, vec![(1.0, Node::Literal("the"))]);
	}

	#[test]
	fn starting_items_continuous_is_the_marginal() {
		let mut model = continuous(2);
		model.observe_sequence(WEATHER).unwrap();
		assert_eq!(model.starting_items().unwrap(), model.distributions(&[]).unwrap());
	}

	#[test]
	fn normalizer_folds_observations_and_queries() {
		let mut folded: FrequencyModel<String> = FrequencyModel::new(
			NgramOrder::new(2).unwrap(),
			SequenceKind::Continuous,
		)
		.with_normalizer(|item: String| item.to_lowercase());
		folded.observe_sequence(["A".to_owned(), "a".to_owned()]).unwrap();

		let mut plain: FrequencyModel<String> = FrequencyModel::new(
			NgramOrder::new(2).unwrap(),
			SequenceKind::Continuous,
		);
		plain.observe_sequence(["a".to_owned(), "a".to_owned()]).unwrap();

		assert_eq!(
			folded.distributions(&[]).unwrap(),
			plain.distributions(&[]).unwrap()
		);
		// The query side is normalized too
		assert_eq!(
			folded.probabilities_after(&["A".to_owned()]).unwrap(),
			plain.probabilities_after(&["a".to_owned()]).unwrap()
		);
	}

	#[test]
	fn over_long_query_prefix_is_clamped() {
		let mut model = continuous(3);
		model.observe_sequence(["x", "y", "z", "x", "y", "z"]).unwrap();

		let clamped = model.probabilities_after(&["x", "y", "z"]).unwrap();
		let direct = model.probabilities_after(&["y", "z"]).unwrap();
		assert_eq!(clamped, direct);
	}

	#[test]
	fn empty_query_lists_root_children() {
		let mut model = continuous(2);
		model.observe_sequence(["a", "b"]).unwrap();

		let result = model.probabilities_after(&[]).unwrap();
		// Boundary markers are included at this level; ratios still sum to 1
		let sum: f64 = result.iter().map(|(p, _)| p).sum();
		assert!((sum - 1.0).abs() < 1e-9);
		assert!(result.iter().any(|(_, n)| *n == Node::UnseenLeading));
		assert!(result.iter().any(|(_, n)| *n == Node::Literal("a")));
	}

	#[test]
	fn unseen_prefix_yields_empty_not_error() {
		let mut model = continuous(2);
		model.observe_sequence(["a", "b"]).unwrap();
		assert!(model.probabilities_after(&["nope"]).unwrap().is_empty());
	}

	#[test]
	fn completed_observation_matches_synchronous_counts() {
		let mut joined = discrete(2);
		let mut outcome = None;
		joined.observe_sequence_completed(["the", "cat"], |result| outcome = Some(result));
		assert!(matches!(outcome, Some(Ok(()))));

		let mut synchronous = discrete(2);
		synchronous.observe_sequence(["the", "cat"]).unwrap();

		assert_eq!(
			joined.probabilities_after(&["the"]).unwrap(),
			synchronous.probabilities_after(&["the"]).unwrap()
		);
		assert_eq!(joined.starting_items().unwrap(), synchronous.starting_items().unwrap());
	}

	#[test]
	fn snapshot_file_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("weather.bin");

		let mut model: FrequencyModel<String> = FrequencyModel::new(
			NgramOrder::new(2).unwrap(),
			SequenceKind::Continuous,
		);
		model
			.observe_sequence(WEATHER.iter().map(|item| (*item).to_owned()))
			.unwrap();
		model.save_snapshot(&path).unwrap();

		let restored: FrequencyModel<String> = FrequencyModel::load_snapshot(&path).unwrap();
		assert_eq!(restored.order(), model.order());
		assert_eq!(restored.kind(), model.kind());
		assert_eq!(restored.distributions(&[]).unwrap(), model.distributions(&[]).unwrap());
		assert_eq!(
			restored.probabilities_after(&["☀️".to_owned()]).unwrap(),
			model.probabilities_after(&["☀️".to_owned()]).unwrap()
		);
	}

	proptest! {
		#[test]
		fn distributions_sum_to_one(
			items in proptest::collection::vec(
				proptest::sample::select(vec!["a", "b", "c", "d"]),
				1..24,
			)
		) {
			let mut model = continuous(3);
			model.observe_sequence(items).unwrap();

			let distribution = model.distributions(&[]).unwrap();
			prop_assert!(!distribution.is_empty());
			let sum: f64 = distribution.iter().map(|(p, _)| p).sum();
			prop_assert!((sum - 1.0).abs() < 1e-9);
		}

		#[test]
		fn long_queries_equal_their_clamp(
			items in proptest::collection::vec(
				proptest::sample::select(vec!["a", "b", "c"]),
				3..16,
			),
			prefix in proptest::collection::vec(
				proptest::sample::select(vec!["a", "b", "c"]),
				3..6,
			),
		) {
			let mut model = continuous(3);
			model.observe_sequence(items).unwrap();

			let clamped = model.probabilities_after(&prefix).unwrap();
			let tail = &prefix[prefix.len() - 2..];
			let direct = model.probabilities_after(tail).unwrap();
			prop_assert_eq!(clamped, direct);
		}
	}
}
