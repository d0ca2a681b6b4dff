use rand::Rng;
use rand::rngs::ThreadRng;

use crate::error::ModelError;
use super::frequency_model::FrequencyModel;
use super::node::{ModelItem, Node, SequenceKind};
use super::tree::CountingTree;

/// How much context a walk conditions each step on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkMode {
	/// Context length 1: classic first-order Markov chain.
	MarkovChain,
	/// Context length `order - 1`: everything the model can condition on.
	MatchModel,
	/// A fixed context length.
	FixedSteps(usize),
}

/// Random-walk sequence generator over a frequency model.
///
/// Holds the model read-only and produces items by repeated weighted
/// sampling over a sliding context of the most recent steps. Discrete
/// models terminate a walk when the end marker is drawn; continuous models
/// retry past boundary draws, backing off to the marginal distribution and
/// then to shorter contexts until a literal comes out.
///
/// Not thread-safe: the context window is mutable state.
pub struct Walker<'m, Item: ModelItem, Store: CountingTree<Item>, R: Rng = ThreadRng> {
	model: &'m FrequencyModel<Item, Store>,
	mode: WalkMode,
	rng: R,
	is_new_sequence: bool,
	last_steps: Vec<Item>,
}

impl<'m, Item: ModelItem, Store: CountingTree<Item>> Walker<'m, Item, Store, ThreadRng> {
	/// Creates a walker drawing from the thread-local random source.
	pub fn new(model: &'m FrequencyModel<Item, Store>, mode: WalkMode) -> Self {
		Self::with_rng(model, mode, rand::rng())
	}
}

impl<'m, Item: ModelItem, Store: CountingTree<Item>, R: Rng> Walker<'m, Item, Store, R> {
	/// Creates a walker with an injected random source.
	///
	/// With a seeded source the walk is reproducible: the bundled memory
	/// backend enumerates children in insertion order, so sampling
	/// tie-breaks are stable.
	pub fn with_rng(model: &'m FrequencyModel<Item, Store>, mode: WalkMode, rng: R) -> Self {
		Self {
			model,
			mode,
			rng,
			is_new_sequence: true,
			last_steps: Vec::new(),
		}
	}

	fn context_len(&self) -> usize {
		match self.mode {
			WalkMode::MarkovChain => 1,
			WalkMode::MatchModel => self.model.order().context_len(),
			WalkMode::FixedSteps(steps) => steps,
		}
	}

	fn clamp_context(&mut self) {
		let context = self.context_len();
		if self.last_steps.len() > context {
			self.last_steps.drain(..self.last_steps.len() - context);
		}
	}

	/// Produces the next item of the walk.
	///
	/// Returns `Ok(None)` when the model is empty, or when a discrete
	/// model draws the end marker: the sequence is complete.
	///
	/// # Errors
	/// Backend failures from the underlying store propagate.
	pub fn next(&mut self) -> Result<Option<Item>, ModelError> {
		let starting = self.model.starting_items()?;
		if starting.is_empty() {
			return Ok(None);
		}

		if self.is_new_sequence {
			self.is_new_sequence = false;
			// A boundary draw from the start distribution is not expected
			// in practice but must not crash
			return Ok(match sample_weighted(&mut self.rng, &starting) {
				Some(Node::Literal(item)) => {
					let item = item.clone();
					self.last_steps = vec![item.clone()];
					Some(item)
				}
				_ => None,
			});
		}

		self.clamp_context();
		match self.model.kind() {
			SequenceKind::Discrete => self.next_discrete(),
			SequenceKind::Continuous => self.next_continuous(),
		}
	}

	fn next_discrete(&mut self) -> Result<Option<Item>, ModelError> {
		let distribution = self.model.probabilities_after(&self.last_steps)?;
		match sample_weighted(&mut self.rng, &distribution) {
			Some(Node::Literal(item)) => {
				let item = item.clone();
				self.last_steps.push(item.clone());
				Ok(Some(item))
			}
			// Drawing the end marker (or matching nothing) terminates the
			// sequence
			_ => Ok(None),
		}
	}

	fn next_continuous(&mut self) -> Result<Option<Item>, ModelError> {
		loop {
			let distribution = self.model.probabilities_after(&self.last_steps)?;
			let mut picked: Option<Item> = None;

			if let Some(node) = sample_weighted(&mut self.rng, &distribution) {
				match node {
					Node::Literal(item) => picked = Some(item.clone()),
					node if node.is_observable_boundary() => {
						// Back off to the marginal distribution, first
						// without the candidate just tried, then unfiltered
						let tried = [node.clone()];
						let mut marginal = self.model.distributions(&tried)?;
						if marginal.is_empty() {
							marginal = self.model.distributions(&[])?;
						}
						if let Some(Node::Literal(item)) =
							sample_weighted(&mut self.rng, &marginal)
						{
							picked = Some(item.clone());
						}
					}
					_ => {}
				}
			}

			if let Some(item) = picked {
				self.last_steps.push(item.clone());
				self.clamp_context();
				return Ok(Some(item));
			}

			if self.last_steps.is_empty() {
				// Context exhausted with nothing to draw: the model holds
				// no literal transitions at all
				return Ok(None);
			}
			// Shrink the context from its oldest entry and retry
			self.last_steps.remove(0);
		}
	}

	/// Resets the walk; the next [`next`](Self::next) starts a fresh
	/// sequence.
	pub fn end_walk(&mut self) {
		self.is_new_sequence = true;
		self.last_steps.clear();
	}

	/// Pulls up to `request` items.
	///
	/// Discrete models start a fresh sequence per fill and may stop early
	/// at the end marker; continuous models produce exactly `request` items
	/// as long as the model is non-empty.
	pub fn fill(&mut self, request: usize) -> Result<Vec<Item>, ModelError> {
		if self.model.kind() == SequenceKind::Discrete {
			self.end_walk();
		}
		let mut items = Vec::with_capacity(request);
		while items.len() < request {
			match self.next()? {
				Some(item) => items.push(item),
				None => break,
			}
		}
		Ok(items)
	}
}

/// Inverse-CDF weighted sampling.
///
/// The remaining mass starts at 1.0 and decreases by each entry's
/// probability in list order, giving every entry a lower-bound threshold;
/// the first entry (in that same order) whose threshold is strictly below a
/// uniform `[0, 1)` draw wins. List order decides ties, which is why
/// distribution order is load-bearing.
fn sample_weighted<'d, Item, R: Rng>(
	rng: &mut R,
	distribution: &'d [(f64, Node<Item>)],
) -> Option<&'d Node<Item>> {
	if distribution.is_empty() {
		return None;
	}
	let draw: f64 = rng.random();
	let mut remaining = 1.0;
	for (probability, node) in distribution {
		remaining -= probability;
		if remaining < draw {
			return Some(node);
		}
	}
	// Float dust can leave the last threshold at or above the draw
	distribution.last().map(|(_, node)| node)
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;
	use crate::model::node::NgramOrder;

	/// Random source returning a fixed stream, for pinning draws.
	struct ConstRng(u64);

	impl rand::RngCore for ConstRng {
		fn next_u32(&mut self) -> u32 {
			self.0 as u32
		}

		fn next_u64(&mut self) -> u64 {
			self.0
		}

		fn fill_bytes(&mut self, dest: &mut [u8]) {
			for chunk in dest.chunks_mut(8) {
				let bytes = self.0.to_le_bytes();
				chunk.copy_from_slice(&bytes[..chunk.len()]);
			}
		}
	}

	/// The `f64` in `[0, 1)` a `ConstRng` will produce for a wanted draw.
	fn rng_for(draw: f64) -> ConstRng {
		ConstRng(((draw * (1u64 << 53) as f64) as u64) << 11)
	}

	fn lit(s: &'static str) -> Node<&'static str> {
		Node::Literal(s)
	}

	#[test]
	fn sampling_walks_the_inverse_cdf() {
		let distribution = vec![(0.75, lit("a")), (0.25, lit("b"))];
		// Thresholds are 0.25 then 0.0
		assert_eq!(sample_weighted(&mut rng_for(0.9), &distribution), Some(&lit("a")));
		assert_eq!(sample_weighted(&mut rng_for(0.3), &distribution), Some(&lit("a")));
		assert_eq!(sample_weighted(&mut rng_for(0.1), &distribution), Some(&lit("b")));
	}

	#[test]
	fn sampling_tie_break_follows_list_order() {
		// A draw of exactly 0.0 is below no threshold; the last entry is
		// the fallback
		let distribution = vec![(0.5, lit("a")), (0.5, lit("b"))];
		assert_eq!(sample_weighted(&mut rng_for(0.0), &distribution), Some(&lit("b")));
		assert_eq!(sample_weighted(&mut rng_for(0.5001), &distribution), Some(&lit("a")));
		assert_eq!(sample_weighted(&mut rng_for(0.4999), &distribution), Some(&lit("b")));
	}

	#[test]
	fn sampling_empty_distribution_is_none() {
		let distribution: Vec<(f64, Node<&str>)> = Vec::new();
		assert_eq!(sample_weighted(&mut rng_for(0.5), &distribution), None);
	}

	#[test]
	fn discrete_single_transition_chain_is_deterministic() {
		let mut model = FrequencyModel::new(
			NgramOrder::new(4).unwrap(),
			SequenceKind::Discrete,
		);
		model.observe_sequence(["a", "b", "c"]).unwrap();

		// One possible transition at every step; any seed replays the
		// training sequence and stops at the end marker
		for seed in [1u64, 7, 42] {
			let mut walker = Walker::with_rng(
				&model,
				WalkMode::MatchModel,
				StdRng::seed_from_u64(seed),
			);
			assert_eq!(walker.fill(10).unwrap(), vec!["a", "b", "c"]);
		}
	}

	#[test]
	fn discrete_fill_starts_a_fresh_sequence_each_time() {
		let mut model = FrequencyModel::new(
			NgramOrder::new(3).unwrap(),
			SequenceKind::Discrete,
		);
		model.observe_sequence(["x", "y"]).unwrap();

		let mut walker = Walker::with_rng(&model, WalkMode::MatchModel, StdRng::seed_from_u64(3));
		assert_eq!(walker.fill(5).unwrap(), vec!["x", "y"]);
		assert_eq!(walker.fill(5).unwrap(), vec!["x", "y"]);
	}

	#[test]
	fn continuous_fill_produces_exactly_the_request() {
		let mut model = FrequencyModel::new(
			NgramOrder::new(2).unwrap(),
			SequenceKind::Continuous,
		);
		model
			.observe_sequence(["🌧", "🌧", "🌧", "🌧", "☀️", "☀️", "☀️", "☀️"])
			.unwrap();

		let mut walker = Walker::with_rng(&model, WalkMode::MarkovChain, StdRng::seed_from_u64(11));
		let forecast = walker.fill(40).unwrap();
		assert_eq!(forecast.len(), 40);
		assert!(forecast.iter().all(|item| *item == "🌧" || *item == "☀️"));
	}

	#[test]
	fn continuous_walks_reproduce_under_a_fixed_seed() {
		let mut model = FrequencyModel::new(
			NgramOrder::new(3).unwrap(),
			SequenceKind::Continuous,
		);
		model
			.observe_sequence(["a", "b", "a", "c", "a", "b", "a"])
			.unwrap();

		let mut first = Walker::with_rng(&model, WalkMode::MatchModel, StdRng::seed_from_u64(99));
		let mut second = Walker::with_rng(&model, WalkMode::MatchModel, StdRng::seed_from_u64(99));
		assert_eq!(first.fill(25).unwrap(), second.fill(25).unwrap());
	}

	#[test]
	fn empty_model_yields_nothing() {
		let model: FrequencyModel<&str> = FrequencyModel::new(
			NgramOrder::new(2).unwrap(),
			SequenceKind::Continuous,
		);
		let mut walker = Walker::with_rng(&model, WalkMode::MarkovChain, StdRng::seed_from_u64(0));
		assert_eq!(walker.next().unwrap(), None);
		assert!(walker.fill(5).unwrap().is_empty());
	}

	#[test]
	fn end_walk_restarts_the_sequence() {
		let mut model = FrequencyModel::new(
			NgramOrder::new(3).unwrap(),
			SequenceKind::Discrete,
		);
		model.observe_sequence(["x", "y"]).unwrap();

		let mut walker = Walker::with_rng(&model, WalkMode::MatchModel, StdRng::seed_from_u64(5));
		assert_eq!(walker.next().unwrap(), Some("x"));
		walker.end_walk();
		assert_eq!(walker.next().unwrap(), Some("x"));
	}

	#[test]
	fn fixed_steps_mode_clamps_the_context() {
		let mut model = FrequencyModel::new(
			NgramOrder::new(4).unwrap(),
			SequenceKind::Continuous,
		);
		model.observe_sequence(["a", "b", "c", "a", "b", "c"]).unwrap();

		let mut walker = Walker::with_rng(&model, WalkMode::FixedSteps(1), StdRng::seed_from_u64(13));
		let items = walker.fill(12).unwrap();
		assert_eq!(items.len(), 12);
	}
}
