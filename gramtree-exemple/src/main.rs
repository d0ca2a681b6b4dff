use gramtree_core::model::frequency_model::FrequencyModel;
use gramtree_core::model::node::{NgramOrder, SequenceKind};
use gramtree_core::model::walker::{WalkMode, Walker};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Clamping diagnostics and other library warnings go through `log`
	env_logger::init();

	// --- Continuous sequences: weather over time ---------------------------
	// No meaningful start or end; the sample just stops being observed.
	let order = NgramOrder::new(2)?;
	let mut weather: FrequencyModel<String> = FrequencyModel::new(order, SequenceKind::Continuous);

	// A week of observations: four rainy days, then four sunny ones
	weather.observe_sequence(
		["🌧", "🌧", "🌧", "🌧", "☀️", "☀️", "☀️", "☀️"]
			.into_iter()
			.map(str::to_owned),
	)?;

	// Overall frequency: half rainy, half sunny
	for (probability, node) in weather.distributions(&[])? {
		println!("overall {node:?}: {probability}");
	}

	// Transition probabilities conditioned on a sunny day
	for (probability, node) in weather.probabilities_after(&["☀️".to_owned()])? {
		println!("after ☀️ {node:?}: {probability}");
	}

	// A continuous walker never terminates on its own; ask for exactly 14 days
	let mut forecast = Walker::new(&weather, WalkMode::MarkovChain);
	println!("two-week forecast: {}", forecast.fill(14)?.join(""));

	// --- Discrete sequences: words --------------------------------------
	// Hard start/end boundaries; the walker stops when a word is complete.
	let mut words: FrequencyModel<char> = FrequencyModel::new(
		NgramOrder::new(3)?,
		SequenceKind::Discrete,
	)
	// Normalization hook: fold case before counting and querying
	.with_normalizer(|c: char| c.to_ascii_lowercase());

	for word in ["Brie", "Bleu", "Comte", "Cantal", "Salers", "Morbier"] {
		words.observe_sequence(word.chars())?;
	}

	// MatchModel conditions on the full context the order allows (here 2)
	let mut namer = Walker::new(&words, WalkMode::MatchModel);
	for i in 0..10 {
		let generated: String = namer.fill(24)?.into_iter().collect();
		println!("generated word {}: {}", i + 1, generated);
	}

	// --- Snapshot round trip ---------------------------------------------
	// The flat bridge turns the counting tree into ID-keyed records;
	// postcard writes them to disk and back.
	let path = std::env::temp_dir().join("weather.bin");
	weather.save_snapshot(&path)?;
	let restored: FrequencyModel<String> = FrequencyModel::load_snapshot(&path)?;
	println!(
		"restored model answers the same: {}",
		restored.distributions(&[])? == weather.distributions(&[])?
	);

	Ok(())
}
