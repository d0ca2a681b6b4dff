use thiserror::Error;

/// Errors produced by the model core.
///
/// Data absence is deliberately not represented here: queries for prefixes or
/// items the model has never seen return empty distributions, never an error.
/// An over-long query prefix is clamped (with a logged warning), never failed.
#[derive(Debug, Error)]
pub enum ModelError {
	/// Configuration error raised at construction time.
	#[error("n-gram order must be >= 2, got {0}")]
	InvalidOrder(usize),

	/// A tree descent was called with an empty path.
	#[error("descent called with an empty path")]
	EmptyPath,

	/// A tree descent was called with a path that does not start at the
	/// node it was invoked on.
	#[error("path does not start at the current node")]
	PathMismatch,

	/// A flat record references a child id absent from the record set.
	#[error("flat record '{0}' is referenced but missing from the record set")]
	MissingRecord(String),

	/// A flat record id is referenced by more than one parent, or the
	/// references form a cycle.
	#[error("flat record '{0}' is referenced by more than one parent")]
	DuplicateReference(String),

	/// A storage backend failed during an increment or a query.
	#[error("storage backend error: {0}")]
	Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

	/// Snapshot file I/O failed.
	#[error("snapshot I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Snapshot byte encoding or decoding failed.
	#[error("snapshot encoding error: {0}")]
	Encode(#[from] postcard::Error),
}

impl ModelError {
	/// Wraps an arbitrary backend error for propagation through the
	/// counting tree contract.
	pub fn backend<E>(error: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self::Backend(Box::new(error))
	}
}
