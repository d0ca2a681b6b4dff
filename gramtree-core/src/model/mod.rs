//! Top-level module for the n-gram counting and generation system.
//!
//! This module provides, leaves first:
//! - The node vocabulary and configuration enums (`node`)
//! - The counting tree contract, its default algorithms and the bundled
//!   in-memory backend (`tree`)
//! - The multi-order frequency model orchestrator (`frequency_model`)
//! - The flat, ID-keyed serialization bridge (`bridge`)
//! - The random-walk sequence generator (`walker`)

/// Tree node vocabulary (`Node`), n-gram order and sequence kind.
///
/// Pure value types: equality, hashing and the boundary predicates that
/// drive distribution filtering and the walker's retry logic.
pub mod node;

/// Counting tree contract and default algorithms.
///
/// Storage backends implement the primitive operations; the increment,
/// probability-query and marginal-distribution algorithms are provided
/// once on top of them. Ships `MemoryTree`, the default in-memory backend.
pub mod tree;

/// Frequency model orchestrator.
///
/// Owns the configuration, the sliding observation window and a counting
/// tree store, and updates every n-gram order simultaneously per observation.
pub mod frequency_model;

/// Flat bridge between the tree shape and ID-keyed records.
///
/// Exports a tree to a flat snapshot suitable for arbitrary persistence and
/// hydrates a tree back from one.
pub mod bridge;

/// Random-walk sequence generator.
///
/// Consumes a frequency model read-only and produces sequences by repeated
/// weighted sampling over a context window.
pub mod walker;
