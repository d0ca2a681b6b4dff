//! N-gram frequency models over arbitrary item sequences.
//!
//! This crate provides a modular n-gram counting and generation system including:
//! - A tagged node vocabulary distinguishing literal items from sequence boundaries
//! - A counting tree contract any storage backend can implement, with the
//!   increment/query algorithms written once against it
//! - A frequency model that updates every n-gram order simultaneously from a
//!   sliding observation window
//! - A flat, ID-keyed bridge between the tree shape and arbitrary persistence
//! - A random-walk sequence generator with boundary-retry back-off
//!
//! Only the high-level API is exposed publicly. Everything is generic over the
//! item type; items need only be cloneable, comparable and hashable.

/// Core counting, modelling and generation logic.
pub mod model;

/// Error taxonomy shared by every component.
pub mod error;
