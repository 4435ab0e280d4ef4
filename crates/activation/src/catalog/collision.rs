//! Collision records.
//!
//! # Role
//!
//! Catalog insertion never fails. When a newer strategy takes over a binding
//! that another strategy held, the displacement is recorded here for
//! diagnostics.

use std::fmt;

use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::strategy::StrategyKind;

/// Identity of a strategy taking part in a collision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
	pub strategy_id: u64,
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollisionKind {
	/// A second primary was registered for the descriptor.
	Primary,
	/// A second strategy was exported under the same key.
	Key(LookupKey),
}

impl fmt::Display for CollisionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Primary => write!(f, "primary"),
			Self::Key(key) => write!(f, "key {key}"),
		}
	}
}

/// One displaced binding. The incoming strategy always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
	pub catalog: StrategyKind,
	pub ty: TypeDescriptor,
	pub kind: CollisionKind,
	pub displaced: Party,
	pub incoming: Party,
}
