//! Snapshot and collection views.
//!
//! # Role
//!
//! Pure read-side types. A [`CatalogSnapshot`] is never mutated after
//! publication; extension builds a new snapshot that shares every untouched
//! [`StrategyCollection`] with its predecessor.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::collision::Collision;
use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::request::StaticInjectionContext;
use crate::strategy::Strategy;

/// Candidate strategies registered for one exact descriptor.
#[derive(Clone, Default)]
pub struct StrategyCollection {
	pub(super) primary: Option<Strategy>,
	/// Unkeyed strategies in registration order; includes the primary.
	pub(super) ordered: Vec<Strategy>,
	pub(super) by_key: FxHashMap<LookupKey, Strategy>,
}

impl StrategyCollection {
	pub fn primary(&self) -> Option<&Strategy> {
		self.primary.as_ref()
	}

	/// Unkeyed strategies in registration order.
	pub fn strategies(&self) -> &[Strategy] {
		&self.ordered
	}

	pub fn keyed(&self, key: &LookupKey) -> Option<&Strategy> {
		self.by_key.get(key)
	}

	/// Picks the strategy serving an unkeyed request.
	///
	/// The primary wins unconditionally. Otherwise the first strategy in
	/// registration order whose conditions all hold is chosen; there is no
	/// specificity scoring between conditional strategies.
	pub fn select(&self, context: &StaticInjectionContext) -> Option<&Strategy> {
		if let Some(primary) = &self.primary {
			return Some(primary);
		}
		self.ordered
			.iter()
			.find(|strategy| !strategy.has_conditions() || strategy.meets_conditions(context))
	}

	/// Strategies whose conditions hold for `context`, in registration order.
	pub fn satisfied<'a>(
		&'a self,
		context: &'a StaticInjectionContext,
	) -> impl Iterator<Item = &'a Strategy> + 'a {
		self.ordered
			.iter()
			.filter(move |strategy| strategy.meets_conditions(context))
	}

	pub fn is_empty(&self) -> bool {
		self.ordered.is_empty() && self.by_key.is_empty()
	}
}

/// One published version of a catalog.
pub struct CatalogSnapshot {
	pub(super) by_type: FxHashMap<TypeDescriptor, Arc<StrategyCollection>>,
	pub(super) collisions: Arc<[Collision]>,
	/// Number of strategies inserted so far.
	pub(super) len: usize,
	/// Incremented by every publication.
	pub(super) generation: u64,
}

impl CatalogSnapshot {
	pub(super) fn empty(capacity: usize) -> Self {
		Self {
			by_type: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
			collisions: Arc::from(Vec::new()),
			len: 0,
			generation: 0,
		}
	}

	#[inline]
	pub fn get(&self, ty: &TypeDescriptor) -> Option<&Arc<StrategyCollection>> {
		self.by_type.get(ty)
	}

	pub fn collisions(&self) -> &[Collision] {
		&self.collisions
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Descriptors with at least one registered strategy.
	pub fn types(&self) -> impl Iterator<Item = &TypeDescriptor> + '_ {
		self.by_type.keys()
	}
}
