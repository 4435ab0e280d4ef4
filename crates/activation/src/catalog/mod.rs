//! Strategy catalogs with atomic publication.
//!
//! # Role
//!
//! One [`StrategyCatalog`] exists per strategy variant. Readers load the current
//! [`CatalogSnapshot`] without locking; writers build an extended snapshot and
//! publish it with a compare-and-swap.
//!
//! # Invariants
//!
//! - Readers never observe a half-updated collection.
//!   - Enforced in: [`StrategyCatalog::add`] (copy-on-write, single pointer swap).
//!   - Tested by: `catalog::tests::held_snapshot_is_unaffected_by_later_adds`
//!   - Failure symptom: a lookup sees a primary whose strategy is missing from the list.
//!
//! - At most one primary per descriptor; the most recent registration holds it.
//!   - Enforced in: `insert_into_collection`.
//!   - Tested by: `catalog::tests::second_primary_displaces_first`
//!   - Failure symptom: tie-break depends on hash order.
//!
//! - Concurrent additions are linearizable without lost updates.
//!   - Enforced in: [`StrategyCatalog::add`] (CAS retry loop).
//!   - Tested by: `catalog::tests::concurrent_adds_are_not_lost`
//!   - Failure symptom: strategies registered from racing threads silently vanish.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::descriptor::TypeDescriptor;
use crate::strategy::{Strategy, StrategyKind};

mod collision;
mod snapshot;


pub use collision::{Collision, CollisionKind, Party};
pub use snapshot::{CatalogSnapshot, StrategyCollection};

/// Index from exact descriptor to candidate strategies of one variant.
pub struct StrategyCatalog {
	kind: StrategyKind,
	snap: ArcSwap<CatalogSnapshot>,
}

impl StrategyCatalog {
	/// Creates an empty catalog sized for `capacity` descriptors.
	pub fn new(kind: StrategyKind, capacity: usize) -> Self {
		Self {
			kind,
			snap: ArcSwap::from_pointee(CatalogSnapshot::empty(capacity)),
		}
	}

	pub fn kind(&self) -> StrategyKind {
		self.kind
	}

	/// Returns the collection registered for exactly `ty`.
	#[inline]
	pub fn get(&self, ty: &TypeDescriptor) -> Option<Arc<StrategyCollection>> {
		self.snap.load().get(ty).cloned()
	}

	/// Returns the current snapshot, pinned for as long as it is held.
	pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
		self.snap.load_full()
	}

	pub fn len(&self) -> usize {
		self.snap.load().len
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn generation(&self) -> u64 {
		self.snap.load().generation
	}

	/// Inserts a strategy and publishes the extended snapshot.
	///
	/// Returns the generation of the snapshot that first contained it.
	pub fn add(&self, strategy: Strategy) -> u64 {
		debug_assert_eq!(strategy.kind(), self.kind, "strategy routed to wrong catalog");

		loop {
			let old = self.snap.load_full();

			let mut by_type = old.by_type.clone();
			let mut collisions = Vec::new();

			for ty in strategy.export_types() {
				let mut collection = by_type
					.get(ty)
					.map(|existing| StrategyCollection::clone(existing))
					.unwrap_or_default();
				insert_into_collection(self.kind, ty, &mut collection, &strategy, &mut collisions);
				by_type.insert(ty.clone(), Arc::new(collection));
			}

			for (ty, key) in strategy.keyed_exports() {
				let mut collection = by_type
					.get(ty)
					.map(|existing| StrategyCollection::clone(existing))
					.unwrap_or_default();
				if let Some(displaced) = collection.by_key.insert(key.clone(), strategy.clone()) {
					collisions.push(Collision {
						catalog: self.kind,
						ty: ty.clone(),
						kind: CollisionKind::Key(key.clone()),
						displaced: party(&displaced),
						incoming: party(&strategy),
					});
				}
				by_type.insert(ty.clone(), Arc::new(collection));
			}

			let generation = old.generation + 1;
			let next = Arc::new(CatalogSnapshot {
				by_type,
				collisions: old
					.collisions
					.iter()
					.cloned()
					.chain(collisions.iter().cloned())
					.collect(),
				len: old.len + 1,
				generation,
			});

			let prev = self.snap.compare_and_swap(&old, Arc::clone(&next));
			if Arc::ptr_eq(&prev, &old) {
				for collision in &collisions {
					tracing::warn!(
						catalog = %collision.catalog,
						ty = %collision.ty,
						kind = %collision.kind,
						displaced = %collision.displaced.name,
						incoming = %collision.incoming.name,
						"strategy binding displaced",
					);
				}
				tracing::debug!(
					catalog = %self.kind,
					strategy = strategy.name(),
					generation,
					"published catalog snapshot",
				);
				return generation;
			}
			// CAS lost against a concurrent writer; rebuild from the newer snapshot.
		}
	}
}

fn insert_into_collection(
	kind: StrategyKind,
	ty: &TypeDescriptor,
	collection: &mut StrategyCollection,
	strategy: &Strategy,
	collisions: &mut Vec<Collision>,
) {
	collection.ordered.push(strategy.clone());
	if !strategy.is_primary() {
		return;
	}
	if let Some(displaced) = collection.primary.replace(strategy.clone()) {
		collisions.push(Collision {
			catalog: kind,
			ty: ty.clone(),
			kind: CollisionKind::Primary,
			displaced: party(&displaced),
			incoming: party(strategy),
		});
	}
}

fn party(strategy: &Strategy) -> Party {
	Party {
		strategy_id: strategy.id(),
		name: strategy.name().to_owned(),
	}
}
