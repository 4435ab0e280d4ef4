//! Located-delegate cache.
//!
//! Maps `(type, key)` to the delegate `find_delegate` returned last time.
//! Any catalog publication bumps the epoch and clears the map; an insert
//! computed against an older epoch is dropped so a lookup that raced a
//! registration cannot resurrect a stale winner.

use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;

use crate::delegate::ActivationDelegate;
use crate::descriptor::{LookupKey, TypeDescriptor};

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
	ty: TypeDescriptor,
	key: Option<LookupKey>,
}

#[derive(Clone)]
struct CacheState {
	epoch: u64,
	entries: FxHashMap<CacheKey, ActivationDelegate>,
}

pub struct DelegateCache {
	capacity: usize,
	state: ArcSwap<CacheState>,
}

impl DelegateCache {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			state: ArcSwap::from_pointee(CacheState {
				epoch: 0,
				entries: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
			}),
		}
	}

	pub fn epoch(&self) -> u64 {
		self.state.load().epoch
	}

	pub fn len(&self) -> usize {
		self.state.load().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn get(&self, ty: &TypeDescriptor, key: Option<&LookupKey>) -> Option<ActivationDelegate> {
		let lookup = CacheKey {
			ty: ty.clone(),
			key: key.cloned(),
		};
		self.state.load().entries.get(&lookup).cloned()
	}

	/// Stores `delegate` unless the cache was invalidated since `epoch`.
	pub fn insert(
		&self,
		epoch: u64,
		ty: &TypeDescriptor,
		key: Option<&LookupKey>,
		delegate: ActivationDelegate,
	) {
		let entry = CacheKey {
			ty: ty.clone(),
			key: key.cloned(),
		};
		self.state.rcu(|current| {
			if current.epoch != epoch || current.entries.contains_key(&entry) {
				return Arc::clone(current);
			}
			let mut next = CacheState::clone(current);
			next.entries.insert(entry.clone(), delegate.clone());
			Arc::new(next)
		});
	}

	/// Drops every entry and starts a new epoch.
	pub fn invalidate(&self) {
		let capacity = self.capacity;
		self.state.rcu(|current| CacheState {
			epoch: current.epoch + 1,
			entries: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
		});
	}
}
