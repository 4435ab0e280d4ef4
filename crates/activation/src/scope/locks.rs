use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use rustc_hash::FxHashMap;

/// Name of the lock serializing strategy escalation within a scope.
pub const ACTIVATION_STRATEGY_ADD_LOCK: &str = "ActivationStrategyAddLock";

/// Table of named re-entrant locks.
///
/// Clones share the table, so child scopes built with a clone contend on the
/// same locks; scopes built with a fresh table are isolated.
#[derive(Clone, Default)]
pub struct ScopeLocks {
	table: Arc<Mutex<FxHashMap<Arc<str>, Arc<ReentrantMutex<()>>>>>,
}

impl ScopeLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the lock registered under `name`, creating it on first use.
	pub fn get(&self, name: &str) -> Arc<ReentrantMutex<()>> {
		let mut table = self.table.lock();
		if let Some(lock) = table.get(name) {
			return Arc::clone(lock);
		}
		let lock = Arc::new(ReentrantMutex::new(()));
		table.insert(Arc::from(name), Arc::clone(&lock));
		lock
	}

	/// Returns true if both handles share one lock table.
	pub fn ptr_eq(a: &Self, b: &Self) -> bool {
		Arc::ptr_eq(&a.table, &b.table)
	}
}

impl fmt::Debug for ScopeLocks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopeLocks")
			.field("names", &self.table.lock().keys().collect::<Vec<_>>())
			.finish()
	}
}
