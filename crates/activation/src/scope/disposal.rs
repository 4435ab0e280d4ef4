use parking_lot::Mutex;

use crate::delegate::Instance;

/// Receives instances whose activation was flagged disposable.
///
/// Lifetime policy belongs to the implementor; compiled delegates only hand
/// instances over.
pub trait DisposalScope: Send + Sync {
	fn track(&self, instance: Instance);
}

/// Disposal scope that keeps tracked instances alive until disposed.
///
/// Instances are released in reverse tracking order.
#[derive(Default)]
pub struct RootDisposalScope {
	tracked: Mutex<Vec<Instance>>,
}

impl RootDisposalScope {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.tracked.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Releases every tracked instance, newest first. Returns how many were released.
	pub fn dispose(&self) -> usize {
		let drained = std::mem::take(&mut *self.tracked.lock());
		let count = drained.len();
		for instance in drained.into_iter().rev() {
			drop(instance);
		}
		tracing::debug!(count, "disposed tracked instances");
		count
	}
}

impl DisposalScope for RootDisposalScope {
	fn track(&self, instance: Instance) {
		self.tracked.lock().push(instance);
	}
}

impl std::fmt::Debug for RootDisposalScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RootDisposalScope")
			.field("tracked", &self.len())
			.finish()
	}
}
