//! Ambient injection context.
//!
//! A context is created at most once per top-level delegate call, and only when
//! the compiled plan asked for one. It is threaded explicitly through delegate
//! parameters; nested delegates receive the same handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::delegate::Instance;
use crate::descriptor::TypeDescriptor;

struct ContextInner {
	target: TypeDescriptor,
	extra: Option<Instance>,
	values: RwLock<FxHashMap<Arc<str>, Instance>>,
}

/// Per-resolution state shared by every operation of one top-level call.
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct InjectionContext {
	inner: Arc<ContextInner>,
}

impl InjectionContext {
	pub fn new(target: TypeDescriptor, extra: Option<Instance>) -> Self {
		Self {
			inner: Arc::new(ContextInner {
				target,
				extra,
				values: RwLock::new(FxHashMap::default()),
			}),
		}
	}

	/// Type the context was created for.
	pub fn target_type(&self) -> &TypeDescriptor {
		&self.inner.target
	}

	pub fn extra_data(&self) -> Option<&Instance> {
		self.inner.extra.as_ref()
	}

	pub fn value(&self, name: &str) -> Option<Instance> {
		self.inner.values.read().get(name).cloned()
	}

	pub fn set_value(&self, name: impl Into<Arc<str>>, value: Instance) {
		self.inner.values.write().insert(name.into(), value);
	}

	/// Returns true if both handles refer to the same context.
	pub fn ptr_eq(a: &Self, b: &Self) -> bool {
		Arc::ptr_eq(&a.inner, &b.inner)
	}
}

impl fmt::Debug for InjectionContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InjectionContext")
			.field("target", &self.inner.target)
			.field("values", &self.inner.values.read().len())
			.finish()
	}
}

/// Creates the ambient context when a compiled delegate runs without one.
pub trait InjectionContextCreator: Send + Sync {
	fn create_context(&self, target: &TypeDescriptor, extra: Option<Instance>)
	-> InjectionContext;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultInjectionContextCreator;

impl InjectionContextCreator for DefaultInjectionContextCreator {
	fn create_context(
		&self,
		target: &TypeDescriptor,
		extra: Option<Instance>,
	) -> InjectionContext {
		InjectionContext::new(target.clone(), extra)
	}
}
