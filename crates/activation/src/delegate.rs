//! Compiled activation functions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::InjectionContext;
use crate::descriptor::TypeDescriptor;
use crate::error::Result;
use crate::scope::{DisposalScope, InjectionScope};

/// A produced service instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// An owned value that has not been shared yet.
pub type Boxed = Box<dyn Any + Send + Sync>;

type DelegateFn = dyn Fn(&InjectionScope, &dyn DisposalScope, Option<InjectionContext>) -> Result<Instance>
	+ Send
	+ Sync;

/// A callable produced by lowering a construction plan.
///
/// Takes the requesting scope, the root disposal scope and the (possibly unset)
/// ambient injection context. Every strategy decision was made when the
/// delegate was compiled; invoking it never locates or compiles anything.
#[derive(Clone)]
pub struct ActivationDelegate {
	activation_type: TypeDescriptor,
	func: Arc<DelegateFn>,
}

impl ActivationDelegate {
	/// Wraps a hand-written activation function.
	pub fn from_fn<F>(activation_type: TypeDescriptor, func: F) -> Self
	where
		F: Fn(&InjectionScope, &dyn DisposalScope, Option<InjectionContext>) -> Result<Instance>
			+ Send
			+ Sync
			+ 'static,
	{
		Self {
			activation_type,
			func: Arc::new(func),
		}
	}

	/// Type this delegate was compiled for.
	pub fn activation_type(&self) -> &TypeDescriptor {
		&self.activation_type
	}

	#[inline]
	pub fn invoke(
		&self,
		scope: &InjectionScope,
		disposal: &dyn DisposalScope,
		context: Option<InjectionContext>,
	) -> Result<Instance> {
		(self.func)(scope, disposal, context)
	}

	/// Returns true if both handles share the same compiled function.
	pub fn ptr_eq(a: &Self, b: &Self) -> bool {
		Arc::ptr_eq(&a.func, &b.func)
	}
}

impl fmt::Debug for ActivationDelegate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActivationDelegate")
			.field("activation_type", &self.activation_type)
			.finish_non_exhaustive()
	}
}
