use std::fmt;

use super::StrategyDef;
use crate::descriptor::TypeDescriptor;
use crate::request::StaticInjectionContext;

/// Predicate deciding whether a non-primary strategy may serve a request.
///
/// Must be a pure function of strategy metadata and the static context.
pub trait Condition: Send + Sync {
	fn is_satisfied(&self, strategy: &StrategyDef, context: &StaticInjectionContext) -> bool;
}

impl<F> Condition for F
where
	F: Fn(&StrategyDef, &StaticInjectionContext) -> bool + Send + Sync,
{
	fn is_satisfied(&self, strategy: &StrategyDef, context: &StaticInjectionContext) -> bool {
		self(strategy, context)
	}
}

/// Satisfied only when the request comes from constructing `parent`.
#[derive(Clone)]
pub struct WhenInjectedInto(pub TypeDescriptor);

impl Condition for WhenInjectedInto {
	fn is_satisfied(&self, _strategy: &StrategyDef, context: &StaticInjectionContext) -> bool {
		context.injected_into() == Some(&self.0)
	}
}

impl fmt::Debug for WhenInjectedInto {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WhenInjectedInto({})", self.0)
	}
}

/// Satisfied while the request depth is at most the given value.
#[derive(Debug, Clone, Copy)]
pub struct WhenDepthAtMost(pub usize);

impl Condition for WhenDepthAtMost {
	fn is_satisfied(&self, _strategy: &StrategyDef, context: &StaticInjectionContext) -> bool {
		context.depth() <= self.0
	}
}
