//! Shared helpers for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::ScopeConfiguration;
use crate::delegate::Instance;
use crate::descriptor::TypeDescriptor;
use crate::error::BoxError;
use crate::provider::MissingStrategyProvider;
use crate::request::{ActivationRequest, StaticInjectionContext};
use crate::scope::{InjectionScope, ScopeBuilder};
use crate::strategy::{
	Activation, Condition, Strategy, StrategyBuilder, StrategyDef, StrategySource,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Widget {
	pub label: String,
}

pub(crate) fn widget_ty() -> TypeDescriptor {
	TypeDescriptor::named("Widget")
}

/// Activation producing a [`Widget`] carrying `label`.
pub(crate) fn labelled(label: &str) -> Activation {
	let label = label.to_owned();
	Activation::new(move |_| {
		Ok(Widget {
			label: label.clone(),
		})
	})
}

/// Strategy builder named `name` whose activation yields a widget labelled `name`.
pub(crate) fn builder(name: &str) -> StrategyBuilder {
	StrategyBuilder::new(name, StrategySource::Activation(labelled(name)))
}

pub(crate) fn export(name: &str, ty: TypeDescriptor) -> StrategyBuilder {
	builder(name).export_as(ty)
}

pub(crate) fn never() -> impl Condition + 'static {
	|_: &StrategyDef, _: &StaticInjectionContext| false
}

pub(crate) fn label_of(instance: &Instance) -> String {
	Arc::clone(instance)
		.downcast::<Widget>()
		.expect("instance is a widget")
		.label
		.clone()
}

pub(crate) fn config() -> ScopeConfiguration {
	ScopeConfiguration {
		auto_register_unknown: false,
		..ScopeConfiguration::default()
	}
}

/// Scope without the inventory-backed concrete-type provider.
pub(crate) fn scope() -> InjectionScope {
	init_tracing();
	ScopeBuilder::new("test")
		.config(config())
		.build()
		.expect("default test config is valid")
}

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Provider serving `ty` with a widget export labelled `label`, counting calls.
pub(crate) struct CountingProvider {
	pub ty: TypeDescriptor,
	pub label: &'static str,
	pub calls: AtomicUsize,
	pub delay: Option<Duration>,
}

impl CountingProvider {
	pub(crate) fn new(ty: TypeDescriptor, label: &'static str) -> Self {
		Self {
			ty,
			label,
			calls: AtomicUsize::new(0),
			delay: None,
		}
	}

	pub(crate) fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl MissingStrategyProvider for CountingProvider {
	fn name(&self) -> &str {
		"counting"
	}

	fn provide_strategies(
		&self,
		_scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<Vec<Strategy>, BoxError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.delay {
			std::thread::sleep(delay);
		}
		if request.activation_type() != &self.ty {
			return Ok(Vec::new());
		}
		Ok(vec![export(self.label, self.ty.clone()).into_export()])
	}
}
