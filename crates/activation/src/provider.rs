//! Missing-strategy providers.
//!
//! Providers are consulted only after every lookup tier missed and only while
//! the scope's strategy-mutation lock is held. Whatever they return is added
//! to the catalogs before the lookup is retried.
//!
//! Concrete types can be made auto-registrable from anywhere in the link
//! graph with [`concrete_type!`](crate::concrete_type); the
//! [`ConcreteStrategyProvider`] built by [`ConcreteStrategyProvider::from_inventory`]
//! picks them up.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::descriptor::TypeDescriptor;
use crate::error::BoxError;
use crate::request::ActivationRequest;
use crate::scope::InjectionScope;
use crate::strategy::{Activation, Strategy, StrategyBuilder, StrategySource};

/// Synthesizes strategies for requests no catalog can serve.
pub trait MissingStrategyProvider: Send + Sync {
	/// Name used in diagnostics and provider errors.
	fn name(&self) -> &str;

	/// Returns strategies able to serve `request`; may be empty.
	///
	/// Must not block indefinitely: the scope lock is held for the duration.
	fn provide_strategies(
		&self,
		scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<Vec<Strategy>, BoxError>;
}

/// Adapts a closure into a named provider.
pub struct FnProvider<F> {
	name: String,
	provide: F,
}

impl<F> FnProvider<F>
where
	F: Fn(&InjectionScope, &ActivationRequest) -> Result<Vec<Strategy>, BoxError> + Send + Sync,
{
	pub fn new(name: impl Into<String>, provide: F) -> Self {
		Self {
			name: name.into(),
			provide,
		}
	}
}

impl<F> MissingStrategyProvider for FnProvider<F>
where
	F: Fn(&InjectionScope, &ActivationRequest) -> Result<Vec<Strategy>, BoxError> + Send + Sync,
{
	fn name(&self) -> &str {
		&self.name
	}

	fn provide_strategies(
		&self,
		scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<Vec<Strategy>, BoxError> {
		(self.provide)(scope, request)
	}
}

/// Static description of an auto-registrable concrete type.
pub struct ConcreteTypeDef {
	pub type_name: fn() -> &'static str,
	pub activation: fn() -> Activation,
}

/// Wrapper for `inventory::collect!`.
pub struct ConcreteTypeReg(pub &'static ConcreteTypeDef);

inventory::collect!(ConcreteTypeReg);

/// Registers a concrete type for auto-registration.
///
/// ```ignore
/// concrete_type!(Clock, || Activation::new(|_| Ok(Clock::default())));
/// ```
#[macro_export]
macro_rules! concrete_type {
	($ty:ty, $activation:expr) => {
		const _: () = {
			static DEF: $crate::provider::ConcreteTypeDef = $crate::provider::ConcreteTypeDef {
				type_name: ::std::any::type_name::<$ty>,
				activation: $activation,
			};
			$crate::inventory::submit! { $crate::provider::ConcreteTypeReg(&DEF) }
		};
	};
}

/// Auto-registers known concrete types the first time they are requested.
///
/// Keyed, array, sequence and open-template requests are never served.
#[derive(Default)]
pub struct ConcreteStrategyProvider {
	known: FxHashMap<TypeDescriptor, Activation>,
}

impl ConcreteStrategyProvider {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a provider knowing every type registered with [`concrete_type!`](crate::concrete_type).
	pub fn from_inventory() -> Self {
		let mut provider = Self::new();
		for reg in inventory::iter::<ConcreteTypeReg> {
			provider
				.known
				.insert(TypeDescriptor::named((reg.0.type_name)()), (reg.0.activation)());
		}
		tracing::debug!(count = provider.known.len(), "collected concrete types");
		provider
	}

	pub fn with_type(mut self, ty: TypeDescriptor, activation: Activation) -> Self {
		self.known.insert(ty, activation);
		self
	}

	pub fn knows(&self, ty: &TypeDescriptor) -> bool {
		self.known.contains_key(ty)
	}
}

impl MissingStrategyProvider for ConcreteStrategyProvider {
	fn name(&self) -> &str {
		"concrete-types"
	}

	fn provide_strategies(
		&self,
		_scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<Vec<Strategy>, BoxError> {
		let ty = request.activation_type();
		if request.key().is_some()
			|| ty.is_collection()
			|| matches!(ty, TypeDescriptor::OpenGeneric { .. })
		{
			return Ok(Vec::new());
		}
		let Some(activation) = self.known.get(ty) else {
			return Ok(Vec::new());
		};
		tracing::debug!(ty = %ty, "auto-registering concrete type");
		Ok(vec![
			StrategyBuilder::new(
				format!("concrete {ty}"),
				StrategySource::Activation(activation.clone()),
			)
			.export_as(ty.clone())
			.into_export(),
		])
	}
}

impl fmt::Debug for ConcreteStrategyProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConcreteStrategyProvider")
			.field("known", &self.known.keys().collect::<Vec<_>>())
			.finish()
	}
}
