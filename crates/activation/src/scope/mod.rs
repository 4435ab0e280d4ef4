//! Injection scopes.
//!
//! # Role
//!
//! An [`InjectionScope`] owns the three strategy catalogs, the
//! missing-strategy providers, the located-delegate cache and the compiler
//! configured for it. It is the `scope` argument threaded through every
//! lookup, plan build and compiled delegate.
//!
//! # Invariants
//!
//! - Adding a strategy invalidates every cached located delegate.
//!   - Enforced in: [`InjectionScope::add_strategy`].
//!   - Tested by: `scope::tests::adding_primary_invalidates_located_delegate`
//!   - Failure symptom: a newly registered primary is ignored until restart.
//!
//! - Scopes built from a shared lock table serialize escalation together.
//!   - Enforced in: [`ScopeBuilder::locks`] (the table is shared, not copied).
//!   - Tested by: `scope::tests::child_scope_shares_escalation_lock`
//!   - Failure symptom: parent and child escalate the same type concurrently.
//!
//! - A [`CatalogStamp`] changes whenever any of the scope's catalogs publishes.
//!   - Enforced in: [`InjectionScope::catalog_stamp`].
//!   - Tested by: `compiler::tests::decorator_added_after_first_locate_applies`, `compiler::tests::dependency_primary_added_after_first_locate_applies`
//!   - Failure symptom: strategies keep serving delegates compiled against an older catalog.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{ReentrantMutex, RwLock};

use crate::catalog::StrategyCatalog;
use crate::compiler::ActivationStrategyCompiler;
use crate::config::ScopeConfiguration;
use crate::context::{DefaultInjectionContextCreator, InjectionContextCreator};
use crate::delegate::Instance;
use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::error::{ActivationError, ConfigError, Result};
use crate::plan::{DefaultPlanBuilder, PlanBuilder};
use crate::provider::{ConcreteStrategyProvider, MissingStrategyProvider};
use crate::strategy::{Strategy, StrategyKind};

mod cache;
mod disposal;
mod locks;


pub use cache::DelegateCache;
pub use disposal::{DisposalScope, RootDisposalScope};
pub use locks::{ACTIVATION_STRATEGY_ADD_LOCK, ScopeLocks};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the catalog state a delegate was compiled against.
///
/// Compiled plans inline decorators and nested dependency choices, so a
/// delegate is only reusable while every catalog of its scope is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatalogStamp {
	pub scope: u64,
	pub exports: u64,
	pub wrappers: u64,
	pub decorators: u64,
}

/// A container scope resolving and activating strategies.
pub struct InjectionScope {
	id: u64,
	name: Arc<str>,
	config: Arc<ScopeConfiguration>,
	exports: StrategyCatalog,
	wrappers: StrategyCatalog,
	decorators: StrategyCatalog,
	providers: RwLock<Vec<Arc<dyn MissingStrategyProvider>>>,
	locks: ScopeLocks,
	delegates: DelegateCache,
	compiler: ActivationStrategyCompiler,
	disposal: RootDisposalScope,
}

impl InjectionScope {
	pub fn builder(name: impl Into<Arc<str>>) -> ScopeBuilder {
		ScopeBuilder::new(name)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Current generations of the export, wrapper and decorator catalogs.
	pub fn catalog_stamp(&self) -> CatalogStamp {
		CatalogStamp {
			scope: self.id,
			exports: self.exports.generation(),
			wrappers: self.wrappers.generation(),
			decorators: self.decorators.generation(),
		}
	}

	pub fn config(&self) -> &ScopeConfiguration {
		&self.config
	}

	pub fn compiler(&self) -> &ActivationStrategyCompiler {
		&self.compiler
	}

	pub fn exports(&self) -> &StrategyCatalog {
		&self.exports
	}

	pub fn wrappers(&self) -> &StrategyCatalog {
		&self.wrappers
	}

	pub fn decorators(&self) -> &StrategyCatalog {
		&self.decorators
	}

	pub fn delegates(&self) -> &DelegateCache {
		&self.delegates
	}

	pub fn locks(&self) -> &ScopeLocks {
		&self.locks
	}

	/// Root disposal scope handed to delegates invoked through [`Self::locate`].
	pub fn disposal(&self) -> &RootDisposalScope {
		&self.disposal
	}

	/// Returns the named lock, shared with every scope using the same table.
	pub fn lock_object(&self, name: &str) -> Arc<ReentrantMutex<()>> {
		self.locks.get(name)
	}

	/// Adds `strategy` to the catalog matching its variant and drops cached
	/// located delegates.
	pub fn add_strategy(&self, strategy: Strategy) {
		let catalog = match &strategy {
			Strategy::Export(_) => &self.exports,
			Strategy::Wrapper(_) => &self.wrappers,
			Strategy::Decorator(_) => &self.decorators,
		};
		catalog.add(strategy);
		self.delegates.invalidate();
	}

	pub fn add_missing_strategy_provider(&self, provider: Arc<dyn MissingStrategyProvider>) {
		tracing::debug!(scope = %self.name, provider = provider.name(), "added missing-strategy provider");
		self.providers.write().push(provider);
	}

	/// Providers in registration order.
	pub fn missing_strategy_providers(&self) -> Vec<Arc<dyn MissingStrategyProvider>> {
		self.providers.read().clone()
	}

	/// Unkeyed strategies registered for exactly `ty` in the catalog of `kind`.
	pub fn strategies_for(&self, kind: StrategyKind, ty: &TypeDescriptor) -> Vec<Strategy> {
		let catalog = match kind {
			StrategyKind::Export => &self.exports,
			StrategyKind::Wrapper => &self.wrappers,
			StrategyKind::Decorator => &self.decorators,
		};
		catalog
			.get(ty)
			.map(|collection| collection.strategies().to_vec())
			.unwrap_or_default()
	}

	/// Resolves and activates `(ty, key)` with a fresh ambient context.
	///
	/// Returns `Ok(None)` when no strategy can produce the type.
	pub fn locate(&self, ty: &TypeDescriptor, key: Option<&LookupKey>) -> Result<Option<Instance>> {
		let Some(delegate) = self.compiler.find_delegate(self, ty, key)? else {
			return Ok(None);
		};
		delegate.invoke(self, &self.disposal, None).map(Some)
	}

	/// Resolves `T` by its type name and downcasts the instance.
	pub fn locate_as<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
		let ty = TypeDescriptor::of::<T>();
		let Some(instance) = self.locate(&ty, None)? else {
			return Ok(None);
		};
		instance
			.downcast::<T>()
			.map(Some)
			.map_err(|_| ActivationError::TypeMismatch {
				expected: type_name::<T>(),
				context: format!("instance located for {ty}"),
			})
	}
}

impl fmt::Debug for InjectionScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InjectionScope")
			.field("name", &self.name)
			.field("exports", &self.exports.len())
			.field("wrappers", &self.wrappers.len())
			.field("decorators", &self.decorators.len())
			.field("providers", &self.providers.read().len())
			.field("cached_delegates", &self.delegates.len())
			.finish()
	}
}

/// Configures and builds an [`InjectionScope`].
pub struct ScopeBuilder {
	name: Arc<str>,
	config: ScopeConfiguration,
	plan_builder: Arc<dyn PlanBuilder>,
	context_creator: Arc<dyn InjectionContextCreator>,
	locks: Option<ScopeLocks>,
	providers: Vec<Arc<dyn MissingStrategyProvider>>,
}

impl ScopeBuilder {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self {
			name: name.into(),
			config: ScopeConfiguration::default(),
			plan_builder: Arc::new(DefaultPlanBuilder),
			context_creator: Arc::new(DefaultInjectionContextCreator),
			locks: None,
			providers: Vec::new(),
		}
	}

	pub fn config(mut self, config: ScopeConfiguration) -> Self {
		self.config = config;
		self
	}

	pub fn plan_builder(mut self, builder: Arc<dyn PlanBuilder>) -> Self {
		self.plan_builder = builder;
		self
	}

	pub fn context_creator(mut self, creator: Arc<dyn InjectionContextCreator>) -> Self {
		self.context_creator = creator;
		self
	}

	/// Shares an existing lock table, typically a parent scope's.
	pub fn locks(mut self, locks: ScopeLocks) -> Self {
		self.locks = Some(locks);
		self
	}

	/// Appends a provider consulted after any built-in one.
	pub fn provider(mut self, provider: Arc<dyn MissingStrategyProvider>) -> Self {
		self.providers.push(provider);
		self
	}

	pub fn build(self) -> Result<InjectionScope, ConfigError> {
		self.config.validate()?;

		let config = Arc::new(self.config);
		let mut providers: Vec<Arc<dyn MissingStrategyProvider>> = Vec::new();
		if config.auto_register_unknown {
			providers.push(Arc::new(ConcreteStrategyProvider::from_inventory()));
		}
		providers.extend(self.providers);

		let catalog_size = config.catalog_size;
		let scope = InjectionScope {
			id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
			exports: StrategyCatalog::new(StrategyKind::Export, catalog_size),
			wrappers: StrategyCatalog::new(StrategyKind::Wrapper, catalog_size),
			decorators: StrategyCatalog::new(StrategyKind::Decorator, catalog_size),
			providers: RwLock::new(providers),
			locks: self.locks.unwrap_or_default(),
			delegates: DelegateCache::new(config.cache_size),
			compiler: ActivationStrategyCompiler::new(
				Arc::clone(&config),
				self.plan_builder,
				self.context_creator,
			),
			disposal: RootDisposalScope::new(),
			config,
			name: self.name,
		};

		tracing::debug!(
			scope = %scope.name,
			max_depth = scope.config.max_object_graph_depth(),
			auto_register = scope.config.auto_register_unknown,
			"built injection scope",
		);
		Ok(scope)
	}
}
