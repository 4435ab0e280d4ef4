//! Activation strategies.
//!
//! # Role
//!
//! A [`Strategy`] is a registered recipe for one or more type descriptors. The
//! three variants share one definition record ([`StrategyDef`]); the variant
//! only decides which catalog owns the strategy.
//!
//! # Invariants
//!
//! - A strategy compiles at most one published delegate per requested descriptor.
//!   - Enforced in: [`StrategyDef::activation_delegate`] (compare-and-swap publication).
//!   - Tested by: `strategy::tests::concurrent_compilation_publishes_one_delegate`
//!   - Failure symptom: two threads observe different delegates for the same type.
//!
//! - A cached delegate is reused only while the scope's catalogs are unchanged.
//!   - Enforced in: [`StrategyDef::activation_delegate`] (entries carry a [`CatalogStamp`]).
//!   - Tested by: `strategy::tests::catalog_change_recompiles_cached_delegate`
//!   - Failure symptom: decorators or nested primaries registered later are ignored.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::compiler::ActivationStrategyCompiler;
use crate::delegate::ActivationDelegate;
use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::error::Result;
use crate::request::{ActivationRequest, StaticInjectionContext};
use crate::scope::{CatalogStamp, InjectionScope};

mod condition;
mod recipe;


pub use condition::{Condition, WhenDepthAtMost, WhenInjectedInto};
pub use recipe::{
	Activation, Args, ConstructFn, Dependency, MemberInjection, MemberRef, MethodInjection,
	MethodRef, StrategySource, TemplateFn, WrapFn,
};

static NEXT_STRATEGY_ID: AtomicU64 = AtomicU64::new(1);

/// Which catalog a strategy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
	Export,
	Wrapper,
	Decorator,
}

impl fmt::Display for StrategyKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Export => write!(f, "export"),
			Self::Wrapper => write!(f, "wrapper"),
			Self::Decorator => write!(f, "decorator"),
		}
	}
}

/// A registered strategy, tagged by variant.
#[derive(Clone)]
pub enum Strategy {
	Export(Arc<StrategyDef>),
	Wrapper(Arc<StrategyDef>),
	Decorator(Arc<StrategyDef>),
}

impl Strategy {
	pub fn kind(&self) -> StrategyKind {
		match self {
			Self::Export(_) => StrategyKind::Export,
			Self::Wrapper(_) => StrategyKind::Wrapper,
			Self::Decorator(_) => StrategyKind::Decorator,
		}
	}

	pub fn def(&self) -> &Arc<StrategyDef> {
		match self {
			Self::Export(def) | Self::Wrapper(def) | Self::Decorator(def) => def,
		}
	}

	/// Returns true if both handles refer to the same registered strategy.
	pub fn ptr_eq(a: &Self, b: &Self) -> bool {
		Arc::ptr_eq(a.def(), b.def())
	}

	/// Returns the delegate for `request`, compiling and caching it on first use.
	pub fn activation_delegate(
		&self,
		scope: &InjectionScope,
		compiler: &ActivationStrategyCompiler,
		request: &ActivationRequest,
	) -> Result<ActivationDelegate> {
		self.def().activation_delegate(self, scope, compiler, request)
	}
}

impl Deref for Strategy {
	type Target = StrategyDef;

	fn deref(&self) -> &StrategyDef {
		self.def()
	}
}

impl fmt::Debug for Strategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Strategy")
			.field("kind", &self.kind())
			.field("id", &self.id())
			.field("name", &self.name())
			.finish()
	}
}

/// Definition shared by every strategy variant.
pub struct StrategyDef {
	id: u64,
	name: Arc<str>,
	export_types: SmallVec<[TypeDescriptor; 1]>,
	keyed_exports: Vec<(TypeDescriptor, LookupKey)>,
	primary: bool,
	conditions: Vec<Arc<dyn Condition>>,
	source: StrategySource,
	/// Delegates compiled so far, by requested descriptor.
	delegates: ArcSwap<FxHashMap<TypeDescriptor, CachedDelegate>>,
}

#[derive(Clone)]
struct CachedDelegate {
	stamp: CatalogStamp,
	delegate: ActivationDelegate,
}

impl StrategyDef {
	/// Process-unique identifier assigned at construction.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Descriptors served to unkeyed requests.
	pub fn export_types(&self) -> &[TypeDescriptor] {
		&self.export_types
	}

	/// (descriptor, key) pairs served only to keyed requests.
	pub fn keyed_exports(&self) -> &[(TypeDescriptor, LookupKey)] {
		&self.keyed_exports
	}

	pub fn is_primary(&self) -> bool {
		self.primary
	}

	pub fn has_conditions(&self) -> bool {
		!self.conditions.is_empty()
	}

	pub fn conditions(&self) -> &[Arc<dyn Condition>] {
		&self.conditions
	}

	pub fn source(&self) -> &StrategySource {
		&self.source
	}

	/// Returns true when every condition holds for `context`.
	pub fn meets_conditions(&self, context: &StaticInjectionContext) -> bool {
		self.conditions
			.iter()
			.all(|condition| condition.is_satisfied(self, context))
	}

	/// Returns the most recently published delegate for `ty`, if any.
	pub fn cached_delegate(&self, ty: &TypeDescriptor) -> Option<ActivationDelegate> {
		self.delegates.load().get(ty).map(|entry| entry.delegate.clone())
	}

	/// Returns the delegate for `ty` compiled against exactly `stamp`.
	fn current_delegate(&self, ty: &TypeDescriptor, stamp: CatalogStamp) -> Option<ActivationDelegate> {
		self.delegates
			.load()
			.get(ty)
			.filter(|entry| entry.stamp == stamp)
			.map(|entry| entry.delegate.clone())
	}

	fn activation_delegate(
		&self,
		strategy: &Strategy,
		scope: &InjectionScope,
		compiler: &ActivationStrategyCompiler,
		request: &ActivationRequest,
	) -> Result<ActivationDelegate> {
		let ty = request.activation_type();
		// Taken before planning so a catalog change mid-build leaves a stale stamp.
		let stamp = scope.catalog_stamp();
		if let Some(delegate) = self.current_delegate(ty, stamp) {
			return Ok(delegate);
		}
		if self.delegates.load().contains_key(ty) {
			tracing::debug!(strategy = %self.name, ty = %ty, "recompiling delegate after catalog change");
		}

		let plan = compiler
			.plan_builder()
			.build_plan(scope, strategy, request.clone())?;
		let compiled = compiler.compile_delegate(scope, plan)?;

		// Compilations racing on one stamp publish once; the first wins.
		self.delegates.rcu(|current| {
			if current.get(ty).is_some_and(|entry| entry.stamp == stamp) {
				Arc::clone(current)
			} else {
				let mut next = FxHashMap::clone(current);
				next.insert(
					ty.clone(),
					CachedDelegate {
						stamp,
						delegate: compiled.clone(),
					},
				);
				Arc::new(next)
			}
		});

		Ok(self.current_delegate(ty, stamp).unwrap_or(compiled))
	}
}

impl fmt::Debug for StrategyDef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StrategyDef")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("export_types", &self.export_types)
			.field("keyed_exports", &self.keyed_exports)
			.field("primary", &self.primary)
			.field("conditions", &self.conditions.len())
			.field("source", &self.source)
			.finish()
	}
}

/// Assembles a [`StrategyDef`] and tags it with a variant.
pub struct StrategyBuilder {
	name: Arc<str>,
	source: StrategySource,
	export_types: SmallVec<[TypeDescriptor; 1]>,
	keyed_exports: Vec<(TypeDescriptor, LookupKey)>,
	primary: bool,
	conditions: Vec<Arc<dyn Condition>>,
}

impl StrategyBuilder {
	pub fn new(name: impl Into<Arc<str>>, source: StrategySource) -> Self {
		Self {
			name: name.into(),
			source,
			export_types: SmallVec::new(),
			keyed_exports: Vec::new(),
			primary: false,
			conditions: Vec::new(),
		}
	}

	/// Serves unkeyed requests for `ty`.
	pub fn export_as(mut self, ty: TypeDescriptor) -> Self {
		self.export_types.push(ty);
		self
	}

	/// Serves requests for `ty` carrying exactly `key`.
	pub fn keyed(mut self, ty: TypeDescriptor, key: impl Into<LookupKey>) -> Self {
		self.keyed_exports.push((ty, key.into()));
		self
	}

	pub fn primary(mut self) -> Self {
		self.primary = true;
		self
	}

	pub fn when(mut self, condition: impl Condition + 'static) -> Self {
		self.conditions.push(Arc::new(condition));
		self
	}

	fn build(self) -> Arc<StrategyDef> {
		Arc::new(StrategyDef {
			id: NEXT_STRATEGY_ID.fetch_add(1, Ordering::Relaxed),
			name: self.name,
			export_types: self.export_types,
			keyed_exports: self.keyed_exports,
			primary: self.primary,
			conditions: self.conditions,
			source: self.source,
			delegates: ArcSwap::from_pointee(FxHashMap::default()),
		})
	}

	pub fn into_export(self) -> Strategy {
		Strategy::Export(self.build())
	}

	pub fn into_wrapper(self) -> Strategy {
		Strategy::Wrapper(self.build())
	}

	pub fn into_decorator(self) -> Strategy {
		Strategy::Decorator(self.build())
	}
}
