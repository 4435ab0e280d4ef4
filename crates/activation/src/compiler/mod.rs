//! Strategy resolution and delegate compilation.
//!
//! # Role
//!
//! [`ActivationStrategyCompiler`] answers "which compiled delegate produces
//! this (type, key)?". It owns the tiered strategy lookup, the lock-guarded
//! escalation to missing-strategy providers and the lowering of construction
//! plans into [`ActivationDelegate`]s.
//!
//! # Mental model
//!
//! ```text
//! find_delegate(ty, key)
//!   scope cache ──hit──▶ done
//!   tiers 1-6 (no lock) ──hit──▶ strategy delegate
//!   array / sequence ──▶ build + compile collection plan
//!   scope lock
//!     tiers 1-6 again ──hit──▶ strategy delegate
//!     providers ──▶ catalogs
//!     tiers 1-6 again ──hit──▶ strategy delegate
//!   None
//! ```
//!
//! # Invariants
//!
//! - A primary export wins over every conditional sibling.
//!   - Enforced in: `StrategyCollection::select`, [`ActivationStrategyCompiler::locate_strategy`].
//!   - Tested by: `compiler::tests::primary_wins_over_conditional_strategies`
//!   - Failure symptom: registration order leaks into which implementation is served.
//!
//! - Unkeyed array and sequence requests never match an export registered for the collection descriptor.
//!   - Enforced in: [`ActivationStrategyCompiler::locate_strategy`] (collection check precedes every unkeyed catalog read).
//!   - Tested by: `compiler::tests::array_request_ignores_export_for_array_descriptor`
//!   - Failure symptom: a hand-registered `[T]` export shadows the synthesized collection.
//!
//! - Keyed lookups match on key equality only and ignore conditions.
//!   - Enforced in: [`ActivationStrategyCompiler::locate_strategy`] (tier 1).
//!   - Tested by: `compiler::tests::keyed_lookup_ignores_conditions`, `compiler::tests::missing_key_is_not_found`
//!   - Failure symptom: keyed requests fall back to unkeyed strategies.
//!
//! - Under contention at most one escalation pass inserts strategies for a missing type.
//!   - Enforced in: [`ActivationStrategyCompiler::find_strategy`] (double-checked scope lock).
//!   - Tested by: `compiler::tests::concurrent_escalation_inserts_once`
//!   - Failure symptom: duplicate auto-registered strategies and collisions in the catalog.
//!
//! - The ambient context is created at most once per top-level delegate call.
//!   - Enforced in: `lower::lower_plan` (`EnsureInjectionContext` only fills an empty slot).
//!   - Tested by: `compiler::tests::context_is_materialized_once_and_shared`
//!   - Failure symptom: nested operations observe different contexts.

use std::sync::Arc;

use crate::catalog::StrategyCatalog;
use crate::config::ScopeConfiguration;
use crate::context::InjectionContextCreator;
use crate::delegate::ActivationDelegate;
use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::error::{ActivationError, Result};
use crate::plan::{ConstructionPlan, PlanBuilder, PlanNode, Statement};
use crate::request::ActivationRequest;
use crate::scope::{ACTIVATION_STRATEGY_ADD_LOCK, InjectionScope};
use crate::strategy::Strategy;

mod lower;

#[cfg(test)]
mod tests;

/// Locates strategies and compiles them into activation delegates.
pub struct ActivationStrategyCompiler {
	config: Arc<ScopeConfiguration>,
	plan_builder: Arc<dyn PlanBuilder>,
	context_creator: Arc<dyn InjectionContextCreator>,
}

impl ActivationStrategyCompiler {
	pub fn new(
		config: Arc<ScopeConfiguration>,
		plan_builder: Arc<dyn PlanBuilder>,
		context_creator: Arc<dyn InjectionContextCreator>,
	) -> Self {
		Self {
			config,
			plan_builder,
			context_creator,
		}
	}

	pub fn plan_builder(&self) -> &dyn PlanBuilder {
		&*self.plan_builder
	}

	pub fn context_creator(&self) -> &Arc<dyn InjectionContextCreator> {
		&self.context_creator
	}

	pub fn max_object_graph_depth(&self) -> usize {
		self.config.max_object_graph_depth()
	}

	/// Creates a top-level request for `ty` at `depth`.
	pub fn create_request(&self, ty: TypeDescriptor, depth: usize) -> ActivationRequest {
		ActivationRequest::root(ty, depth)
	}

	/// Creates a plan for `request` whose value is `node`.
	pub fn create_plan(&self, request: ActivationRequest, node: PlanNode) -> ConstructionPlan {
		let mut plan = ConstructionPlan::new(request);
		plan.set_value(node);
		plan
	}

	/// Returns the delegate for `(ty, key)`, or `None` if no strategy can
	/// produce it even after escalation.
	pub fn find_delegate(
		&self,
		scope: &InjectionScope,
		ty: &TypeDescriptor,
		key: Option<&LookupKey>,
	) -> Result<Option<ActivationDelegate>> {
		let epoch = scope.delegates().epoch();
		if let Some(delegate) = scope.delegates().get(ty, key) {
			tracing::trace!(ty = %ty, ?key, "scope delegate cache hit");
			return Ok(Some(delegate));
		}

		let request = self.create_request(ty.clone(), 1).with_key(key.cloned());

		let delegate = if let Some(strategy) = self.locate_strategy(scope, &request) {
			tracing::trace!(ty = %ty, strategy = strategy.name(), "fast path hit");
			strategy.activation_delegate(scope, self, &request)?
		} else if ty.is_collection() {
			// A keyed collection that missed tier 1 falls back to every unkeyed element.
			let plan = self.plan_builder.build_request_plan(scope, request)?;
			self.compile_delegate(scope, plan)?
		} else {
			match self.find_strategy_locked(scope, &request)? {
				Some(strategy) => strategy.activation_delegate(scope, self, &request)?,
				None => {
					tracing::debug!(ty = %ty, ?key, "no strategy after escalation");
					return Ok(None);
				}
			}
		};

		scope.delegates().insert(epoch, ty, key, delegate.clone());
		Ok(Some(delegate))
	}

	/// Runs the lookup tiers for `request` without taking any lock.
	///
	/// 1. Keyed request: the export keyed under exactly that key, conditions ignored.
	/// 2. Unkeyed array or sequence: nothing here, the enumerable path serves it.
	/// 3. Exports for the exact descriptor.
	/// 4. Exports for the open template of a constructed generic.
	/// 5. Wrappers for the exact descriptor.
	/// 6. Wrappers for the open template.
	///
	/// Tiers 3 to 6 take the primary if there is one, else the first strategy in
	/// registration order whose conditions all hold.
	pub fn locate_strategy(
		&self,
		scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Option<Strategy> {
		let ty = request.activation_type();
		if let Some(key) = request.key() {
			return scope
				.exports()
				.get(ty)
				.and_then(|collection| collection.keyed(key).cloned());
		}

		if ty.is_collection() {
			return None;
		}

		let context = request.static_context();
		let template = ty.open_template();
		let select = |catalog: &StrategyCatalog, lookup: &TypeDescriptor| {
			catalog
				.get(lookup)
				.and_then(|collection| collection.select(&context).cloned())
		};

		select(scope.exports(), ty)
			.or_else(|| template.as_ref().and_then(|open| select(scope.exports(), open)))
			.or_else(|| select(scope.wrappers(), ty))
			.or_else(|| template.as_ref().and_then(|open| select(scope.wrappers(), open)))
	}

	/// Locates a strategy, escalating to missing-strategy providers on a miss.
	pub fn find_strategy(
		&self,
		scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<Option<Strategy>> {
		if let Some(strategy) = self.locate_strategy(scope, request) {
			return Ok(Some(strategy));
		}
		if request.activation_type().is_collection() {
			return Ok(None);
		}
		self.find_strategy_locked(scope, request)
	}

	fn find_strategy_locked(
		&self,
		scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<Option<Strategy>> {
		let lock = scope.lock_object(ACTIVATION_STRATEGY_ADD_LOCK);
		let _guard = lock.lock();

		if let Some(strategy) = self.locate_strategy(scope, request) {
			tracing::trace!(
				ty = %request.activation_type(),
				"strategy registered while waiting for scope lock",
			);
			return Ok(Some(strategy));
		}

		self.process_missing_strategy_providers(scope, request)?;
		Ok(self.locate_strategy(scope, request))
	}

	/// Asks every missing-strategy provider for strategies serving `request`
	/// and adds them to the matching catalogs.
	///
	/// Returns the number of strategies added. Callers hold the scope's
	/// strategy-mutation lock.
	pub fn process_missing_strategy_providers(
		&self,
		scope: &InjectionScope,
		request: &ActivationRequest,
	) -> Result<usize> {
		let mut added = 0;
		for provider in scope.missing_strategy_providers() {
			let strategies = provider
				.provide_strategies(scope, request)
				.map_err(|source| ActivationError::Provider {
					provider: provider.name().to_owned(),
					source,
				})?;
			for strategy in strategies {
				scope.add_strategy(strategy);
				added += 1;
			}
		}

		tracing::debug!(
			scope = scope.name(),
			ty = %request.activation_type(),
			added,
			"escalated to missing-strategy providers",
		);
		Ok(added)
	}

	/// Lowers a finished plan into a delegate.
	///
	/// Prepends injection-context materialization when the plan's request
	/// requires it.
	pub fn compile_delegate(
		&self,
		scope: &InjectionScope,
		mut plan: ConstructionPlan,
	) -> Result<ActivationDelegate> {
		if plan.request().injection_context_required() {
			let target = plan.request().activation_type().clone();
			plan.prepend_statement(Statement::EnsureInjectionContext { target });
		}

		let delegate = lower::lower_plan(plan, Arc::clone(&self.context_creator))?;
		tracing::debug!(
			scope = scope.name(),
			ty = %delegate.activation_type(),
			"compiled activation delegate",
		);
		Ok(delegate)
	}
}
