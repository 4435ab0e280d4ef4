//! Plan building.
//!
//! # Role
//!
//! Turns a chosen strategy plus a request into a [`ConstructionPlan`]. Nested
//! dependencies are located through the scope's compiler (escalating to
//! missing-strategy providers when needed) and their plans are inlined. A
//! request repeating one of its ancestors is rejected as a cycle before its
//! plan is built, so cycles cost time linear in the chain length.
//!
//! # Invariants
//!
//! - Plan building never recurses past the configured depth ceiling.
//!   - Enforced in: [`DefaultPlanBuilder::build_plan`], `DefaultPlanBuilder::build_collection_plan`.
//!   - Tested by: `compiler::tests::deep_acyclic_graph_hits_depth_ceiling`
//!   - Failure symptom: stack overflow on a pathologically deep registration.
//!
//! - A request repeating an ancestor's (type, key) fails before planning.
//!   - Enforced in: [`DefaultPlanBuilder::build_plan`] via [`ActivationRequest::check_cycle`].
//!   - Tested by: `compiler::tests::dependency_cycle_reports_resolution_chain`, `compiler::tests::fan_out_cycle_fails_fast`
//!   - Failure symptom: exponential plan growth before the depth ceiling trips.
//!
//! - Builders never add strategies to catalogs themselves.
//!   - Enforced in: `DefaultPlanBuilder` (catalog access is read-only; escalation goes through the compiler).
//!   - Tested by: `compiler::tests::nested_dependency_escalates_through_provider`
//!   - Failure symptom: catalog mutation outside the scope lock.

use crate::descriptor::TypeDescriptor;
use crate::error::{ActivationError, Result};
use crate::plan::{ConstructionPlan, PlanNode};
use crate::request::{ActivationRequest, RequestKind};
use crate::scope::InjectionScope;
use crate::strategy::{Activation, Dependency, Strategy, StrategyKind, StrategySource};

/// Produces construction plans for the compiler.
///
/// Must be deterministic for a given strategy and request shape.
pub trait PlanBuilder: Send + Sync {
	/// Builds the plan for `strategy` serving `request`.
	fn build_plan(
		&self,
		scope: &InjectionScope,
		strategy: &Strategy,
		request: ActivationRequest,
	) -> Result<ConstructionPlan>;

	/// Builds the plan for a request that has no pre-selected strategy, such as
	/// an array or sequence request.
	fn build_request_plan(
		&self,
		scope: &InjectionScope,
		request: ActivationRequest,
	) -> Result<ConstructionPlan>;
}

/// Builder covering constructor dependencies, member injection, method
/// invocation, decorators and collection requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlanBuilder;

impl PlanBuilder for DefaultPlanBuilder {
	fn build_plan(
		&self,
		scope: &InjectionScope,
		strategy: &Strategy,
		request: ActivationRequest,
	) -> Result<ConstructionPlan> {
		request.check_depth(scope.compiler().max_object_graph_depth())?;
		request.check_cycle()?;

		let ty = request.activation_type().clone();
		let mut plan = ConstructionPlan::new(request);

		let node = match strategy.source() {
			StrategySource::Instance(instance) => PlanNode::Constant(instance.clone()),
			StrategySource::Activation(activation) => {
				self.activation_node(scope, &mut plan, &ty, activation)?
			}
			StrategySource::Template(specialize) => {
				let activation = specialize(&ty)?;
				self.activation_node(scope, &mut plan, &ty, &activation)?
			}
			StrategySource::Decorate(_) => {
				return Err(ActivationError::malformed(
					&ty,
					format!("decorator {} cannot serve a request directly", strategy.name()),
				));
			}
		};

		let node = match strategy.kind() {
			StrategyKind::Export => self.decorate(scope, &plan, node)?,
			StrategyKind::Wrapper | StrategyKind::Decorator => node,
		};
		plan.set_value(node);
		Ok(plan)
	}

	fn build_request_plan(
		&self,
		scope: &InjectionScope,
		request: ActivationRequest,
	) -> Result<ConstructionPlan> {
		if request.activation_type().is_collection() {
			return match scope.compiler().locate_strategy(scope, &request) {
				Some(strategy) => self.build_plan(scope, &strategy, request),
				None => self.build_collection_plan(scope, request),
			};
		}
		match scope.compiler().find_strategy(scope, &request)? {
			Some(strategy) => self.build_plan(scope, &strategy, request),
			None => Err(ActivationError::MissingDependency {
				ty: request.activation_type().clone(),
				chain: request.resolution_chain(),
			}),
		}
	}
}

impl DefaultPlanBuilder {
	fn activation_node(
		&self,
		scope: &InjectionScope,
		plan: &mut ConstructionPlan,
		ty: &TypeDescriptor,
		activation: &Activation,
	) -> Result<PlanNode> {
		let args = activation
			.dependencies()
			.iter()
			.map(|dep| self.dependency_node(scope, plan, dep, RequestKind::ConstructorParameter))
			.collect::<Result<Vec<_>>>()?;

		let mut node = PlanNode::Instantiate {
			ty: ty.clone(),
			constructor: activation.constructor().clone(),
			args,
		};

		if !activation.members().is_empty() {
			let members = activation
				.members()
				.iter()
				.map(|injection| -> Result<_> {
					let value =
						self.dependency_node(scope, plan, &injection.dependency, RequestKind::Member)?;
					Ok((injection.member.clone(), value))
				})
				.collect::<Result<Vec<_>>>()?;
			node = PlanNode::AssignMembers {
				ty: ty.clone(),
				target: Box::new(node),
				members,
			};
		}

		for injection in activation.methods() {
			let args = injection
				.dependencies
				.iter()
				.map(|dep| self.dependency_node(scope, plan, dep, RequestKind::MethodParameter))
				.collect::<Result<Vec<_>>>()?;
			node = PlanNode::InvokeMethod {
				ty: ty.clone(),
				target: Box::new(node),
				method: injection.method.clone(),
				args,
			};
		}

		if activation.is_disposable() {
			node = PlanNode::TrackDisposal(Box::new(node));
		}
		Ok(node)
	}

	fn dependency_node(
		&self,
		scope: &InjectionScope,
		plan: &mut ConstructionPlan,
		dependency: &Dependency,
		kind: RequestKind,
	) -> Result<PlanNode> {
		let request = match dependency {
			Dependency::ContextValue(name) => {
				plan.request().require_injection_context();
				return Ok(PlanNode::ContextValue { name: name.clone() });
			}
			Dependency::InjectionContext => {
				plan.request().require_injection_context();
				return Ok(PlanNode::InjectionContext);
			}
			Dependency::Service(ty) => plan.request().child(ty.clone(), kind),
			Dependency::Keyed(ty, key) => plan
				.request()
				.child(ty.clone(), kind)
				.with_key(Some(key.clone())),
		};
		let child = self.build_request_plan(scope, request)?;
		Ok(plan.absorb(child))
	}

	/// Wraps an export node with every satisfied decorator registered for its
	/// type, first registered innermost.
	fn decorate(
		&self,
		scope: &InjectionScope,
		plan: &ConstructionPlan,
		mut node: PlanNode,
	) -> Result<PlanNode> {
		let request = plan.request();
		let ty = request.activation_type();
		let context = request.static_context();

		for lookup in std::iter::once(ty.clone()).chain(ty.open_template()) {
			let Some(collection) = scope.decorators().get(&lookup) else {
				continue;
			};
			for decorator in collection.satisfied(&context) {
				let StrategySource::Decorate(wrap) = decorator.source() else {
					return Err(ActivationError::malformed(
						ty,
						format!("decorator {} has no decorate source", decorator.name()),
					));
				};
				node = PlanNode::Wrap {
					ty: ty.clone(),
					wrap: wrap.clone(),
					inner: Box::new(node),
				};
			}
		}
		Ok(node)
	}

	fn build_collection_plan(
		&self,
		scope: &InjectionScope,
		request: ActivationRequest,
	) -> Result<ConstructionPlan> {
		request.check_depth(scope.compiler().max_object_graph_depth())?;
		request.check_cycle()?;

		let ty = request.activation_type().clone();
		let Some(element) = ty.element().cloned() else {
			return Err(ActivationError::malformed(&ty, "not an array or sequence"));
		};

		let mut plan = ConstructionPlan::new(request);
		let element_request = plan
			.request()
			.child(element.clone(), RequestKind::CollectionElement);
		let candidates = collection_candidates(scope, &element_request);

		let mut elements = Vec::with_capacity(candidates.len());
		for strategy in candidates {
			let child = self.build_plan(scope, &strategy, element_request.clone())?;
			elements.push(plan.absorb(child));
		}

		tracing::trace!(
			ty = %ty,
			count = elements.len(),
			"built collection plan",
		);
		plan.set_value(PlanNode::Collection { element, elements });
		Ok(plan)
	}
}

/// Export strategies contributing elements to a collection request.
///
/// Every satisfied exact export comes first, followed by satisfied exports of
/// the element's open template. Keyed exports never contribute.
fn collection_candidates(scope: &InjectionScope, element_request: &ActivationRequest) -> Vec<Strategy> {
	let element = element_request.activation_type();
	let exports = scope.exports();

	let context = element_request.static_context();
	std::iter::once(element.clone())
		.chain(element.open_template())
		.filter_map(|lookup| exports.get(&lookup))
		.flat_map(|collection| collection.satisfied(&context).cloned().collect::<Vec<_>>())
		.collect()
}
