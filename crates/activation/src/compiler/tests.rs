use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::config::{CompilationBehaviors, ScopeConfiguration};
use crate::context::{InjectionContext, InjectionContextCreator};
use crate::delegate::{Boxed, Instance};
use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::error::{ActivationError, BoxError};
use crate::plan::{ConstructionPlan, PlanNode, Statement};
use crate::request::StaticInjectionContext;
use crate::scope::{DisposalScope, InjectionScope, ScopeBuilder};
use crate::strategy::{
	Activation, Args, ConstructFn, Dependency, MemberRef, MethodRef, StrategyBuilder, StrategyDef,
	StrategySource, WhenInjectedInto,
};
use crate::test_fixtures::{
	CountingProvider, Widget, builder, config, export, label_of, never, scope, widget_ty,
};

fn locate_label(scope: &InjectionScope, ty: &TypeDescriptor, key: Option<&LookupKey>) -> Option<String> {
	scope
		.locate(ty, key)
		.expect("resolution succeeds")
		.map(|instance| label_of(&instance))
}

fn scope_with(provider: Arc<CountingProvider>) -> InjectionScope {
	ScopeBuilder::new("escalation")
		.config(config())
		.provider(provider)
		.build()
		.expect("valid config")
}

fn elements(instance: Instance) -> Vec<Instance> {
	instance
		.downcast::<Vec<Instance>>()
		.expect("collection value")
		.to_vec()
}

#[test]
fn primary_wins_over_conditional_strategies() {
	let scope = scope();
	scope.add_strategy(export("A", widget_ty()).when(never()).into_export());
	scope.add_strategy(export("B", widget_ty()).primary().into_export());
	scope.add_strategy(export("C", widget_ty()).into_export());

	assert_eq!(locate_label(&scope, &widget_ty(), None).as_deref(), Some("B"));
}

#[test]
fn first_satisfied_conditional_wins() {
	let scope = scope();
	scope.add_strategy(export("never", widget_ty()).when(never()).into_export());
	scope.add_strategy(export("plain", widget_ty()).into_export());
	scope.add_strategy(export("later", widget_ty()).into_export());

	assert_eq!(locate_label(&scope, &widget_ty(), None).as_deref(), Some("plain"));
}

#[test]
fn all_conditions_failing_is_not_found() {
	let scope = scope();
	scope.add_strategy(export("never", widget_ty()).when(never()).into_export());

	assert!(scope.locate(&widget_ty(), None).expect("no error").is_none());
}

#[derive(Debug)]
struct Service {
	widget: Arc<Widget>,
}

fn service_ty() -> TypeDescriptor {
	TypeDescriptor::named("Service")
}

fn service_activation() -> Activation {
	Activation::new(|args| {
		Ok(Service {
			widget: args.get::<Widget>(0)?,
		})
	})
	.depends_on(widget_ty())
}

#[test]
fn injected_into_condition_sees_parent_type() {
	let scope = scope();
	scope.add_strategy(
		export("for-service", widget_ty())
			.when(WhenInjectedInto(service_ty()))
			.into_export(),
	);
	scope.add_strategy(export("fallback", widget_ty()).into_export());
	scope.add_strategy(
		StrategyBuilder::new("service", StrategySource::Activation(service_activation()))
			.export_as(service_ty())
			.into_export(),
	);

	assert_eq!(locate_label(&scope, &widget_ty(), None).as_deref(), Some("fallback"));

	let service = scope
		.locate(&service_ty(), None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Service>()
		.expect("service");
	assert_eq!(service.widget.label, "for-service");
}

#[test]
fn keyed_lookup_ignores_conditions() {
	let scope = scope();
	scope.add_strategy(builder("blue").keyed(widget_ty(), "blue").when(never()).into_export());
	scope.add_strategy(export("plain", widget_ty()).into_export());

	let key = LookupKey::from("blue");
	assert_eq!(locate_label(&scope, &widget_ty(), Some(&key)).as_deref(), Some("blue"));
	assert_eq!(locate_label(&scope, &widget_ty(), None).as_deref(), Some("plain"));
}

proptest! {
	/// Keyed resolution returns the keyed export whatever its conditions say.
	#[test]
	fn keyed_resolution_ignores_any_condition(blocked in any::<bool>(), siblings in 0usize..4) {
		let scope = scope();
		for i in 0..siblings {
			scope.add_strategy(export(&format!("s{i}"), widget_ty()).into_export());
		}
		let keyed = builder("keyed").keyed(widget_ty(), 7_i64);
		let keyed = if blocked { keyed.when(never()) } else { keyed };
		scope.add_strategy(keyed.into_export());

		let key = LookupKey::Index(7);
		prop_assert_eq!(locate_label(&scope, &widget_ty(), Some(&key)), Some("keyed".to_owned()));
	}
}

#[test]
fn missing_key_is_not_found() {
	let scope = scope();
	scope.add_strategy(export("plain", widget_ty()).primary().into_export());

	let key = LookupKey::from("red");
	let found = scope
		.compiler()
		.find_delegate(&scope, &widget_ty(), Some(&key))
		.expect("no error");
	assert!(found.is_none());
}

#[test]
fn keyed_dependency_resolves_by_key() {
	let scope = scope();
	scope.add_strategy(export("plain", widget_ty()).into_export());
	scope.add_strategy(builder("blue").keyed(widget_ty(), 1_i64).into_export());
	scope.add_strategy(
		StrategyBuilder::new(
			"service",
			StrategySource::Activation(
				Activation::new(|args| {
					Ok(Service {
						widget: args.get::<Widget>(0)?,
					})
				})
				.depends_on(Dependency::Keyed(widget_ty(), LookupKey::Index(1))),
			),
		)
		.export_as(service_ty())
		.into_export(),
	);

	let service = scope
		.locate(&service_ty(), None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Service>()
		.expect("service");
	assert_eq!(service.widget.label, "blue");
}

#[test]
fn array_request_ignores_export_for_array_descriptor() {
	let scope = scope();
	let array = TypeDescriptor::array(widget_ty());
	scope.add_strategy(export("shadow", array.clone()).into_export());
	scope.add_strategy(export("a", widget_ty()).into_export());
	scope.add_strategy(export("skipped", widget_ty()).when(never()).into_export());
	scope.add_strategy(export("b", widget_ty()).into_export());

	let instance = scope.locate(&array, None).expect("resolves").expect("collection");
	let labels: Vec<String> = elements(instance).iter().map(label_of).collect();
	assert_eq!(labels, vec!["a".to_owned(), "b".to_owned()]);

	let seq = TypeDescriptor::sequence(widget_ty());
	let instance = scope.locate(&seq, None).expect("resolves").expect("collection");
	assert_eq!(elements(instance).len(), 2);
}

#[test]
fn empty_collection_is_found_not_missing() {
	let scope = scope();
	let array = TypeDescriptor::array(widget_ty());
	let instance = scope.locate(&array, None).expect("resolves").expect("collection");
	assert!(elements(instance).is_empty());
}

#[test]
fn keyed_collection_falls_back_to_unkeyed_elements() {
	let scope = scope();
	scope.add_strategy(export("plain", widget_ty()).into_export());
	scope.add_strategy(export("other", widget_ty()).into_export());
	scope.add_strategy(builder("blue").keyed(widget_ty(), "blue").into_export());

	let key = LookupKey::from("blue");
	let instance = scope
		.locate(&TypeDescriptor::array(widget_ty()), Some(&key))
		.expect("resolves")
		.expect("collection");
	let labels: Vec<String> = elements(instance).iter().map(label_of).collect();
	assert_eq!(labels, vec!["plain".to_owned(), "other".to_owned()]);
}

#[test]
fn keyed_collection_prefers_keyed_collection_export() {
	let scope = scope();
	let array = TypeDescriptor::array(widget_ty());
	scope.add_strategy(export("plain", widget_ty()).into_export());
	scope.add_strategy(builder("fixed").keyed(array.clone(), "fixed").into_export());

	let key = LookupKey::from("fixed");
	assert_eq!(locate_label(&scope, &array, Some(&key)).as_deref(), Some("fixed"));

	let other = LookupKey::from("other");
	let instance = scope.locate(&array, Some(&other)).expect("resolves").expect("collection");
	assert_eq!(elements(instance).len(), 1);
}

#[derive(Debug)]
struct Repository {
	entity: String,
}

fn repository_template(label: &'static str) -> StrategySource {
	StrategySource::template(move |ty: &TypeDescriptor| {
		let entity = ty
			.generic_args()
			.first()
			.map(|arg| format!("{label}:{arg}"))
			.ok_or_else(|| ActivationError::malformed(ty, "missing entity argument"))?;
		Ok(Activation::new(move |_| {
			Ok(Repository {
				entity: entity.clone(),
			})
		}))
	})
}

fn locate_repository(scope: &InjectionScope, ty: &TypeDescriptor) -> String {
	scope
		.locate(ty, None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Repository>()
		.expect("repository")
		.entity
		.clone()
}

#[test]
fn generic_fallback_specializes_template() {
	let scope = scope();
	scope.add_strategy(
		StrategyBuilder::new("repo", repository_template("template"))
			.export_as(TypeDescriptor::open("Repository", 1))
			.into_export(),
	);

	let orders = TypeDescriptor::generic("Repository", [TypeDescriptor::named("Order")]);
	assert_eq!(locate_repository(&scope, &orders), "template:Order");

	let users = TypeDescriptor::generic("Repository", [TypeDescriptor::named("User")]);
	assert_eq!(locate_repository(&scope, &users), "template:User");
}

#[test]
fn exact_generic_registration_beats_template() {
	let scope = scope();
	let orders = TypeDescriptor::generic("Repository", [TypeDescriptor::named("Order")]);
	scope.add_strategy(
		StrategyBuilder::new("repo", repository_template("template"))
			.export_as(TypeDescriptor::open("Repository", 1))
			.primary()
			.into_export(),
	);
	scope.add_strategy(
		StrategyBuilder::new("exact", repository_template("exact"))
			.export_as(orders.clone())
			.into_export(),
	);

	assert_eq!(locate_repository(&scope, &orders), "exact:Order");
}

#[derive(Debug)]
struct Owned(Arc<Widget>);

fn owned_wrapper(name: &str) -> StrategyBuilder {
	StrategyBuilder::new(
		name,
		StrategySource::template(|ty: &TypeDescriptor| {
			let inner = ty
				.generic_args()
				.first()
				.cloned()
				.ok_or_else(|| ActivationError::malformed(ty, "missing wrapped type"))?;
			Ok(Activation::new(|args| Ok(Owned(args.get::<Widget>(0)?))).depends_on(inner))
		}),
	)
	.export_as(TypeDescriptor::open("Owned", 1))
}

#[test]
fn wrapper_template_tier_serves_generic_request() {
	let scope = scope();
	scope.add_strategy(export("inner", widget_ty()).into_export());
	scope.add_strategy(owned_wrapper("owned").into_wrapper());

	let ty = TypeDescriptor::generic("Owned", [widget_ty()]);
	let owned = scope
		.locate(&ty, None)
		.expect("resolves")
		.expect("wrapper found")
		.downcast::<Owned>()
		.expect("owned");
	assert_eq!(owned.0.label, "inner");
}

#[test]
fn wrapper_tier_scans_wrapper_collection_conditions() {
	let scope = scope();
	let ty = TypeDescriptor::named("Lazy");
	scope.add_strategy(export("blocked", ty.clone()).when(never()).into_wrapper());
	scope.add_strategy(export("open", ty.clone()).into_wrapper());

	assert_eq!(locate_label(&scope, &ty, None).as_deref(), Some("open"));
}

#[test]
fn exports_take_precedence_over_wrappers() {
	let scope = scope();
	scope.add_strategy(export("wrapper", widget_ty()).primary().into_wrapper());
	scope.add_strategy(export("export", widget_ty()).into_export());

	assert_eq!(locate_label(&scope, &widget_ty(), None).as_deref(), Some("export"));
}

#[test]
fn escalation_runs_once_then_fast_path() {
	let logger = TypeDescriptor::named("Logger");
	let provider = Arc::new(CountingProvider::new(logger.clone(), "auto"));
	let scope = scope_with(Arc::clone(&provider));

	assert_eq!(locate_label(&scope, &logger, None).as_deref(), Some("auto"));
	assert_eq!(provider.calls(), 1);
	assert_eq!(scope.exports().len(), 1);

	assert_eq!(locate_label(&scope, &logger, None).as_deref(), Some("auto"));
	assert_eq!(provider.calls(), 1, "second resolution must not escalate");
}

#[test]
fn unserved_escalation_reports_none_each_attempt() {
	let provider = Arc::new(CountingProvider::new(TypeDescriptor::named("Other"), "x"));
	let scope = scope_with(Arc::clone(&provider));

	for attempt in 1..=2 {
		let found = scope
			.compiler()
			.find_delegate(&scope, &TypeDescriptor::named("Logger"), None)
			.expect("no error");
		assert!(found.is_none());
		assert_eq!(provider.calls(), attempt);
	}
}

#[test]
fn concurrent_escalation_inserts_once() {
	const THREADS: usize = 8;

	let logger = TypeDescriptor::named("Logger");
	let mut provider = CountingProvider::new(logger.clone(), "auto");
	provider.delay = Some(Duration::from_millis(20));
	let provider = Arc::new(provider);
	let scope = scope_with(Arc::clone(&provider));
	let barrier = Barrier::new(THREADS);

	let found: Vec<bool> = thread::scope(|s| {
		let handles: Vec<_> = (0..THREADS)
			.map(|_| {
				s.spawn(|| {
					barrier.wait();
					scope
						.compiler()
						.find_delegate(&scope, &logger, None)
						.expect("no error")
						.is_some()
				})
			})
			.collect();
		handles
			.into_iter()
			.map(|h| h.join().expect("thread panicked"))
			.collect()
	});

	assert!(found.iter().all(|f| *f));
	assert_eq!(provider.calls(), 1);
	assert_eq!(scope.exports().len(), 1);
	assert!(scope.exports().snapshot().collisions().is_empty());
}

#[test]
fn nested_dependency_escalates_through_provider() {
	let provider = Arc::new(CountingProvider::new(widget_ty(), "auto-widget"));
	let scope = scope_with(Arc::clone(&provider));
	scope.add_strategy(
		StrategyBuilder::new("service", StrategySource::Activation(service_activation()))
			.export_as(service_ty())
			.into_export(),
	);

	let service = scope
		.locate(&service_ty(), None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Service>()
		.expect("service");
	assert_eq!(service.widget.label, "auto-widget");
	assert_eq!(provider.calls(), 1);
}

#[test]
fn provider_failure_propagates() {
	let scope = ScopeBuilder::new("failing")
		.config(config())
		.provider(Arc::new(crate::provider::FnProvider::new(
			"offline",
			|_: &InjectionScope,
			 _: &crate::request::ActivationRequest|
			 -> Result<Vec<crate::strategy::Strategy>, BoxError> {
				Err("registry offline".into())
			},
		)))
		.build()
		.expect("valid config");

	let err = scope
		.locate(&TypeDescriptor::named("Logger"), None)
		.expect_err("provider error surfaces");
	match err {
		ActivationError::Provider { provider, source } => {
			assert_eq!(provider, "offline");
			assert_eq!(source.to_string(), "registry offline");
		}
		other => panic!("unexpected error: {other:?}"),
	}
}

fn depending_on(name: &str, ty: &TypeDescriptor, deps: &[TypeDescriptor]) -> crate::strategy::Strategy {
	let activation = deps
		.iter()
		.fold(Activation::new(|_| Ok(0_u8)), |activation, dep| activation.depends_on(dep.clone()));
	StrategyBuilder::new(name, StrategySource::Activation(activation))
		.export_as(ty.clone())
		.into_export()
}

#[test]
fn dependency_cycle_reports_resolution_chain() {
	let scope = scope();
	let a = TypeDescriptor::named("A");
	let b = TypeDescriptor::named("B");
	scope.add_strategy(depending_on("a", &a, &[b.clone()]));
	scope.add_strategy(depending_on("b", &b, &[a.clone()]));

	match scope.locate(&a, None) {
		Err(ActivationError::CircularDependency { chain }) => {
			assert_eq!(chain.types(), &[a.clone(), b.clone(), a.clone()]);
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn fan_out_cycle_fails_fast() {
	let scope = scope();
	let a = TypeDescriptor::named("A");
	let b = TypeDescriptor::named("B");
	scope.add_strategy(depending_on("a", &a, &[b.clone(), b.clone()]));
	scope.add_strategy(depending_on("b", &b, &[a.clone(), a.clone()]));

	let err = scope.locate(&a, None).expect_err("cycle");
	assert!(matches!(err, ActivationError::CircularDependency { .. }));
}

#[test]
fn deep_acyclic_graph_hits_depth_ceiling() {
	let scope = ScopeBuilder::new("deep")
		.config(ScopeConfiguration {
			behaviors: CompilationBehaviors {
				max_object_graph_depth: 4,
			},
			..config()
		})
		.build()
		.expect("valid config");
	let layers: Vec<TypeDescriptor> = (0..8)
		.map(|i| TypeDescriptor::named(format!("L{i}")))
		.collect();
	for pair in layers.windows(2) {
		scope.add_strategy(depending_on("layer", &pair[0], &[pair[1].clone()]));
	}
	scope.add_strategy(depending_on("leaf", &layers[7], &[]));

	match scope.locate(&layers[0], None) {
		Err(ActivationError::RecursionDepthExceeded { max, chain }) => {
			assert_eq!(max, 4);
			assert_eq!(chain.types(), &layers[..5]);
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn missing_dependency_names_the_chain() {
	let scope = scope();
	scope.add_strategy(
		StrategyBuilder::new("service", StrategySource::Activation(service_activation()))
			.export_as(service_ty())
			.into_export(),
	);

	match scope.locate(&service_ty(), None) {
		Err(ActivationError::MissingDependency { ty, chain }) => {
			assert_eq!(ty, widget_ty());
			assert_eq!(chain.to_string(), "Service -> Widget");
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

struct CountingCreator {
	created: AtomicUsize,
}

impl InjectionContextCreator for CountingCreator {
	fn create_context(&self, target: &TypeDescriptor, extra: Option<Instance>) -> InjectionContext {
		self.created.fetch_add(1, Ordering::SeqCst);
		let context = InjectionContext::new(target.clone(), extra);
		context.set_value("tenant", Arc::new(String::from("acme")));
		context
	}
}

fn counting_scope() -> (InjectionScope, Arc<CountingCreator>) {
	let creator = Arc::new(CountingCreator {
		created: AtomicUsize::new(0),
	});
	let scope = ScopeBuilder::new("context")
		.config(config())
		.context_creator(Arc::clone(&creator) as Arc<dyn InjectionContextCreator>)
		.build()
		.expect("valid config");
	(scope, creator)
}

fn as_context(instance: &Instance) -> InjectionContext {
	let context = Arc::clone(instance)
		.downcast::<InjectionContext>()
		.expect("context value");
	InjectionContext::clone(&context)
}

#[test]
fn context_is_materialized_once_and_shared() {
	let (scope, creator) = counting_scope();
	let compiler = scope.compiler();
	let outer_ty = TypeDescriptor::named("Outer");

	let inner_request = compiler.create_request(TypeDescriptor::named("Inner"), 2);
	inner_request.require_injection_context();
	let inner = compiler
		.compile_delegate(&scope, compiler.create_plan(inner_request, PlanNode::InjectionContext))
		.expect("inner compiles");

	let outer_request = compiler.create_request(outer_ty.clone(), 1);
	outer_request.require_injection_context();
	let outer = compiler
		.compile_delegate(
			&scope,
			compiler.create_plan(
				outer_request,
				PlanNode::Collection {
					element: TypeDescriptor::named("Context"),
					elements: vec![PlanNode::InjectionContext, PlanNode::Delegate(inner)],
				},
			),
		)
		.expect("outer compiles");

	let values = elements(outer.invoke(&scope, scope.disposal(), None).expect("runs"));
	let direct = as_context(&values[0]);
	let nested = as_context(&values[1]);
	assert!(InjectionContext::ptr_eq(&direct, &nested));
	assert_eq!(direct.target_type(), &outer_ty);
	assert_eq!(creator.created.load(Ordering::SeqCst), 1);

	let existing = InjectionContext::new(TypeDescriptor::named("Caller"), None);
	let values = elements(
		outer
			.invoke(&scope, scope.disposal(), Some(existing.clone()))
			.expect("runs"),
	);
	assert!(InjectionContext::ptr_eq(&as_context(&values[0]), &existing));
	assert_eq!(creator.created.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Tenant {
	name: Arc<String>,
	context: Arc<InjectionContext>,
}

#[test]
fn context_dependencies_read_materialized_context() {
	let (scope, creator) = counting_scope();
	let tenant_ty = TypeDescriptor::named("Tenant");
	scope.add_strategy(
		StrategyBuilder::new(
			"tenant",
			StrategySource::Activation(
				Activation::new(|args| {
					Ok(Tenant {
						name: args.get::<String>(0)?,
						context: args.get::<InjectionContext>(1)?,
					})
				})
				.depends_on(Dependency::ContextValue(Arc::from("tenant")))
				.depends_on(Dependency::InjectionContext),
			),
		)
		.export_as(tenant_ty.clone())
		.into_export(),
	);

	let tenant = scope
		.locate(&tenant_ty, None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Tenant>()
		.expect("tenant");
	assert_eq!(tenant.name.as_str(), "acme");
	assert_eq!(tenant.context.target_type(), &tenant_ty);
	assert_eq!(creator.created.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_context_value_is_reported() {
	let scope = scope();
	let ty = TypeDescriptor::named("Tenant");
	scope.add_strategy(
		StrategyBuilder::new(
			"tenant",
			StrategySource::Activation(
				Activation::new(|args| Ok(args.get::<String>(0)?.len()))
					.depends_on(Dependency::ContextValue(Arc::from("tenant"))),
			),
		)
		.export_as(ty.clone())
		.into_export(),
	);

	match scope.locate(&ty, None) {
		Err(ActivationError::MissingContextValue { name }) => assert_eq!(&*name, "tenant"),
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn unresolved_node_is_malformed() {
	let scope = scope();
	let compiler = scope.compiler();
	let plan = ConstructionPlan::new(compiler.create_request(widget_ty(), 1));
	let err = compiler.compile_delegate(&scope, plan).expect_err("unresolved");
	assert!(matches!(err, ActivationError::MalformedPlan { ty, .. } if ty == widget_ty()));
}

#[test]
fn context_read_without_requirement_is_malformed() {
	let scope = scope();
	let compiler = scope.compiler();
	let plan = compiler.create_plan(
		compiler.create_request(widget_ty(), 1),
		PlanNode::InjectionContext,
	);
	let err = compiler.compile_delegate(&scope, plan).expect_err("no context slot");
	assert!(matches!(err, ActivationError::MalformedPlan { .. }));
}

#[derive(Debug, Default)]
struct Greeter {
	greeting: Option<String>,
	widget: Option<Arc<Widget>>,
}

fn greeter_ctor() -> ConstructFn {
	Arc::new(|_: &[Instance]| -> Result<Boxed, BoxError> { Ok(Box::new(Greeter::default())) })
}

fn greet_method(arity: usize) -> MethodRef {
	MethodRef::new("greet", arity, |greeter: &mut Greeter, args: Args<'_>| {
		greeter.greeting = Some(format!("hello {}", args.get::<Widget>(0)?.label));
		Ok(())
	})
}

#[test]
fn method_arity_mismatch_is_malformed() {
	let scope = scope();
	let compiler = scope.compiler();
	let ty = TypeDescriptor::named("Greeter");
	let plan = compiler.create_plan(
		compiler.create_request(ty.clone(), 1),
		PlanNode::InvokeMethod {
			ty: ty.clone(),
			target: Box::new(PlanNode::Instantiate {
				ty: ty.clone(),
				constructor: greeter_ctor(),
				args: Vec::new(),
			}),
			method: greet_method(2),
			args: vec![PlanNode::Constant(Arc::new(Widget {
				label: "w".into(),
			}))],
		},
	);
	let err = compiler.compile_delegate(&scope, plan).expect_err("arity");
	assert!(matches!(err, ActivationError::MalformedPlan { reason, .. } if reason.contains("greet")));
}

#[test]
fn member_on_shared_target_is_malformed() {
	let scope = scope();
	let compiler = scope.compiler();
	let ty = TypeDescriptor::named("Greeter");
	let member = MemberRef::new("widget", |greeter: &mut Greeter, widget: Arc<Widget>| {
		greeter.widget = Some(widget);
		Ok(())
	});
	let plan = compiler.create_plan(
		compiler.create_request(ty.clone(), 1),
		PlanNode::AssignMembers {
			ty: ty.clone(),
			target: Box::new(PlanNode::Constant(Arc::new(Greeter::default()))),
			members: vec![(member, PlanNode::Constant(Arc::new(Widget { label: "w".into() })))],
		},
	);
	let err = compiler.compile_delegate(&scope, plan).expect_err("shared target");
	assert!(matches!(err, ActivationError::MalformedPlan { .. }));
}

#[test]
fn member_and_method_injection_run_in_order() {
	let scope = scope();
	scope.add_strategy(export("dep", widget_ty()).into_export());
	let ty = TypeDescriptor::named("Greeter");
	let member = MemberRef::new("widget", |greeter: &mut Greeter, widget: Arc<Widget>| {
		greeter.widget = Some(widget);
		Ok(())
	});
	let activation = Activation::from_raw(greeter_ctor())
		.inject_member(member, widget_ty())
		.invoke_method(greet_method(1), vec![Dependency::Service(widget_ty())]);
	scope.add_strategy(
		StrategyBuilder::new("greeter", StrategySource::Activation(activation))
			.export_as(ty.clone())
			.into_export(),
	);

	let greeter = scope
		.locate(&ty, None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Greeter>()
		.expect("greeter");
	assert_eq!(greeter.widget.as_ref().map(|w| w.label.as_str()), Some("dep"));
	assert_eq!(greeter.greeting.as_deref(), Some("hello dep"));
}

fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> ConstructFn {
	let log = Arc::clone(log);
	Arc::new(move |_: &[Instance]| -> Result<Boxed, BoxError> {
		log.lock().push(name);
		Ok(Box::new(name))
	})
}

#[test]
fn statements_run_in_recorded_order_before_value() {
	let scope = scope();
	let compiler = scope.compiler();
	let log = Arc::new(Mutex::new(Vec::new()));
	let ty = TypeDescriptor::named("Ordered");

	let mut plan = ConstructionPlan::new(compiler.create_request(ty.clone(), 1));
	let first = plan.add_local(TypeDescriptor::named("First"));
	plan.add_statement(Statement::Assign {
		local: first,
		value: PlanNode::Instantiate {
			ty: ty.clone(),
			constructor: recording(&log, "assign"),
			args: Vec::new(),
		},
	});
	plan.add_statement(Statement::Evaluate(PlanNode::Instantiate {
		ty: ty.clone(),
		constructor: recording(&log, "evaluate"),
		args: vec![PlanNode::Local(first)],
	}));
	plan.set_value(PlanNode::Local(first));
	assert!(plan.has_extras());

	let delegate = compiler.compile_delegate(&scope, plan).expect("compiles");
	let value = delegate.invoke(&scope, scope.disposal(), None).expect("runs");
	assert_eq!(*log.lock(), vec!["assign", "evaluate"]);
	assert_eq!(value.downcast_ref::<&str>(), Some(&"assign"));

	delegate.invoke(&scope, scope.disposal(), None).expect("runs again");
	assert_eq!(*log.lock(), vec!["assign", "evaluate", "assign", "evaluate"]);
}

#[test]
fn local_read_before_assignment_is_malformed() {
	let scope = scope();
	let compiler = scope.compiler();
	let ty = TypeDescriptor::named("Ordered");
	let mut plan = ConstructionPlan::new(compiler.create_request(ty.clone(), 1));
	let local = plan.add_local(ty.clone());
	plan.add_statement(Statement::Evaluate(PlanNode::Local(local)));
	plan.add_statement(Statement::Assign {
		local,
		value: PlanNode::Constant(Arc::new(1_u8)),
	});
	plan.set_value(PlanNode::Local(local));

	let err = compiler.compile_delegate(&scope, plan).expect_err("read before write");
	assert!(matches!(err, ActivationError::MalformedPlan { reason, .. } if reason.contains("before assignment")));
}

#[test]
fn compiling_twice_is_behaviorally_equivalent() {
	let scope = scope();
	let strategy = export("w", widget_ty()).into_export();
	let compiler = scope.compiler();

	let compile = || {
		let request = compiler.create_request(widget_ty(), 1);
		let plan = compiler
			.plan_builder()
			.build_plan(&scope, &strategy, request)
			.expect("plan");
		compiler.compile_delegate(&scope, plan).expect("compiles")
	};
	let first = compile();
	let second = compile();
	assert!(!crate::delegate::ActivationDelegate::ptr_eq(&first, &second));

	let a = first.invoke(&scope, scope.disposal(), None).expect("runs");
	let b = second.invoke(&scope, scope.disposal(), None).expect("runs");
	assert_eq!(label_of(&a), label_of(&b));
	assert!(!Arc::ptr_eq(&a, &b));
}

#[derive(Debug)]
struct Layer {
	name: &'static str,
	inner: Instance,
}

fn layer(name: &'static str) -> StrategySource {
	StrategySource::decorate(move |inner: Instance| Ok(Layer { name, inner }))
}

#[test]
fn decorators_wrap_exports_in_registration_order() {
	let scope = scope();
	scope.add_strategy(export("core", widget_ty()).into_export());
	scope.add_strategy(
		StrategyBuilder::new("first", layer("first"))
			.export_as(widget_ty())
			.into_decorator(),
	);
	scope.add_strategy(
		StrategyBuilder::new("blocked", layer("blocked"))
			.export_as(widget_ty())
			.when(never())
			.into_decorator(),
	);
	scope.add_strategy(
		StrategyBuilder::new("second", layer("second"))
			.export_as(widget_ty())
			.into_decorator(),
	);

	let outer = scope
		.locate(&widget_ty(), None)
		.expect("resolves")
		.expect("registered")
		.downcast::<Layer>()
		.expect("outer layer");
	assert_eq!(outer.name, "second");
	let inner = Arc::clone(&outer.inner)
		.downcast::<Layer>()
		.expect("inner layer");
	assert_eq!(inner.name, "first");
	assert_eq!(label_of(&inner.inner), "core");
}

#[test]
fn decorator_added_after_first_locate_applies() {
	let scope = scope();
	scope.add_strategy(export("core", widget_ty()).into_export());
	let plain = scope.locate(&widget_ty(), None).expect("resolves").expect("found");
	assert_eq!(label_of(&plain), "core");

	scope.add_strategy(
		StrategyBuilder::new("late", layer("late"))
			.export_as(widget_ty())
			.into_decorator(),
	);

	let decorated = scope
		.locate(&widget_ty(), None)
		.expect("resolves")
		.expect("found")
		.downcast::<Layer>()
		.expect("late decorator wraps the export");
	assert_eq!(decorated.name, "late");
	assert_eq!(label_of(&decorated.inner), "core");
}

#[test]
fn dependency_primary_added_after_first_locate_applies() {
	let scope = scope();
	let app_ty = TypeDescriptor::named("App");
	let dep_ty = TypeDescriptor::named("Dep");
	scope.add_strategy(export("dep-a", dep_ty.clone()).into_export());
	scope.add_strategy(
		StrategyBuilder::new(
			"app",
			StrategySource::Activation(
				Activation::new(|args| Ok(Service { widget: args.get::<Widget>(0)? }))
					.depends_on(dep_ty.clone()),
			),
		)
		.export_as(app_ty.clone())
		.into_export(),
	);

	let app_dep = |scope: &InjectionScope| {
		scope
			.locate(&app_ty, None)
			.expect("resolves")
			.expect("found")
			.downcast::<Service>()
			.expect("app")
			.widget
			.label
			.clone()
	};
	assert_eq!(app_dep(&scope), "dep-a");

	scope.add_strategy(export("dep-b", dep_ty.clone()).primary().into_export());
	assert_eq!(locate_label(&scope, &dep_ty, None).as_deref(), Some("dep-b"));
	assert_eq!(app_dep(&scope), "dep-b");
}

#[test]
fn disposable_activations_are_tracked() {
	let scope = scope();
	scope.add_strategy(
		StrategyBuilder::new("tracked", StrategySource::Activation(crate::test_fixtures::labelled("t").disposable()))
			.export_as(widget_ty())
			.into_export(),
	);

	let first = scope.locate(&widget_ty(), None).expect("resolves").expect("found");
	scope.locate(&widget_ty(), None).expect("resolves").expect("found");
	assert_eq!(scope.disposal().len(), 2);
	assert_eq!(Arc::strong_count(&first), 2);

	assert_eq!(scope.disposal().dispose(), 2);
	assert!(scope.disposal().is_empty());
	assert_eq!(Arc::strong_count(&first), 1);
}

struct Recorder(Mutex<Vec<Instance>>);

impl DisposalScope for Recorder {
	fn track(&self, instance: Instance) {
		self.0.lock().push(instance);
	}
}

#[test]
fn delegate_tracks_into_supplied_disposal_scope() {
	let scope = scope();
	scope.add_strategy(
		StrategyBuilder::new("tracked", StrategySource::Activation(crate::test_fixtures::labelled("t").disposable()))
			.export_as(widget_ty())
			.into_export(),
	);
	let delegate = scope
		.compiler()
		.find_delegate(&scope, &widget_ty(), None)
		.expect("no error")
		.expect("found");

	let recorder = Recorder(Mutex::new(Vec::new()));
	let instance = delegate.invoke(&scope, &recorder, None).expect("runs");
	let tracked = recorder.0.lock();
	assert_eq!(tracked.len(), 1);
	assert!(Arc::ptr_eq(&tracked[0], &instance));
	assert!(scope.disposal().is_empty());
}

#[test]
fn construction_errors_carry_the_type() {
	let scope = scope();
	scope.add_strategy(
		StrategyBuilder::new(
			"broken",
			StrategySource::Activation(Activation::new(|_| -> Result<u8, BoxError> {
				Err("boom".into())
			})),
		)
		.export_as(widget_ty())
		.into_export(),
	);

	match scope.locate(&widget_ty(), None) {
		Err(ActivationError::Construction { ty, source }) => {
			assert_eq!(ty, widget_ty());
			assert_eq!(source.to_string(), "boom");
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[test]
fn static_context_reaches_conditions() {
	let scope = scope();
	let depths = Arc::new(Mutex::new(Vec::new()));
	let seen = Arc::clone(&depths);
	scope.add_strategy(
		export("observed", widget_ty())
			.when(move |_: &StrategyDef, ctx: &StaticInjectionContext| {
				seen.lock().push(ctx.depth());
				true
			})
			.into_export(),
	);

	assert_eq!(locate_label(&scope, &widget_ty(), None).as_deref(), Some("observed"));
	assert_eq!(depths.lock().first().copied(), Some(1));
}

fn assert_send_sync<T: Any + Send + Sync>() {}

#[test]
fn shared_types_are_thread_safe() {
	assert_send_sync::<InjectionScope>();
	assert_send_sync::<crate::delegate::ActivationDelegate>();
}
