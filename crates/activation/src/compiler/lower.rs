//! Lowering of construction plans into closures.
//!
//! Every node becomes a boxed closure over a [`Frame`]; every strategy and
//! type decision is captured at lowering time. Structural defects (unresolved
//! nodes, member or method calls on a shared value, arity mismatches, locals
//! read before assignment) are rejected here rather than at call time.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::{InjectionContext, InjectionContextCreator};
use crate::delegate::{ActivationDelegate, Boxed, Instance};
use crate::descriptor::TypeDescriptor;
use crate::error::{ActivationError, Result};
use crate::plan::{ConstructionPlan, LocalId, PlanNode, Shape, Statement};
use crate::scope::{DisposalScope, InjectionScope};

/// Per-call evaluation state.
struct Frame<'a> {
	scope: &'a InjectionScope,
	disposal: &'a dyn DisposalScope,
	context: Option<InjectionContext>,
	locals: Vec<Option<Instance>>,
}

enum Value {
	Owned(Boxed),
	Shared(Instance),
}

impl Value {
	fn into_shared(self) -> Instance {
		match self {
			Self::Owned(boxed) => Instance::from(boxed),
			Self::Shared(instance) => instance,
		}
	}
}

type Eval = Box<dyn Fn(&mut Frame<'_>) -> Result<Value> + Send + Sync>;
type SharedEval = Box<dyn Fn(&mut Frame<'_>) -> Result<Instance> + Send + Sync>;
type Exec = Box<dyn Fn(&mut Frame<'_>) -> Result<()> + Send + Sync>;

struct Lowering {
	root: TypeDescriptor,
	creator: Arc<dyn InjectionContextCreator>,
	context_available: bool,
	slots: FxHashMap<LocalId, usize>,
	assigned: FxHashSet<LocalId>,
}

/// Lowers `plan` into a delegate bound to (scope, disposal scope, context).
pub(super) fn lower_plan(
	plan: ConstructionPlan,
	creator: Arc<dyn InjectionContextCreator>,
) -> Result<ActivationDelegate> {
	let (request, value, locals, statements) = plan.into_parts();
	let root = request.activation_type().clone();

	let mut slots = FxHashMap::default();
	for (slot, binding) in locals.iter().enumerate() {
		if slots.insert(binding.id, slot).is_some() {
			return Err(ActivationError::malformed(
				&root,
				format!("local {:?} declared twice", binding.id),
			));
		}
	}

	let mut lowering = Lowering {
		root: root.clone(),
		creator,
		context_available: false,
		slots,
		assigned: FxHashSet::default(),
	};

	let mut body = Vec::with_capacity(statements.len());
	for statement in statements {
		body.push(lowering.statement(statement)?);
	}
	let value = lowering.coerced(value)?;

	if body.is_empty() && locals.is_empty() {
		return Ok(ActivationDelegate::from_fn(root, move |scope, disposal, context| {
			let mut frame = Frame {
				scope,
				disposal,
				context,
				locals: Vec::new(),
			};
			value(&mut frame).map(Value::into_shared)
		}));
	}

	let slot_count = locals.len();
	Ok(ActivationDelegate::from_fn(root, move |scope, disposal, context| {
		let mut frame = Frame {
			scope,
			disposal,
			context,
			locals: vec![None; slot_count],
		};
		for statement in &body {
			statement(&mut frame)?;
		}
		value(&mut frame).map(Value::into_shared)
	}))
}

impl Lowering {
	/// Lowers the value node; owned results are shared on return.
	fn coerced(&mut self, node: PlanNode) -> Result<Eval> {
		let shape = node.shape();
		let eval = self.node(node)?;
		if shape == Shape::Shared {
			return Ok(eval);
		}
		Ok(Box::new(move |frame: &mut Frame<'_>| {
			eval(frame).map(|value| Value::Shared(value.into_shared()))
		}))
	}

	fn statement(&mut self, statement: Statement) -> Result<Exec> {
		match statement {
			Statement::EnsureInjectionContext { target } => {
				self.context_available = true;
				let creator = Arc::clone(&self.creator);
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					if frame.context.is_none() {
						frame.context = Some(creator.create_context(&target, None));
					}
					Ok(())
				}))
			}
			Statement::Assign { local, value } => {
				let Some(&slot) = self.slots.get(&local) else {
					return Err(ActivationError::malformed(
						&self.root,
						format!("assignment to undeclared local {local:?}"),
					));
				};
				let eval = self.node(value)?;
				self.assigned.insert(local);
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let value = eval(frame)?.into_shared();
					frame.locals[slot] = Some(value);
					Ok(())
				}))
			}
			Statement::Evaluate(node) => {
				let eval = self.node(node)?;
				Ok(Box::new(move |frame: &mut Frame<'_>| eval(frame).map(drop)))
			}
		}
	}

	fn node(&mut self, node: PlanNode) -> Result<Eval> {
		match node {
			PlanNode::Constant(instance) => {
				Ok(Box::new(move |_: &mut Frame<'_>| Ok(Value::Shared(Arc::clone(&instance)))))
			}

			PlanNode::Instantiate {
				ty,
				constructor,
				args,
			} => {
				let args = self.all(args)?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let values = evaluate_all(&args, frame)?;
					constructor(values.as_slice())
						.map(Value::Owned)
						.map_err(|source| ActivationError::Construction {
							ty: ty.clone(),
							source,
						})
				}))
			}

			PlanNode::AssignMembers {
				ty,
				target,
				members,
			} => {
				if target.shape() != Shape::Owned {
					return Err(ActivationError::malformed(
						&ty,
						"member injection requires an owned target",
					));
				}
				let target = self.node(*target)?;
				let members = members
					.into_iter()
					.map(|(member, value)| -> Result<_> { Ok((member, self.shared(value)?)) })
					.collect::<Result<Vec<_>>>()?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let mut boxed = owned(target(frame)?, &ty)?;
					for (member, value) in &members {
						let value = value(frame)?;
						member
							.assign(&mut *boxed, value)
							.map_err(|source| ActivationError::Construction {
								ty: ty.clone(),
								source,
							})?;
					}
					Ok(Value::Owned(boxed))
				}))
			}

			PlanNode::InvokeMethod {
				ty,
				target,
				method,
				args,
			} => {
				if target.shape() != Shape::Owned {
					return Err(ActivationError::malformed(
						&ty,
						format!("method {} requires an owned target", method.name()),
					));
				}
				if args.len() != method.arity() {
					return Err(ActivationError::malformed(
						&ty,
						format!(
							"method {} takes {} arguments, plan supplies {}",
							method.name(),
							method.arity(),
							args.len()
						),
					));
				}
				let target = self.node(*target)?;
				let args = self.all(args)?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let mut boxed = owned(target(frame)?, &ty)?;
					let values = evaluate_all(&args, frame)?;
					method
						.invoke(&mut *boxed, &values)
						.map_err(|source| ActivationError::Construction {
							ty: ty.clone(),
							source,
						})?;
					Ok(Value::Owned(boxed))
				}))
			}

			PlanNode::Wrap { ty, wrap, inner } => {
				let inner = self.shared(*inner)?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let inner = inner(frame)?;
					wrap(inner)
						.map(Value::Owned)
						.map_err(|source| ActivationError::Construction {
							ty: ty.clone(),
							source,
						})
				}))
			}

			PlanNode::Collection { elements, .. } => {
				let elements = self.all(elements)?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let values = evaluate_all(&elements, frame)?;
					Ok(Value::Owned(Box::new(values)))
				}))
			}

			PlanNode::Delegate(delegate) => Ok(Box::new(move |frame: &mut Frame<'_>| {
				delegate
					.invoke(frame.scope, frame.disposal, frame.context.clone())
					.map(Value::Shared)
			})),

			PlanNode::Local(local) => {
				let Some(&slot) = self.slots.get(&local) else {
					return Err(ActivationError::malformed(
						&self.root,
						format!("read of undeclared local {local:?}"),
					));
				};
				if !self.assigned.contains(&local) {
					return Err(ActivationError::malformed(
						&self.root,
						format!("local {local:?} read before assignment"),
					));
				}
				let root = self.root.clone();
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					frame.locals[slot]
						.clone()
						.map(Value::Shared)
						.ok_or_else(|| ActivationError::malformed(&root, "unassigned local"))
				}))
			}

			PlanNode::ContextValue { name } => {
				self.require_context()?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					frame
						.context
						.as_ref()
						.and_then(|context| context.value(&name))
						.map(Value::Shared)
						.ok_or_else(|| ActivationError::MissingContextValue { name: name.clone() })
				}))
			}

			PlanNode::InjectionContext => {
				self.require_context()?;
				let root = self.root.clone();
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let context = frame
						.context
						.clone()
						.ok_or_else(|| ActivationError::malformed(&root, "injection context unset"))?;
					Ok(Value::Shared(Arc::new(context)))
				}))
			}

			PlanNode::TrackDisposal(inner) => {
				let inner = self.shared(*inner)?;
				Ok(Box::new(move |frame: &mut Frame<'_>| {
					let instance = inner(frame)?;
					frame.disposal.track(Arc::clone(&instance));
					Ok(Value::Shared(instance))
				}))
			}

			PlanNode::Unresolved { ty } => Err(ActivationError::malformed(
				&ty,
				"plan contains an unresolved node",
			)),
		}
	}

	fn shared(&mut self, node: PlanNode) -> Result<SharedEval> {
		let eval = self.node(node)?;
		Ok(Box::new(move |frame: &mut Frame<'_>| eval(frame).map(Value::into_shared)))
	}

	fn all(&mut self, nodes: Vec<PlanNode>) -> Result<Vec<Eval>> {
		nodes.into_iter().map(|node| self.node(node)).collect()
	}

	fn require_context(&self) -> Result<()> {
		if self.context_available {
			Ok(())
		} else {
			Err(ActivationError::malformed(
				&self.root,
				"reads the injection context but the request never required one",
			))
		}
	}
}

fn evaluate_all(evals: &[Eval], frame: &mut Frame<'_>) -> Result<Vec<Instance>> {
	evals
		.iter()
		.map(|eval| eval(frame).map(Value::into_shared))
		.collect()
}

fn owned(value: Value, ty: &TypeDescriptor) -> Result<Boxed> {
	match value {
		Value::Owned(boxed) => Ok(boxed),
		Value::Shared(_) => Err(ActivationError::malformed(ty, "expected an owned value")),
	}
}
