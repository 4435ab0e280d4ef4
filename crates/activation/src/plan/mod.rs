//! Construction plans.
//!
//! # Role
//!
//! A [`ConstructionPlan`] is the intermediate representation handed from a
//! [`PlanBuilder`] to the compiler: one value-producing [`PlanNode`] tree plus
//! a flat, ordered list of local bindings and side-effect statements that run
//! before it. Plans are built fresh for every compilation and dropped once the
//! delegate exists.
//!
//! # Invariants
//!
//! - Statements keep their recorded order, including across [`ConstructionPlan::absorb`].
//!   - Enforced in: [`ConstructionPlan::absorb`] (append-only merge).
//!   - Tested by: `compiler::tests::statements_run_in_recorded_order_before_value`
//!   - Failure symptom: a local is read before the statement that assigns it.
//!
//! - A plan whose value was never set cannot compile.
//!   - Enforced in: [`ConstructionPlan::new`] (value starts as [`PlanNode::Unresolved`]).
//!   - Tested by: `compiler::tests::unresolved_node_is_malformed`
//!   - Failure symptom: a delegate returning a placeholder instead of failing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::delegate::{ActivationDelegate, Instance};
use crate::descriptor::TypeDescriptor;
use crate::request::ActivationRequest;
use crate::strategy::{ConstructFn, MemberRef, MethodRef, WrapFn};

mod builder;

pub use builder::{DefaultPlanBuilder, PlanBuilder};

static NEXT_LOCAL: AtomicU32 = AtomicU32::new(0);

/// Identifies a function-local binding.
///
/// Ids are process-unique so plans built independently can be merged without
/// renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(u32);

impl LocalId {
	fn fresh() -> Self {
		Self(NEXT_LOCAL.fetch_add(1, Ordering::Relaxed))
	}
}

/// How a node hands its result to its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
	/// A freshly built value still owned by the node; mutable until shared.
	Owned,
	/// An already shared instance.
	Shared,
}

/// One typed operation in a plan tree.
#[derive(Clone)]
pub enum PlanNode {
	/// A pre-built instance.
	Constant(Instance),
	/// Calls a constructor with the evaluated arguments.
	Instantiate {
		ty: TypeDescriptor,
		constructor: ConstructFn,
		args: Vec<PlanNode>,
	},
	/// Assigns members on an owned target, in order.
	AssignMembers {
		ty: TypeDescriptor,
		target: Box<PlanNode>,
		members: Vec<(MemberRef, PlanNode)>,
	},
	/// Invokes a method on an owned target.
	InvokeMethod {
		ty: TypeDescriptor,
		target: Box<PlanNode>,
		method: MethodRef,
		args: Vec<PlanNode>,
	},
	/// Wraps the shared inner value.
	Wrap {
		ty: TypeDescriptor,
		wrap: WrapFn,
		inner: Box<PlanNode>,
	},
	/// Builds a `Vec<Instance>` of the element values.
	Collection {
		element: TypeDescriptor,
		elements: Vec<PlanNode>,
	},
	/// Invokes an already compiled delegate with the same scope and context.
	Delegate(ActivationDelegate),
	/// Reads a local assigned by an earlier statement.
	Local(LocalId),
	/// Reads a named value from the ambient injection context.
	ContextValue { name: Arc<str> },
	/// The ambient injection context itself.
	InjectionContext,
	/// Shares the inner value and hands it to the root disposal scope.
	TrackDisposal(Box<PlanNode>),
	/// Placeholder for a node the builder could not produce.
	Unresolved { ty: TypeDescriptor },
}

impl PlanNode {
	pub fn shape(&self) -> Shape {
		match self {
			Self::Instantiate { .. }
			| Self::AssignMembers { .. }
			| Self::InvokeMethod { .. }
			| Self::Wrap { .. }
			| Self::Collection { .. }
			| Self::Unresolved { .. } => Shape::Owned,
			Self::Constant(_)
			| Self::Delegate(_)
			| Self::Local(_)
			| Self::ContextValue { .. }
			| Self::InjectionContext
			| Self::TrackDisposal(_) => Shape::Shared,
		}
	}

	/// Returns true if evaluating this node reads the ambient context.
	pub fn reads_context(&self) -> bool {
		match self {
			Self::ContextValue { .. } | Self::InjectionContext => true,
			Self::Instantiate { args, .. } => args.iter().any(Self::reads_context),
			Self::AssignMembers {
				target, members, ..
			} => target.reads_context() || members.iter().any(|(_, node)| node.reads_context()),
			Self::InvokeMethod { target, args, .. } => {
				target.reads_context() || args.iter().any(Self::reads_context)
			}
			Self::Wrap { inner, .. } | Self::TrackDisposal(inner) => inner.reads_context(),
			Self::Collection { elements, .. } => elements.iter().any(Self::reads_context),
			Self::Constant(_) | Self::Delegate(_) | Self::Local(_) | Self::Unresolved { .. } => {
				false
			}
		}
	}
}

impl fmt::Debug for PlanNode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Constant(_) => f.write_str("Constant"),
			Self::Instantiate { ty, args, .. } => f
				.debug_struct("Instantiate")
				.field("ty", ty)
				.field("args", args)
				.finish_non_exhaustive(),
			Self::AssignMembers {
				ty,
				target,
				members,
			} => f
				.debug_struct("AssignMembers")
				.field("ty", ty)
				.field("target", target)
				.field("members", members)
				.finish(),
			Self::InvokeMethod {
				ty,
				target,
				method,
				args,
			} => f
				.debug_struct("InvokeMethod")
				.field("ty", ty)
				.field("target", target)
				.field("method", method)
				.field("args", args)
				.finish(),
			Self::Wrap { ty, inner, .. } => f
				.debug_struct("Wrap")
				.field("ty", ty)
				.field("inner", inner)
				.finish_non_exhaustive(),
			Self::Collection { element, elements } => f
				.debug_struct("Collection")
				.field("element", element)
				.field("elements", elements)
				.finish(),
			Self::Delegate(delegate) => f.debug_tuple("Delegate").field(delegate).finish(),
			Self::Local(id) => f.debug_tuple("Local").field(id).finish(),
			Self::ContextValue { name } => {
				f.debug_struct("ContextValue").field("name", name).finish()
			}
			Self::InjectionContext => f.write_str("InjectionContext"),
			Self::TrackDisposal(inner) => f.debug_tuple("TrackDisposal").field(inner).finish(),
			Self::Unresolved { ty } => f.debug_struct("Unresolved").field("ty", ty).finish(),
		}
	}
}

/// A side effect emitted before the value node.
#[derive(Debug, Clone)]
pub enum Statement {
	/// Materializes the ambient context for `target` if the caller passed none.
	EnsureInjectionContext { target: TypeDescriptor },
	/// Evaluates `value`, shares it and stores it in `local`.
	Assign { local: LocalId, value: PlanNode },
	/// Evaluates a node for its side effects and drops the result.
	Evaluate(PlanNode),
}

/// A declared function-local binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBinding {
	pub id: LocalId,
	pub ty: TypeDescriptor,
}

/// Value node plus the auxiliary locals and statements preceding it.
#[derive(Debug, Clone)]
pub struct ConstructionPlan {
	request: ActivationRequest,
	value: PlanNode,
	locals: Vec<LocalBinding>,
	statements: Vec<Statement>,
}

impl ConstructionPlan {
	/// Starts an empty plan whose value is still unresolved.
	pub fn new(request: ActivationRequest) -> Self {
		let ty = request.activation_type().clone();
		Self {
			request,
			value: PlanNode::Unresolved { ty },
			locals: Vec::new(),
			statements: Vec::new(),
		}
	}

	pub fn request(&self) -> &ActivationRequest {
		&self.request
	}

	pub fn value(&self) -> &PlanNode {
		&self.value
	}

	pub fn set_value(&mut self, value: PlanNode) {
		self.value = value;
	}

	pub fn locals(&self) -> &[LocalBinding] {
		&self.locals
	}

	pub fn statements(&self) -> &[Statement] {
		&self.statements
	}

	/// Declares a new local of type `ty`.
	pub fn add_local(&mut self, ty: TypeDescriptor) -> LocalId {
		let id = LocalId::fresh();
		self.locals.push(LocalBinding { id, ty });
		id
	}

	pub fn add_statement(&mut self, statement: Statement) {
		self.statements.push(statement);
	}

	/// Inserts a statement ahead of every recorded one.
	pub fn prepend_statement(&mut self, statement: Statement) {
		self.statements.insert(0, statement);
	}

	/// Moves a child plan's locals and statements into this one and returns the
	/// child's value node for inlining.
	pub fn absorb(&mut self, child: ConstructionPlan) -> PlanNode {
		self.locals.extend(child.locals);
		self.statements.extend(child.statements);
		child.value
	}

	/// Returns true if the plan needs a block around its value node.
	pub fn has_extras(&self) -> bool {
		!self.locals.is_empty() || !self.statements.is_empty()
	}

	pub(crate) fn into_parts(
		self,
	) -> (ActivationRequest, PlanNode, Vec<LocalBinding>, Vec<Statement>) {
		(self.request, self.value, self.locals, self.statements)
	}
}
