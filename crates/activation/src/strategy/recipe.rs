//! Construction metadata consumed by plan builders.
//!
//! None of these types run anything by themselves; a plan builder turns them
//! into plan nodes, and the compiler lowers the nodes.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::delegate::{Boxed, Instance};
use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::error::{ActivationError, BoxError, Result};

pub type ConstructFn = Arc<dyn Fn(&[Instance]) -> Result<Boxed, BoxError> + Send + Sync>;

/// Turns an already-built inner instance into a wrapping value.
pub type WrapFn = Arc<dyn Fn(Instance) -> Result<Boxed, BoxError> + Send + Sync>;

/// Specializes an open template strategy to a concrete descriptor.
pub type TemplateFn = Arc<dyn Fn(&TypeDescriptor) -> Result<Activation> + Send + Sync>;

type AssignFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync), Instance) -> Result<(), BoxError> + Send + Sync>;
type InvokeFn =
	Arc<dyn Fn(&mut (dyn Any + Send + Sync), &[Instance]) -> Result<(), BoxError> + Send + Sync>;

/// Resolved dependency values handed to a constructor or method.
#[derive(Clone, Copy)]
pub struct Args<'a>(&'a [Instance]);

impl<'a> Args<'a> {
	pub fn new(values: &'a [Instance]) -> Self {
		Self(values)
	}

	/// Downcasts the argument at `index`.
	pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
		let value = self.0.get(index).ok_or_else(|| ActivationError::TypeMismatch {
			expected: type_name::<T>(),
			context: format!("argument {index} (only {} supplied)", self.0.len()),
		})?;
		Arc::clone(value)
			.downcast::<T>()
			.map_err(|_| ActivationError::TypeMismatch {
				expected: type_name::<T>(),
				context: format!("argument {index}"),
			})
	}

	pub fn raw(&self, index: usize) -> Option<&Instance> {
		self.0.get(index)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Something a constructor, member or method needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
	Service(TypeDescriptor),
	Keyed(TypeDescriptor, LookupKey),
	/// A named value stored on the ambient injection context.
	ContextValue(Arc<str>),
	/// The ambient injection context itself, as `Arc<InjectionContext>`.
	InjectionContext,
}

impl From<TypeDescriptor> for Dependency {
	fn from(ty: TypeDescriptor) -> Self {
		Self::Service(ty)
	}
}

/// Reference to a settable member of a constructed value.
#[derive(Clone)]
pub struct MemberRef {
	name: Arc<str>,
	assign: AssignFn,
}

impl MemberRef {
	/// Creates a member setter for target `T` taking a value of type `V`.
	pub fn new<T, V, F>(name: impl Into<Arc<str>>, setter: F) -> Self
	where
		T: Any + Send + Sync,
		V: Any + Send + Sync,
		F: Fn(&mut T, Arc<V>) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		let name = name.into();
		let label = Arc::clone(&name);
		let assign: AssignFn = Arc::new(
			move |target: &mut (dyn Any + Send + Sync), value: Instance| -> Result<(), BoxError> {
				let target = target
					.downcast_mut::<T>()
					.ok_or_else(|| ActivationError::TypeMismatch {
						expected: type_name::<T>(),
						context: format!("target of member {label}"),
					})?;
				let value = value
					.downcast::<V>()
					.map_err(|_| ActivationError::TypeMismatch {
						expected: type_name::<V>(),
						context: format!("value of member {label}"),
					})?;
				setter(target, value)
			},
		);
		Self { name, assign }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn assign(
		&self,
		target: &mut (dyn Any + Send + Sync),
		value: Instance,
	) -> Result<(), BoxError> {
		(self.assign)(target, value)
	}
}

impl fmt::Debug for MemberRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("MemberRef").field(&self.name).finish()
	}
}

/// Reference to a method invoked on a constructed value.
#[derive(Clone)]
pub struct MethodRef {
	name: Arc<str>,
	arity: usize,
	invoke: InvokeFn,
}

impl MethodRef {
	pub fn new<T, F>(name: impl Into<Arc<str>>, arity: usize, method: F) -> Self
	where
		T: Any + Send + Sync,
		F: Fn(&mut T, Args<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		let name = name.into();
		let label = Arc::clone(&name);
		let invoke: InvokeFn = Arc::new(
			move |target: &mut (dyn Any + Send + Sync), args: &[Instance]| -> Result<(), BoxError> {
				let target = target
					.downcast_mut::<T>()
					.ok_or_else(|| ActivationError::TypeMismatch {
						expected: type_name::<T>(),
						context: format!("receiver of method {label}"),
					})?;
				method(target, Args::new(args))
			},
		);
		Self {
			name,
			arity,
			invoke,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Number of arguments the method expects.
	pub fn arity(&self) -> usize {
		self.arity
	}

	pub(crate) fn invoke(
		&self,
		target: &mut (dyn Any + Send + Sync),
		args: &[Instance],
	) -> Result<(), BoxError> {
		(self.invoke)(target, args)
	}
}

impl fmt::Debug for MethodRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MethodRef")
			.field("name", &self.name)
			.field("arity", &self.arity)
			.finish()
	}
}

#[derive(Debug, Clone)]
pub struct MemberInjection {
	pub member: MemberRef,
	pub dependency: Dependency,
}

#[derive(Debug, Clone)]
pub struct MethodInjection {
	pub method: MethodRef,
	pub dependencies: Vec<Dependency>,
}

/// How to build one concrete value: constructor, members, then methods.
#[derive(Clone)]
pub struct Activation {
	pub(crate) constructor: ConstructFn,
	pub(crate) dependencies: Vec<Dependency>,
	pub(crate) members: Vec<MemberInjection>,
	pub(crate) methods: Vec<MethodInjection>,
	pub(crate) disposable: bool,
}

impl Activation {
	/// Creates an activation from a typed constructor.
	pub fn new<T, F>(constructor: F) -> Self
	where
		T: Any + Send + Sync,
		F: Fn(Args<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
	{
		Self::from_raw(Arc::new(move |args: &[Instance]| {
			constructor(Args::new(args)).map(|value| Box::new(value) as Boxed)
		}))
	}

	pub fn from_raw(constructor: ConstructFn) -> Self {
		Self {
			constructor,
			dependencies: Vec::new(),
			members: Vec::new(),
			methods: Vec::new(),
			disposable: false,
		}
	}

	/// Appends a constructor dependency.
	pub fn depends_on(mut self, dependency: impl Into<Dependency>) -> Self {
		self.dependencies.push(dependency.into());
		self
	}

	pub fn inject_member(mut self, member: MemberRef, dependency: impl Into<Dependency>) -> Self {
		self.members.push(MemberInjection {
			member,
			dependency: dependency.into(),
		});
		self
	}

	pub fn invoke_method(mut self, method: MethodRef, dependencies: Vec<Dependency>) -> Self {
		self.methods.push(MethodInjection {
			method,
			dependencies,
		});
		self
	}

	/// Hands produced instances to the root disposal scope.
	pub fn disposable(mut self) -> Self {
		self.disposable = true;
		self
	}

	pub fn dependencies(&self) -> &[Dependency] {
		&self.dependencies
	}

	pub fn members(&self) -> &[MemberInjection] {
		&self.members
	}

	pub fn methods(&self) -> &[MethodInjection] {
		&self.methods
	}

	pub fn constructor(&self) -> &ConstructFn {
		&self.constructor
	}

	pub fn is_disposable(&self) -> bool {
		self.disposable
	}
}

impl fmt::Debug for Activation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Activation")
			.field("dependencies", &self.dependencies)
			.field("members", &self.members)
			.field("methods", &self.methods)
			.field("disposable", &self.disposable)
			.finish_non_exhaustive()
	}
}

/// What a strategy produces when activated.
#[derive(Clone)]
pub enum StrategySource {
	/// A pre-built instance.
	Instance(Instance),
	Activation(Activation),
	/// Open template specialized per requested descriptor.
	Template(TemplateFn),
	/// Decorates an already-built export.
	Decorate(WrapFn),
}

impl StrategySource {
	pub fn template<F>(specialize: F) -> Self
	where
		F: Fn(&TypeDescriptor) -> Result<Activation> + Send + Sync + 'static,
	{
		Self::Template(Arc::new(specialize))
	}

	pub fn decorate<T, F>(decorator: F) -> Self
	where
		T: Any + Send + Sync,
		F: Fn(Instance) -> Result<T, BoxError> + Send + Sync + 'static,
	{
		Self::Decorate(Arc::new(move |inner: Instance| {
			decorator(inner).map(|value| Box::new(value) as Boxed)
		}))
	}
}

impl fmt::Debug for StrategySource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Instance(_) => f.write_str("Instance"),
			Self::Activation(activation) => f.debug_tuple("Activation").field(activation).finish(),
			Self::Template(_) => f.write_str("Template"),
			Self::Decorate(_) => f.write_str("Decorate"),
		}
	}
}
