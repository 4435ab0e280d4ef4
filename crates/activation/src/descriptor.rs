//! Type descriptors and lookup keys.
//!
//! A [`TypeDescriptor`] names the shape a caller asks for. Catalogs are keyed by
//! exact descriptor, so two descriptors that render the same must also compare
//! equal; every variant hashes structurally.

use std::fmt;
use std::sync::Arc;

/// Identifies a requested or exported type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
	/// A plain, non-generic type.
	Named(Arc<str>),
	/// Array of the element type.
	Array(Arc<TypeDescriptor>),
	/// Sequence (enumerable) of the element type.
	Sequence(Arc<TypeDescriptor>),
	/// Constructed instantiation of an open template, e.g. `Repository<Order>`.
	Generic {
		template: Arc<str>,
		args: Arc<[TypeDescriptor]>,
	},
	/// Open template with unbound parameters, e.g. `Repository<_>`.
	OpenGeneric { template: Arc<str>, arity: usize },
}

impl TypeDescriptor {
	/// Creates a descriptor for a plain named type.
	pub fn named(name: impl Into<Arc<str>>) -> Self {
		Self::Named(name.into())
	}

	/// Creates a descriptor for a Rust type using its [`std::any::type_name`].
	pub fn of<T: ?Sized>() -> Self {
		Self::Named(Arc::from(std::any::type_name::<T>()))
	}

	pub fn array(element: TypeDescriptor) -> Self {
		Self::Array(Arc::new(element))
	}

	pub fn sequence(element: TypeDescriptor) -> Self {
		Self::Sequence(Arc::new(element))
	}

	/// Creates a constructed generic instantiation.
	pub fn generic(
		template: impl Into<Arc<str>>,
		args: impl IntoIterator<Item = TypeDescriptor>,
	) -> Self {
		Self::Generic {
			template: template.into(),
			args: args.into_iter().collect(),
		}
	}

	/// Creates an open template descriptor with `arity` unbound parameters.
	pub fn open(template: impl Into<Arc<str>>, arity: usize) -> Self {
		Self::OpenGeneric {
			template: template.into(),
			arity,
		}
	}

	/// Returns true for array and sequence requests.
	///
	/// These are always satisfied by the enumerable path and never matched as
	/// plain exports.
	pub fn is_collection(&self) -> bool {
		matches!(self, Self::Array(_) | Self::Sequence(_))
	}

	/// Returns the element type of an array or sequence descriptor.
	pub fn element(&self) -> Option<&TypeDescriptor> {
		match self {
			Self::Array(elem) | Self::Sequence(elem) => Some(elem),
			_ => None,
		}
	}

	pub fn is_constructed_generic(&self) -> bool {
		matches!(self, Self::Generic { .. })
	}

	/// Returns the open template this descriptor instantiates.
	pub fn open_template(&self) -> Option<TypeDescriptor> {
		match self {
			Self::Generic { template, args } => Some(Self::OpenGeneric {
				template: template.clone(),
				arity: args.len(),
			}),
			_ => None,
		}
	}

	/// Returns bound type arguments; empty for non-generic descriptors.
	pub fn generic_args(&self) -> &[TypeDescriptor] {
		match self {
			Self::Generic { args, .. } => args,
			_ => &[],
		}
	}
}

impl fmt::Display for TypeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Named(name) => f.write_str(name),
			Self::Array(elem) => write!(f, "[{elem}]"),
			Self::Sequence(elem) => write!(f, "Seq<{elem}>"),
			Self::Generic { template, args } => {
				write!(f, "{template}<")?;
				for (i, arg) in args.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{arg}")?;
				}
				f.write_str(">")
			}
			Self::OpenGeneric { template, arity } => {
				write!(f, "{template}<")?;
				for i in 0..*arity {
					if i > 0 {
						f.write_str(", ")?;
					}
					f.write_str("_")?;
				}
				f.write_str(">")
			}
		}
	}
}

impl fmt::Debug for TypeDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "TypeDescriptor({self})")
	}
}

/// Opaque value distinguishing several strategies exported for one type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LookupKey {
	Name(Arc<str>),
	Index(i64),
}

impl fmt::Display for LookupKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Name(name) => write!(f, "{name:?}"),
			Self::Index(idx) => write!(f, "#{idx}"),
		}
	}
}

impl From<&str> for LookupKey {
	fn from(value: &str) -> Self {
		Self::Name(Arc::from(value))
	}
}

impl From<String> for LookupKey {
	fn from(value: String) -> Self {
		Self::Name(Arc::from(value))
	}
}

impl From<i64> for LookupKey {
	fn from(value: i64) -> Self {
		Self::Index(value)
	}
}
