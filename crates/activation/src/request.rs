//! In-flight resolution state.
//!
//! # Role
//!
//! An [`ActivationRequest`] describes one node of an object graph being planned:
//! what type is wanted, why (root, constructor parameter, member, ...), and how
//! deep in the graph it sits. Child requests share the root's
//! injection-context flag so a requirement discovered anywhere in the graph
//! reaches the top-level compilation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::descriptor::{LookupKey, TypeDescriptor};
use crate::error::{ActivationError, Result};

/// Why a type is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
	Root,
	ConstructorParameter,
	Member,
	MethodParameter,
	CollectionElement,
}

/// Ordered list of types from the root request down to the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionChain(pub Vec<TypeDescriptor>);

impl ResolutionChain {
	pub fn types(&self) -> &[TypeDescriptor] {
		&self.0
	}
}

impl fmt::Display for ResolutionChain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, ty) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(" -> ")?;
			}
			write!(f, "{ty}")?;
		}
		Ok(())
	}
}

/// Compile-time view of a request handed to strategy conditions.
///
/// Carries no runtime instance data.
#[derive(Debug, Clone)]
pub struct StaticInjectionContext {
	activation_type: TypeDescriptor,
	depth: usize,
	chain: ResolutionChain,
}

impl StaticInjectionContext {
	pub fn new(activation_type: TypeDescriptor, depth: usize) -> Self {
		Self {
			chain: ResolutionChain(vec![activation_type.clone()]),
			activation_type,
			depth,
		}
	}

	/// Type being located.
	pub fn activation_type(&self) -> &TypeDescriptor {
		&self.activation_type
	}

	pub fn depth(&self) -> usize {
		self.depth
	}

	/// Type whose construction requested this one, if any.
	pub fn injected_into(&self) -> Option<&TypeDescriptor> {
		let types = self.chain.types();
		types.len().checked_sub(2).map(|idx| &types[idx])
	}

	pub fn chain(&self) -> &ResolutionChain {
		&self.chain
	}
}

/// A request for one type within a resolution.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
	activation_type: TypeDescriptor,
	kind: RequestKind,
	depth: usize,
	key: Option<LookupKey>,
	/// Ancestors with the key each was requested under, root first.
	path: Vec<(TypeDescriptor, Option<LookupKey>)>,
	injection_context_required: Arc<AtomicBool>,
}

impl ActivationRequest {
	pub(crate) fn root(activation_type: TypeDescriptor, depth: usize) -> Self {
		Self {
			activation_type,
			kind: RequestKind::Root,
			depth,
			key: None,
			path: Vec::new(),
			injection_context_required: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Creates a request for a dependency of this one, one level deeper.
	pub fn child(&self, activation_type: TypeDescriptor, kind: RequestKind) -> Self {
		let mut path = Vec::with_capacity(self.path.len() + 1);
		path.extend(self.path.iter().cloned());
		path.push((self.activation_type.clone(), self.key.clone()));
		Self {
			activation_type,
			kind,
			depth: self.depth + 1,
			key: None,
			path,
			injection_context_required: Arc::clone(&self.injection_context_required),
		}
	}

	/// Restricts the request to strategies exported under `key`.
	pub fn with_key(mut self, key: Option<LookupKey>) -> Self {
		self.key = key;
		self
	}

	pub fn activation_type(&self) -> &TypeDescriptor {
		&self.activation_type
	}

	pub fn kind(&self) -> RequestKind {
		self.kind
	}

	pub fn depth(&self) -> usize {
		self.depth
	}

	pub fn key(&self) -> Option<&LookupKey> {
		self.key.as_ref()
	}

	/// Marks the whole resolution as needing an ambient injection context.
	pub fn require_injection_context(&self) {
		self.injection_context_required
			.store(true, Ordering::Release);
	}

	pub fn injection_context_required(&self) -> bool {
		self.injection_context_required.load(Ordering::Acquire)
	}

	/// Types from the root request down to this one.
	pub fn resolution_chain(&self) -> ResolutionChain {
		let chain = self
			.path
			.iter()
			.map(|(ty, _)| ty.clone())
			.chain(std::iter::once(self.activation_type.clone()))
			.collect();
		ResolutionChain(chain)
	}

	pub fn static_context(&self) -> StaticInjectionContext {
		StaticInjectionContext {
			activation_type: self.activation_type.clone(),
			depth: self.depth,
			chain: self.resolution_chain(),
		}
	}

	/// Fails when an ancestor already requested this type under the same key.
	pub fn check_cycle(&self) -> Result<()> {
		let repeated = self
			.path
			.iter()
			.any(|(ty, key)| *ty == self.activation_type && *key == self.key);
		if repeated {
			return Err(ActivationError::CircularDependency {
				chain: self.resolution_chain(),
			});
		}
		Ok(())
	}

	/// Fails once the request sits deeper than `max`.
	pub fn check_depth(&self, max: usize) -> Result<()> {
		if self.depth > max {
			return Err(ActivationError::RecursionDepthExceeded {
				max,
				chain: self.resolution_chain(),
			});
		}
		Ok(())
	}
}
