use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::request::ResolutionChain;

/// Error type returned by user constructors, member setters and providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = ActivationError> = std::result::Result<T, E>;

/// Resolution and activation failures.
///
/// A missing strategy is not an error: lookups report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
	/// The plan references a node the compiler cannot lower.
	#[error("malformed construction plan for {ty}: {reason}")]
	MalformedPlan { ty: TypeDescriptor, reason: String },

	/// A missing-strategy provider failed during escalation.
	#[error("missing-strategy provider {provider} failed: {source}")]
	Provider {
		provider: String,
		#[source]
		source: BoxError,
	},

	/// A type depends on itself through its own dependency chain.
	#[error("circular dependency: {chain}")]
	CircularDependency { chain: ResolutionChain },

	#[error("object graph depth limit {max} exceeded: {chain}")]
	RecursionDepthExceeded { max: usize, chain: ResolutionChain },

	/// A dependency required while building a plan has no strategy.
	#[error("no strategy can satisfy {ty}: {chain}")]
	MissingDependency {
		ty: TypeDescriptor,
		chain: ResolutionChain,
	},

	#[error("type mismatch in {context}: expected {expected}")]
	TypeMismatch {
		expected: &'static str,
		context: String,
	},

	#[error("injection context has no value named {name:?}")]
	MissingContextValue { name: Arc<str> },

	/// A user constructor, member setter or method returned an error.
	#[error("activation of {ty} failed: {source}")]
	Construction {
		ty: TypeDescriptor,
		#[source]
		source: BoxError,
	},
}

impl ActivationError {
	pub(crate) fn malformed(ty: &TypeDescriptor, reason: impl Into<String>) -> Self {
		Self::MalformedPlan {
			ty: ty.clone(),
			reason: reason.into(),
		}
	}
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to parse scope configuration: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("{field} must be a positive power of two, got {value}")]
	NotPowerOfTwo { field: &'static str, value: usize },

	#[error("max_object_graph_depth must be at least 1")]
	ZeroDepth,
}
