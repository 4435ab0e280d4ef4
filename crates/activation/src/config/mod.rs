//! Scope configuration.
//!
//! Loaded from TOML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```toml
//! cache_size = 128
//! auto_register_unknown = false
//!
//! [behaviors]
//! max_object_graph_depth = 40
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;


/// Settings that shape how plans are built and compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationBehaviors {
	/// Hard ceiling on request depth while building a plan.
	pub max_object_graph_depth: usize,
}

impl Default for CompilationBehaviors {
	fn default() -> Self {
		Self {
			max_object_graph_depth: 100,
		}
	}
}

/// Configuration for one injection scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfiguration {
	pub behaviors: CompilationBehaviors,
	/// Initial capacity of the scope's located-delegate cache.
	pub cache_size: usize,
	/// Initial capacity of each strategy catalog.
	pub catalog_size: usize,
	/// Installs the concrete-type provider so known concrete types are
	/// registered on first request.
	pub auto_register_unknown: bool,
}

impl Default for ScopeConfiguration {
	fn default() -> Self {
		Self {
			behaviors: CompilationBehaviors::default(),
			cache_size: 64,
			catalog_size: 16,
			auto_register_unknown: true,
		}
	}
}

impl ScopeConfiguration {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks size hints and the depth ceiling.
	pub fn validate(&self) -> Result<(), ConfigError> {
		check_power_of_two("cache_size", self.cache_size)?;
		check_power_of_two("catalog_size", self.catalog_size)?;
		if self.behaviors.max_object_graph_depth == 0 {
			return Err(ConfigError::ZeroDepth);
		}
		Ok(())
	}

	pub fn max_object_graph_depth(&self) -> usize {
		self.behaviors.max_object_graph_depth
	}
}

fn check_power_of_two(field: &'static str, value: usize) -> Result<(), ConfigError> {
	if value.is_power_of_two() {
		Ok(())
	} else {
		Err(ConfigError::NotPowerOfTwo { field, value })
	}
}
