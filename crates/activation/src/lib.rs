#![cfg_attr(doc, allow(rustdoc::private_intra_doc_links))]
//! Strategy resolution and delegate compilation for dependency injection.
//!
//! # Purpose
//!
//! Given a requested [`TypeDescriptor`] and an optional [`LookupKey`], this
//! crate finds the registered [`Strategy`] able to produce it, turns the
//! strategy into a compiled [`ActivationDelegate`] and caches the delegate so
//! later requests pay no further resolution cost.
//!
//! # Mental Model
//!
//! 1. **Registration:** strategies land in one of three copy-on-write
//!    catalogs (export, wrapper, decorator) owned by an [`InjectionScope`].
//! 2. **Lookup:** [`ActivationStrategyCompiler::find_delegate`] walks the lookup
//!    tiers without locking. On a miss it takes the scope's strategy-mutation
//!    lock, re-checks, asks the [`MissingStrategyProvider`]s and re-checks again.
//! 3. **Planning:** a [`PlanBuilder`] turns the chosen strategy into a
//!    [`ConstructionPlan`].
//! 4. **Lowering:** the compiler lowers the plan into a closure over
//!    (scope, root disposal scope, ambient [`InjectionContext`]).
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`InjectionScope`] | Owns catalogs, providers, locks and the delegate cache. |
//! | [`ActivationStrategyCompiler`] | Lookup tiers, escalation, plan lowering. |
//! | [`StrategyCatalog`] | Lock-free snapshot index from descriptor to strategies. |
//! | [`ConstructionPlan`] | Node tree plus locals and statements handed to the compiler. |
//! | [`ActivationDelegate`] | Immutable compiled activation function. |
//!
//! # Invariants
//!
//! - Fast-path lookups and delegate invocation never take the scope lock.
//!   - Enforced in: [`ActivationStrategyCompiler::find_delegate`], [`StrategyCatalog::get`].
//!   - Tested by: `compiler::tests::escalation_runs_once_then_fast_path`,
//!     `scope::tests::fast_path_and_invocation_proceed_while_another_thread_holds_the_lock`
//!   - Failure symptom: every resolution serializes behind registration.
//!
//! - A missing strategy is `Ok(None)`, never an error.
//!   - Enforced in: [`ActivationStrategyCompiler::find_delegate`].
//!   - Tested by: `scope::tests::unknown_type_locates_none`
//!   - Failure symptom: optional dependencies abort resolution.

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod context;
pub mod delegate;
pub mod descriptor;
pub mod error;
pub mod plan;
pub mod provider;
pub mod request;
pub mod scope;
pub mod strategy;

#[cfg(test)]
mod test_fixtures;

#[doc(hidden)]
pub use inventory;

pub use catalog::{CatalogSnapshot, Collision, CollisionKind, StrategyCatalog, StrategyCollection};
pub use compiler::ActivationStrategyCompiler;
pub use config::{CompilationBehaviors, ScopeConfiguration};
pub use context::{DefaultInjectionContextCreator, InjectionContext, InjectionContextCreator};
pub use delegate::{ActivationDelegate, Boxed, Instance};
pub use descriptor::{LookupKey, TypeDescriptor};
pub use error::{ActivationError, BoxError, ConfigError, Result};
pub use plan::{ConstructionPlan, DefaultPlanBuilder, PlanBuilder, PlanNode, Statement};
pub use provider::{ConcreteStrategyProvider, FnProvider, MissingStrategyProvider};
pub use request::{ActivationRequest, RequestKind, ResolutionChain, StaticInjectionContext};
pub use scope::{
	ACTIVATION_STRATEGY_ADD_LOCK, CatalogStamp, DisposalScope, InjectionScope, RootDisposalScope,
	ScopeBuilder, ScopeLocks,
};
pub use strategy::{
	Activation, Args, Condition, Dependency, MemberRef, MethodRef, Strategy, StrategyBuilder,
	StrategyDef, StrategyKind, StrategySource, WhenDepthAtMost, WhenInjectedInto,
};
