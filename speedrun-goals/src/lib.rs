//! Goals for item speedruns.
//!
//! A goal is an ordered list of atomic [`Predicate`]s: "obtain a stone",
//! "obtain 16 logs of any kind", "get the Diamonds! advancement". Goal
//! authors write a compact declarative form which the [`GoalCompiler`]
//! flattens into predicates, each carrying a display icon.
//!
//! ```text
//! GoalDefinition (JSON) ──► GoalCompiler ──► CompiledGoal { predicates }
//!                                │
//!                         ItemRegistry (host)
//! ```
//!
//! # Key Components
//!
//! - [`ItemStack`]: item-like value with a typed [`Metadata`] bag
//! - [`Predicate`]: item or advancement requirement, tested against [`Evidence`]
//! - [`GoalCompiler`]: definition to predicate list
//! - [`GoalLibrary`]: compiled goals by identifier

pub mod compiler;
pub mod icon;
pub mod library;
pub mod predicate;
pub mod range;
pub mod registry;
pub mod types;

// Re-export main types
pub use compiler::{fingerprint, CompiledGoal, GoalCompiler, GoalDefinition};
pub use icon::{anything_marker, IconState};
pub use library::{GoalLibrary, LoadReport};
pub use predicate::{EnchantmentMatcher, Evidence, ItemMatcher, Predicate};
pub use range::IntRange;
pub use registry::{ItemRegistry, StaticRegistry};
pub use types::*;
