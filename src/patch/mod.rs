//! Load-time rewriting of method bodies.
//!
//! A patch is a [`PatchRule`] registered with a [`PatchEngine`] for a target method. Two
//! rules are provided:
//!
//! - [`InsertAfterCallRule`] - observe a call's receiver right after the call
//! - [`RedirectConstructorRule`] - replace in-place value-type construction with a
//!   factory call
//!
//! Rules locate their sites with [`find_call`] and [`find_address_of_local_backward`], report
//! what they did through the [`EventLog`], and never lose labels or exception-region
//! markers. The engine enforces the latter when [`EngineConfig::verify_integrity`] is set.

mod config;
mod engine;
mod events;
mod insert_after_call;
mod matcher;
mod redirect_ctor;
mod rule;

pub use config::{EngineConfig, DEFAULT_ANCHOR_WINDOW, DEFAULT_BOUNDARY_MARGIN};
pub use engine::{PatchEngine, PatchReport, RuleReport};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use insert_after_call::InsertAfterCallRule;
pub use matcher::{find_address_of_local_backward, find_call, near_window_boundary, MatchResult};
pub use redirect_ctor::RedirectConstructorRule;
pub use rule::{PatchRule, RuleContext, RuleOutcome};
