//! The patch rule abstraction.

use crate::{
    assembly::InstructionStream,
    patch::{
        config::EngineConfig,
        events::{EventBuilder, EventKind, EventLog},
    },
    Result,
};

/// What a rule accomplished on one method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Number of sites the rule rewrote
    pub replacements: usize,
}

/// Everything a rule may consult while rewriting one method.
pub struct RuleContext<'a> {
    /// The method being patched, as `Namespace.Type::Name`
    pub method: &'a str,
    /// Engine-wide settings
    pub config: &'a EngineConfig,
    /// Sink for transformation and diagnostic events
    pub events: &'a EventLog,
}

impl<'a> RuleContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(method: &'a str, config: &'a EngineConfig, events: &'a EventLog) -> Self {
        RuleContext {
            method,
            config,
            events,
        }
    }

    /// Starts an event attributed to `rule` at `position` in the current method.
    pub fn record(&self, kind: EventKind, rule: &str, position: usize) -> EventBuilder<'a> {
        self.events.record(kind).at(self.method, position).rule(rule)
    }
}

/// A rewrite of an instruction stream.
///
/// Rules are constructed once, registered with a [`crate::patch::PatchEngine`] for one
/// or more target methods, and applied to each target's stream. A rule that finds
/// nothing to rewrite returns zero replacements and leaves the stream as it was; it does
/// not return an error.
///
/// Implementations must keep every label and exception block attached to some
/// instruction. The engine verifies this after each application when
/// [`EngineConfig::verify_integrity`] is set.
pub trait PatchRule: Send + Sync {
    /// Unique name of the rule, used in events and reports.
    fn name(&self) -> &str;

    /// Short description of what the rule does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Whether every occurrence is rewritten, or only the first.
    fn match_all(&self) -> bool;

    /// Rewrites `stream` in place.
    ///
    /// # Errors
    ///
    /// Errors indicate that the rule could not complete its edits. The engine discards
    /// the partially edited stream in that case.
    fn apply(&self, stream: &mut InstructionStream, ctx: &RuleContext<'_>) -> Result<RuleOutcome>;
}
