//! Event log for patch application.
//!
//! Every transformation a rule performs and every situation in which a rule could not do
//! its job is recorded as an [`Event`]. Events are appended through [`EventLog::record`],
//! which returns an [`EventBuilder`]; the event lands in the log (and is forwarded to the
//! [`log`] facade at the kind's [`log::Level`]) when the builder is dropped.
//!
//! Diagnostics never abort patching. A rule that finds nothing to patch leaves the method
//! untouched and records why, so the host keeps running with its original behavior.

use std::{collections::HashMap, fmt};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A call to a hook was inserted after a matched call.
    CallHookInserted,
    /// A constructor call was replaced by a factory call plus a store.
    ConstructorRedirected,
    /// Labels or exception blocks were moved off a removed instruction.
    MetadataRelocated,

    /// A rule made zero replacements in its target method.
    RuleNoMatch,
    /// One occurrence of a rule's target was left untouched.
    OccurrenceSkipped,
    /// An anchor was found close to the edge of the backward search window.
    AnchorNearWindowBoundary,
    /// A rule failed or broke stream integrity; its edits were discarded.
    RuleAborted,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::CallHookInserted => "call hook inserted",
            Self::ConstructorRedirected => "constructor redirected",
            Self::MetadataRelocated => "metadata relocated",
            Self::RuleNoMatch => "rule made no replacements",
            Self::OccurrenceSkipped => "occurrence skipped",
            Self::AnchorNearWindowBoundary => "anchor near window boundary",
            Self::RuleAborted => "rule aborted",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::CallHookInserted | Self::ConstructorRedirected | Self::MetadataRelocated
        )
    }

    /// Returns true if this is a diagnostic event.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        !self.is_transformation()
    }

    /// Level the event is forwarded to the [`log`] facade at.
    #[must_use]
    pub fn level(&self) -> log::Level {
        match self {
            Self::CallHookInserted | Self::ConstructorRedirected => log::Level::Debug,
            Self::MetadataRelocated => log::Level::Trace,
            Self::RuleNoMatch | Self::OccurrenceSkipped | Self::AnchorNearWindowBoundary => {
                log::Level::Warn
            }
            Self::RuleAborted => log::Level::Error,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The method the event occurred in, as `Namespace.Type::Name`.
    pub method: Option<String>,
    /// Name of the rule that produced the event.
    pub rule: Option<String>,
    /// Instruction position within the method.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "[{method}] ")?;
        }
        if let Some(rule) = &self.rule {
            write!(f, "{rule}: ")?;
        }
        f.write_str(&self.message)?;
        if let Some(location) = self.location {
            write!(f, " (at {location})")?;
        }
        Ok(())
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the builder is
/// dropped.
///
/// # Example
///
/// ```rust
/// use cilpatch::patch::{EventKind, EventLog};
///
/// let log = EventLog::new();
/// log.record(EventKind::OccurrenceSkipped)
///     .at("Verse.Game::InitNewGame", 42)
///     .rule("redirect-intvec3")
///     .message("no address-of-local anchor within 12 instructions");
///
/// assert_eq!(log.count_kind(EventKind::OccurrenceSkipped), 1);
/// ```
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    method: Option<String>,
    rule: Option<String>,
    location: Option<usize>,
    message: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            method: None,
            rule: None,
            location: None,
            message: None,
        }
    }

    /// Sets the method and instruction position where the event occurred.
    pub fn at(mut self, method: impl Into<String>, location: usize) -> Self {
        self.method = Some(method.into());
        self.location = Some(location);
        self
    }

    /// Sets only the method (for method-level events without specific location).
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the instruction position.
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Associates this event with a rule.
    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            method: self.method.take(),
            rule: self.rule.take(),
            location: self.location.take(),
            message,
        };

        log::log!(self.kind.level(), "{event}");
        self.log.events.push(event);
    }
}

/// Collection of events from patch application.
///
/// Append-only and safe to record into through a shared reference.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Appends clones of all events of `other`, without forwarding them to [`log`] again.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Appends clones of the diagnostic events of `other`.
    pub fn merge_diagnostics(&self, other: &EventLog) {
        for event in other.diagnostics() {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events produced by a specific rule.
    pub fn filter_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter().filter(move |e| e.rule.as_deref() == Some(rule))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_diagnostic())
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();
        parts.sort();
        parts.join(", ")
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = Box<dyn Iterator<Item = &'a Event> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_on_drop() {
        let log = EventLog::new();
        assert!(log.is_empty());

        log.record(EventKind::CallHookInserted)
            .at("A::B", 3)
            .rule("hook");
        log.record(EventKind::RuleNoMatch).method("A::C");
        log.record(EventKind::OccurrenceSkipped)
            .at("A::D", 7)
            .location(8)
            .rule("redirect")
            .message("left in place");

        assert_eq!(log.len(), 3);
        let last = log.iter().last().unwrap();
        assert_eq!(last.to_string(), "[A::D] redirect: left in place (at 8)");
        let first = log.iter().next().unwrap();
        assert_eq!(first.message, "call hook inserted");
        assert_eq!(first.location, Some(3));
        assert_eq!(first.to_string(), "[A::B] hook: call hook inserted (at 3)");
    }

    #[test]
    fn test_classification() {
        assert!(EventKind::ConstructorRedirected.is_transformation());
        assert!(!EventKind::ConstructorRedirected.is_diagnostic());
        assert!(EventKind::AnchorNearWindowBoundary.is_diagnostic());
        assert_eq!(EventKind::RuleAborted.level(), log::Level::Error);
        assert_eq!(EventKind::OccurrenceSkipped.level(), log::Level::Warn);
    }

    #[test]
    fn test_queries() {
        let log = EventLog::new();
        log.record(EventKind::ConstructorRedirected).rule("a");
        log.record(EventKind::ConstructorRedirected).rule("a");
        log.record(EventKind::OccurrenceSkipped).rule("b");

        assert!(log.has(EventKind::OccurrenceSkipped));
        assert!(!log.has(EventKind::RuleAborted));
        assert_eq!(log.count_kind(EventKind::ConstructorRedirected), 2);
        assert_eq!(log.transformations().count(), 2);
        assert_eq!(log.diagnostics().count(), 1);
        assert_eq!(log.filter_rule("a").count(), 2);
        assert_eq!(
            log.summary(),
            "1 occurrence skipped, 2 constructor redirected"
        );
        assert_eq!(EventLog::new().summary(), "no events");
    }

    #[test]
    fn test_merge() {
        let scratch = EventLog::new();
        scratch.record(EventKind::CallHookInserted);
        scratch.record(EventKind::OccurrenceSkipped);

        let all = EventLog::new();
        all.merge(&scratch);
        assert_eq!(all.len(), 2);

        let diagnostics_only = EventLog::new();
        diagnostics_only.merge_diagnostics(&scratch);
        assert_eq!(diagnostics_only.len(), 1);
        assert!(diagnostics_only.has(EventKind::OccurrenceSkipped));

        let cloned = all.clone();
        assert_eq!(cloned.len(), 2);
    }
}
