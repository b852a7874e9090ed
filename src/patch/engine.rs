//! Applying registered rules to method bodies.
//!
//! The [`PatchEngine`] holds, per target method, an ordered list of rules. Patching a
//! method runs each rule against a copy of the current stream; the copy replaces the
//! stream only if the rule succeeded and, when enabled, the result passes the integrity
//! check. A failing rule therefore never leaves a half-edited method behind, and later
//! rules still run.

use crate::{
    assembly::InstructionStream,
    patch::{
        config::EngineConfig,
        events::{EventKind, EventLog},
        rule::{PatchRule, RuleContext},
    },
};

/// Result of one rule on one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleReport {
    /// Rule name
    pub rule: String,
    /// Sites rewritten; 0 when nothing matched or the rule was aborted
    pub replacements: usize,
    /// Whether the rule's edits were discarded
    pub aborted: bool,
}

/// Result of patching one method.
#[derive(Debug, Clone)]
pub struct PatchReport {
    /// The patched stream, identical to the input when nothing applied
    pub stream: InstructionStream,
    /// Per-rule results, in registration order
    pub rules: Vec<RuleReport>,
    /// Everything recorded while patching this method
    pub events: EventLog,
}

impl PatchReport {
    /// Replacement count of the named rule.
    #[must_use]
    pub fn replacements(&self, rule: &str) -> Option<usize> {
        self.rules
            .iter()
            .find(|report| report.rule == rule)
            .map(|report| report.replacements)
    }

    /// Sum of all rules' replacement counts.
    #[must_use]
    pub fn total_replacements(&self) -> usize {
        self.rules.iter().map(|report| report.replacements).sum()
    }

    /// Whether any rule changed the stream.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.total_replacements() > 0
    }

    /// Whether any diagnostic was recorded.
    #[must_use]
    pub fn has_diagnostics(&self) -> bool {
        self.events.diagnostics().next().is_some()
    }
}

struct Target {
    method: String,
    rules: Vec<Box<dyn PatchRule>>,
}

/// Applies registered [`PatchRule`]s to method bodies.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::{Instruction, InstructionStream, MethodRef, OpCode};
/// use cilpatch::patch::{EngineConfig, InsertAfterCallRule, PatchEngine};
///
/// let target = MethodRef::instance("Verse.Listing", "NewColumn", &[], None);
/// let hook = MethodRef::static_method("Mod.Hooks", "AfterColumn", &["Verse.Listing"], None);
///
/// let mut engine = PatchEngine::new(EngineConfig::default());
/// engine.register("Demo::Draw", InsertAfterCallRule::new("column-hook", target.clone(), hook)?);
///
/// let mut stream = InstructionStream::new("Demo::Draw");
/// stream.push(Instruction::new(OpCode::Ldarg1));
/// stream.push(Instruction::callvirt(target));
/// stream.push(Instruction::new(OpCode::Ret));
///
/// let report = engine.patch_method(stream);
/// assert_eq!(report.replacements("column-hook"), Some(1));
/// assert_eq!(report.stream.len(), 5);
/// # Ok::<(), cilpatch::Error>(())
/// ```
pub struct PatchEngine {
    config: EngineConfig,
    targets: Vec<Target>,
}

impl PatchEngine {
    /// Creates an engine without any registered rules.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        PatchEngine {
            config,
            targets: Vec::new(),
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers `rule` for `method` (`Namespace.Type::Name`). Rules for the same method
    /// run in registration order.
    pub fn register<R>(&mut self, method: impl Into<String>, rule: R) -> &mut Self
    where
        R: PatchRule + 'static,
    {
        let method = method.into();
        match self.targets.iter_mut().find(|target| target.method == method) {
            Some(target) => target.rules.push(Box::new(rule)),
            None => self.targets.push(Target {
                method,
                rules: vec![Box::new(rule)],
            }),
        }
        self
    }

    /// Methods with at least one registered rule, in registration order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|target| target.method.as_str())
    }

    /// Names of the rules registered for `method`.
    #[must_use]
    pub fn rules_for(&self, method: &str) -> Vec<&str> {
        self.targets
            .iter()
            .find(|target| target.method == method)
            .map(|target| target.rules.iter().map(|rule| rule.name()).collect())
            .unwrap_or_default()
    }

    /// Applies the rules registered for the stream's method.
    ///
    /// Never fails: rules that error or break integrity are discarded and reported as
    /// [`EventKind::RuleAborted`], and rules that find nothing are reported as
    /// [`EventKind::RuleNoMatch`]. A stream with no registered rules is returned as is.
    #[must_use]
    pub fn patch_method(&self, stream: InstructionStream) -> PatchReport {
        let events = EventLog::new();
        let mut stream = stream;
        let mut reports = Vec::new();

        let Some(target) = self
            .targets
            .iter()
            .find(|target| target.method == stream.method())
        else {
            return PatchReport {
                stream,
                rules: reports,
                events,
            };
        };

        for rule in &target.rules {
            let report = self.apply_rule(rule.as_ref(), &mut stream, &events);
            reports.push(report);
        }

        log::info!("[{}] patched: {}", target.method, events.summary());

        PatchReport {
            stream,
            rules: reports,
            events,
        }
    }

    /// Patches every stream, in order.
    pub fn patch_all<I>(&self, streams: I) -> Vec<PatchReport>
    where
        I: IntoIterator<Item = InstructionStream>,
    {
        streams
            .into_iter()
            .map(|stream| self.patch_method(stream))
            .collect()
    }

    fn apply_rule(
        &self,
        rule: &dyn PatchRule,
        stream: &mut InstructionStream,
        events: &EventLog,
    ) -> RuleReport {
        let method = stream.method().to_string();
        let scratch = EventLog::new();
        let ctx = RuleContext::new(&method, &self.config, &scratch);
        let mut working = stream.clone();

        let result = rule
            .apply(&mut working, &ctx)
            .map_err(|error| error.to_string())
            .and_then(|outcome| {
                if self.config.verify_integrity {
                    Self::verify(stream, &working)?;
                }
                Ok(outcome)
            });

        match result {
            Ok(outcome) => {
                events.merge(&scratch);
                if outcome.replacements == 0 {
                    events
                        .record(EventKind::RuleNoMatch)
                        .method(method.as_str())
                        .rule(rule.name())
                        .message("no replacements made, original behavior retained");
                }
                *stream = working;
                RuleReport {
                    rule: rule.name().to_string(),
                    replacements: outcome.replacements,
                    aborted: false,
                }
            }
            Err(reason) => {
                events.merge_diagnostics(&scratch);
                events
                    .record(EventKind::RuleAborted)
                    .method(method.as_str())
                    .rule(rule.name())
                    .message(format!("edits discarded: {reason}"));
                RuleReport {
                    rule: rule.name().to_string(),
                    replacements: 0,
                    aborted: true,
                }
            }
        }
    }

    /// Labels and exception blocks are conserved and no branch lost its target.
    fn verify(before: &InstructionStream, after: &InstructionStream) -> Result<(), String> {
        let (expected, actual) = (before.metadata_count(), after.metadata_count());
        if expected != actual {
            return Err(format!(
                "control-flow metadata not preserved ({expected} attached before, {actual} after)"
            ));
        }

        let known = before.dangling_labels();
        let introduced: Vec<String> = after
            .dangling_labels()
            .into_iter()
            .filter(|label| !known.contains(label))
            .map(|label| label.to_string())
            .collect();
        if !introduced.is_empty() {
            return Err(format!(
                "branches target unattached labels: {}",
                introduced.join(", ")
            ));
        }
        Ok(())
    }
}
