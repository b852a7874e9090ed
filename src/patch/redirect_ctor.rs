//! Replacing in-place value-type construction with a factory call.
//!
//! A value-type constructor invoked with `call` initializes storage through an address
//! pushed before the arguments:
//!
//! ```text
//!     ldloca.s  V_4          <- anchor
//!     <arg 1> <arg 2> <arg 3>
//!     call      void IntVec3::.ctor(int32, int32, int32)
//! ```
//!
//! [`RedirectConstructorRule`] turns this into a call to a static factory with the same
//! parameters, storing the result into the slot the anchor addressed:
//!
//! ```text
//!     <arg 1> <arg 2> <arg 3>
//!     call      IntVec3 Helpers::Create(int32, int32, int32)
//!     stloc.s   V_4
//! ```
//!
//! The anchor's labels and exception-region markers move to the instruction that
//! followed it, so branches that targeted the anchor now land on the first argument.
//! The constructor call's own metadata stays on the factory call. An occurrence whose
//! anchor cannot be found inside the search window is skipped and reported, never
//! guessed at.

use crate::{
    assembly::{Instruction, InstructionStream, MethodRef},
    patch::{
        events::EventKind,
        matcher::{find_address_of_local_backward, find_call, near_window_boundary, MatchResult},
        rule::{PatchRule, RuleContext, RuleOutcome},
    },
    Error, Result,
};

/// Redirects calls to a value-type constructor to a static factory.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::MethodRef;
/// use cilpatch::patch::{PatchRule, RedirectConstructorRule};
///
/// let ctor = MethodRef::constructor("Verse.IntVec3", &["int32", "int32", "int32"]);
/// let factory = MethodRef::static_method(
///     "CustomMapSizes.CmsIlHelpers",
///     "CreateCustomVector",
///     &["int32", "int32", "int32"],
///     Some("Verse.IntVec3"),
/// );
///
/// let rule = RedirectConstructorRule::new("redirect-intvec3", ctor, factory)?;
/// assert!(rule.match_all());
/// # Ok::<(), cilpatch::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RedirectConstructorRule {
    name: String,
    constructor: MethodRef,
    factory: MethodRef,
    window: Option<usize>,
    match_all: bool,
}

impl RedirectConstructorRule {
    /// Creates a rule that redirects every call to `constructor`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] unless `constructor` is an instance constructor and
    /// `factory` is a static method with the same parameter types that returns a value.
    pub fn new(
        name: impl Into<String>,
        constructor: MethodRef,
        factory: MethodRef,
    ) -> Result<Self> {
        if !constructor.is_constructor() {
            return Err(Error::InvalidRule(format!(
                "{constructor} is not an instance constructor"
            )));
        }
        if factory.has_this {
            return Err(Error::InvalidRule(format!("factory {factory} must be static")));
        }
        if !factory.returns_value() {
            return Err(Error::InvalidRule(format!(
                "factory {factory} must return the constructed value"
            )));
        }
        if factory.parameters != constructor.parameters {
            return Err(Error::InvalidRule(format!(
                "factory {factory} does not take the parameters of {constructor}"
            )));
        }

        Ok(RedirectConstructorRule {
            name: name.into(),
            constructor,
            factory,
            window: None,
            match_all: true,
        })
    }

    /// Overrides the engine's anchor search window for this rule.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    /// Redirects only the first occurrence when `false`.
    #[must_use]
    pub fn with_match_all(mut self, match_all: bool) -> Self {
        self.match_all = match_all;
        self
    }

    /// The constructor being replaced.
    #[must_use]
    pub fn constructor(&self) -> &MethodRef {
        &self.constructor
    }

    /// The factory called instead.
    #[must_use]
    pub fn factory(&self) -> &MethodRef {
        &self.factory
    }

    fn skip(&self, ctx: &RuleContext<'_>, position: usize, reason: &str) {
        ctx.record(EventKind::OccurrenceSkipped, &self.name, position)
            .message(format!("{} left in place: {reason}", self.constructor));
    }
}

impl PatchRule for RedirectConstructorRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &'static str {
        "Replace in-place value-type construction with a factory call and a local store"
    }

    fn match_all(&self) -> bool {
        self.match_all
    }

    fn apply(&self, stream: &mut InstructionStream, ctx: &RuleContext<'_>) -> Result<RuleOutcome> {
        let window = self.window.unwrap_or(ctx.config.anchor_window);
        let mut outcome = RuleOutcome::default();
        let mut from = 0;
        // Anchors of earlier occurrences are never reused
        let mut floor = 0;

        while let MatchResult::Found { position: call } = find_call(stream, &self.constructor, from)
        {
            from = call + 1;

            let MatchResult::Found { position: anchor } =
                find_address_of_local_backward(stream, call, window, floor)
            else {
                self.skip(
                    ctx,
                    call,
                    &format!("no address-of-local anchor within {window} instructions"),
                );
                floor = from;
                continue;
            };

            let Some(slot) = stream.get(anchor).and_then(Instruction::local_slot) else {
                self.skip(ctx, call, "anchor does not name a local slot");
                floor = from;
                continue;
            };

            let distance = call - anchor;
            if near_window_boundary(distance, window, ctx.config.boundary_margin) {
                ctx.record(EventKind::AnchorNearWindowBoundary, &self.name, anchor)
                    .message(format!(
                        "anchor found {distance} instructions before the call, window is {window}"
                    ));
            }

            let relocated = stream.get(anchor).is_some_and(Instruction::has_metadata);
            match stream.remove_relocating(anchor) {
                Ok(_) => {}
                Err(Error::MetadataWouldBeDropped(_)) => {
                    self.skip(ctx, call, "anchor metadata has no instruction to move to");
                    floor = from;
                    continue;
                }
                Err(error) => return Err(error),
            }
            if relocated {
                ctx.record(EventKind::MetadataRelocated, &self.name, anchor)
                    .message("anchor labels moved to the following instruction");
            }

            let call = call - 1;
            stream.replace(call, Instruction::call(self.factory.clone()))?;
            stream.insert(call + 1, Instruction::store_local(slot))?;

            ctx.record(EventKind::ConstructorRedirected, &self.name, call)
                .message(format!("{} -> {} into V_{slot}", self.constructor, self.factory));
            outcome.replacements += 1;

            from = call + 2;
            floor = from;
            if !self.match_all {
                break;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{ExceptionBlock, OpCode},
        patch::{config::EngineConfig, events::EventLog},
        test::{intvec3_ctor, intvec3_factory},
    };

    fn apply_with(
        rule: &RedirectConstructorRule,
        config: &EngineConfig,
        stream: &mut InstructionStream,
    ) -> (usize, EventLog) {
        let events = EventLog::new();
        let method = stream.method().to_string();
        let ctx = RuleContext::new(&method, config, &events);
        let outcome = rule.apply(stream, &ctx).unwrap();
        (outcome.replacements, events)
    }

    fn apply(rule: &RedirectConstructorRule, stream: &mut InstructionStream) -> (usize, EventLog) {
        apply_with(rule, &EngineConfig::default(), stream)
    }

    fn rule() -> RedirectConstructorRule {
        RedirectConstructorRule::new("redirect", intvec3_ctor(), intvec3_factory()).unwrap()
    }

    /// `ldloca.s slot; ldc.i4 x; ldc.i4 y; ldc.i4 z; call .ctor`
    fn push_construction(stream: &mut InstructionStream, slot: u16, padding: usize) {
        stream.push(Instruction::load_local_address(slot));
        for _ in 0..padding {
            stream.push(Instruction::new(OpCode::Nop));
        }
        stream.push(Instruction::load_int(-1));
        stream.push(Instruction::load_int(0));
        stream.push(Instruction::load_int(-1));
        stream.push(Instruction::call(intvec3_ctor()));
    }

    #[test]
    fn test_rule_validation() {
        let not_ctor = MethodRef::instance("Verse.IntVec3", "Set", &["int32", "int32", "int32"], None);
        assert!(matches!(
            RedirectConstructorRule::new("r", not_ctor, intvec3_factory()),
            Err(Error::InvalidRule(_))
        ));

        let instance_factory = MethodRef::instance(
            "Mod.H",
            "Create",
            &["int32", "int32", "int32"],
            Some("Verse.IntVec3"),
        );
        assert!(RedirectConstructorRule::new("r", intvec3_ctor(), instance_factory).is_err());

        let void_factory =
            MethodRef::static_method("Mod.H", "Create", &["int32", "int32", "int32"], None);
        assert!(RedirectConstructorRule::new("r", intvec3_ctor(), void_factory).is_err());

        let short_factory =
            MethodRef::static_method("Mod.H", "Create", &["int32", "int32"], Some("Verse.IntVec3"));
        assert!(RedirectConstructorRule::new("r", intvec3_ctor(), short_factory).is_err());
    }

    #[test]
    fn test_redirects_and_stores_into_anchor_slot() {
        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 4, 0);
        stream.push(Instruction::new(OpCode::Ret));
        let before_delta = stream.stack_delta(0..5).unwrap();

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 1);
        assert_eq!(stream.len(), 6);

        assert_eq!(stream.get(0).unwrap().opcode, OpCode::LdcI4M1);
        assert!(stream.get(3).unwrap().calls(&intvec3_factory()));
        let store = stream.get(4).unwrap();
        assert!(store.opcode.is_store_local());
        assert_eq!(store.local_slot(), Some(4));
        assert!(!stream.iter().any(|i| i.opcode.is_address_of_local()));

        assert_eq!(stream.stack_delta(0..5).unwrap(), before_delta);
        assert_eq!(events.count_kind(EventKind::ConstructorRedirected), 1);
        assert_eq!(events.diagnostics().count(), 0);
    }

    #[test]
    fn test_anchor_metadata_moves_to_successor() {
        let mut stream = InstructionStream::new("T::M");
        let label = stream.define_label();
        stream.push(Instruction::branch(OpCode::Br, label));
        push_construction(&mut stream, 1, 0);
        stream.push(Instruction::new(OpCode::Ret));
        let anchor = stream.get_mut(1).unwrap();
        anchor.labels.push(label);
        anchor.blocks.push(ExceptionBlock::BeginTry);
        let metadata = stream.metadata_count();

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 1);

        let first_arg = stream.get(1).unwrap();
        assert_eq!(first_arg.opcode, OpCode::LdcI4M1);
        assert_eq!(first_arg.labels, vec![label]);
        assert_eq!(first_arg.blocks, vec![ExceptionBlock::BeginTry]);
        assert_eq!(stream.metadata_count(), metadata);
        assert!(stream.dangling_labels().is_empty());
        assert!(events.has(EventKind::MetadataRelocated));
    }

    #[test]
    fn test_call_metadata_stays_on_factory() {
        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 1, 0);
        stream.push(Instruction::new(OpCode::Ret));
        let label = stream.mark_label(4).unwrap();

        apply(&rule(), &mut stream);
        assert_eq!(stream.position_of_label(label), Some(3));
        assert!(stream.get(3).unwrap().calls(&intvec3_factory()));
    }

    #[test]
    fn test_skips_when_anchor_outside_window() {
        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 2, 10);
        stream.push(Instruction::new(OpCode::Ret));
        let original = stream.clone();

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 0);
        assert_eq!(stream, original);
        assert_eq!(events.count_kind(EventKind::OccurrenceSkipped), 1);
    }

    #[test]
    fn test_window_edge_is_inclusive_and_flagged() {
        // 8 padding + 3 args puts the anchor exactly 12 before the call
        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 2, 8);
        stream.push(Instruction::new(OpCode::Ret));

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 1);
        assert_eq!(events.count_kind(EventKind::AnchorNearWindowBoundary), 1);

        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 2, 8);
        let config = EngineConfig::default().with_anchor_window(11);
        let (count, _) = apply_with(&rule(), &config, &mut stream);
        assert_eq!(count, 0);

        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 2, 8);
        let (count, _) = apply_with(&rule().with_window(13), &config, &mut stream);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_skip_continues_to_later_occurrences() {
        let mut stream = InstructionStream::new("T::M");
        // No anchor at all for the first call
        stream.push(Instruction::load_int(-1));
        stream.push(Instruction::load_int(0));
        stream.push(Instruction::load_int(-1));
        stream.push(Instruction::call(intvec3_ctor()));
        push_construction(&mut stream, 3, 0);
        stream.push(Instruction::new(OpCode::Ret));

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 1);
        assert_eq!(events.count_kind(EventKind::OccurrenceSkipped), 1);
        assert!(stream.get(3).unwrap().calls(&intvec3_ctor()));
        assert!(stream.get(7).unwrap().calls(&intvec3_factory()));
        assert_eq!(stream.get(8).unwrap().local_slot(), Some(3));
    }

    #[test]
    fn test_missing_anchor_after_redirect_is_skipped() {
        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 1, 0);
        // Second construction has no anchor of its own
        stream.push(Instruction::load_int(1));
        stream.push(Instruction::load_int(1));
        stream.push(Instruction::load_int(1));
        stream.push(Instruction::call(intvec3_ctor()));
        stream.push(Instruction::new(OpCode::Ret));

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 1);
        assert_eq!(events.count_kind(EventKind::OccurrenceSkipped), 1);
        assert!(stream.get(8).unwrap().calls(&intvec3_ctor()));
    }

    #[test]
    fn test_first_only() {
        let mut stream = InstructionStream::new("T::M");
        push_construction(&mut stream, 1, 0);
        push_construction(&mut stream, 2, 0);

        let (count, _) = apply(&rule().with_match_all(false), &mut stream);
        assert_eq!(count, 1);
        assert!(stream.get(9).unwrap().calls(&intvec3_ctor()));
    }

    #[test]
    fn test_match_all_rewrites_every_occurrence() {
        let mut stream = InstructionStream::new("T::M");
        for slot in 0..3 {
            push_construction(&mut stream, slot, 1);
        }
        stream.push(Instruction::new(OpCode::Ret));

        let (count, events) = apply(&rule(), &mut stream);
        assert_eq!(count, 3);
        assert_eq!(events.count_kind(EventKind::ConstructorRedirected), 3);
        let slots: Vec<_> = stream
            .iter()
            .filter(|i| i.opcode.is_store_local())
            .filter_map(Instruction::local_slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 2]);
        assert!(!stream.iter().any(|i| i.calls(&intvec3_ctor())));
    }
}
