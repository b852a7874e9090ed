//! Observing the receiver of a call once the call has returned.
//!
//! [`InsertAfterCallRule`] rewrites
//!
//! ```text
//!     <receiver on stack>
//!     callvirt Target
//! ```
//!
//! into
//!
//! ```text
//!     dup
//!     callvirt Target
//!     call Hook(receiver)
//! ```
//!
//! Any labels that pointed at the original call move to the `dup`, so branches into the
//! sequence still see the receiver duplicated. Exception-region markers stay on the call.
//! The net stack effect of the sequence is unchanged.

use crate::{
    assembly::{Instruction, InstructionStream, MethodRef, OpCode},
    patch::{
        events::EventKind,
        matcher::{find_call, MatchResult},
        rule::{PatchRule, RuleContext, RuleOutcome},
    },
    Error, Result,
};

/// Inserts a call to a one-argument hook right after each matched call, passing it the
/// same receiver the matched call consumed.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::MethodRef;
/// use cilpatch::patch::{InsertAfterCallRule, PatchRule};
///
/// let target = MethodRef::instance("Verse.Listing", "NewColumn", &[], None);
/// let hook = MethodRef::static_method("Mod.Hooks", "AfterColumn", &["Verse.Listing"], None);
///
/// let rule = InsertAfterCallRule::new("column-hook", target, hook)?;
/// assert!(!rule.match_all());
/// # Ok::<(), cilpatch::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct InsertAfterCallRule {
    name: String,
    target: MethodRef,
    hook: MethodRef,
    match_all: bool,
}

impl InsertAfterCallRule {
    /// Creates a rule that hooks the first call to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] if
    /// - `target` is not a parameterless instance method returning `void`, so the value on
    ///   top of the stack before the call is not its receiver
    /// - `hook` does not consume exactly one value and leave nothing behind, i.e. is not a
    ///   static `void Hook(T)` or an instance `void T::Hook()`
    pub fn new(name: impl Into<String>, target: MethodRef, hook: MethodRef) -> Result<Self> {
        if !target.has_this || target.arity() != 0 || target.returns_value() {
            return Err(Error::InvalidRule(format!(
                "target {target} must be a parameterless instance method returning void"
            )));
        }

        let behavior = hook.stack_behavior(OpCode::Call);
        if behavior.pops != 1 || behavior.pushes != 0 {
            return Err(Error::InvalidRule(format!(
                "hook {hook} must take exactly the receiver and return nothing"
            )));
        }

        Ok(InsertAfterCallRule {
            name: name.into(),
            target,
            hook,
            match_all: false,
        })
    }

    /// Hooks every call to the target instead of only the first.
    #[must_use]
    pub fn with_match_all(mut self, match_all: bool) -> Self {
        self.match_all = match_all;
        self
    }

    /// The call being observed.
    #[must_use]
    pub fn target(&self) -> &MethodRef {
        &self.target
    }

    /// The method invoked after the target.
    #[must_use]
    pub fn hook(&self) -> &MethodRef {
        &self.hook
    }
}

impl PatchRule for InsertAfterCallRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &'static str {
        "Duplicate a call's receiver and pass it to a hook after the call returns"
    }

    fn match_all(&self) -> bool {
        self.match_all
    }

    fn apply(&self, stream: &mut InstructionStream, ctx: &RuleContext<'_>) -> Result<RuleOutcome> {
        let mut outcome = RuleOutcome::default();
        let mut from = 0;

        while let MatchResult::Found { position } = find_call(stream, &self.target, from) {
            let labels = stream
                .get_mut(position)
                .map(|call| std::mem::take(&mut call.labels))
                .unwrap_or_default();
            stream.insert(position, Instruction::new(OpCode::Dup))?;
            if let Some(dup) = stream.get_mut(position) {
                dup.labels = labels;
            }
            stream.insert(position + 2, Instruction::call(self.hook.clone()))?;

            ctx.record(EventKind::CallHookInserted, &self.name, position)
                .message(format!("{} now follows {}", self.hook, self.target));
            outcome.replacements += 1;

            if !self.match_all {
                break;
            }
            from = position + 3;
        }

        Ok(outcome)
    }
}
