//! Symbolic method references.
//!
//! A [`MethodRef`] identifies a method by declaring type, name and signature. Two
//! references are equal exactly when all of these agree, which is how the matcher decides
//! whether a call targets the method a rule is looking for.

use std::fmt;

use crate::assembly::{instruction::StackBehavior, opcodes::OpCode};

/// Name used by the runtime for instance constructors.
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Reference to a method by declaring type, name and signature.
///
/// Parameter and return types are kept as their fully qualified names (`"int32"`,
/// `"Verse.IntVec3"`), which is sufficient for signature equality.
///
/// # Examples
///
/// ```rust
/// use cilpatch::assembly::MethodRef;
///
/// let ctor = MethodRef::constructor("Verse.IntVec3", &["int32", "int32", "int32"]);
/// assert!(ctor.is_constructor());
/// assert_eq!(ctor.arity(), 3);
/// assert_eq!(ctor.to_string(), "void Verse.IntVec3::.ctor(int32, int32, int32)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Fully qualified declaring type
    pub declaring_type: String,
    /// Method name, `.ctor` for constructors
    pub name: String,
    /// Fully qualified parameter types, excluding `this`
    pub parameters: Vec<String>,
    /// Fully qualified return type, `None` for `void`
    pub return_type: Option<String>,
    /// Whether the method takes an implicit `this`
    pub has_this: bool,
}

impl MethodRef {
    fn build(
        declaring_type: &str,
        name: &str,
        parameters: &[&str],
        return_type: Option<&str>,
        has_this: bool,
    ) -> Self {
        MethodRef {
            declaring_type: declaring_type.to_string(),
            name: name.to_string(),
            parameters: parameters.iter().map(|p| (*p).to_string()).collect(),
            return_type: return_type.map(str::to_string),
            has_this,
        }
    }

    /// Reference to an instance method.
    #[must_use]
    pub fn instance(
        declaring_type: &str,
        name: &str,
        parameters: &[&str],
        return_type: Option<&str>,
    ) -> Self {
        Self::build(declaring_type, name, parameters, return_type, true)
    }

    /// Reference to a static method.
    #[must_use]
    pub fn static_method(
        declaring_type: &str,
        name: &str,
        parameters: &[&str],
        return_type: Option<&str>,
    ) -> Self {
        Self::build(declaring_type, name, parameters, return_type, false)
    }

    /// Reference to an instance constructor.
    #[must_use]
    pub fn constructor(declaring_type: &str, parameters: &[&str]) -> Self {
        Self::build(declaring_type, CONSTRUCTOR_NAME, parameters, None, true)
    }

    /// Whether this references an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.has_this && self.name == CONSTRUCTOR_NAME
    }

    /// Number of declared parameters, excluding `this`.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Whether a call leaves a value on the stack.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_type.is_some()
    }

    /// `Namespace.Type::Name`, the form used to key patch targets.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }

    /// Stack effect of invoking this method with the given call-family opcode.
    ///
    /// `newobj` consumes the declared arguments and pushes the new object; `call` and
    /// `callvirt` additionally consume `this` for instance methods and push the return
    /// value, if any.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn stack_behavior(&self, opcode: OpCode) -> StackBehavior {
        let args = self.arity().min(usize::from(u8::MAX - 1)) as u8;
        if opcode == OpCode::Newobj {
            return StackBehavior::new(args, 1);
        }
        let pops = if self.has_this { args + 1 } else { args };
        let pushes = u8::from(self.returns_value());
        StackBehavior::new(pops, pushes)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {}::{}({})",
            if self.has_this && !self.is_constructor() {
                "instance "
            } else {
                ""
            },
            self.return_type.as_deref().unwrap_or("void"),
            self.declaring_type,
            self.name,
            self.parameters.join(", ")
        )
    }
}
