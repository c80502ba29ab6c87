use std::fmt;

use serde::Serialize;

use crate::source::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warning",
            LogLevel::Error => "error",
        })
    }
}

/// The stage of compilation a message template belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Staging,
    Typing,
    Checking,
    Interpretation,
}

/// Every message the typer can log. Payloads are already rendered so that
/// entries stay independent of the tree they were produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MessageTemplate {
    ExpectedValueOfType { expected: String, actual: String },
    MissingMemberVisibility { member: String, defined_in: String },
    NoStaticPropertyVisible { member: String, type_name: String },
    NoSuchMember { member: String, type_name: String },
    IncompatibleUsage { member: String, defined_in: String },
    UseBeforeInitialization { name: String, positions: String },
    ArityMismatch { expected: usize },
    NoSignatureMatches,
    SignatureInputMismatch {
        signature: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    RedundantArgument,
    MissingDeclaration { name: String },
    MissingType { name: String },
    ActualNotInBounds {
        formal: String,
        actual: String,
        bounds: Vec<String>,
    },
    IllegalAssignment { target: String, source: String },
    ExpectedSubType { expected: String, actual: String },
    ExpectedFunctionType { actual: String },
    ReturnTypeRequired,
    ExpectedNoBubble,
    DivByZero,
    InvalidTypeMention { ty: String },
    InvalidVariantMention { variant: String },
}

impl MessageTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            MessageTemplate::ExpectedValueOfType { .. } => "ExpectedValueOfType",
            MessageTemplate::MissingMemberVisibility { .. } => "MissingMemberVisibility",
            MessageTemplate::NoStaticPropertyVisible { .. } => "NoStaticPropertyVisible",
            MessageTemplate::NoSuchMember { .. } => "NoSuchMember",
            MessageTemplate::IncompatibleUsage { .. } => "IncompatibleUsage",
            MessageTemplate::UseBeforeInitialization { .. } => "UseBeforeInitialization",
            MessageTemplate::ArityMismatch { .. } => "ArityMismatch",
            MessageTemplate::NoSignatureMatches => "NoSignatureMatches",
            MessageTemplate::SignatureInputMismatch { .. } => "SignatureInputMismatch",
            MessageTemplate::RedundantArgument => "RedundantArgument",
            MessageTemplate::MissingDeclaration { .. } => "MissingDeclaration",
            MessageTemplate::MissingType { .. } => "MissingType",
            MessageTemplate::ActualNotInBounds { .. } => "ActualNotInBounds",
            MessageTemplate::IllegalAssignment { .. } => "IllegalAssignment",
            MessageTemplate::ExpectedSubType { .. } => "ExpectedSubType",
            MessageTemplate::ExpectedFunctionType { .. } => "ExpectedFunctionType",
            MessageTemplate::ReturnTypeRequired => "ReturnTypeRequired",
            MessageTemplate::ExpectedNoBubble => "ExpectedNoBubble",
            MessageTemplate::DivByZero => "DivByZero",
            MessageTemplate::InvalidTypeMention { .. } => "InvalidTypeMention",
            MessageTemplate::InvalidVariantMention { .. } => "InvalidVariantMention",
        }
    }

    pub fn format_string(&self) -> &'static str {
        match self {
            MessageTemplate::ExpectedValueOfType { .. } => "Expected value of type %s not %s",
            MessageTemplate::MissingMemberVisibility { .. } => {
                "Member %s defined in %s not publicly accessible"
            }
            MessageTemplate::NoStaticPropertyVisible { .. } => {
                "No static property %s visible in %s"
            }
            MessageTemplate::NoSuchMember { .. } => "No member %s in %s",
            MessageTemplate::IncompatibleUsage { .. } => {
                "Member %s defined in %s incompatible with usage"
            }
            MessageTemplate::UseBeforeInitialization { .. } => {
                "%s is not initialized along branches at %s"
            }
            MessageTemplate::ArityMismatch { .. } => "Wrong number of arguments.  Expected %d",
            MessageTemplate::NoSignatureMatches => "No signature matches",
            MessageTemplate::SignatureInputMismatch { .. } => {
                "Actual arguments do not match signature: %s expected [%s], but got [%s]"
            }
            MessageTemplate::RedundantArgument => "Argument passed but it matches no parameter",
            MessageTemplate::MissingDeclaration { .. } => "No declaration for %s",
            MessageTemplate::MissingType { .. } => "No type for %s",
            MessageTemplate::ActualNotInBounds { .. } => {
                "Type formal <%s> cannot bind to %s which does not fit upper bounds [%s]"
            }
            MessageTemplate::IllegalAssignment { .. } => "Cannot assign to %s from %s",
            MessageTemplate::ExpectedSubType { .. } => "Expected subtype of %s, but got %s",
            MessageTemplate::ExpectedFunctionType { .. } => {
                "Expected function type, but got %s"
            }
            MessageTemplate::ReturnTypeRequired => "Explicit return type required",
            MessageTemplate::ExpectedNoBubble => {
                "Cannot bubble from a function without Bubble in its return type"
            }
            MessageTemplate::DivByZero => "Division by zero",
            MessageTemplate::InvalidTypeMention { .. } => "Type %s mentions Invalid",
            MessageTemplate::InvalidVariantMention { .. } => "Invalid variant: %s mentions Invalid",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            MessageTemplate::MissingDeclaration { .. } => Phase::Staging,
            MessageTemplate::ExpectedNoBubble => Phase::Checking,
            MessageTemplate::DivByZero => Phase::Interpretation,
            _ => Phase::Typing,
        }
    }

    /// The values interpolated into `format_string`, in order.
    pub fn values(&self) -> Vec<String> {
        match self {
            MessageTemplate::ExpectedValueOfType { expected, actual }
            | MessageTemplate::ExpectedSubType { expected, actual } => {
                vec![expected.clone(), actual.clone()]
            }
            MessageTemplate::MissingMemberVisibility { member, defined_in }
            | MessageTemplate::IncompatibleUsage { member, defined_in } => {
                vec![member.clone(), defined_in.clone()]
            }
            MessageTemplate::NoStaticPropertyVisible { member, type_name }
            | MessageTemplate::NoSuchMember { member, type_name } => {
                vec![member.clone(), type_name.clone()]
            }
            MessageTemplate::UseBeforeInitialization { name, positions } => {
                vec![name.clone(), positions.clone()]
            }
            MessageTemplate::ArityMismatch { expected } => vec![expected.to_string()],
            MessageTemplate::SignatureInputMismatch {
                signature,
                expected,
                actual,
            } => vec![signature.clone(), expected.join(", "), actual.join(", ")],
            MessageTemplate::MissingDeclaration { name } | MessageTemplate::MissingType { name } => {
                vec![name.clone()]
            }
            MessageTemplate::ActualNotInBounds {
                formal,
                actual,
                bounds,
            } => vec![formal.clone(), actual.clone(), bounds.join(", ")],
            MessageTemplate::IllegalAssignment { target, source } => {
                vec![target.clone(), source.clone()]
            }
            MessageTemplate::ExpectedFunctionType { actual } => vec![actual.clone()],
            MessageTemplate::InvalidTypeMention { ty } => vec![ty.clone()],
            MessageTemplate::InvalidVariantMention { variant } => vec![variant.clone()],
            MessageTemplate::NoSignatureMatches
            | MessageTemplate::RedundantArgument
            | MessageTemplate::ReturnTypeRequired
            | MessageTemplate::ExpectedNoBubble
            | MessageTemplate::DivByZero => Vec::new(),
        }
    }

    pub fn format(&self) -> String {
        let mut values = self.values().into_iter();
        let pattern = self.format_string();
        let mut out = String::with_capacity(pattern.len());
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' && matches!(chars.peek(), Some('s') | Some('d')) {
                chars.next();
                out.push_str(&values.next().unwrap_or_default());
            } else {
                out.push(c);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub template: MessageTemplate,
    pub position: Position,
}

impl LogEntry {
    pub fn new(level: LogLevel, template: MessageTemplate, position: Position) -> Self {
        Self {
            level,
            template,
            position,
        }
    }

    pub fn error(template: MessageTemplate, position: Position) -> Self {
        Self::new(LogLevel::Error, template, position)
    }

    pub fn message(&self) -> String {
        self.template.format()
    }
}

/// `3+8-9: No declaration for b!` for errors, without the `!` otherwise.
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message())?;
        if self.level == LogLevel::Error {
            f.write_str("!")?;
        }
        Ok(())
    }
}

pub trait LogSink {
    fn log(&mut self, entry: LogEntry);
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<LogEntry>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.level == LogLevel::Error)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.level == LogLevel::Error)
    }

    pub fn with_template<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.template.name() == name)
    }

    /// One rendered line per entry, in the order they were logged.
    pub fn render(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

impl LogSink for Diagnostics {
    fn log(&mut self, entry: LogEntry) {
        tracing::trace!(template = entry.template.name(), position = %entry.position, "logged");
        self.entries.push(entry);
    }
}
