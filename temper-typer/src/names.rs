use std::fmt;

use serde::Serialize;

/// A disambiguated name. Two declarations that share surface text get
/// distinct `ResolvedName`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResolvedName(u32);

impl ResolvedName {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NameKind {
    /// Written by the programmer.
    Source,
    /// Introduced by an earlier stage to hold an intermediate result.
    Temporary,
    /// The implicit result slot of a function or module.
    Return,
    /// Provided by the language, like `+` or `panic`.
    Builtin,
    /// Referenced but never declared.
    Unresolved,
}

#[derive(Debug, Clone)]
struct NameInfo {
    text: String,
    kind: NameKind,
}

#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: Vec<NameInfo>,
}

impl NameTable {
    pub fn new() -> Self {
        Self { names: Vec::new() }
    }

    pub fn fresh(&mut self, text: impl Into<String>, kind: NameKind) -> ResolvedName {
        let name = ResolvedName(self.names.len() as u32);
        self.names.push(NameInfo {
            text: text.into(),
            kind,
        });
        name
    }

    pub fn text(&self, name: ResolvedName) -> &str {
        &self.names[name.index()].text
    }

    pub fn kind(&self, name: ResolvedName) -> NameKind {
        self.names[name.index()].kind
    }

    pub fn is_local(&self, name: ResolvedName) -> bool {
        matches!(
            self.kind(name),
            NameKind::Source | NameKind::Temporary | NameKind::Return
        )
    }

    pub fn find(&self, text: &str) -> Option<ResolvedName> {
        self.names
            .iter()
            .position(|info| info.text == text)
            .map(|index| ResolvedName(index as u32))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn display(&self, name: ResolvedName) -> DisplayName<'_> {
        DisplayName { table: self, name }
    }
}

pub struct DisplayName<'a> {
    table: &'a NameTable,
    name: ResolvedName,
}

impl fmt::Display for DisplayName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table.text(self.name))
    }
}
