use thiserror::Error;

use crate::tree::NodeId;

/// Problems with the shape of an input tree or module description.
///
/// These are reported to whoever assembled the tree. Problems in the program
/// being typed are diagnostics instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("malformed position `{0}`")]
    BadPosition(String),
    #[error("malformed type expression `{text}`: {reason}")]
    BadTypeExpression { text: String, reason: String },
    #[error("`{keyword}` outside of any loop")]
    JumpOutsideLoop { keyword: &'static str },
    #[error("no enclosing loop labelled `{0}`")]
    UnknownLabel(String),
    #[error("`return` outside of any function")]
    ReturnOutsideFunction,
    #[error("name `{0}` is declared twice in the same scope")]
    DuplicateDeclaration(String),
    #[error("node {0:?} is already attached to a parent")]
    NodeReused(NodeId),
    #[error("root of a module must be a block")]
    RootNotBlock,
    #[error("unknown member visibility `{0}`")]
    UnknownVisibility(String),
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to parse module description as YAML")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse module description as JSON")]
    Json(#[from] serde_json::Error),
    #[error("failed to read module description")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
}
