mod builder;
mod builtins;
mod diagnostics;
mod error;
mod names;
mod options;
mod plan;
mod source;
mod table;
mod tree;
mod type_expr;
mod typer;
mod types;

pub mod fixture;
pub mod reachability;

pub use crate::builder::{ClassBuilder, Signature, TreeBuilder, DEFAULT_OUTPUT_NAME};
pub use crate::builtins::{canonical_type_name, BuiltinFunction, BuiltinKind, Builtins};
pub use crate::diagnostics::{Diagnostics, LogEntry, LogLevel, LogSink, MessageTemplate, Phase};
pub use crate::error::{FixtureError, TreeError};
pub use crate::fixture::{load_json, load_path, load_yaml, Fixture, ModuleDescription};
pub use crate::names::{NameKind, NameTable, ResolvedName};
pub use crate::options::TyperOptions;
pub use crate::plan::{AliasedCall, NamedNames, NamedNodes, PlanSummary, TyperPlan};
pub use crate::reachability::Reachability;
pub use crate::source::{Position, SourceFile, SourceId};
pub use crate::table::{
    MemberKind, MemberRef, MemberShape, MethodKind, ShapeKind, TypeFormal, TypeShape, TypeTable,
    Visibility,
};
pub use crate::tree::{
    Call, CheckPosition, ClassDecl, Decl, Fun, Literal, Loop, Module, Node, NodeId, NodeKind, Tree,
    TypeFormalDecl, TypeInferences,
};
pub use crate::type_expr::{TypeExpr, TypeExprKind};
pub use crate::typer::typecheck;
pub use crate::types::{FunctionType, NominalType, ShapeId, StaticType, TypeFormalId, TypeFormalRef};

/// Types `module` and collects everything that was logged.
pub fn typecheck_module(module: &mut Module, options: &TyperOptions) -> (TyperPlan, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let plan = typecheck(module, options, &mut diagnostics);
    (plan, diagnostics)
}
