use crate::names::{NameKind, ResolvedName};
use crate::reachability::completes_normally;
use crate::tree::{NodeId, NodeKind};
use crate::types::StaticType;

use super::Typer;

impl Typer<'_> {
    /// Refines the type of a read of an immutable name using the conditions
    /// that must hold for control to reach it.
    pub(super) fn narrow(&self, read: NodeId, name: ResolvedName, ty: StaticType) -> StaticType {
        let mutable = self
            .plan
            .declarations
            .get(&name)
            .and_then(|decl| self.module.tree.as_decl(*decl))
            .map_or(true, |decl| decl.mutable);
        if mutable {
            return ty;
        }
        let tree = &self.module.tree;
        let mut ty = ty;
        let mut current = read;
        for ancestor in tree.ancestors(read) {
            match tree.kind(ancestor) {
                NodeKind::Fun(_) => break,
                NodeKind::If {
                    condition,
                    consequent,
                    alternate,
                } => {
                    if *consequent == current {
                        ty = self.refine(ty, name, *condition, true);
                    } else if *alternate == Some(current) {
                        ty = self.refine(ty, name, *condition, false);
                    }
                }
                NodeKind::Call(call) if call.args.len() == 2 && call.args[1] == current => {
                    match self.builtin_callee(call.callee) {
                        Some("&&") => ty = self.refine(ty, name, call.args[0], true),
                        Some("||") => ty = self.refine(ty, name, call.args[0], false),
                        _ => {}
                    }
                }
                NodeKind::Block { statements } => {
                    for statement in statements.iter().take_while(|statement| **statement != current) {
                        ty = self.refine_after(ty, name, *statement);
                    }
                }
                _ => {}
            }
            current = ancestor;
        }
        ty
    }

    /// After `if (c) { return }`, `c` is known to be false.
    fn refine_after(&self, ty: StaticType, name: ResolvedName, statement: NodeId) -> StaticType {
        let tree = &self.module.tree;
        let NodeKind::If {
            condition,
            consequent,
            alternate,
        } = tree.kind(statement)
        else {
            return ty;
        };
        let consequent_exits = !completes_normally(tree, *consequent);
        let alternate_exits = alternate.is_some_and(|alternate| !completes_normally(tree, alternate));
        match (consequent_exits, alternate_exits) {
            (true, false) => self.refine(ty, name, *condition, false),
            (false, true) => self.refine(ty, name, *condition, true),
            _ => ty,
        }
    }

    fn builtin_callee(&self, callee: NodeId) -> Option<&str> {
        match self.module.tree.kind(callee) {
            NodeKind::RightName(name) if self.module.names.kind(*name) == NameKind::Builtin => {
                Some(self.module.names.text(*name))
            }
            _ => None,
        }
    }

    fn reads(&self, node: NodeId, name: ResolvedName) -> bool {
        matches!(self.module.tree.kind(node), NodeKind::RightName(read) if *read == name)
    }

    /// Narrows `ty` given that `condition` evaluated to `holds`.
    fn refine(&self, ty: StaticType, name: ResolvedName, condition: NodeId, holds: bool) -> StaticType {
        let tree = &self.module.tree;
        match tree.kind(condition) {
            NodeKind::Call(call) => {
                let op = self.builtin_callee(call.callee);
                match (op, call.args.as_slice()) {
                    (Some("!"), [operand]) => self.refine(ty, name, *operand, !holds),
                    (Some("&&"), [left, right]) if holds => {
                        let ty = self.refine(ty, name, *left, true);
                        self.refine(ty, name, *right, true)
                    }
                    (Some("||"), [left, right]) if !holds => {
                        let ty = self.refine(ty, name, *left, false);
                        self.refine(ty, name, *right, false)
                    }
                    (Some(op @ ("==" | "!=")), [left, right]) => {
                        let compared = (self.reads(*left, name) && tree.is_null_literal(*right))
                            || (self.reads(*right, name) && tree.is_null_literal(*left));
                        if !compared {
                            return ty;
                        }
                        let is_null = (op == "==") == holds;
                        if is_null {
                            if ty.includes_null() {
                                StaticType::Null
                            } else {
                                ty
                            }
                        } else {
                            ty.without_null()
                        }
                    }
                    _ => ty,
                }
            }
            NodeKind::Is { value, .. } if self.reads(*value, name) => {
                let Some(checked) = self.checked_types.get(&condition) else {
                    return ty;
                };
                let types = &self.module.types;
                if holds {
                    if types.is_subtype(checked, &ty) {
                        checked.clone()
                    } else {
                        ty
                    }
                } else {
                    let remaining: Vec<StaticType> = ty
                        .alternatives()
                        .iter()
                        .filter(|alternative| !types.is_subtype(alternative, checked))
                        .cloned()
                        .collect();
                    if remaining.is_empty() || remaining.len() == ty.alternatives().len() {
                        ty
                    } else {
                        types.union(remaining)
                    }
                }
            }
            _ => ty,
        }
    }
}
