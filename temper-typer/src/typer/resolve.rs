use crate::builtins::canonical_type_name;
use crate::diagnostics::MessageTemplate;
use crate::source::Position;
use crate::tree::{NodeId, NodeKind, TypeFormalDecl};
use crate::type_expr::{TypeExpr, TypeExprKind};
use crate::types::{FunctionType, NominalType, StaticType, TypeFormalRef};

use super::Typer;

impl Typer<'_> {
    /// Resolves a written type as seen from `scope`, reporting names that
    /// refer to nothing.
    pub(crate) fn resolve_type(&mut self, expr: &TypeExpr, scope: NodeId) -> StaticType {
        match &expr.kind {
            TypeExprKind::Named { name, args } => self.resolve_named(expr, name, args, scope),
            TypeExprKind::Nullable(inner) => self.resolve_type(inner, scope).nullable(),
            TypeExprKind::Union(members) => {
                let members: Vec<StaticType> = members
                    .iter()
                    .map(|member| self.resolve_type(member, scope))
                    .collect();
                self.module.types.union(members)
            }
            TypeExprKind::Function { params, rest, ret } => {
                let params = params
                    .iter()
                    .map(|param| self.resolve_type(param, scope))
                    .collect();
                let ret = self.resolve_type(ret, scope);
                let mut function = FunctionType::new(params, ret);
                if let Some(rest) = rest {
                    function = function.with_rest(self.resolve_type(rest, scope));
                }
                StaticType::Function(function)
            }
        }
    }

    fn resolve_named(
        &mut self,
        expr: &TypeExpr,
        name: &str,
        args: &[TypeExpr],
        scope: NodeId,
    ) -> StaticType {
        match name {
            "Bubble" => return StaticType::Bubble,
            "Void" => return StaticType::Void,
            "Never" => return StaticType::Never,
            "Null" => return StaticType::Null,
            "Top" => return StaticType::Top,
            _ => {}
        }
        if args.is_empty() {
            if let Some(formal) = self.formal_in_scope(name, scope) {
                return StaticType::Param(formal);
            }
        }
        let canonical = canonical_type_name(name);
        let Some(shape) = self.module.types.shape_named(canonical) else {
            let pos = self.type_position(expr, scope);
            self.report(
                MessageTemplate::MissingDeclaration {
                    name: name.to_string(),
                },
                pos,
            );
            return StaticType::Invalid;
        };
        let mut resolved: Vec<StaticType> = args
            .iter()
            .map(|arg| self.resolve_type(arg, scope))
            .collect();
        let arity = self.module.types.shape(shape).formals.len();
        if resolved.is_empty() && arity > 0 {
            resolved = vec![self.module.types.any_value(); arity];
        }
        self.module.types.nominal(shape, resolved)
    }

    fn type_position(&self, expr: &TypeExpr, scope: NodeId) -> Position {
        if expr.pos == Position::default() {
            self.pos(scope)
        } else {
            expr.pos
        }
    }

    /// Type formals are visible from the function or class that declares them
    /// and from everything nested inside.
    fn formal_in_scope(&self, name: &str, scope: NodeId) -> Option<TypeFormalRef> {
        let tree = &self.module.tree;
        std::iter::once(scope)
            .chain(tree.ancestors(scope))
            .find_map(|node| {
                let formals: &[TypeFormalDecl] = match tree.kind(node) {
                    NodeKind::Fun(fun) => &fun.type_formals,
                    NodeKind::ClassDecl(class) => &class.type_formals,
                    _ => return None,
                };
                formals
                    .iter()
                    .find(|decl| decl.formal.name == name)
                    .map(|decl| decl.formal.clone())
            })
    }

    /// Fills in declared supertypes and formal bounds before anything that
    /// depends on the subtype relation is typed.
    pub(crate) fn resolve_shapes(&mut self) {
        let ids: Vec<NodeId> = self.module.tree.ids().collect();
        for id in ids {
            let (formals, supertypes, shape) = match self.kind(id) {
                NodeKind::ClassDecl(class) => {
                    (class.type_formals, class.supertypes, Some(class.shape))
                }
                NodeKind::Fun(fun) => (fun.type_formals, Vec::new(), None),
                _ => continue,
            };
            for decl in &formals {
                let bounds = decl
                    .bounds
                    .iter()
                    .map(|bound| self.resolve_type(bound, id))
                    .collect();
                self.module.types.set_formal_bounds(decl.formal.id, bounds);
            }
            let Some(shape) = shape else {
                continue;
            };
            let mut resolved: Vec<NominalType> = Vec::new();
            for supertype in &supertypes {
                match self.resolve_type(supertype, id) {
                    StaticType::Nominal(nominal) if nominal.shape != shape => resolved.push(nominal),
                    StaticType::Invalid => {}
                    other => {
                        let pos = self.type_position(supertype, id);
                        self.report(
                            MessageTemplate::ExpectedSubType {
                                expected: self.module.types.any_value().to_string(),
                                actual: other.to_string(),
                            },
                            pos,
                        );
                    }
                }
            }
            self.module.types.shape_mut(shape).supertypes = resolved;
        }
        self.explanations.clear();
    }
}
