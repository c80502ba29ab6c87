use crate::diagnostics::MessageTemplate;
use crate::table::{MemberKind, MemberRef, MethodKind, Visibility};
use crate::tree::{NodeId, NodeKind};
use crate::types::{NominalType, ShapeId, StaticType};

use super::Typer;

impl Typer<'_> {
    pub(super) fn type_member(&mut self, id: NodeId, receiver: NodeId, name: &str) -> StaticType {
        if let NodeKind::RightName(receiver_name) = self.module.tree.kind(receiver) {
            if let Some(shape) = self.class_shapes.get(receiver_name).copied() {
                return self.type_static_member(id, shape, name);
            }
        }
        let receiver_type = self.type_of(receiver);
        if receiver_type.mentions_invalid() {
            return StaticType::Invalid;
        }
        let Some((member_ref, owner)) = self.find_member(&receiver_type, name) else {
            self.report(
                MessageTemplate::NoSuchMember {
                    member: name.to_string(),
                    type_name: receiver_type.to_string(),
                },
                self.pos(id),
            );
            return StaticType::Invalid;
        };
        let member = self.module.types.member(member_ref).clone();
        let defined_in = self.module.types.shape(member_ref.shape).name.clone();
        let called = self.module.tree.is_callee(id);

        let incompatible = match member.kind {
            MemberKind::Method(MethodKind::Normal) => !called,
            MemberKind::Method(MethodKind::Constructor | MethodKind::Setter) => true,
            MemberKind::StaticProperty | MemberKind::TypeParameter => true,
            MemberKind::Property | MemberKind::Method(MethodKind::Getter) => {
                called && member.ty.as_ref().is_some_and(|ty| !ty.is_function())
            }
        };
        if incompatible {
            self.report(
                MessageTemplate::IncompatibleUsage {
                    member: name.to_string(),
                    defined_in,
                },
                self.pos(id),
            );
            return StaticType::Invalid;
        }
        if member.visibility == Visibility::Private && !self.inside_shape(id, member_ref.shape) {
            self.report(
                MessageTemplate::MissingMemberVisibility {
                    member: name.to_string(),
                    defined_in,
                },
                self.pos(id),
            );
            return StaticType::Invalid;
        }

        let Some(ty) = self.member_type(member_ref) else {
            self.report(
                MessageTemplate::MissingType {
                    name: name.to_string(),
                },
                self.pos(id),
            );
            return StaticType::Invalid;
        };
        let ty = ty.substitute(&self.module.types.argument_map(&owner));
        match member.kind {
            MemberKind::Method(MethodKind::Getter) => match ty {
                StaticType::Function(function) => *function.ret,
                other => other,
            },
            _ => ty,
        }
    }

    fn type_static_member(&mut self, id: NodeId, shape: ShapeId, name: &str) -> StaticType {
        let found = self
            .module
            .types
            .shape(shape)
            .members
            .iter()
            .position(|member| member.name == name && member.kind == MemberKind::StaticProperty)
            .map(|index| MemberRef { shape, index });
        let visible = found.filter(|member| {
            self.module.types.member(*member).visibility == Visibility::Public
                || self.inside_shape(id, shape)
        });
        match visible.and_then(|member| self.member_type(member)) {
            Some(ty) => ty,
            None => {
                let type_name = self.module.types.shape(shape).name.clone();
                self.report(
                    MessageTemplate::NoStaticPropertyVisible {
                        member: name.to_string(),
                        type_name,
                    },
                    self.pos(id),
                );
                StaticType::Invalid
            }
        }
    }

    /// Finds `name` on `ty` or the nearest supertype declaring it. Also
    /// returns the supertype as seen from `ty`, for substituting its formals.
    fn find_member(&self, ty: &StaticType, name: &str) -> Option<(MemberRef, NominalType)> {
        let types = &self.module.types;
        match ty {
            StaticType::Nominal(nominal) => types.ancestors(nominal).into_iter().find_map(|owner| {
                types
                    .shape(owner.shape)
                    .members
                    .iter()
                    .position(|member| member.name == name)
                    .map(|index| {
                        (
                            MemberRef {
                                shape: owner.shape,
                                index,
                            },
                            owner,
                        )
                    })
            }),
            StaticType::Param(formal) => {
                let bound = types
                    .formal(formal.id)
                    .bounds
                    .first()
                    .cloned()
                    .unwrap_or_else(|| types.any_value());
                self.find_member(&bound, name)
            }
            _ => None,
        }
    }

    fn member_type(&self, member: MemberRef) -> Option<StaticType> {
        let shape = self.module.types.member(member);
        if let Some(ty) = &shape.ty {
            return Some(ty.clone());
        }
        let init = self.module.tree.as_decl(shape.declaration?)?.initializer?;
        self.signatures.get(&init).cloned().map(StaticType::Function)
    }

    /// Is `id` inside the declaration of `shape`?
    pub(super) fn inside_shape(&self, id: NodeId, shape: ShapeId) -> bool {
        let tree = &self.module.tree;
        tree.ancestors(id)
            .any(|ancestor| matches!(tree.kind(ancestor), NodeKind::ClassDecl(class) if class.shape == shape))
    }
}
