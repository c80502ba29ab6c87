use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::builtins::{self, Builtins};
use crate::tree::NodeId;
use crate::types::{FunctionType, NominalType, ShapeId, StaticType, TypeFormalId, TypeFormalRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShapeKind {
    Class,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MethodKind {
    Normal,
    Constructor,
    Getter,
    Setter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemberKind {
    Property,
    Method(MethodKind),
    StaticProperty,
    TypeParameter,
}

#[derive(Debug, Clone)]
pub struct MemberShape {
    pub name: String,
    pub kind: MemberKind,
    pub visibility: Visibility,
    /// Filled from a declared type up front or from the member's
    /// initializer once it has been typed.
    pub ty: Option<StaticType>,
    pub throws_bubble: bool,
    pub declaration: Option<NodeId>,
}

impl MemberShape {
    pub fn new(name: impl Into<String>, kind: MemberKind, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility,
            ty: None,
            throws_bubble: false,
            declaration: None,
        }
    }

    pub fn typed(mut self, ty: StaticType) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, MemberKind::Method(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MemberRef {
    pub shape: ShapeId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct TypeShape {
    pub name: String,
    pub kind: ShapeKind,
    pub formals: Vec<TypeFormalRef>,
    pub supertypes: Vec<NominalType>,
    pub members: Vec<MemberShape>,
    /// Member indices of properties declared in the class header, in order.
    pub constructor_params: Vec<usize>,
    pub builtin: bool,
}

#[derive(Debug, Clone)]
pub struct TypeFormal {
    pub name: String,
    pub bounds: Vec<StaticType>,
}

/// Renders a member shape the way plans and dumps show them, for example
/// `MethodShape(C.constructor, Constructor)`.
pub struct DisplayMember<'a> {
    table: &'a TypeTable,
    member: MemberRef,
}

impl fmt::Display for DisplayMember<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self.table.shape(self.member.shape);
        let member = &shape.members[self.member.index];
        match member.kind {
            MemberKind::Property => write!(f, "PropertyShape({}.{})", shape.name, member.name),
            MemberKind::StaticProperty => {
                write!(f, "StaticPropertyShape({}.{})", shape.name, member.name)
            }
            MemberKind::TypeParameter => {
                write!(f, "TypeParameterShape({}.{})", shape.name, member.name)
            }
            MemberKind::Method(kind) => {
                write!(f, "MethodShape({}.{}, {:?})", shape.name, member.name, kind)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeTable {
    shapes: Vec<TypeShape>,
    formals: Vec<TypeFormal>,
    builtins: Builtins,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = Self {
            shapes: Vec::new(),
            formals: Vec::new(),
            builtins: Builtins::default(),
        };
        table.builtins = builtins::install(&mut table);
        table
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn add_shape(&mut self, name: impl Into<String>, kind: ShapeKind) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(TypeShape {
            name: name.into(),
            kind,
            formals: Vec::new(),
            supertypes: Vec::new(),
            members: Vec::new(),
            constructor_params: Vec::new(),
            builtin: false,
        });
        id
    }

    pub fn shape(&self, id: ShapeId) -> &TypeShape {
        &self.shapes[id.index()]
    }

    pub fn shape_mut(&mut self, id: ShapeId) -> &mut TypeShape {
        &mut self.shapes[id.index()]
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId, &TypeShape)> {
        self.shapes
            .iter()
            .enumerate()
            .map(|(index, shape)| (ShapeId(index as u32), shape))
    }

    /// Finds the most recently declared shape with the given name.
    pub fn shape_named(&self, name: &str) -> Option<ShapeId> {
        let name = builtins::canonical_type_name(name);
        self.shapes
            .iter()
            .rposition(|shape| shape.name == name)
            .map(|index| ShapeId(index as u32))
    }

    pub fn add_formal(&mut self, name: impl Into<String>) -> TypeFormalRef {
        let name = name.into();
        let id = TypeFormalId(self.formals.len() as u32);
        self.formals.push(TypeFormal {
            name: name.clone(),
            bounds: Vec::new(),
        });
        TypeFormalRef { id, name }
    }

    pub fn formal(&self, id: TypeFormalId) -> &TypeFormal {
        &self.formals[id.index()]
    }

    pub fn set_formal_bounds(&mut self, id: TypeFormalId, bounds: Vec<StaticType>) {
        self.formals[id.index()].bounds = bounds;
    }

    pub fn add_member(&mut self, shape: ShapeId, member: MemberShape) -> MemberRef {
        let members = &mut self.shapes[shape.index()].members;
        members.push(member);
        MemberRef {
            shape,
            index: members.len() - 1,
        }
    }

    pub fn member(&self, member: MemberRef) -> &MemberShape {
        &self.shapes[member.shape.index()].members[member.index]
    }

    pub fn member_mut(&mut self, member: MemberRef) -> &mut MemberShape {
        &mut self.shapes[member.shape.index()].members[member.index]
    }

    pub fn display_member(&self, member: MemberRef) -> DisplayMember<'_> {
        DisplayMember {
            table: self,
            member,
        }
    }

    /// The type of `this` inside a shape: the shape applied to its own formals.
    pub fn self_type(&self, shape: ShapeId) -> NominalType {
        let declared = self.shape(shape);
        NominalType {
            shape,
            name: declared.name.clone(),
            args: declared
                .formals
                .iter()
                .cloned()
                .map(StaticType::Param)
                .collect(),
        }
    }

    pub fn nominal(&self, shape: ShapeId, args: Vec<StaticType>) -> StaticType {
        StaticType::nominal(shape, self.shape(shape).name.clone(), args)
    }

    pub fn simple(&self, shape: ShapeId) -> StaticType {
        self.nominal(shape, Vec::new())
    }

    pub fn any_value(&self) -> StaticType {
        self.simple(self.builtins.any_value)
    }

    pub fn boolean(&self) -> StaticType {
        self.simple(self.builtins.boolean)
    }

    pub fn int32(&self) -> StaticType {
        self.simple(self.builtins.int32)
    }

    pub fn float64(&self) -> StaticType {
        self.simple(self.builtins.float64)
    }

    pub fn string(&self) -> StaticType {
        self.simple(self.builtins.string)
    }

    /// Maps from a shape's formals to the arguments of `ty`.
    pub fn argument_map(&self, ty: &NominalType) -> HashMap<TypeFormalId, StaticType> {
        self.shape(ty.shape)
            .formals
            .iter()
            .zip(ty.args.iter())
            .map(|(formal, arg)| (formal.id, arg.clone()))
            .collect()
    }

    /// Views `ty` as an instance of `target` by walking declared supertypes.
    pub fn supertype_as(&self, ty: &NominalType, target: ShapeId) -> Option<NominalType> {
        if ty.shape == target {
            return Some(ty.clone());
        }
        if target == self.builtins.any_value {
            return Some(NominalType {
                shape: target,
                name: self.shape(target).name.clone(),
                args: Vec::new(),
            });
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([ty.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.shape) {
                continue;
            }
            let mapping = self.argument_map(&current);
            for supertype in &self.shape(current.shape).supertypes {
                let substituted = match StaticType::Nominal(supertype.clone()).substitute(&mapping) {
                    StaticType::Nominal(nominal) => nominal,
                    _ => continue,
                };
                if substituted.shape == target {
                    return Some(substituted);
                }
                queue.push_back(substituted);
            }
        }
        None
    }

    /// `ty` followed by its supertypes, nearest first, ending in `AnyValue`.
    pub fn ancestors(&self, ty: &NominalType) -> Vec<NominalType> {
        let mut out = vec![ty.clone()];
        let mut seen = HashSet::from([ty.shape]);
        let mut index = 0;
        while index < out.len() {
            let current = out[index].clone();
            index += 1;
            let mapping = self.argument_map(&current);
            for supertype in &self.shape(current.shape).supertypes {
                if let StaticType::Nominal(nominal) =
                    StaticType::Nominal(supertype.clone()).substitute(&mapping)
                {
                    if seen.insert(nominal.shape) {
                        out.push(nominal);
                    }
                }
            }
        }
        let any_value = self.builtins.any_value;
        if seen.insert(any_value) {
            out.push(NominalType {
                shape: any_value,
                name: self.shape(any_value).name.clone(),
                args: Vec::new(),
            });
        } else if let Some(position) = out.iter().position(|nominal| nominal.shape == any_value) {
            let any = out.remove(position);
            out.push(any);
        }
        out
    }

    pub fn is_subtype(&self, sub: &StaticType, sup: &StaticType) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (_, StaticType::Top) | (_, StaticType::Invalid) => true,
            (StaticType::Invalid, _) | (StaticType::Never, _) => true,
            (StaticType::Top, _) => false,
            (StaticType::Or(members), _) => members.iter().all(|member| self.is_subtype(member, sup)),
            (_, StaticType::Or(members)) => {
                members.iter().any(|member| self.is_subtype(sub, member))
            }
            (StaticType::Param(a), StaticType::Param(b)) if a.id == b.id => true,
            (StaticType::Param(formal), _) => {
                let bounds = &self.formal(formal.id).bounds;
                if bounds.is_empty() {
                    self.is_subtype(&self.any_value(), sup)
                } else {
                    bounds.iter().any(|bound| self.is_subtype(bound, sup))
                }
            }
            (StaticType::Nominal(a), StaticType::Nominal(b)) => {
                let Some(viewed) = self.supertype_as(a, b.shape) else {
                    return false;
                };
                if viewed.args.len() != b.args.len() {
                    return false;
                }
                let covariant = b.shape == self.builtins.list;
                viewed.args.iter().zip(b.args.iter()).all(|(left, right)| {
                    if covariant {
                        self.is_subtype(left, right)
                    } else {
                        left == right || (self.is_subtype(left, right) && self.is_subtype(right, left))
                    }
                })
            }
            (StaticType::Function(a), StaticType::Function(b)) => self.function_subtype(a, b),
            _ => false,
        }
    }

    fn function_subtype(&self, sub: &FunctionType, sup: &FunctionType) -> bool {
        if sub.formals.len() != sup.formals.len()
            || sub.params.len() != sup.params.len()
            || sub.rest.is_some() != sup.rest.is_some()
        {
            return false;
        }
        // Compare generic signatures up to renaming of their formals.
        let renaming: HashMap<TypeFormalId, StaticType> = sub
            .formals
            .iter()
            .zip(sup.formals.iter())
            .map(|(left, right)| (left.id, StaticType::Param(right.clone())))
            .collect();
        let sub = sub.instantiate(&renaming);
        let params_ok = sub
            .params
            .iter()
            .zip(sup.params.iter())
            .all(|(left, right)| self.is_subtype(right, left));
        let rest_ok = match (&sub.rest, &sup.rest) {
            (Some(left), Some(right)) => self.is_subtype(right, left),
            _ => true,
        };
        params_ok && rest_ok && self.is_subtype(&sub.ret, &sup.ret)
    }

    /// A union that also drops members subsumed by other members.
    pub fn union(&self, types: impl IntoIterator<Item = StaticType>) -> StaticType {
        let joined = StaticType::union(types);
        let StaticType::Or(members) = &joined else {
            return joined;
        };
        let mut kept: Vec<StaticType> = Vec::new();
        for (index, member) in members.iter().enumerate() {
            let subsumed = members.iter().enumerate().any(|(other_index, other)| {
                other_index != index
                    && self.is_subtype(member, other)
                    && (!self.is_subtype(other, member) || other_index < index)
            });
            if !subsumed {
                kept.push(member.clone());
            }
        }
        StaticType::union(kept)
    }

    /// The most specific common supertype. Nominal types meet at their nearest
    /// shared ancestor; anything else falls back to a union.
    pub fn least_upper_bound(&self, a: &StaticType, b: &StaticType) -> StaticType {
        if self.is_subtype(a, b) {
            return b.clone();
        }
        if self.is_subtype(b, a) {
            return a.clone();
        }
        if a.includes_null() || b.includes_null() {
            let joined = self.least_upper_bound(&a.without_null(), &b.without_null());
            return if joined == StaticType::Never {
                StaticType::Null
            } else {
                joined.nullable()
            };
        }
        if a.includes_bubble() || b.includes_bubble() {
            return self
                .least_upper_bound(&a.without_bubble(), &b.without_bubble())
                .or_bubble();
        }
        if let (StaticType::Nominal(left), StaticType::Nominal(_)) = (a, b) {
            for ancestor in self.ancestors(left) {
                let candidate = StaticType::Nominal(ancestor);
                if self.is_subtype(b, &candidate) {
                    return candidate;
                }
            }
        }
        self.union([a.clone(), b.clone()])
    }

    /// The more specific of two upper bounds, or the first when unrelated.
    pub fn greatest_lower_bound(&self, a: &StaticType, b: &StaticType) -> StaticType {
        if self.is_subtype(b, a) {
            b.clone()
        } else {
            a.clone()
        }
    }
}
