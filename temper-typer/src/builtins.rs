use crate::table::{MemberKind, MemberShape, MethodKind, ShapeKind, TypeTable, Visibility};
use crate::types::{FunctionType, NominalType, ShapeId, StaticType, TypeFormalRef};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Arithmetic,
    /// `/` and `%`: integer variants can fail on a zero divisor.
    Division,
    Comparison,
    Equality,
    Logic,
    Concatenation,
    ListConstruction,
    Panic,
    Bubble,
    Random,
}

/// Types that can appear in a builtin signature. `Element` is the
/// signature's own type formal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Int,
    Float,
    String,
    Boolean,
    AnyValueOrNull,
    Element,
    ListOfElement,
    Never,
    Bubble,
}

#[derive(Clone, Copy, Debug)]
pub struct BuiltinSignature {
    pub params: &'static [BuiltinType],
    pub rest: Option<BuiltinType>,
    pub result: BuiltinType,
    pub may_bubble: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct BuiltinSpec {
    pub name: &'static str,
    pub kind: BuiltinKind,
    pub signatures: &'static [BuiltinSignature],
}

const fn sig(params: &'static [BuiltinType], result: BuiltinType) -> BuiltinSignature {
    BuiltinSignature {
        params,
        rest: None,
        result,
        may_bubble: false,
    }
}

const fn bubbly(params: &'static [BuiltinType], result: BuiltinType) -> BuiltinSignature {
    BuiltinSignature {
        params,
        rest: None,
        result,
        may_bubble: true,
    }
}

const fn variadic(rest: BuiltinType, result: BuiltinType) -> BuiltinSignature {
    BuiltinSignature {
        params: &[],
        rest: Some(rest),
        result,
        may_bubble: false,
    }
}

use BuiltinType::{AnyValueOrNull, Boolean, Element, Float, Int, ListOfElement};

const INT_INT: &[BuiltinType] = &[Int, Int];
const FLOAT_FLOAT: &[BuiltinType] = &[Float, Float];
const STRING_STRING: &[BuiltinType] = &[BuiltinType::String, BuiltinType::String];
const BOOL_BOOL: &[BuiltinType] = &[Boolean, Boolean];

pub const BUILTIN_FUNCTIONS: &[BuiltinSpec] = &[
    BuiltinSpec {
        name: "+",
        kind: BuiltinKind::Arithmetic,
        signatures: &[
            sig(INT_INT, Int),
            sig(FLOAT_FLOAT, Float),
            sig(STRING_STRING, BuiltinType::String),
        ],
    },
    BuiltinSpec {
        name: "-",
        kind: BuiltinKind::Arithmetic,
        signatures: &[
            sig(INT_INT, Int),
            sig(FLOAT_FLOAT, Float),
            sig(&[Int], Int),
            sig(&[Float], Float),
        ],
    },
    BuiltinSpec {
        name: "*",
        kind: BuiltinKind::Arithmetic,
        signatures: &[sig(INT_INT, Int), sig(FLOAT_FLOAT, Float)],
    },
    BuiltinSpec {
        name: "/",
        kind: BuiltinKind::Division,
        signatures: &[bubbly(INT_INT, Int), sig(FLOAT_FLOAT, Float)],
    },
    BuiltinSpec {
        name: "%",
        kind: BuiltinKind::Division,
        signatures: &[bubbly(INT_INT, Int), sig(FLOAT_FLOAT, Float)],
    },
    BuiltinSpec {
        name: "<",
        kind: BuiltinKind::Comparison,
        signatures: &[
            sig(INT_INT, Boolean),
            sig(FLOAT_FLOAT, Boolean),
            sig(STRING_STRING, Boolean),
        ],
    },
    BuiltinSpec {
        name: "<=",
        kind: BuiltinKind::Comparison,
        signatures: &[
            sig(INT_INT, Boolean),
            sig(FLOAT_FLOAT, Boolean),
            sig(STRING_STRING, Boolean),
        ],
    },
    BuiltinSpec {
        name: ">",
        kind: BuiltinKind::Comparison,
        signatures: &[
            sig(INT_INT, Boolean),
            sig(FLOAT_FLOAT, Boolean),
            sig(STRING_STRING, Boolean),
        ],
    },
    BuiltinSpec {
        name: ">=",
        kind: BuiltinKind::Comparison,
        signatures: &[
            sig(INT_INT, Boolean),
            sig(FLOAT_FLOAT, Boolean),
            sig(STRING_STRING, Boolean),
        ],
    },
    BuiltinSpec {
        name: "==",
        kind: BuiltinKind::Equality,
        signatures: &[sig(&[AnyValueOrNull, AnyValueOrNull], Boolean)],
    },
    BuiltinSpec {
        name: "!=",
        kind: BuiltinKind::Equality,
        signatures: &[sig(&[AnyValueOrNull, AnyValueOrNull], Boolean)],
    },
    BuiltinSpec {
        name: "!",
        kind: BuiltinKind::Logic,
        signatures: &[sig(&[Boolean], Boolean)],
    },
    BuiltinSpec {
        name: "&&",
        kind: BuiltinKind::Logic,
        signatures: &[sig(BOOL_BOOL, Boolean)],
    },
    BuiltinSpec {
        name: "||",
        kind: BuiltinKind::Logic,
        signatures: &[sig(BOOL_BOOL, Boolean)],
    },
    BuiltinSpec {
        name: "cat",
        kind: BuiltinKind::Concatenation,
        signatures: &[variadic(BuiltinType::String, BuiltinType::String)],
    },
    BuiltinSpec {
        name: "listOf",
        kind: BuiltinKind::ListConstruction,
        signatures: &[variadic(Element, ListOfElement)],
    },
    BuiltinSpec {
        name: "panic",
        kind: BuiltinKind::Panic,
        signatures: &[sig(&[], BuiltinType::Never)],
    },
    BuiltinSpec {
        name: "bubble",
        kind: BuiltinKind::Bubble,
        signatures: &[sig(&[], BuiltinType::Bubble)],
    },
    BuiltinSpec {
        name: "randomInt",
        kind: BuiltinKind::Random,
        signatures: &[sig(&[], Int)],
    },
];

pub fn find_builtin(name: &str) -> Option<&'static BuiltinSpec> {
    BUILTIN_FUNCTIONS.iter().find(|spec| spec.name == name)
}

/// Source-level spellings that name the same type.
pub fn canonical_type_name(name: &str) -> &str {
    match name {
        "Int" => "Int32",
        "Float" => "Float64",
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct BuiltinFunction {
    pub name: &'static str,
    pub kind: BuiltinKind,
    pub variants: Vec<FunctionType>,
}

#[derive(Debug, Clone, Default)]
pub struct Builtins {
    pub any_value: ShapeId,
    pub equatable: ShapeId,
    pub map_key: ShapeId,
    pub int32: ShapeId,
    pub float64: ShapeId,
    pub string: ShapeId,
    pub boolean: ShapeId,
    pub list: ShapeId,
    pub type_shape: ShapeId,
    functions: Vec<BuiltinFunction>,
}

impl Builtins {
    pub fn function(&self, name: &str) -> Option<&BuiltinFunction> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn functions(&self) -> &[BuiltinFunction] {
        &self.functions
    }
}

fn builtin_shape(
    table: &mut TypeTable,
    name: &str,
    kind: ShapeKind,
    supertypes: &[ShapeId],
) -> ShapeId {
    let id = table.add_shape(name, kind);
    let supertypes = supertypes
        .iter()
        .map(|shape| NominalType {
            shape: *shape,
            name: table.shape(*shape).name.clone(),
            args: Vec::new(),
        })
        .collect();
    let shape = table.shape_mut(id);
    shape.supertypes = supertypes;
    shape.builtin = true;
    id
}

fn method(name: &str, params: Vec<StaticType>, ret: StaticType) -> MemberShape {
    MemberShape::new(name, MemberKind::Method(MethodKind::Normal), Visibility::Public)
        .typed(StaticType::function(params, ret))
}

fn property(name: &str, ty: StaticType) -> MemberShape {
    MemberShape::new(name, MemberKind::Property, Visibility::Public).typed(ty)
}

pub(crate) fn install(table: &mut TypeTable) -> Builtins {
    let any_value = builtin_shape(table, "AnyValue", ShapeKind::Interface, &[]);
    let equatable = builtin_shape(table, "Equatable", ShapeKind::Interface, &[any_value]);
    let map_key = builtin_shape(table, "MapKey", ShapeKind::Interface, &[equatable]);
    let int32 = builtin_shape(table, "Int32", ShapeKind::Class, &[map_key]);
    let float64 = builtin_shape(table, "Float64", ShapeKind::Class, &[equatable]);
    let string = builtin_shape(table, "String", ShapeKind::Class, &[map_key]);
    let boolean = builtin_shape(table, "Boolean", ShapeKind::Class, &[equatable]);
    let list = builtin_shape(table, "List", ShapeKind::Class, &[any_value]);
    let type_shape = builtin_shape(table, "Type", ShapeKind::Class, &[any_value]);

    let string_type = table.simple(string);
    let int_type = table.simple(int32);
    let boolean_type = table.simple(boolean);

    for shape in [int32, float64, boolean] {
        table.add_member(shape, method("toString", Vec::new(), string_type.clone()));
    }
    table.add_member(string, property("length", int_type.clone()));
    table.add_member(string, property("isEmpty", boolean_type.clone()));
    table.add_member(string, method("toString", Vec::new(), string_type.clone()));

    let element = table.add_formal("T");
    table.shape_mut(list).formals = vec![element.clone()];
    let element_type = StaticType::Param(element);
    table.add_member(list, property("length", int_type.clone()));
    table.add_member(list, property("isEmpty", boolean_type));
    let mut get = method("get", vec![int_type], element_type.or_bubble());
    get.throws_bubble = true;
    table.add_member(list, get);

    let mut builtins = Builtins {
        any_value,
        equatable,
        map_key,
        int32,
        float64,
        string,
        boolean,
        list,
        type_shape,
        functions: Vec::new(),
    };

    for spec in BUILTIN_FUNCTIONS {
        let variants = spec
            .signatures
            .iter()
            .map(|signature| signature_type(table, &builtins, signature))
            .collect();
        builtins.functions.push(BuiltinFunction {
            name: spec.name,
            kind: spec.kind,
            variants,
        });
    }
    builtins
}

fn signature_type(
    table: &mut TypeTable,
    builtins: &Builtins,
    signature: &BuiltinSignature,
) -> FunctionType {
    let mentions_element = signature
        .params
        .iter()
        .chain(signature.rest.iter())
        .chain(std::iter::once(&signature.result))
        .any(|ty| matches!(ty, Element | ListOfElement));
    let formal: Option<TypeFormalRef> = mentions_element.then(|| table.add_formal("T"));

    let mut convert = |ty: BuiltinType| -> StaticType {
        let element = formal
            .clone()
            .map(StaticType::Param)
            .unwrap_or(StaticType::Never);
        match ty {
            Int => table.simple(builtins.int32),
            Float => table.simple(builtins.float64),
            BuiltinType::String => table.simple(builtins.string),
            Boolean => table.simple(builtins.boolean),
            AnyValueOrNull => table.simple(builtins.any_value).nullable(),
            Element => element,
            ListOfElement => table.nominal(builtins.list, vec![element]),
            BuiltinType::Never => StaticType::Never,
            BuiltinType::Bubble => StaticType::Bubble,
        }
    };

    let params = signature.params.iter().map(|ty| convert(*ty)).collect();
    let rest = signature.rest.map(&mut convert);
    let mut result = convert(signature.result);
    if signature.may_bubble {
        result = result.or_bubble();
    }
    FunctionType {
        formals: formal.into_iter().collect(),
        params,
        rest: rest.map(Box::new),
        ret: Box::new(result),
    }
}
