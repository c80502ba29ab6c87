use temper_typer::{
    typecheck_module, Diagnostics, LogLevel, Module, NodeId, Signature, TreeBuilder, TyperOptions,
    Visibility,
};

fn at(module: &Module, position: &str) -> NodeId {
    module
        .tree
        .ids()
        .find(|id| module.tree.pos(*id).to_string() == position)
        .unwrap_or_else(|| panic!("no node at {position}"))
}

fn typed(module: &mut Module) -> Diagnostics {
    let (_, diagnostics) = typecheck_module(module, &TyperOptions::default());
    diagnostics
}

fn type_at(module: &Module, position: &str) -> String {
    module
        .tree
        .type_of(at(module, position))
        .map(ToString::to_string)
        .unwrap_or_else(|| panic!("nothing typed at {position}"))
}

/// The type bound to a declared name, as seen on its declaration.
fn binding(module: &Module, name: &str) -> String {
    let decl = module.declaration_named(name).expect("declaration");
    let left = module.tree.as_decl(decl).expect("decl").name;
    module
        .tree
        .type_of(left)
        .map(ToString::to_string)
        .unwrap_or_else(|| panic!("{name} has no type"))
}

fn error_names(diagnostics: &Diagnostics) -> Vec<&'static str> {
    diagnostics
        .errors()
        .map(|entry| entry.template.name())
        .collect()
}

fn coin(b: &TreeBuilder) -> NodeId {
    b.op("<", vec![b.op("randomInt", Vec::new()), b.int(5)])
}

#[test]
fn literal_initializers_on_both_branches_are_joined() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let x = b.var_decl("x", None, None);
        let branch = b.if_else(
            coin(b),
            |b| vec![b.assign("x", b.int(0))],
            |b| vec![b.assign("x", b.int(1))],
        );
        vec![x, branch, b.place(b.read("x"), "4+0")]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.render());
    assert_eq!(binding(&module, "x"), "Int32");
    assert_eq!(type_at(&module, "4+0"), "Int32");
}

#[test]
fn null_then_string_is_an_optional_string() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let s = b.var_decl("s", None, Some(b.null()));
        let branch = b.if_then(coin(b), |b| vec![b.assign("s", b.string("a"))]);
        vec![s, branch, b.place(b.read("s"), "3+0")]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors());
    assert_eq!(type_at(&module, "3+0"), "String?");
}

#[test]
fn computed_initializers_are_typed_in_order() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let n = b.let_decl("n", None, Some(b.op("+", vec![b.int(1), b.int(2)])));
        let m = b.let_decl("m", None, Some(b.op("*", vec![b.read("n"), b.float(2.0)])));
        vec![n, m]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert_eq!(binding(&module, "n"), "Int32");
    assert_eq!(error_names(&diagnostics), vec!["NoSignatureMatches"]);
    assert_eq!(binding(&module, "m"), "Invalid");
}

#[test]
fn declared_types_win_over_initializers() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![
            b.let_decl("x", Some("Int?"), Some(b.null())),
            b.place(b.read("x"), "2+0"),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors());
    assert_eq!(binding(&module, "x"), "Int32?");
    assert_eq!(type_at(&module, "2+0"), "Int32?");
}

#[test]
fn initializer_that_does_not_fit_the_declared_type() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![b.var_decl("y", Some("Int"), Some(b.place(b.string("no"), "1+13")))]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(errors, vec!["1+13: Cannot assign to Int32 from String!"]);
}

#[test]
fn assignment_to_a_declared_name_is_checked() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let x = b.var_decl("x", Some("String"), Some(b.string("a")));
        let assign = b.place(b.assign("x", b.int(3)), "2+0");
        vec![x, assign]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert_eq!(error_names(&diagnostics), vec!["IllegalAssignment"]);
    assert_eq!(type_at(&module, "2+0"), "String");
}

#[test]
fn division_by_literals() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![
            b.let_decl("n", None, Some(b.int(2))),
            b.place(b.op("/", vec![b.int(6), b.int(2)]), "2+0"),
            b.place(b.op("/", vec![b.int(6), b.int(0)]), "3+0"),
            b.place(b.op("/", vec![b.int(6), b.read("n")]), "4+0"),
            b.place(b.op("/", vec![b.int(6), b.op("-", vec![b.int(2)])]), "5+0"),
            b.place(b.op("/", vec![b.float(6.0), b.float(0.0)]), "6+0"),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert_eq!(type_at(&module, "2+0"), "Int32");
    assert_eq!(type_at(&module, "3+0"), "Int32 | Bubble");
    assert_eq!(type_at(&module, "4+0"), "Int32 | Bubble");
    assert_eq!(type_at(&module, "5+0"), "Int32");
    assert_eq!(type_at(&module, "6+0"), "Float64");

    let zero: Vec<String> = diagnostics
        .with_template("DivByZero")
        .map(|entry| entry.position.to_string())
        .collect();
    assert_eq!(zero, vec!["3+0"]);
    assert_eq!(error_names(&diagnostics), vec!["DivByZero"]);

    let variant = module
        .tree
        .inferences(at(&module, "2+0"))
        .and_then(|inferences| inferences.variant())
        .map(ToString::to_string);
    assert_eq!(variant.as_deref(), Some("fn (Int32, Int32): Int32"));
}

#[test]
fn bound_violations_make_the_call_invalid() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let keep = b.fun_decl(
            "keep",
            Signature::new()
                .type_formal("T", &["MapKey"])
                .param("x", "T")
                .returns("T"),
            |b| vec![b.read("x")],
        );
        vec![
            keep,
            b.place(b.call(b.read("keep"), vec![b.int(1)]), "2+0"),
            b.place(b.call(b.read("keep"), vec![b.float(1.5)]), "3+0"),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert_eq!(type_at(&module, "2+0"), "Int32");
    assert_eq!(type_at(&module, "3+0"), "Invalid");

    let violations: Vec<String> = diagnostics
        .with_template("ActualNotInBounds")
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        violations,
        vec!["3+0: Type formal <T extends MapKey> cannot bind to Float64 which does not fit upper bounds [MapKey]!"]
    );
    let notes: Vec<String> = diagnostics
        .with_template("InvalidTypeMention")
        .map(|entry| entry.position.to_string())
        .collect();
    assert_eq!(notes, vec!["3+0"]);
    let variant = module
        .tree
        .inferences(at(&module, "3+0"))
        .and_then(|inferences| inferences.variant())
        .map(ToString::to_string);
    assert_eq!(variant.as_deref(), Some("fn (Float64): Float64"));
}

#[test]
fn list_element_types_come_from_arguments_or_context() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![
            b.let_decl("xs", None, Some(b.op("listOf", vec![b.int(1), b.int(2)]))),
            b.let_decl(
                "ys",
                Some("List<List<String>>"),
                Some(b.place(
                    b.op("listOf", vec![b.place(b.op("listOf", Vec::new()), "3+7")]),
                    "3+0",
                )),
            ),
            b.let_decl("zs", None, Some(b.op("listOf", Vec::new()))),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(binding(&module, "xs"), "List<Int32>");
    assert_eq!(type_at(&module, "3+7"), "List<String>");
    assert_eq!(type_at(&module, "3+0"), "List<List<String>>");
    assert_eq!(binding(&module, "zs"), "List<AnyValue>");
}

#[test]
fn aliased_calls_wait_for_the_call_they_feed() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let count = b.fun_decl(
            "count",
            Signature::new().param("xs", "List<String>").returns("Int"),
            |b| vec![b.member(b.read("xs"), "length")],
        );
        let t = b.let_decl("t", None, Some(b.place(b.op("listOf", Vec::new()), "2+8")));
        let use_site = b.place(b.call(b.read("count"), vec![b.read("t")]), "3+0");
        vec![count, t, use_site]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+8"), "List<String>");
    assert_eq!(binding(&module, "t"), "List<String>");
    assert_eq!(type_at(&module, "3+0"), "Int32");
}

#[test]
fn explicit_type_arguments_are_used() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let callee = b.read("listOf");
        vec![b.let_decl("xs", None, Some(b.call_generic(callee, &["String"], Vec::new())))]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors());
    assert_eq!(binding(&module, "xs"), "List<String>");
}

#[test]
fn reads_before_initialization_are_reported() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![
            b.var_decl("x", None, None),
            b.let_decl("y", None, Some(b.place(b.read("x"), "2+8"))),
            b.assign("x", b.place(b.op("+", vec![b.int(1), b.int(2)]), "3+4")),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(
        errors,
        vec!["2+8: x is not initialized along branches at 3+4!"]
    );
    assert_eq!(binding(&module, "x"), "Int32");
    assert_eq!(binding(&module, "y"), "Invalid");
}

#[test]
fn invalid_types_get_notes_unless_disabled() {
    let build = || {
        TreeBuilder::build("typer.temper", |b| {
            vec![b.place(b.read("nope"), "1+0")]
        })
        .expect("module")
    };

    let mut module = build();
    let diagnostics = typed(&mut module);
    let rendered = diagnostics.render();
    assert_eq!(
        rendered,
        vec!["1+0: No declaration for nope!", "1+0: Type Invalid mentions Invalid"]
    );
    assert_eq!(diagnostics.entries()[1].level, LogLevel::Info);

    let mut module = build();
    let options = TyperOptions {
        invalid_notes: false,
        ..TyperOptions::default()
    };
    let (_, diagnostics) = typecheck_module(&mut module, &options);
    assert_eq!(diagnostics.render(), vec!["1+0: No declaration for nope!"]);
}

#[test]
fn null_checks_narrow_immutable_names() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let s = b.let_decl("s", Some("String?"), Some(b.null()));
        let branch = b.if_else(
            b.op("!=", vec![b.read("s"), b.null()]),
            |b| vec![b.place(b.member(b.place(b.read("s"), "2+2"), "length"), "2+4")],
            |b| vec![b.place(b.read("s"), "3+2")],
        );
        vec![s, branch]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+2"), "String");
    assert_eq!(type_at(&module, "2+4"), "Int32");
    assert_eq!(type_at(&module, "3+2"), "Null");
}

#[test]
fn early_exit_narrows_the_rest_of_the_block() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let f = b.fun_decl(
            "len",
            Signature::new().param("s", "String?").returns("Int"),
            |b| {
                vec![
                    b.if_then(b.op("==", vec![b.read("s"), b.null()]), |b| {
                        vec![b.return_(Some(b.int(0)))]
                    }),
                    b.member(b.place(b.read("s"), "3+2"), "length"),
                ]
            },
        );
        vec![f]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "3+2"), "String");
}

#[test]
fn type_tests_narrow_unions() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let v = b.let_decl("v", Some("Int | String"), Some(b.int(1)));
        let branch = b.if_else(
            b.is_check(b.read("v"), "Int"),
            |b| vec![b.place(b.read("v"), "2+2")],
            |b| vec![b.place(b.read("v"), "3+2")],
        );
        vec![v, branch]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+2"), "Int32");
    assert_eq!(type_at(&module, "3+2"), "String");
}

#[test]
fn mutable_names_are_not_narrowed() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let s = b.var_decl("s", Some("String?"), Some(b.null()));
        let branch = b.if_then(b.op("!=", vec![b.read("s"), b.null()]), |b| {
            vec![b.place(b.read("s"), "2+2")]
        });
        vec![s, branch]
    })
    .expect("module");

    typed(&mut module);
    assert_eq!(type_at(&module, "2+2"), "String?");
}

#[test]
fn casts_add_bubble_and_reject_unrelated_types() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![
            b.let_decl("v", Some("Int | String"), Some(b.int(1))),
            b.place(b.as_cast(b.read("v"), "Int"), "2+0"),
            b.place(b.as_cast(b.int(1), "String"), "3+0"),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert_eq!(type_at(&module, "2+0"), "Int32 | Bubble");
    assert_eq!(type_at(&module, "3+0"), "Invalid");
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(errors, vec!["3+0: Expected subtype of Int32, but got String!"]);
}

#[test]
fn orelse_handles_bubbles() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let f = b.fun_decl(
            "half",
            Signature::new().param("n", "Int").returns("Int"),
            |b| {
                vec![b.place(
                    b.orelse(b.op("/", vec![b.read("n"), b.read("n")]), b.int(0)),
                    "2+2",
                )]
            },
        );
        vec![f]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+2"), "Int32");
}

#[test]
fn unhandled_bubbles_need_a_bubbling_signature() {
    let build = |signature: Signature| {
        TreeBuilder::build("typer.temper", |b| {
            let f = b.fun_decl("half", signature, |b| {
                vec![b.place(b.op("/", vec![b.int(6), b.read("n")]), "2+2")]
            });
            vec![f]
        })
        .expect("module")
    };

    let mut module = build(Signature::new().param("n", "Int").returns("Int"));
    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(
        errors,
        vec!["2+2: Cannot bubble from a function without Bubble in its return type!"]
    );

    let mut module = build(
        Signature::new()
            .param("n", "Int")
            .returns("Int")
            .throws_bubble(),
    );
    assert!(!typed(&mut module).has_errors());

    let mut module = build(Signature::new().param("n", "Int").returns("Int"));
    let options = TyperOptions {
        check_bubbles: false,
        ..TyperOptions::default()
    };
    let (_, diagnostics) = typecheck_module(&mut module, &options);
    assert!(!diagnostics.has_errors());
}

#[test]
fn lambdas_need_a_return_type_or_context() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let bare = b.place(
            b.fun(Signature::new().param("x", "Int"), |b| vec![b.read("x")]),
            "1+8",
        );
        let shaped = b.place(
            b.fun(Signature::new().untyped_param("x"), |b| vec![b.read("x")]),
            "2+23",
        );
        vec![
            b.let_decl("f", None, Some(bare)),
            b.let_decl("g", Some("fn (Int): Int"), Some(shaped)),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(errors, vec!["1+8: Explicit return type required!"]);
    assert_eq!(type_at(&module, "1+8"), "fn (Int32): Top");
    assert_eq!(type_at(&module, "2+23"), "fn (Int32): Int32");
}

#[test]
fn lambdas_passed_to_calls_take_their_types_from_the_callee() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let apply = b.fun_decl(
            "apply",
            Signature::new()
                .param("f", "fn (Int): Int")
                .param("x", "Int")
                .returns("Int"),
            |b| vec![b.call(b.read("f"), vec![b.read("x")])],
        );
        let lambda = b.place(
            b.fun(Signature::new().untyped_param("y"), |b| {
                vec![b.op("+", vec![b.place(b.read("y"), "2+17"), b.int(1)])]
            }),
            "2+6",
        );
        let call = b.place(b.call(b.read("apply"), vec![lambda, b.int(2)]), "2+0");
        vec![apply, call]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+17"), "Int32");
    assert_eq!(type_at(&module, "2+6"), "fn (Int32): Int32");
    assert_eq!(type_at(&module, "2+0"), "Int32");
}

#[test]
fn returned_values_must_fit_the_declared_return_type() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let f = b.fun_decl("f", Signature::new().returns("Int"), |b| {
            vec![b.return_(Some(b.place(b.string("a"), "1+20")))]
        });
        vec![f]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(errors, vec!["1+20: Cannot assign to Int32 from String!"]);
}

#[test]
fn call_problems() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let twice = b.fun_decl(
            "twice",
            Signature::new().param("n", "Int").returns("Int"),
            |b| vec![b.op("*", vec![b.read("n"), b.int(2)])],
        );
        let n = b.let_decl("n", None, Some(b.int(1)));
        vec![
            twice,
            n,
            b.call(b.read("twice"), vec![b.int(1), b.place(b.int(2), "3+9")]),
            b.place(b.call(b.read("twice"), vec![b.string("a")]), "4+0"),
            b.place(b.call(b.read("twice"), Vec::new()), "5+0"),
            b.place(b.op("+", vec![b.int(1), b.string("a")]), "6+0"),
            b.place(b.call(b.place(b.read("n"), "7+0"), vec![b.int(2)]), "7+0-4"),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(
        errors,
        vec![
            "3+9: Argument passed but it matches no parameter!",
            "4+0: Actual arguments do not match signature: fn (Int32): Int32 expected [Int32], but got [String]!",
            "5+0: Wrong number of arguments.  Expected 1!",
            "6+0: No signature matches!",
            "7+0: Expected function type, but got Int32!",
        ]
    );
}

#[test]
fn non_boolean_conditions_are_reported() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        vec![b.if_then(b.place(b.int(1), "1+4"), |_| Vec::new())]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(errors, vec!["1+4: Expected value of type Boolean not Int32!"]);
}

#[test]
fn bare_names_used_as_conditions_are_boolean() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let flag = b.var_decl("flag", None, None);
        let branch = b.if_then(b.place(b.read("flag"), "2+4"), |_| Vec::new());
        vec![flag, branch]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+4"), "Boolean");
}

fn boxes(extra: impl FnOnce(&TreeBuilder) -> Vec<NodeId>) -> Module {
    TreeBuilder::build("members.temper", |b| {
        let class = b.class_decl("Box", |c| {
            c.constructor_property("value", Visibility::Public, "Int");
            c.property("secret", Visibility::Private, Some("Int"), Some(c.builder().int(1)));
            c.static_property("count", Visibility::Public, Some("Int"), Some(c.builder().int(0)));
            c.method(
                "get",
                Visibility::Public,
                Signature::new().returns("Int"),
                |b| vec![b.member(b.read("this"), "value")],
            );
            c.method(
                "peek",
                Visibility::Public,
                Signature::new().returns("Int"),
                |b| vec![b.member(b.read("this"), "secret")],
            );
        });
        let made = b.let_decl("box", None, Some(b.new_instance("Box", vec![b.int(1)])));
        let mut statements = vec![class, made];
        statements.extend(extra(b));
        statements
    })
    .expect("module")
}

#[test]
fn members_are_typed_through_their_class() {
    let mut module = boxes(|b| {
        vec![
            b.place(b.member(b.read("box"), "value"), "10+0"),
            b.place(b.method_call(b.read("box"), "get", Vec::new()), "11+0"),
            b.place(b.method_call(b.read("box"), "peek", Vec::new()), "12+0"),
            b.place(b.member(b.read("Box"), "count"), "13+0"),
        ]
    });

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(binding(&module, "box"), "Box");
    assert_eq!(type_at(&module, "10+0"), "Int32");
    assert_eq!(type_at(&module, "11+0"), "Int32");
    assert_eq!(type_at(&module, "12+0"), "Int32");
    assert_eq!(type_at(&module, "13+0"), "Int32");
}

#[test]
fn member_problems() {
    let mut module = boxes(|b| {
        vec![
            b.place(b.member(b.read("box"), "missing"), "10+0"),
            b.place(b.member(b.read("box"), "get"), "11+0"),
            b.place(b.member(b.read("box"), "secret"), "12+0"),
            b.place(b.member(b.read("Box"), "nothing"), "13+0"),
            b.place(b.new_instance("Box", vec![b.string("x")]), "14+0"),
        ]
    });

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(
        errors,
        vec![
            "10+0: No member missing in Box!",
            "11+0: Member get defined in Box incompatible with usage!",
            "12+0: Member secret defined in Box not publicly accessible!",
            "13+0: No static property nothing visible in Box!",
            "14+0: Actual arguments do not match signature: fn (Int32): Box expected [Int32], but got [String]!",
        ]
    );
}

#[test]
fn interfaces_cannot_be_constructed() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let shape = b.interface_decl("Shape", |c| {
            c.abstract_method("area", Visibility::Public, Signature::new().returns("Float"));
        });
        vec![shape, b.place(b.new_instance("Shape", Vec::new()), "2+0")]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    let errors: Vec<String> = diagnostics.errors().map(ToString::to_string).collect();
    assert_eq!(errors, vec!["2+0: No member constructor in Shape!"]);
}

#[test]
fn subclasses_see_inherited_members() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let shape = b.interface_decl("Shape", |c| {
            c.abstract_method("area", Visibility::Public, Signature::new().returns("Float"));
        });
        let square = b.class_decl("Square", |c| {
            c.extends("Shape");
            c.constructor_property("side", Visibility::Public, "Float");
        });
        let s = b.let_decl(
            "s",
            Some("Shape"),
            Some(b.new_instance("Square", vec![b.float(2.0)])),
        );
        vec![
            shape,
            square,
            s,
            b.place(b.method_call(b.read("s"), "area", Vec::new()), "4+0"),
        ]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "4+0"), "Float64");
}

#[test]
fn typing_twice_gives_the_same_answers() {
    let mut module = boxes(|b| {
        vec![
            b.let_decl("xs", None, Some(b.op("listOf", vec![b.read("box")]))),
            b.member(b.read("box"), "missing"),
            b.op("/", vec![b.int(1), b.int(0)]),
        ]
    });

    let snapshot = |module: &Module| -> Vec<Option<String>> {
        module
            .tree
            .ids()
            .map(|id| module.tree.type_of(id).map(ToString::to_string))
            .collect()
    };

    let first = typed(&mut module).render();
    let first_types = snapshot(&module);
    let second = typed(&mut module).render();
    assert_eq!(first, second);
    assert_eq!(first_types, snapshot(&module));
    assert_eq!(binding(&module, "xs"), "List<Box>");
}

#[test]
fn conditional_expressions_join_their_arms() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let c = b.let_decl("c", None, Some(b.boolean(true)));
        let choice = b.place(
            b.if_else(b.read("c"), |b| vec![b.int(1)], |b| vec![b.null()]),
            "2+8",
        );
        let x = b.let_decl("x", None, Some(choice));
        vec![c, x, b.place(b.read("x"), "3+0")]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "2+8"), "Int32?");
    assert_eq!(binding(&module, "x"), "Int32?");
    assert_eq!(type_at(&module, "3+0"), "Int32?");
}

#[test]
fn block_expressions_take_the_type_of_their_last_expression() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let value = b.place(
            b.block(|b| {
                vec![
                    b.let_decl("t", None, Some(b.int(2))),
                    b.op("*", vec![b.read("t"), b.int(3)]),
                ]
            }),
            "1+8",
        );
        vec![b.let_decl("x", None, Some(value))]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "1+8"), "Int32");
    assert_eq!(binding(&module, "x"), "Int32");
}

#[test]
fn declarations_are_typed_before_code_that_reads_them() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        b.hoist(&["j", "i"]);
        let f = b.fun_decl("f", Signature::new().returns("Int"), |b| {
            let i = b.let_decl("i", None, Some(b.int(4)));
            let g = b.fun_decl("g", Signature::new().returns("Int"), |b| {
                vec![b.op("+", vec![b.read("i"), b.place(b.read("j"), "3+22")])]
            });
            vec![i, g, b.call(b.read("g"), Vec::new())]
        });
        let j = b.let_decl("j", None, Some(b.op("+", vec![b.read("i"), b.int(1)])));
        let start = b.block(|b| {
            vec![
                b.let_decl("k", None, Some(b.int(0))),
                b.int(1),
            ]
        });
        let i = b.let_decl("i", None, Some(start));
        vec![f, j, i]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "3+22"), "Int32");
    assert_eq!(binding(&module, "j"), "Int32");
}

#[test]
fn negating_the_smallest_integer_is_not_a_known_divisor() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let divisor = b.op("-", vec![b.int(i64::MIN)]);
        vec![b.place(b.op("/", vec![b.int(6), divisor]), "1+0")]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    assert_eq!(type_at(&module, "1+0"), "Int32 | Bubble");
}

#[test]
fn nested_generic_calls_bind_their_formals_separately() {
    let mut module = TreeBuilder::build("typer.temper", |b| {
        let identity = b.fun_decl(
            "identity",
            Signature::new().type_formal("T", &[]).param("x", "T").returns("T"),
            |b| vec![b.read("x")],
        );
        let nothing = b.fun_decl(
            "nothing",
            Signature::new().type_formal("T", &[]).returns("T"),
            |b| vec![b.op("panic", Vec::new())],
        );
        let pair = b.fun_decl(
            "pair",
            Signature::new().param("a", "String").param("n", "Int").returns("Int"),
            |b| vec![b.read("n")],
        );
        let innermost = b.place(b.call(b.read("nothing"), Vec::new()), "4+33");
        let inner = b.place(b.call(b.read("identity"), vec![innermost]), "4+24");
        let outer = b.place(b.call(b.read("identity"), vec![inner]), "4+15");
        let s = b.let_decl("s", Some("String"), Some(outer));
        let both = b.place(
            b.call(
                b.read("pair"),
                vec![
                    b.place(b.call(b.read("nothing"), Vec::new()), "5+5"),
                    b.place(b.call(b.read("nothing"), Vec::new()), "5+16"),
                ],
            ),
            "5+0",
        );
        vec![identity, nothing, pair, s, both]
    })
    .expect("module");

    let diagnostics = typed(&mut module);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics.render());
    for position in ["4+33", "4+24", "4+15", "5+5"] {
        assert_eq!(type_at(&module, position), "String", "at {position}");
    }
    assert_eq!(type_at(&module, "5+16"), "Int32");
    assert_eq!(type_at(&module, "5+0"), "Int32");
}
