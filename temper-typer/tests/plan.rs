use std::collections::BTreeSet;

use temper_typer::{AliasedCall, Module, NodeId, Signature, TreeBuilder, TyperPlan, Visibility};

fn at(module: &Module, position: &str) -> NodeId {
    module
        .tree
        .ids()
        .find(|id| module.tree.pos(*id).to_string() == position)
        .unwrap_or_else(|| panic!("no node at {position}"))
}

fn index_of(plan: &TyperPlan, id: NodeId) -> usize {
    plan.type_order
        .iter()
        .position(|node| *node == id)
        .unwrap_or_else(|| panic!("{id:?} is not in the type order"))
}

#[test]
fn operands_are_typed_before_their_operation() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let sum = b.op(
            "+",
            vec![b.place(b.int(1), "1+8"), b.place(b.int(2), "1+12")],
        );
        vec![b.place(b.let_decl("x", None, Some(b.place(sum, "1+8-13"))), "1+0-13")]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let call = index_of(&plan, at(&module, "1+8-13"));
    assert!(index_of(&plan, at(&module, "1+8")) < call);
    assert!(index_of(&plan, at(&module, "1+12")) < call);
    assert!(call < index_of(&plan, at(&module, "1+0-13")));
    assert_eq!(plan.type_order.last().copied(), module.root());
}

#[test]
fn unreachable_statements_are_left_out() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let f = b.fun_decl("f", Signature::new().returns("Int"), |b| {
            vec![b.return_(Some(b.int(1))), b.place(b.int(2), "2+2")]
        });
        vec![f]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let dead = at(&module, "2+2");
    assert!(plan.unreachable.contains(&dead));
    assert!(!plan.type_order.contains(&dead));
}

#[test]
fn assignments_before_definite_initialization_are_initializers() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let x = b.var_decl("x", None, None);
        let branch = b.if_then(b.op("<", vec![b.int(1), b.int(2)]), |b| {
            vec![b.assign("x", b.place(b.int(1), "2+8"))]
        });
        let second = b.assign("x", b.place(b.int(2), "3+4"));
        let third = b.assign("x", b.place(b.int(3), "4+4"));
        vec![x, branch, second, third]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let x = module.name_declared("x").expect("x");
    assert_eq!(
        plan.initializers_of(x),
        &[at(&module, "2+8"), at(&module, "3+4")]
    );
}

#[test]
fn null_does_not_count_as_a_full_initialization() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let s = b.var_decl("s", None, Some(b.place(b.null(), "1+8")));
        let assign = b.assign("s", b.place(b.string("a"), "2+4"));
        vec![s, assign]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let s = module.name_declared("s").expect("s");
    assert_eq!(plan.initializers_of(s), &[at(&module, "1+8"), at(&module, "2+4")]);
}

#[test]
fn declared_names_have_no_initializers() {
    let module = TreeBuilder::build("plan.temper", |b| {
        vec![b.let_decl("x", Some("Int?"), Some(b.null()))]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let x = module.name_declared("x").expect("x");
    assert!(plan.initializers_of(x).is_empty());
    assert!(plan.declarations.contains_key(&x));
}

#[test]
fn terminals_initialize_the_output_name() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let branch = b.if_else(
            b.op("<", vec![b.int(1), b.int(2)]),
            |b| vec![b.place(b.int(1), "2+4")],
            |b| vec![b.place(b.string("a"), "3+4")],
        );
        vec![branch]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let output = module.output_name.expect("output name");
    assert!(plan.return_names.contains(&output));
    assert_eq!(plan.initializers_of(output), &[at(&module, "2+4"), at(&module, "3+4")]);
    assert_eq!(plan.implicit_results.get(&at(&module, "2+4")), Some(&output));
}

#[test]
fn temporaries_may_take_their_type_from_where_they_are_stored() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let t = b.temp_decl("t", Some(b.op("randomInt", Vec::new())));
        let x = b.let_decl("x", Some("Int"), Some(b.read("t")));
        vec![t, x]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let t = module.name_declared("t").expect("t");
    let x = module.name_declared("x").expect("x");
    assert_eq!(
        plan.may_infer_type_for_variable_from.get(&t),
        Some(&BTreeSet::from([x]))
    );
    assert!(!plan.may_infer_type_for_variable_from.contains_key(&x));
}

#[test]
fn single_use_call_results_passed_to_calls_are_aliased() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let t = b.place(
            b.let_decl("t", None, Some(b.place(b.op("listOf", Vec::new()), "1+8"))),
            "1+0",
        );
        let use_site = b.op("listOf", vec![b.place(b.read("t"), "2+7")]);
        vec![t, use_site]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let t = module.name_declared("t").expect("t");
    assert_eq!(
        plan.aliased_calls.get(&t),
        Some(&AliasedCall {
            call: at(&module, "1+8"),
            assignment: at(&module, "1+0"),
            use_site: at(&module, "2+7"),
        })
    );
}

#[test]
fn names_read_twice_are_not_aliased() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let t = b.let_decl("t", None, Some(b.op("listOf", Vec::new())));
        let first = b.op("listOf", vec![b.read("t")]);
        let second = b.op("listOf", vec![b.read("t")]);
        vec![t, first, second]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    assert!(plan.aliased_calls.is_empty());
}

#[test]
fn conditions_are_collected() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let flag = b.var_decl("flag", None, None);
        let branch = b.if_then(b.place(b.read("flag"), "2+4"), |_| Vec::new());
        let lp = b.while_loop(b.place(b.boolean(false), "3+7"), |_| Vec::new());
        vec![flag, branch, lp]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    assert_eq!(
        plan.used_as_condition,
        BTreeSet::from([at(&module, "2+4"), at(&module, "3+7")])
    );
}

#[test]
fn untyped_lambdas_are_typed_after_their_call() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let apply = b.fun_decl(
            "apply",
            Signature::new()
                .param("f", "fn (Int): Int")
                .param("x", "Int")
                .returns("Int"),
            |b| vec![b.call(b.read("f"), vec![b.read("x")])],
        );
        let lambda = b.place(
            b.fun(Signature::new().untyped_param("y"), |b| vec![b.read("y")]),
            "2+6",
        );
        let call = b.place(b.call(b.read("apply"), vec![lambda, b.int(2)]), "2+0");
        vec![apply, call]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let lambda = at(&module, "2+6");
    let call = at(&module, "2+0");
    assert_eq!(plan.deferred_lambdas.get(&lambda), Some(&call));
    assert!(index_of(&plan, call) < index_of(&plan, lambda));
}

#[test]
fn class_members_map_to_their_shapes() {
    let module = TreeBuilder::build("plan.temper", |b| {
        vec![b.class_decl("Point", |c| {
            c.property("x", Visibility::Public, Some("Int"), Some(c.builder().int(0)));
        })]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let summary = plan.summarize(&module);
    assert!(summary
        .names_to_local_member_shapes
        .iter()
        .any(|(name, _)| name == "x"));
    assert!(summary.return_names.iter().any(|name| name == "return__0"));
}

#[test]
fn assignments_after_both_arms_initialize_are_not_initializers() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let x = b.var_decl("x", None, None);
        let branch = b.if_else(
            b.op("<", vec![b.int(1), b.int(2)]),
            |b| vec![b.assign("x", b.place(b.int(0), "2+8"))],
            |b| vec![b.assign("x", b.place(b.int(1), "3+8"))],
        );
        let later = b.assign("x", b.place(b.int(2), "4+4"));
        vec![x, branch, later]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let x = module.name_declared("x").expect("x");
    assert_eq!(
        plan.initializers_of(x),
        &[at(&module, "2+8"), at(&module, "3+8")]
    );
}

#[test]
fn conditions_are_typed_before_either_branch() {
    let module = TreeBuilder::build("plan.temper", |b| {
        let branch = b.if_else(
            b.place(b.op("<", vec![b.int(1), b.int(2)]), "1+4"),
            |b| {
                vec![
                    b.place(b.op("randomInt", Vec::new()), "2+2"),
                    b.place(b.op("randomInt", Vec::new()), "3+2"),
                ]
            },
            |b| vec![b.place(b.op("randomInt", Vec::new()), "5+2")],
        );
        vec![branch, b.place(b.op("randomInt", Vec::new()), "7+0")]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let order: Vec<usize> = ["1+4", "2+2", "3+2", "5+2", "7+0"]
        .iter()
        .map(|position| index_of(&plan, at(&module, position)))
        .collect();
    assert!(order.windows(2).all(|pair| pair[0] < pair[1]), "{order:?}");
}

#[test]
fn declarations_are_ordered_before_earlier_readers() {
    let module = TreeBuilder::build("plan.temper", |b| {
        b.hoist(&["limit"]);
        let show = b.place(
            b.let_decl("show", None, Some(b.op("+", vec![b.read("limit"), b.int(1)]))),
            "1+0",
        );
        let limit = b.place(b.let_decl("limit", None, Some(b.int(10))), "2+0");
        let after = b.place(b.op("randomInt", Vec::new()), "3+0");
        vec![show, limit, after]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    let show = index_of(&plan, at(&module, "1+0"));
    let limit = index_of(&plan, at(&module, "2+0"));
    let after = index_of(&plan, at(&module, "3+0"));
    assert!(limit < show);
    assert!(show < after);
}

#[test]
fn mutually_dependent_declarations_keep_source_order() {
    let module = TreeBuilder::build("plan.temper", |b| {
        b.hoist(&["ping", "pong"]);
        let ping = b.place(
            b.fun_decl("ping", Signature::new().returns("Int"), |b| {
                vec![b.call(b.read("pong"), Vec::new())]
            }),
            "1+0",
        );
        let pong = b.place(
            b.fun_decl("pong", Signature::new().returns("Int"), |b| {
                vec![b.call(b.read("ping"), Vec::new())]
            }),
            "2+0",
        );
        vec![ping, pong]
    })
    .expect("module");
    let plan = TyperPlan::build(&module);

    assert!(index_of(&plan, at(&module, "1+0")) < index_of(&plan, at(&module, "2+0")));
}
