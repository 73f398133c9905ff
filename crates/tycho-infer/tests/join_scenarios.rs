use pretty_assertions::assert_eq;

use tycho_infer::{common_super_type, InferenceOptions};
use tycho_types::{
    intersect_types, CaptureStatus, CtorDecl, CtorId, Head, Nullability, RigidType, StubOrigin,
    Type, TypeArg, TypeEnv, TypeStore, Variance,
};

fn join(env: &TypeStore, types: &[Type]) -> Type {
    common_super_type(env, types, InferenceOptions::default())
}

/// `Fruit`, with `Apple` and `Banana` below it.
fn fruit_fixture(env: &mut TypeStore) -> (CtorId, CtorId, CtorId) {
    let fruit = env.add_ctor(CtorDecl {
        name: "Fruit".to_string(),
        params: vec![],
        supertypes: vec![],
    });
    let apple = env.add_ctor(CtorDecl {
        name: "Apple".to_string(),
        params: vec![],
        supertypes: vec![RigidType::class(fruit, vec![])],
    });
    let banana = env.add_ctor(CtorDecl {
        name: "Banana".to_string(),
        params: vec![],
        supertypes: vec![RigidType::class(fruit, vec![])],
    });
    (fruit, apple, banana)
}

fn generic_ctor(env: &mut TypeStore, name: &str, variance: Variance) -> CtorId {
    let t = env.add_type_param("T", variance);
    env.add_ctor(CtorDecl {
        name: name.to_string(),
        params: vec![t],
        supertypes: vec![],
    })
}

#[test]
fn single_operand_is_returned_unchanged() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let ty = Type::class(wk.list, vec![TypeArg::out(Type::class(wk.int, vec![]))])
        .with_nullability(Nullability::Nullable);
    assert_eq!(join(&env, &[ty.clone()]), ty);
}

#[test]
fn siblings_join_to_their_shared_ancestor() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);

    let joined = join(
        &env,
        &[Type::class(apple, vec![]), Type::class(banana, vec![])],
    );
    assert_eq!(joined, Type::class(fruit, vec![]));
}

#[test]
fn declared_supertype_absorbs_its_subtype() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, _) = fruit_fixture(&mut env);

    let joined = join(&env, &[Type::class(apple, vec![]), Type::class(fruit, vec![])]);
    assert_eq!(joined, Type::class(fruit, vec![]));
}

#[test]
fn numeric_siblings_meet_below_number() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let int = Type::class(wk.int, vec![]);
    let long = Type::class(wk.long, vec![]);
    let number = Type::class(wk.number, vec![]);

    let joined = join(&env, &[int.clone(), long.clone()]);
    let policy = tycho_types::SubtypePolicy::STRICT;
    assert!(tycho_types::is_subtype_of(&env, &int, &joined, policy));
    assert!(tycho_types::is_subtype_of(&env, &long, &joined, policy));
    assert!(tycho_types::is_subtype_of(&env, &joined, &number, policy));
    // `Int` and `Long` also share `Comparable`, so the join is finer than
    // `Number` alone.
    assert!(matches!(
        joined.lower_if_flexible().head,
        Head::Intersection(_)
    ));
}

#[test]
fn covariant_positions_join_their_arguments() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);
    let producer = generic_ctor(&mut env, "Producer", Variance::Out);

    let joined = join(
        &env,
        &[
            Type::class(producer, vec![TypeArg::inv(Type::class(apple, vec![]))]),
            Type::class(producer, vec![TypeArg::inv(Type::class(banana, vec![]))]),
        ],
    );
    assert_eq!(
        joined,
        Type::class(producer, vec![TypeArg::inv(Type::class(fruit, vec![]))])
    );
}

#[test]
fn contravariant_positions_intersect_their_arguments() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, banana) = fruit_fixture(&mut env);
    let consumer = generic_ctor(&mut env, "Consumer", Variance::In);

    let apple_ty = Type::class(apple, vec![]);
    let banana_ty = Type::class(banana, vec![]);
    let joined = join(
        &env,
        &[
            Type::class(consumer, vec![TypeArg::inv(apple_ty.clone())]),
            Type::class(consumer, vec![TypeArg::inv(banana_ty.clone())]),
        ],
    );
    let expected_arg = intersect_types(&env, &[apple_ty, banana_ty]);
    assert_eq!(
        joined,
        Type::class(consumer, vec![TypeArg::inv(expected_arg)])
    );
}

#[test]
fn invariant_use_site_in_projections_intersect() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, banana) = fruit_fixture(&mut env);
    let boxed = generic_ctor(&mut env, "Box", Variance::Invariant);

    let apple_ty = Type::class(apple, vec![]);
    let banana_ty = Type::class(banana, vec![]);
    let joined = join(
        &env,
        &[
            Type::class(boxed, vec![TypeArg::in_(apple_ty.clone())]),
            Type::class(boxed, vec![TypeArg::in_(banana_ty.clone())]),
        ],
    );
    let expected_arg = intersect_types(&env, &[apple_ty, banana_ty]);
    assert_eq!(joined, Type::class(boxed, vec![TypeArg::in_(expected_arg)]));
}

#[test]
fn invariant_positions_promote_to_out_when_arguments_differ() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);
    let boxed = generic_ctor(&mut env, "Box", Variance::Invariant);

    let joined = join(
        &env,
        &[
            Type::class(boxed, vec![TypeArg::inv(Type::class(apple, vec![]))]),
            Type::class(boxed, vec![TypeArg::inv(Type::class(banana, vec![]))]),
        ],
    );
    assert_eq!(
        joined,
        Type::class(boxed, vec![TypeArg::out(Type::class(fruit, vec![]))])
    );
}

#[test]
fn invariant_positions_keep_identical_arguments() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);
    let boxed = generic_ctor(&mut env, "Box", Variance::Invariant);
    let apple_box = RigidType::class(boxed, vec![TypeArg::inv(Type::class(apple, vec![]))]);
    let crate_a = env.add_ctor(CtorDecl {
        name: "CrateA".to_string(),
        params: vec![],
        supertypes: vec![apple_box.clone()],
    });
    let crate_b = env.add_ctor(CtorDecl {
        name: "CrateB".to_string(),
        params: vec![],
        supertypes: vec![apple_box.clone()],
    });

    // Both operands project Box<Apple>; the argument agrees exactly and
    // stays invariant.
    let joined = join(
        &env,
        &[Type::class(crate_a, vec![]), Type::class(crate_b, vec![])],
    );
    assert_eq!(joined, Type::Rigid(apple_box));
}

#[test]
fn mixed_out_and_in_projections_collapse_to_star() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, banana) = fruit_fixture(&mut env);
    let boxed = generic_ctor(&mut env, "Box", Variance::Invariant);

    let joined = join(
        &env,
        &[
            Type::class(boxed, vec![TypeArg::out(Type::class(apple, vec![]))]),
            Type::class(boxed, vec![TypeArg::in_(Type::class(banana, vec![]))]),
        ],
    );
    assert_eq!(joined, Type::class(boxed, vec![TypeArg::Star]));
}

#[test]
fn improved_variance_keeps_invariant_when_join_matches_all_arguments() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);
    let boxed = generic_ctor(&mut env, "Box", Variance::Invariant);
    let wk = *env.well_known();

    let stub = env.new_stub(StubOrigin::SubtypingVariable);
    let list_stub = Type::class(wk.list, vec![TypeArg::inv(Type::Rigid(stub))]);
    let list_apple = Type::class(wk.list, vec![TypeArg::inv(Type::class(apple, vec![]))]);

    let operands = [
        Type::class(boxed, vec![TypeArg::inv(list_stub)]),
        Type::class(boxed, vec![TypeArg::inv(list_apple.clone())]),
    ];

    let improved = common_super_type(&env, &operands, InferenceOptions::default());
    assert_eq!(
        improved,
        Type::class(boxed, vec![TypeArg::inv(list_apple.clone())])
    );

    let legacy = common_super_type(
        &env,
        &operands,
        InferenceOptions {
            improved_variance_in_cst: false,
        },
    );
    assert_eq!(legacy, Type::class(boxed, vec![TypeArg::out(list_apple)]));
}

#[test]
fn nullable_operand_makes_the_join_nullable() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);

    let joined = join(
        &env,
        &[
            Type::class(apple, vec![]).with_nullability(Nullability::Nullable),
            Type::class(banana, vec![]),
        ],
    );
    assert_eq!(
        joined,
        Type::class(fruit, vec![]).with_nullability(Nullability::Nullable)
    );
}

#[test]
fn bottom_is_absorbed_and_nullability_preserved() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let joined = join(
        &env,
        &[
            Type::class(wk.string, vec![]).with_nullability(Nullability::Nullable),
            Type::class(wk.nothing, vec![]),
        ],
    );
    assert_eq!(
        joined,
        Type::class(wk.string, vec![]).with_nullability(Nullability::Nullable)
    );
}

#[test]
fn error_operands_poison_the_join() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let error = Type::Rigid(RigidType::new(
        Head::Error(tycho_types::ErrorInfo {
            reason: "unresolved reference".to_string(),
            operands: vec![],
        }),
        vec![],
    ));
    let joined = join(&env, &[error, Type::class(wk.string, vec![])]);

    let Type::Rigid(rigid) = joined else {
        panic!("expected a rigid error type");
    };
    let Head::Error(info) = rigid.head else {
        panic!("expected an error head, got {:?}", rigid.head);
    };
    assert_eq!(info.operands.len(), 2);
}

#[test]
fn error_in_a_supertype_closure_poisons_the_join() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);

    let broken = env.add_ctor(CtorDecl {
        name: "Broken".to_string(),
        params: vec![],
        supertypes: vec![RigidType::new(
            Head::Error(tycho_types::ErrorInfo {
                reason: "unresolved supertype".to_string(),
                operands: vec![],
            }),
            vec![],
        )],
    });

    let joined = join(&env, &[Type::class(broken, vec![]), Type::class(apple, vec![])]);
    let Type::Rigid(rigid) = joined else {
        panic!("expected a rigid error type");
    };
    assert!(rigid.is_error());
}

#[test]
fn exact_match_collapses_flexible_and_rigid_operands() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let string = RigidType::class(wk.string, vec![]);
    let platform_string = Type::flexible(
        string.clone(),
        string.with_nullability(Nullability::Nullable),
    );

    let joined = join(&env, &[platform_string, Type::class(wk.string, vec![])]);
    assert_eq!(joined, Type::class(wk.string, vec![]));
}

#[test]
fn distinct_flexible_operands_join_bound_wise() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);

    let apple_rigid = RigidType::class(apple, vec![]);
    let platform_apple = Type::flexible(
        apple_rigid.clone(),
        apple_rigid.with_nullability(Nullability::Nullable),
    );

    let joined = join(&env, &[platform_apple, Type::class(banana, vec![])]);
    let fruit_rigid = RigidType::class(fruit, vec![]);
    assert_eq!(
        joined,
        Type::flexible(
            fruit_rigid.clone(),
            fruit_rigid.with_nullability(Nullability::Nullable)
        )
    );
}

#[test]
fn dynamic_absorbs_the_join() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);
    let wk = *env.well_known();

    let dynamic = Type::flexible(
        RigidType::class(wk.nothing, vec![]),
        RigidType::class(wk.any, vec![]).with_nullability(Nullability::Nullable),
    );
    let joined = join(&env, &[dynamic.clone(), Type::class(apple, vec![])]);
    assert_eq!(joined, dynamic);
}

#[test]
fn captured_dynamic_absorbs_the_join() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);
    let wk = *env.well_known();

    let dynamic = Type::flexible(
        RigidType::class(wk.nothing, vec![]),
        RigidType::class(wk.any, vec![]).with_nullability(Nullability::Nullable),
    );
    let captured = env.new_capture(
        TypeArg::out(dynamic),
        vec![Type::class(wk.any, vec![])],
        CaptureStatus::FromExpression,
    );

    let joined = join(
        &env,
        &[Type::Rigid(captured.clone()), Type::class(apple, vec![])],
    );
    assert_eq!(joined, Type::Rigid(captured));
}

#[test]
fn subtyping_captures_are_unwrapped_before_argument_combination() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);
    let producer = generic_ctor(&mut env, "Producer", Variance::Out);

    let apple_ty = Type::class(apple, vec![]);
    let captured = env.new_capture(
        TypeArg::out(apple_ty.clone()),
        vec![apple_ty],
        CaptureStatus::ForSubtyping,
    );

    let joined = join(
        &env,
        &[
            Type::class(producer, vec![TypeArg::inv(Type::Rigid(captured))]),
            Type::class(producer, vec![TypeArg::inv(Type::class(banana, vec![]))]),
        ],
    );
    assert_eq!(
        joined,
        Type::class(producer, vec![TypeArg::inv(Type::class(fruit, vec![]))])
    );
}

#[test]
fn self_bounded_hierarchy_terminates_with_a_star_argument() {
    let mut env = TypeStore::with_builtins();
    let some = generic_ctor(&mut env, "Some", Variance::Invariant);
    let a = env.intern_ctor_id("A");
    env.define_ctor(
        a,
        CtorDecl {
            name: "A".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(some, vec![TypeArg::inv(Type::class(a, vec![]))])],
        },
    );
    let b = env.intern_ctor_id("B");
    env.define_ctor(
        b,
        CtorDecl {
            name: "B".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(some, vec![TypeArg::inv(Type::class(b, vec![]))])],
        },
    );

    let joined = join(&env, &[Type::class(a, vec![]), Type::class(b, vec![])]);
    assert_eq!(joined, Type::class(some, vec![TypeArg::Star]));
}

#[test]
fn joining_instantiations_of_a_self_bounded_constructor_folds_to_star() {
    let mut env = TypeStore::with_builtins();
    let node = generic_ctor(&mut env, "Node", Variance::Invariant);
    let a = env.intern_ctor_id("NodeA");
    env.define_ctor(
        a,
        CtorDecl {
            name: "NodeA".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(node, vec![TypeArg::inv(Type::class(a, vec![]))])],
        },
    );
    let b = env.intern_ctor_id("NodeB");
    env.define_ctor(
        b,
        CtorDecl {
            name: "NodeB".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(node, vec![TypeArg::inv(Type::class(b, vec![]))])],
        },
    );

    let joined = join(
        &env,
        &[
            Type::class(node, vec![TypeArg::inv(Type::class(a, vec![]))]),
            Type::class(node, vec![TypeArg::inv(Type::class(b, vec![]))]),
        ],
    );
    assert_eq!(joined, Type::class(node, vec![TypeArg::Star]));
}

#[test]
fn rotating_recursion_is_cut_off_by_the_depth_bound() {
    let mut env = TypeStore::with_builtins();
    let producer = generic_ctor(&mut env, "Producer", Variance::Out);

    // X : Producer<Y>, Y : Producer<Z>, Z : Producer<X> — a cycle the
    // relabeling check cannot see, bounded by depth instead.
    let x = env.intern_ctor_id("X");
    let y = env.intern_ctor_id("Y");
    let z = env.intern_ctor_id("Z");
    env.define_ctor(
        x,
        CtorDecl {
            name: "X".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(producer, vec![TypeArg::inv(Type::class(y, vec![]))])],
        },
    );
    env.define_ctor(
        y,
        CtorDecl {
            name: "Y".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(producer, vec![TypeArg::inv(Type::class(z, vec![]))])],
        },
    );
    env.define_ctor(
        z,
        CtorDecl {
            name: "Z".to_string(),
            params: vec![],
            supertypes: vec![RigidType::class(producer, vec![TypeArg::inv(Type::class(x, vec![]))])],
        },
    );

    let joined = join(&env, &[Type::class(x, vec![]), Type::class(y, vec![])]);
    let expected = Type::class(
        producer,
        vec![TypeArg::inv(Type::class(
            producer,
            vec![TypeArg::inv(Type::class(producer, vec![TypeArg::Star]))],
        ))],
    );
    assert_eq!(joined, expected);
}

#[test]
fn postponed_stubs_that_disagree_widen_to_nullable_top() {
    let mut env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let s1 = env.new_stub(StubOrigin::BuilderInference);
    let s2 = env.new_stub(StubOrigin::BuilderInference);
    let joined = join(&env, &[Type::Rigid(s1), Type::Rigid(s2)]);
    assert_eq!(
        joined,
        Type::class(wk.any, vec![]).with_nullability(Nullability::Nullable)
    );
}

#[test]
fn postponed_stub_nullability_contributions_are_merged() {
    let mut env = TypeStore::with_builtins();

    let stub = env.new_stub(StubOrigin::BuilderInference);

    // A nullable occurrence forces the nullable form.
    let joined = join(
        &env,
        &[
            Type::Rigid(stub.clone()),
            Type::Rigid(stub.with_nullability(Nullability::Nullable)),
        ],
    );
    assert_eq!(
        joined,
        Type::Rigid(stub.with_nullability(Nullability::Nullable))
    );

    // All definitely-not-null occurrences keep the strengthened form.
    let dnn = stub.with_nullability(Nullability::DefinitelyNotNull);
    let joined = join(&env, &[Type::Rigid(dnn.clone()), Type::Rigid(dnn.clone())]);
    assert_eq!(joined, Type::Rigid(dnn));
}

#[test]
fn postponed_stub_absorbs_bottom_operands() {
    let mut env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let stub = env.new_stub(StubOrigin::BuilderInference);
    let joined = join(
        &env,
        &[Type::Rigid(stub.clone()), Type::class(wk.nothing, vec![])],
    );
    assert_eq!(joined, Type::Rigid(stub));
}

#[test]
fn postponed_stub_defers_to_proper_operands() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);

    let stub = env.new_stub(StubOrigin::BuilderInference);
    let joined = join(&env, &[Type::Rigid(stub), Type::class(apple, vec![])]);
    assert_eq!(joined, Type::class(apple, vec![]));
}

#[test]
fn subtyping_variable_stubs_contribute_nothing() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);

    let stub = env.new_stub(StubOrigin::SubtypingVariable);
    let joined = join(&env, &[Type::Rigid(stub), Type::class(apple, vec![])]);
    assert_eq!(joined, Type::class(apple, vec![]));
}

#[test]
fn star_operand_forces_a_star_argument() {
    let mut env = TypeStore::with_builtins();
    let (_, apple, _) = fruit_fixture(&mut env);
    let producer = generic_ctor(&mut env, "Producer", Variance::Out);

    let joined = join(
        &env,
        &[
            Type::class(producer, vec![TypeArg::Star]),
            Type::class(producer, vec![TypeArg::inv(Type::class(apple, vec![]))]),
        ],
    );
    assert_eq!(joined, Type::class(producer, vec![TypeArg::Star]));
}

#[test]
fn integer_literals_widen_to_their_first_common_width() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let small = Type::Rigid(RigidType::new(
        Head::IntegerLiteral {
            widths: vec![wk.int, wk.long, wk.short, wk.byte],
        },
        vec![],
    ));
    let large = Type::Rigid(RigidType::new(
        Head::IntegerLiteral {
            widths: vec![wk.int, wk.long],
        },
        vec![],
    ));

    let joined = join(&env, &[small, large]);
    assert_eq!(joined, Type::class(wk.int, vec![]));
}

#[test]
fn integer_literal_against_a_concrete_width_collapses() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let literal = Type::Rigid(RigidType::new(
        Head::IntegerLiteral {
            widths: vec![wk.int, wk.long],
        },
        vec![],
    ));
    let joined = join(&env, &[literal, Type::class(wk.int, vec![])]);
    assert_eq!(joined, Type::class(wk.int, vec![]));
}

#[test]
fn builtin_collections_join_through_their_shared_comparable() {
    let env = TypeStore::with_builtins();
    let wk = *env.well_known();

    let string = Type::class(wk.string, vec![]);
    let int = Type::class(wk.int, vec![]);
    let element = Type::class(
        wk.comparable,
        vec![TypeArg::inv(intersect_types(
            &env,
            &[string.clone(), int.clone()],
        ))],
    );

    let covariant = join(
        &env,
        &[
            Type::class(wk.list, vec![TypeArg::inv(string.clone())]),
            Type::class(wk.list, vec![TypeArg::inv(int.clone())]),
        ],
    );
    assert_eq!(
        covariant,
        Type::class(wk.list, vec![TypeArg::inv(element.clone())])
    );

    let invariant = join(
        &env,
        &[
            Type::class(wk.mutable_list, vec![TypeArg::inv(string)]),
            Type::class(wk.mutable_list, vec![TypeArg::inv(int)]),
        ],
    );
    assert_eq!(
        invariant,
        Type::class(wk.mutable_list, vec![TypeArg::out(element)])
    );
}

#[test]
fn extension_marker_survives_only_when_all_operands_carry_it() {
    let mut env = TypeStore::with_builtins();
    let (fruit, apple, banana) = fruit_fixture(&mut env);
    let producer = generic_ctor(&mut env, "Producer", Variance::Out);

    let mut apple_fn = RigidType::class(producer, vec![TypeArg::inv(Type::class(apple, vec![]))]);
    apple_fn.is_extension_fn = true;
    let mut banana_fn = RigidType::class(producer, vec![TypeArg::inv(Type::class(banana, vec![]))]);
    banana_fn.is_extension_fn = true;

    let joined = join(&env, &[Type::Rigid(apple_fn.clone()), Type::Rigid(banana_fn)]);
    let Type::Rigid(rigid) = &joined else {
        panic!("expected a rigid join");
    };
    assert!(rigid.is_extension_fn);
    assert_eq!(rigid.head, Head::Class(producer));
    assert_eq!(
        rigid.args,
        vec![TypeArg::inv(Type::class(fruit, vec![]))]
    );

    let mut plain = RigidType::class(producer, vec![TypeArg::inv(Type::class(banana, vec![]))]);
    plain.is_extension_fn = false;
    let joined = join(&env, &[Type::Rigid(apple_fn), Type::Rigid(plain)]);
    assert!(!joined.lower_if_flexible().is_extension_fn);
}
