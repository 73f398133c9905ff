//! The common-supertype (join) engine.
//!
//! Given the types observed at a control-flow merge point, compute the most
//! specific type that is a supertype of all of them. The computation is a
//! pure function of its inputs and the declaration environment; every
//! working set below is local to one call.
//!
//! Outline: flexible operands are split into bounds and joined bound-wise
//! (`cst_with_depth`); rigid joins normalize nullability around the core
//! (`cst_rigid`); the core deduplicates, drops redundant supertypes, and
//! either merges postponed-inference stubs, widens integer literals, or
//! intersects instantiations of every most-specific shared constructor
//! (`cst_not_null`). Argument positions recurse back into the join with an
//! explicit depth counter so deeply nested or self-referential generics
//! terminate in a star projection instead of unfolding forever.

use tracing::trace;

use tycho_types::{
    collect_super_types, equal_types, find_corresponding_supertypes, format_type,
    has_different_flexibility_at_depth, has_path_by_not_nullable_nodes, intersect_types,
    is_rigid_subtype, is_subtype_of_top, CaptureStatus, CtorId, ErrorInfo, Head, Nullability,
    RigidType, SubtypePolicy, Type, TypeArg, TypeEnv, Variance,
};

use crate::InferenceOptions;

/// Join `types` into their common supertype.
///
/// The operand list must be non-empty; an empty list is a caller bug and
/// fails fast. A single operand is returned unchanged — the join of one type
/// is itself, and skipping the lattice walk keeps every attribute of the
/// input intact.
pub fn common_super_type(
    env: &dyn TypeEnv,
    types: &[Type],
    options: InferenceOptions,
) -> Type {
    assert!(!types.is_empty(), "join of an empty operand list");
    if types.len() == 1 {
        return types[0].clone();
    }

    // The first `max_depth` levels of argument recursion are unrestricted;
    // only joins nested deeper than the inputs themselves hit the
    // star-projection bailout in `calculate_argument`.
    let max_depth = types.iter().map(Type::type_depth).max().unwrap_or(0);
    trace!(operands = types.len(), max_depth, "computing common supertype");
    cst_with_depth(env, types, -max_depth, options)
}

fn cst_with_depth(
    env: &dyn TypeEnv,
    types: &[Type],
    depth: i32,
    options: InferenceOptions,
) -> Type {
    if types.len() == 1 {
        return types[0].clone();
    }
    debug_assert!(!types.is_empty());

    let mut there_is_flexible = false;
    let mut lowers: Vec<RigidType> = Vec::with_capacity(types.len());
    for t in types {
        match t {
            Type::Rigid(rigid) => {
                // A capture of the dynamic type absorbs the join the same
                // way the dynamic type does.
                if rigid.is_captured_dynamic(env) {
                    trace!("captured dynamic operand absorbs the join");
                    return t.clone();
                }
                lowers.push(rigid.clone());
            }
            Type::Flexible(flexible) => {
                if flexible.is_dynamic(env) {
                    trace!("dynamic operand absorbs the join");
                    return t.clone();
                }
                there_is_flexible = true;
                lowers.push(flexible.lower.clone());
            }
        }
    }

    let lower_join = cst_rigid(env, &lowers, depth, options);
    if !there_is_flexible {
        return Type::Rigid(lower_join);
    }

    let uppers: Vec<RigidType> = types
        .iter()
        .map(|t| t.upper_if_flexible().clone())
        .collect();
    let upper_join = cst_rigid(env, &uppers, depth, options);

    // When every proper operand is the same type up to flexibility, prefer
    // that exact type over building a wider range. Rigid members win the
    // tie so coincidental flexibility does not leak into the result.
    let proper: Vec<&Type> = types
        .iter()
        .filter(|t| {
            !is_type_variable(t.lower_if_flexible()) && !is_type_variable(t.upper_if_flexible())
        })
        .collect();
    let all_equal = !proper.is_empty()
        && proper.iter().copied().all(|t| {
            proper
                .iter()
                .copied()
                .all(|other| equal_types(env, t, other, SubtypePolicy::STUB_TOLERANT))
        });
    if all_equal {
        let exact = proper
            .iter()
            .find(|t| !t.is_flexible())
            .or_else(|| proper.first())
            .expect("proper operand list is non-empty");
        return (**exact).clone();
    }

    Type::flexible(lower_join, upper_join)
}

/// Join rigid operands, normalizing nullability around the not-null core.
fn cst_rigid(
    env: &dyn TypeEnv,
    types: &[RigidType],
    depth: i32,
    options: InferenceOptions,
) -> RigidType {
    if types.iter().any(RigidType::is_error) {
        return error_join(env, types);
    }

    // The result must be marked nullable unless every operand is provably
    // not null (or is a placeholder whose nullability is still open).
    let all_not_null = types.iter().all(|t| {
        is_type_variable(t) || is_not_null_builder_stub(t) || is_subtype_of_top(env, t)
    });
    let stripped: Vec<RigidType> = if all_not_null {
        types.to_vec()
    } else {
        types
            .iter()
            .map(|t| {
                if t.is_marked_nullable() {
                    t.with_nullability(Nullability::NotMarked)
                } else {
                    t.clone()
                }
            })
            .collect()
    };

    let joined = cst_not_null(env, &stripped, depth, options);
    if all_not_null {
        joined
    } else {
        refine_nullability_for_undefined_nullability(env, types, &joined)
            .unwrap_or_else(|| joined.with_nullability(Nullability::Nullable))
    }
}

/// A join whose result head is still an unresolved placeholder may keep its
/// non-null marker if every operand reaches that head through supertype
/// edges that never pass a nullable node.
fn refine_nullability_for_undefined_nullability(
    env: &dyn TypeEnv,
    types: &[RigidType],
    joined: &RigidType,
) -> Option<RigidType> {
    if !joined.can_have_undefined_nullability() {
        return None;
    }
    let actually_not_null = types
        .iter()
        .all(|t| has_path_by_not_nullable_nodes(env, t, &joined.head));
    actually_not_null.then(|| joined.clone())
}

fn cst_not_null(
    env: &dyn TypeEnv,
    types: &[RigidType],
    depth: i32,
    options: InferenceOptions,
) -> RigidType {
    if types.len() == 1 {
        return types[0].clone();
    }

    let non_type_variables: Vec<RigidType> = types
        .iter()
        .filter(|t| !is_type_variable(t))
        .cloned()
        .collect();
    assert!(
        !non_type_variables.is_empty(),
        "join requires at least one operand besides inference variables"
    );

    let (builder_stubs, proper): (Vec<RigidType>, Vec<RigidType>) = non_type_variables
        .into_iter()
        .partition(|t| t.is_stub_for_builder_inference());
    let all_proper_bottom = !proper.is_empty() && proper.iter().all(|t| t.is_nothing(env));
    if !builder_stubs.is_empty() && (proper.is_empty() || all_proper_bottom) {
        return cst_builder_stubs(env, &builder_stubs);
    }

    let unique = uniquify(env, &proper);
    if unique.len() == 1 {
        return unique.into_iter().next().expect("single unique operand");
    }

    let survivors = filter_supertypes(env, unique);
    if survivors.len() == 1 {
        return survivors.into_iter().next().expect("single surviving operand");
    }
    if let Some(error) = find_error_in_supertypes(env, &survivors) {
        return error;
    }
    if let Some(widened) = integer_literal_join(&survivors) {
        return widened;
    }

    ctor_search_and_intersect(env, &survivors, depth, options)
}

/// Merge operands that are all placeholders of postponed-call inference.
/// Unlike the general lattice join, this only reconciles nullability: if the
/// placeholders do not collapse to one type, the result degenerates to the
/// nullable top type rather than guessing.
fn cst_builder_stubs(env: &dyn TypeEnv, stubs: &[RigidType]) -> RigidType {
    debug_assert!(!stubs.is_empty());

    let mut all_definitely_not_null = true;
    let mut any_nullable = false;
    let mut unwrapped: Vec<RigidType> = Vec::with_capacity(stubs.len());
    for stub in stubs {
        if stub.is_definitely_not_null() {
            unwrapped.push(stub.original_if_definitely_not_null());
        } else if stub.is_marked_nullable() {
            any_nullable = true;
            all_definitely_not_null = false;
            unwrapped.push(stub.with_nullability(Nullability::NotMarked));
        } else {
            all_definitely_not_null = false;
            unwrapped.push(stub.clone());
        }
    }

    let unique = uniquify(env, &unwrapped);
    if unique.len() == 1 {
        let single = unique.into_iter().next().expect("single unique stub");
        return if all_definitely_not_null {
            single.with_nullability(Nullability::DefinitelyNotNull)
        } else if any_nullable {
            single.with_nullability(Nullability::Nullable)
        } else {
            single
        };
    }

    trace!("postponed-inference operands do not agree; widening to nullable top");
    RigidType::class(env.well_known().any, vec![]).with_nullability(Nullability::Nullable)
}

/// Representative sample: `(A, B, A)` becomes `(A, B)`. Types that compare
/// equal but disagree in flexibility somewhere in their arguments are kept
/// apart, as are integer-literal operands.
fn uniquify(env: &dyn TypeEnv, types: &[RigidType]) -> Vec<RigidType> {
    let mut unique: Vec<RigidType> = Vec::new();
    for t in types {
        let is_new = unique.iter().all(|u| {
            let equals_modulo_flexibility = equal_rigid_strict(env, u, t) && !u.is_integer_literal();
            !equals_modulo_flexibility
                || has_different_flexibility_at_depth(&[
                    Type::Rigid(u.clone()),
                    Type::Rigid(t.clone()),
                ])
        });
        if is_new {
            unique.push(t.clone());
        }
    }
    unique
}

/// Keep only the most general operands: `A` is dropped when some other
/// operand `A0` satisfies `A <: A0`, because the join of `A` and `A0` is
/// `A0` anyway.
fn filter_supertypes(env: &dyn TypeEnv, list: Vec<RigidType>) -> Vec<RigidType> {
    let mut survivors = list;
    let mut index = 0;
    while index < survivors.len() {
        let is_subtype = survivors.iter().enumerate().any(|(other, supertype)| {
            other != index
                && is_rigid_subtype(env, &survivors[index], supertype, SubtypePolicy::STRICT)
                && !has_different_flexibility_at_depth(&[
                    Type::Rigid(survivors[index].clone()),
                    Type::Rigid(supertype.clone()),
                ])
        });
        if is_subtype {
            survivors.remove(index);
        } else {
            index += 1;
        }
    }
    survivors
}

/// An error type anywhere in an operand's supertype closure poisons the
/// join: propagate it instead of pretending the hierarchy is intact.
fn find_error_in_supertypes(env: &dyn TypeEnv, types: &[RigidType]) -> Option<RigidType> {
    for t in types {
        if let Some(error) = collect_super_types(env, t).into_iter().find(RigidType::is_error) {
            return Some(error);
        }
    }
    None
}

/// Integer-literal operands live in a closed, finite width lattice: widening
/// picks the first width every operand admits. Mixed or disjoint operands
/// fall through to the general search.
fn integer_literal_join(types: &[RigidType]) -> Option<RigidType> {
    let all_literal = types.iter().all(RigidType::is_integer_literal);
    if !all_literal {
        return None;
    }
    let Head::IntegerLiteral { widths: first } = &types[0].head else {
        return None;
    };
    let common: Vec<CtorId> = first
        .iter()
        .filter(|width| {
            types[1..].iter().all(|t| match &t.head {
                Head::IntegerLiteral { widths } => widths.contains(width),
                _ => false,
            })
        })
        .copied()
        .collect();
    common.first().map(|width| RigidType::class(*width, vec![]))
}

/// Intersect instantiations of every most-specific constructor shared by all
/// operands' supertype closures.
fn ctor_search_and_intersect(
    env: &dyn TypeEnv,
    types: &[RigidType],
    depth: i32,
    options: InferenceOptions,
) -> RigidType {
    let ctors = common_super_ctors(env, types);
    debug_assert!(!ctors.is_empty(), "the top type is a supertype of everything");

    let instantiated: Vec<Type> = ctors
        .iter()
        .map(|ctor| Type::Rigid(supertype_with_ctor(env, types, ctor, depth, options)))
        .collect();
    match intersect_types(env, &instantiated) {
        Type::Rigid(rigid) => rigid,
        // Instantiations are rigid, so the intersection is too.
        Type::Flexible(flexible) => flexible.lower,
    }
}

/// The constructors present in every operand's supertype closure, minus
/// those that are themselves strict supertypes of another survivor. Order
/// follows the first operand's closure.
fn common_super_ctors(env: &dyn TypeEnv, types: &[RigidType]) -> Vec<Head> {
    let mut result: Vec<Head> = closure_heads(env, &types[0]);
    for t in &types[1..] {
        let other = closure_heads(env, t);
        result.retain(|head| other.contains(head));
    }
    if result.is_empty() {
        // Only reachable with cyclic declarations that never arrive at the
        // top type; the top is a supertype of everything regardless.
        return vec![Head::Class(env.well_known().any)];
    }

    let redundant: Vec<bool> = result
        .iter()
        .map(|target| {
            result.iter().any(|other| {
                other != target && head_closure_contains(env, other, target)
            })
        })
        .collect();
    result
        .into_iter()
        .zip(redundant)
        .filter_map(|(head, drop)| (!drop).then_some(head))
        .collect()
}

fn closure_heads(env: &dyn TypeEnv, t: &RigidType) -> Vec<Head> {
    collect_super_types(env, t)
        .into_iter()
        .map(|st| st.head)
        .collect()
}

fn head_closure_contains(env: &dyn TypeEnv, head: &Head, target: &Head) -> bool {
    let representative = RigidType::new(head.clone(), vec![]);
    closure_heads(env, &representative)
        .iter()
        .any(|reached| reached == target)
}

/// Build the instantiation of `head` that is a supertype of all operands,
/// combining each argument position under its parameter's variance.
fn supertype_with_ctor(
    env: &dyn TypeEnv,
    types: &[RigidType],
    head: &Head,
    depth: i32,
    options: InferenceOptions,
) -> RigidType {
    let Head::Class(ctor) = head else {
        // Non-nominal constructors (captures, intersections reached through
        // closures) carry no parameters of their own.
        return RigidType::new(head.clone(), vec![]);
    };
    let Some(decl) = env.ctor(*ctor) else {
        return RigidType::new(head.clone(), vec![]);
    };
    if decl.params.is_empty() {
        return RigidType::class(*ctor, vec![]);
    }

    // One operand can reach the constructor along several instantiations
    // (`A <: List<Int>` and `A <: List<Double>`); all of them contribute,
    // trading some precision for a single instantiation per constructor.
    let corresponding: Vec<RigidType> = types
        .iter()
        .flat_map(|t| find_corresponding_supertypes(env, t, *ctor))
        .collect();

    let mut args: Vec<TypeArg> = Vec::with_capacity(decl.params.len());
    for (index, param_id) in decl.params.iter().enumerate() {
        let param_variance = env
            .type_param(*param_id)
            .map(|p| p.variance)
            .unwrap_or(Variance::Invariant);

        let mut there_is_star = false;
        let mut projections: Vec<TypeArg> = Vec::new();
        for supertype in &corresponding {
            let Some(arg) = supertype.args.get(index) else {
                continue;
            };
            let arg = uncapture_from_subtyping(arg);
            match arg {
                TypeArg::Star => there_is_star = true,
                TypeArg::Arg { ref ty, .. }
                    if ty.lower_if_flexible().is_stub_for_subtyping_variable() => {}
                other => projections.push(other),
            }
        }

        let argument = if there_is_star
            || projections.is_empty()
            || check_recursion(types, &projections, param_variance)
        {
            if !there_is_star && !projections.is_empty() {
                trace!(ctor = ?decl.name, index, "argument recursion detected; projecting star");
            }
            TypeArg::Star
        } else {
            collapse_recursive_argument(
                *ctor,
                index,
                calculate_argument(env, param_variance, &projections, depth, options),
            )
        };
        args.push(argument);
    }

    RigidType {
        head: Head::Class(*ctor),
        args,
        nullability: Nullability::NotMarked,
        is_extension_fn: types.iter().all(|t| t.is_extension_fn),
    }
}

/// Captures created transiently while subtype queries ran are unwrapped back
/// to the projection they stand for before the argument combination sees
/// them.
fn uncapture_from_subtyping(arg: &TypeArg) -> TypeArg {
    let Some(Type::Rigid(rigid)) = arg.ty() else {
        return arg.clone();
    };
    let Some(captured) = rigid.as_captured() else {
        return arg.clone();
    };
    if captured.status == CaptureStatus::ForSubtyping {
        captured.projection.clone()
    } else {
        arg.clone()
    }
}

/// Detect self-referential argument positions: when the argument types at a
/// parameter are a relabeling of the operand list itself (`C<T : C<T>>`
/// hierarchies), the position must become a star projection or the join
/// would unfold forever. Captured star projections stand for their
/// supertypes during the comparison. Contravariant parameters intersect
/// their arguments instead of recursing, so they are exempt.
fn check_recursion(
    original: &[RigidType],
    projections: &[TypeArg],
    param_variance: Variance,
) -> bool {
    if param_variance == Variance::In {
        return false;
    }

    let mut originals: Vec<RigidType> = Vec::new();
    for t in original {
        let unwrapped = t.original_if_definitely_not_null();
        if !originals.contains(&unwrapped) {
            originals.push(unwrapped);
        }
    }
    let mut argument_types: Vec<RigidType> = Vec::new();
    for projection in projections {
        let ty = projection
            .ty()
            .expect("star projections were filtered before the recursion check");
        let unwrapped = ty.lower_if_flexible().original_if_definitely_not_null();
        if !argument_types.contains(&unwrapped) {
            argument_types.push(unwrapped);
        }
    }

    if originals.len() != argument_types.len() {
        return false;
    }

    let mut original_heads: Vec<Head> = Vec::new();
    for t in &originals {
        if let Some(supertypes) = captured_star_supertypes(t) {
            for st in supertypes {
                original_heads.push(st.lower_if_flexible().head.clone());
            }
        } else {
            original_heads.push(t.head.clone());
        }
    }

    for argument in &argument_types {
        if originals.contains(argument) {
            continue;
        }
        let Some(supertypes) = captured_star_supertypes(argument) else {
            return false;
        };
        let mut star_found = false;
        for st in supertypes {
            if !original_heads.contains(&st.lower_if_flexible().head) {
                return false;
            }
            star_found = true;
        }
        if !star_found {
            return false;
        }
    }
    true
}

fn captured_star_supertypes(t: &RigidType) -> Option<&[Type]> {
    let captured = t.as_captured()?;
    captured
        .projection
        .is_star()
        .then(|| captured.supertypes.as_slice())
}

/// Fold `C<C<*>>`-shaped covariant arguments down to `C<*>`.
fn collapse_recursive_argument(ctor: CtorId, index: usize, argument: TypeArg) -> TypeArg {
    let TypeArg::Arg {
        variance: Variance::Out,
        ty,
    } = &argument
    else {
        return argument;
    };
    let Type::Rigid(rigid) = ty.as_ref() else {
        return argument;
    };
    if rigid.head == Head::Class(ctor) && rigid.args.get(index).is_some_and(TypeArg::is_star) {
        TypeArg::Star
    } else {
        argument
    }
}

/// Combine the projected arguments at one parameter position.
///
/// `join(Out<X>, Out<Y>) = Out<join(X, Y)>`;
/// `join(In<X>, In<Y>) = In<X & Y>`;
/// `join(Inv<X>, Inv<Y>)` keeps `X` invariant when `X == Y`, keeps the
/// joined argument invariant when it is equal to every operand (improved
/// variance only), and otherwise out-projects it.
fn calculate_argument(
    env: &dyn TypeEnv,
    param_variance: Variance,
    args: &[TypeArg],
    depth: i32,
    options: InferenceOptions,
) -> TypeArg {
    // Nesting already exceeds the depth of the original operands: cut off.
    if depth > 0 {
        trace!(depth, "argument nesting exceeded input depth; projecting star");
        return TypeArg::Star;
    }

    if param_variance == Variance::Invariant
        && args.iter().all(|a| a.variance() == Some(Variance::Invariant))
    {
        let first = &args[0];
        if args.iter().all(|a| a.ty() == first.ty()) {
            return first.clone();
        }
    }

    let as_out: bool;
    if param_variance != Variance::Invariant {
        as_out = param_variance == Variance::Out;
    } else {
        let there_is_out = args.iter().any(|a| a.variance() == Some(Variance::Out));
        let there_is_in = args.iter().any(|a| a.variance() == Some(Variance::In));
        if there_is_out {
            if there_is_in {
                // join(Inv<out X>, Inv<in Y>): no single projection is sound.
                return TypeArg::Star;
            }
            as_out = true;
        } else {
            as_out = !there_is_in;
        }
    }

    let argument_types: Vec<Type> = args
        .iter()
        .map(|a| {
            a.ty()
                .expect("star projections were filtered before argument combination")
                .clone()
        })
        .collect();

    if as_out {
        if param_variance != Variance::Invariant {
            return TypeArg::inv(cst_with_depth(env, &argument_types, depth + 1, options));
        }

        let equal_to_each_other = args.iter().find(|candidate| {
            args.iter().all(|a| {
                equal_types(
                    env,
                    a.ty().expect("star projections were filtered"),
                    candidate.ty().expect("star projections were filtered"),
                    SubtypePolicy::STRICT,
                )
            })
        });

        match equal_to_each_other {
            None => {
                let joined = cst_with_depth(env, &argument_types, depth + 1, options);
                // Keeping the position invariant is only sound when the join
                // is equal to every argument; otherwise claim no more than
                // an out projection.
                let variance = if options.improved_variance_in_cst
                    && argument_types
                        .iter()
                        .all(|t| equal_types(env, t, &joined, SubtypePolicy::STUB_TOLERANT))
                {
                    Variance::Invariant
                } else {
                    Variance::Out
                };
                TypeArg::of(variance, joined)
            }
            Some(equal) => {
                let there_is_projected = args
                    .iter()
                    .any(|a| a.variance() != Some(Variance::Invariant));
                TypeArg::of(
                    if there_is_projected {
                        Variance::Out
                    } else {
                        Variance::Invariant
                    },
                    equal.ty().expect("star projections were filtered").clone(),
                )
            }
        }
    } else {
        let ty = intersect_types(env, &argument_types);
        TypeArg::of(
            if param_variance != Variance::Invariant {
                Variance::Invariant
            } else {
                Variance::In
            },
            ty,
        )
    }
}

fn error_join(env: &dyn TypeEnv, types: &[RigidType]) -> RigidType {
    let rendered: Vec<String> = types
        .iter()
        .map(|t| format_type(env, &Type::Rigid(t.clone())))
        .collect();
    RigidType::new(
        Head::Error(ErrorInfo {
            reason: format!("unresolved operand in join of {}", rendered.join(", ")),
            operands: types.iter().cloned().map(Type::Rigid).collect(),
        }),
        vec![],
    )
}

/// Operands standing in for inference variables of an in-flight subtype
/// query; they contribute nothing to the join shape.
fn is_type_variable(t: &RigidType) -> bool {
    t.is_stub_for_subtyping_variable() || t.is_captured_subtyping_stub()
}

fn is_not_null_builder_stub(t: &RigidType) -> bool {
    t.is_stub_for_builder_inference() && !t.is_marked_nullable()
}

fn equal_rigid_strict(env: &dyn TypeEnv, a: &RigidType, b: &RigidType) -> bool {
    tycho_types::equal_rigid(env, a, b, SubtypePolicy::STRICT)
}
