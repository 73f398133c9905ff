//! Subtype and equality queries, supertype enumeration, and the
//! corresponding-supertype projection.
//!
//! All queries are parameterized by a [`SubtypePolicy`] controlling whether
//! stub types (inference-variable placeholders) and error types compare
//! equal to anything. Inference runs most checks with stub-tolerant
//! policies; deduplication runs strict.

use std::collections::{HashMap, VecDeque};

use crate::{
    Head, Nullability, RigidType, Type, TypeArg, TypeEnv, TypeParamId, Variance,
};

use crate::CtorId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubtypePolicy {
    pub stub_types_equal_to_anything: bool,
    pub error_types_equal_to_anything: bool,
}

impl SubtypePolicy {
    /// Stubs and errors compare structurally.
    pub const STRICT: SubtypePolicy = SubtypePolicy {
        stub_types_equal_to_anything: false,
        error_types_equal_to_anything: false,
    };

    /// Stubs match anything; errors still compare structurally.
    pub const STUB_TOLERANT: SubtypePolicy = SubtypePolicy {
        stub_types_equal_to_anything: true,
        error_types_equal_to_anything: false,
    };
}

/// Self-referential hierarchies (`C<T> : C<C<T>>`) produce unboundedly many
/// distinct instantiations of the same constructor; the supertype walks cap
/// how many instantiations of one constructor they expand.
const MAX_INSTANTIATIONS_PER_CTOR: usize = 8;

/// `sub <: sup`. Flexible bounds are compared range-against-range: the
/// subtype's lower bound against the supertype's upper bound.
pub fn is_subtype_of(env: &dyn TypeEnv, sub: &Type, sup: &Type, policy: SubtypePolicy) -> bool {
    is_rigid_subtype(env, sub.lower_if_flexible(), sup.upper_if_flexible(), policy)
}

pub fn equal_types(env: &dyn TypeEnv, a: &Type, b: &Type, policy: SubtypePolicy) -> bool {
    is_subtype_of(env, a, b, policy) && is_subtype_of(env, b, a, policy)
}

pub fn equal_rigid(env: &dyn TypeEnv, a: &RigidType, b: &RigidType, policy: SubtypePolicy) -> bool {
    is_rigid_subtype(env, a, b, policy) && is_rigid_subtype(env, b, a, policy)
}

/// Whether `t` is provably a subtype of the non-null top type, i.e. provably
/// not nullable.
///
/// This is a reachability question, not a full subtype query: starting from
/// `t` and expanding only nodes that are not marked nullable, is there a
/// concretely-typed not-null node? Stub and parameter heads pass through
/// their bounds, so an unresolved-variable placeholder counts as not-null
/// unless its marker says otherwise.
pub fn is_subtype_of_top(env: &dyn TypeEnv, t: &RigidType) -> bool {
    let mut visited: Vec<Head> = Vec::new();
    let mut queue: VecDeque<RigidType> = VecDeque::new();
    queue.push_back(t.clone());

    while let Some(node) = queue.pop_front() {
        if node.is_marked_nullable() {
            continue;
        }
        if visited.contains(&node.head) {
            continue;
        }
        visited.push(node.head.clone());
        if node.is_definitely_not_null()
            || matches!(node.head, Head::Class(_) | Head::IntegerLiteral { .. })
        {
            return true;
        }
        push_immediate_supertypes(env, &node, &mut queue);
    }
    false
}

pub fn is_rigid_subtype(
    env: &dyn TypeEnv,
    sub: &RigidType,
    sup: &RigidType,
    policy: SubtypePolicy,
) -> bool {
    if policy.stub_types_equal_to_anything
        && (matches!(sub.head, Head::Stub { .. }) || matches!(sup.head, Head::Stub { .. }))
    {
        return true;
    }
    if let (Head::Stub { id: a, .. }, Head::Stub { id: b, .. }) = (&sub.head, &sup.head) {
        return a == b && nullability_accepts(sub, sup);
    }
    if sub.is_error() || sup.is_error() {
        if policy.error_types_equal_to_anything {
            return true;
        }
        return sub.head == sup.head && nullability_accepts(sub, sup);
    }

    // Definitely-not-null strips down to the underlying type; a
    // definitely-not-null supertype additionally rejects nullable subtypes.
    if sup.is_definitely_not_null() {
        if sub.is_marked_nullable() {
            return false;
        }
        return is_rigid_subtype(
            env,
            &sub.original_if_definitely_not_null(),
            &sup.original_if_definitely_not_null(),
            policy,
        );
    }
    if sub.is_definitely_not_null() {
        return is_rigid_subtype(env, &sub.original_if_definitely_not_null(), sup, policy);
    }

    if sub.is_marked_nullable() && !sup.is_marked_nullable() {
        return false;
    }

    if sub.head == Head::Class(env.well_known().nothing) {
        return true;
    }
    if sup.is_top(env) {
        return true;
    }

    if let Head::Intersection(members) = &sup.head {
        return members
            .iter()
            .all(|m| is_rigid_subtype(env, sub, m.upper_if_flexible(), policy));
    }
    if let Head::Intersection(members) = &sub.head {
        return members
            .iter()
            .any(|m| is_rigid_subtype(env, m.lower_if_flexible(), sup, policy));
    }

    if let Head::IntegerLiteral { widths: sub_w } = &sub.head {
        if let Head::IntegerLiteral { widths: sup_w } = &sup.head {
            return sub_w.iter().all(|w| sup_w.contains(w));
        }
        return sub_w
            .iter()
            .any(|w| is_rigid_subtype(env, &RigidType::class(*w, vec![]), sup, policy));
    }
    if matches!(sup.head, Head::IntegerLiteral { .. }) {
        return false;
    }

    if let Some(captured) = sub.as_captured() {
        if let Some(sup_captured) = sup.as_captured() {
            if captured.id == sup_captured.id {
                return true;
            }
        }
        return captured
            .supertypes
            .iter()
            .any(|st| is_rigid_subtype(env, st.lower_if_flexible(), sup, policy));
    }
    if let Some(captured) = sup.as_captured() {
        // `x <: capture(in L)` holds whenever `x <: L`.
        if let TypeArg::Arg {
            variance: Variance::In,
            ty,
        } = &captured.projection
        {
            return is_rigid_subtype(env, sub, ty.upper_if_flexible(), policy);
        }
        return false;
    }

    match (&sub.head, &sup.head) {
        (Head::Param(a), Head::Param(b)) => a == b,
        (Head::Param(_), _) | (_, Head::Param(_)) => false,
        (Head::Class(_), Head::Class(sup_id)) => {
            find_corresponding_supertypes(env, sub, *sup_id)
                .iter()
                .any(|candidate| class_args_compatible(env, candidate, sup, policy))
        }
        _ => false,
    }
}

fn nullability_accepts(sub: &RigidType, sup: &RigidType) -> bool {
    !(sub.is_marked_nullable() && !sup.is_marked_nullable())
}

/// Argument containment for two instantiations of the same constructor.
fn class_args_compatible(
    env: &dyn TypeEnv,
    sub: &RigidType,
    sup: &RigidType,
    policy: SubtypePolicy,
) -> bool {
    let Head::Class(ctor) = sup.head else {
        return false;
    };
    let Some(decl) = env.ctor(ctor) else {
        return false;
    };
    for (index, param_id) in decl.params.iter().enumerate() {
        let declared = env
            .type_param(*param_id)
            .map(|p| p.variance)
            .unwrap_or(Variance::Invariant);
        let sup_arg = sup.args.get(index).unwrap_or(&TypeArg::Star);
        let sub_arg = sub.args.get(index).unwrap_or(&TypeArg::Star);

        let TypeArg::Arg {
            variance: sup_variance,
            ty: sup_ty,
        } = sup_arg
        else {
            continue; // star accepts anything at this position
        };
        let TypeArg::Arg {
            variance: sub_variance,
            ty: sub_ty,
        } = sub_arg
        else {
            return false; // star is only contained in star
        };

        let effective = if *sup_variance == Variance::Invariant {
            declared
        } else {
            *sup_variance
        };
        match effective {
            Variance::Invariant => {
                if *sub_variance != Variance::Invariant {
                    return false;
                }
                if !equal_types(env, sub_ty, sup_ty, policy) {
                    return false;
                }
            }
            Variance::Out => {
                if *sub_variance == Variance::In {
                    return false;
                }
                if !is_subtype_of(env, sub_ty, sup_ty, policy) {
                    return false;
                }
            }
            Variance::In => {
                if *sub_variance == Variance::Out {
                    return false;
                }
                if !is_subtype_of(env, sup_ty, sub_ty, policy) {
                    return false;
                }
            }
        }
    }
    true
}

/// Enumerate the supertype closure of `start` (including `start` itself),
/// one representative per constructor, in first-seen (breadth-first) order.
pub fn collect_super_types(env: &dyn TypeEnv, start: &RigidType) -> Vec<RigidType> {
    let mut visited: Vec<Head> = Vec::new();
    let mut out: Vec<RigidType> = Vec::new();
    let mut queue: VecDeque<RigidType> = VecDeque::new();
    queue.push_back(start.clone());

    while let Some(t) = queue.pop_front() {
        if visited.contains(&t.head) {
            continue;
        }
        visited.push(t.head.clone());
        out.push(t.clone());
        push_immediate_supertypes(env, &t, &mut queue);
    }
    out
}

fn push_immediate_supertypes(env: &dyn TypeEnv, t: &RigidType, queue: &mut VecDeque<RigidType>) {
    match &t.head {
        Head::Class(id) => {
            if let Some(decl) = env.ctor(*id) {
                for st in &decl.supertypes {
                    queue.push_back(st.clone());
                }
            }
        }
        Head::Intersection(members) => {
            for m in members {
                queue.push_back(m.lower_if_flexible().clone());
            }
        }
        Head::IntegerLiteral { widths } => {
            for w in widths {
                queue.push_back(RigidType::class(*w, vec![]));
            }
        }
        Head::Captured(captured) => {
            for st in &captured.supertypes {
                queue.push_back(st.lower_if_flexible().clone());
            }
        }
        Head::Stub { .. } | Head::Param(_) => {
            queue.push_back(RigidType::class(env.well_known().any, vec![]));
        }
        Head::Error(_) => {}
    }
}

/// Whether `start` reaches a type with head `target` through supertype edges
/// that never pass a nullable-marked node. Used to keep a join result
/// non-null when every operand provides a non-null path to it.
pub fn has_path_by_not_nullable_nodes(env: &dyn TypeEnv, start: &RigidType, target: &Head) -> bool {
    let mut visited: Vec<Head> = Vec::new();
    let mut queue: VecDeque<RigidType> = VecDeque::new();
    queue.push_back(start.clone());

    while let Some(t) = queue.pop_front() {
        if t.is_marked_nullable() {
            continue;
        }
        if visited.contains(&t.head) {
            continue;
        }
        visited.push(t.head.clone());
        if &t.head == target {
            return true;
        }
        push_immediate_supertypes(env, &t, &mut queue);
    }
    false
}

/// Whether the given types disagree in flexibility at any shared structural
/// depth (one is a range where another is rigid). Such types are kept apart
/// by deduplication even when they compare equal.
pub fn has_different_flexibility_at_depth(types: &[Type]) -> bool {
    if types.is_empty() {
        return false;
    }
    let any_flexible = types.iter().any(Type::is_flexible);
    let any_rigid = types.iter().any(|t| !t.is_flexible());
    if any_flexible && any_rigid {
        return true;
    }

    let max_args = types
        .iter()
        .map(|t| t.lower_if_flexible().args.len())
        .max()
        .unwrap_or(0);
    for index in 0..max_args {
        let nested: Vec<Type> = types
            .iter()
            .filter_map(|t| t.lower_if_flexible().args.get(index)?.ty().cloned())
            .collect();
        if has_different_flexibility_at_depth(&nested) {
            return true;
        }
    }
    false
}

/// Substitute `map` into `ty`. Parameter references pick up the mapped
/// argument's type, merged with the reference's own nullability marker.
pub fn substitute_rigid(
    env: &dyn TypeEnv,
    ty: &RigidType,
    map: &HashMap<TypeParamId, TypeArg>,
) -> Type {
    if let Head::Param(p) = &ty.head {
        if let Some(TypeArg::Arg { ty: mapped, .. }) = map.get(p) {
            return apply_ref_nullability(mapped, ty.nullability);
        }
        return Type::Rigid(ty.clone());
    }

    let head = match &ty.head {
        Head::Intersection(members) => Head::Intersection(
            members
                .iter()
                .map(|m| substitute_type(env, m, map))
                .collect(),
        ),
        other => other.clone(),
    };
    Type::Rigid(RigidType {
        head,
        args: ty
            .args
            .iter()
            .map(|arg| substitute_arg(env, arg, map))
            .collect(),
        nullability: ty.nullability,
        is_extension_fn: ty.is_extension_fn,
    })
}

fn substitute_type(env: &dyn TypeEnv, ty: &Type, map: &HashMap<TypeParamId, TypeArg>) -> Type {
    match ty {
        Type::Rigid(r) => substitute_rigid(env, r, map),
        Type::Flexible(f) => {
            let lower = substitute_rigid(env, &f.lower, map);
            let upper = substitute_rigid(env, &f.upper, map);
            Type::flexible(
                lower.lower_if_flexible().clone(),
                upper.upper_if_flexible().clone(),
            )
        }
    }
}

fn substitute_arg(env: &dyn TypeEnv, arg: &TypeArg, map: &HashMap<TypeParamId, TypeArg>) -> TypeArg {
    let TypeArg::Arg { variance, ty } = arg else {
        return TypeArg::Star;
    };

    // A direct parameter reference composes its use-site projection with the
    // mapped argument's projection; conflicting projections collapse to star.
    if let Type::Rigid(r) = ty.as_ref() {
        if let Head::Param(p) = &r.head {
            if r.args.is_empty() {
                return match map.get(p) {
                    None => arg.clone(),
                    Some(TypeArg::Star) => TypeArg::Star,
                    Some(TypeArg::Arg {
                        variance: mapped_variance,
                        ty: mapped_ty,
                    }) => match compose_variance(*variance, *mapped_variance) {
                        None => TypeArg::Star,
                        Some(v) => {
                            TypeArg::of(v, apply_ref_nullability(mapped_ty, r.nullability))
                        }
                    },
                };
            }
        }
    }

    TypeArg::of(*variance, substitute_type(env, ty, map))
}

fn compose_variance(outer: Variance, inner: Variance) -> Option<Variance> {
    match (outer, inner) {
        (Variance::Invariant, v) => Some(v),
        (v, Variance::Invariant) => Some(v),
        (a, b) if a == b => Some(a),
        _ => None,
    }
}

fn apply_ref_nullability(mapped: &Type, reference: Nullability) -> Type {
    match reference {
        Nullability::NotMarked => mapped.clone(),
        Nullability::Nullable => mapped.with_nullability(Nullability::Nullable),
        Nullability::DefinitelyNotNull => mapped.with_nullability(Nullability::DefinitelyNotNull),
    }
}

/// All instantiations of `target` reachable from `t` through substituted
/// declared supertypes, in first-seen order. A type can reach the same
/// constructor along several paths with different arguments; every distinct
/// instantiation is reported.
pub fn find_corresponding_supertypes(
    env: &dyn TypeEnv,
    t: &RigidType,
    target: CtorId,
) -> Vec<RigidType> {
    let mut out: Vec<RigidType> = Vec::new();
    let mut processed: Vec<RigidType> = Vec::new();
    let mut expansions: HashMap<Head, usize> = HashMap::new();
    let mut queue: VecDeque<RigidType> = VecDeque::new();
    queue.push_back(t.clone());

    while let Some(current) = queue.pop_front() {
        if processed.contains(&current) {
            continue;
        }
        processed.push(current.clone());

        let count = expansions.entry(current.head.clone()).or_insert(0);
        if *count >= MAX_INSTANTIATIONS_PER_CTOR {
            continue;
        }
        *count += 1;

        if current.head == Head::Class(target) && !out.contains(&current) {
            out.push(current.clone());
        }

        match &current.head {
            Head::Class(id) => {
                let Some(decl) = env.ctor(*id) else { continue };
                let mut map: HashMap<TypeParamId, TypeArg> =
                    HashMap::with_capacity(decl.params.len());
                for (index, param) in decl.params.iter().enumerate() {
                    map.insert(
                        *param,
                        current.args.get(index).cloned().unwrap_or(TypeArg::Star),
                    );
                }
                for st in &decl.supertypes {
                    let substituted = substitute_rigid(env, st, &map);
                    queue.push_back(substituted.lower_if_flexible().clone());
                }
            }
            Head::Intersection(members) => {
                for m in members {
                    queue.push_back(m.lower_if_flexible().clone());
                }
            }
            Head::IntegerLiteral { widths } => {
                for w in widths {
                    queue.push_back(RigidType::class(*w, vec![]));
                }
            }
            Head::Captured(captured) => {
                for st in &captured.supertypes {
                    queue.push_back(st.lower_if_flexible().clone());
                }
            }
            Head::Param(_) | Head::Stub { .. } | Head::Error(_) => {}
        }
    }
    out
}
