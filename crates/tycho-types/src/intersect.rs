//! Intersection-type construction.

use crate::{
    equal_types, is_subtype_of, FlexibleType, Head, Nullability, RigidType, SubtypePolicy, Type,
    TypeEnv,
};

/// Intersect `types` into a single type.
///
/// Members that are supertypes of other members are dropped (the most
/// specific members carry all the information); a single survivor is
/// returned as-is. The result is nullable only when every input is
/// nullable; members are stored nullability-stripped.
pub fn intersect_types(env: &dyn TypeEnv, types: &[Type]) -> Type {
    assert!(!types.is_empty(), "intersection of no types");
    if types.len() == 1 {
        return types[0].clone();
    }

    if types.iter().any(Type::is_flexible) {
        let lowers: Vec<Type> = types
            .iter()
            .map(|t| Type::Rigid(t.lower_if_flexible().clone()))
            .collect();
        let uppers: Vec<Type> = types
            .iter()
            .map(|t| Type::Rigid(t.upper_if_flexible().clone()))
            .collect();
        let lower = intersect_rigid(env, &lowers);
        let upper = intersect_rigid(env, &uppers);
        if lower == upper {
            return Type::Rigid(lower);
        }
        return Type::Flexible(FlexibleType { lower, upper });
    }

    Type::Rigid(intersect_rigid(env, types))
}

fn intersect_rigid(env: &dyn TypeEnv, types: &[Type]) -> RigidType {
    let all_nullable = types
        .iter()
        .all(|t| t.lower_if_flexible().is_marked_nullable());
    let result_nullability = if all_nullable {
        Nullability::Nullable
    } else {
        Nullability::NotMarked
    };

    let stripped: Vec<RigidType> = types
        .iter()
        .map(|t| t.lower_if_flexible().with_nullability(Nullability::NotMarked))
        .collect();

    // Deduplicate, first occurrence wins.
    let mut members: Vec<RigidType> = Vec::new();
    for t in &stripped {
        let duplicate = members.iter().any(|m| {
            equal_types(
                env,
                &Type::Rigid(m.clone()),
                &Type::Rigid(t.clone()),
                SubtypePolicy::STRICT,
            )
        });
        if !duplicate {
            members.push(t.clone());
        }
    }

    // Drop members that are strict supertypes of another member.
    let mut index = 0;
    while index < members.len() {
        let is_redundant = members.iter().enumerate().any(|(other, m)| {
            other != index
                && is_subtype_of(
                    env,
                    &Type::Rigid(m.clone()),
                    &Type::Rigid(members[index].clone()),
                    SubtypePolicy::STRICT,
                )
        });
        if is_redundant {
            members.remove(index);
        } else {
            index += 1;
        }
    }

    if members.len() == 1 {
        let single = members.pop().expect("member list is non-empty");
        return single.with_nullability(result_nullability);
    }

    RigidType {
        head: Head::Intersection(members.into_iter().map(Type::Rigid).collect()),
        args: vec![],
        nullability: result_nullability,
        is_extension_fn: false,
    }
}
