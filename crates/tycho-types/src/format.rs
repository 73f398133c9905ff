//! Stable, diagnostics-oriented type rendering.
//!
//! The output is meant for messages and test assertions, not for parsing
//! back: `List<out Int>`, `String?`, `Number..Number?` for flexible ranges.

use crate::{Head, Nullability, RigidType, StubOrigin, Type, TypeArg, TypeEnv, Variance};

pub fn format_type(env: &dyn TypeEnv, ty: &Type) -> String {
    match ty {
        Type::Rigid(r) => format_rigid(env, r),
        Type::Flexible(f) => format!(
            "{}..{}",
            format_rigid(env, &f.lower),
            format_rigid(env, &f.upper)
        ),
    }
}

fn format_rigid(env: &dyn TypeEnv, ty: &RigidType) -> String {
    let mut out = match &ty.head {
        Head::Class(id) => env
            .ctor(*id)
            .map(|decl| decl.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0)),
        Head::Param(id) => env
            .type_param(*id)
            .map(|decl| decl.name.clone())
            .unwrap_or_else(|| format!("#{}", id.0)),
        Head::Intersection(members) => members
            .iter()
            .map(|m| format_type(env, m))
            .collect::<Vec<_>>()
            .join(" & "),
        Head::IntegerLiteral { widths } => {
            let names: Vec<String> = widths
                .iter()
                .map(|w| {
                    env.ctor(*w)
                        .map(|decl| decl.name.clone())
                        .unwrap_or_else(|| format!("#{}", w.0))
                })
                .collect();
            format!("integer({})", names.join(", "))
        }
        Head::Stub { origin, id } => match origin {
            StubOrigin::SubtypingVariable => format!("{{stub {}}}", id.0),
            StubOrigin::BuilderInference => format!("{{postponed {}}}", id.0),
        },
        Head::Captured(captured) => {
            format!("capture({})", format_arg(env, &captured.projection))
        }
        Head::Error(info) => format!("{{error: {}}}", info.reason),
    };

    if !ty.args.is_empty() {
        let rendered: Vec<String> = ty.args.iter().map(|a| format_arg(env, a)).collect();
        out.push('<');
        out.push_str(&rendered.join(", "));
        out.push('>');
    }

    match ty.nullability {
        Nullability::NotMarked => {}
        Nullability::Nullable => out.push('?'),
        Nullability::DefinitelyNotNull => out.push_str(" & Any"),
    }
    out
}

fn format_arg(env: &dyn TypeEnv, arg: &TypeArg) -> String {
    match arg {
        TypeArg::Star => "*".to_string(),
        TypeArg::Arg { variance, ty } => {
            let rendered = format_type(env, ty);
            match variance {
                Variance::Invariant => rendered,
                Variance::Out => format!("out {rendered}"),
                Variance::In => format!("in {rendered}"),
            }
        }
    }
}
