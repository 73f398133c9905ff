//! Core type model for the Tycho type system.
//!
//! A [`Type`] is either *rigid* (a constructor applied to arguments, plus a
//! nullability marker) or *flexible* (a `lower..upper` range of rigid types,
//! used for values whose nullability is only known up to a range, e.g. at
//! interop boundaries). Declarations live in a [`TypeStore`]; algorithms take
//! the store through the [`TypeEnv`] trait so they can run against the
//! production registry or a small hand-built lattice in tests.
//!
//! Types are immutable values. Operations that "change" a type (nullability
//! toggling, substitution) return new values.

mod format;
mod intersect;
mod store;
mod subtyping;

pub use format::format_type;
pub use intersect::intersect_types;
pub use store::{StoreError, TypeStore, WellKnown};
pub use subtyping::{
    collect_super_types, equal_rigid, equal_types, find_corresponding_supertypes,
    has_different_flexibility_at_depth, has_path_by_not_nullable_nodes, is_rigid_subtype,
    is_subtype_of, is_subtype_of_top, substitute_rigid, SubtypePolicy,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identifies a nominal type constructor (class or interface) in a [`TypeStore`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct CtorId(pub u32);

/// Identifies a formal type parameter. Parameters are interned globally; a
/// parameter's position is its offset in the declaring constructor's
/// `params` list.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct TypeParamId(pub u32);

/// Identifies a stub type standing in for an unresolved inference variable.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct StubId(pub u32);

/// Identifies a captured type argument. Captures compare by identity: two
/// captures of the same projection are still distinct types.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct CaptureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Variance {
    Invariant,
    /// Covariant (`out`) position: producers only.
    Out,
    /// Contravariant (`in`) position: consumers only.
    In,
}

/// Nullability of a rigid type. `DefinitelyNotNull` is the strengthened form
/// a not-null assertion or intersection with the non-null top produces; its
/// `original` is the same type with `NotMarked` nullability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Nullability {
    NotMarked,
    Nullable,
    DefinitelyNotNull,
}

/// What kind of inference variable a stub type stands in for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StubOrigin {
    /// Placeholder substituted for a type variable while a subtype query runs.
    SubtypingVariable,
    /// Placeholder for a variable that postponed-call ("builder") inference
    /// will resolve after the enclosing call is complete.
    BuilderInference,
}

/// Why a captured type exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum CaptureStatus {
    /// Created transiently while checking subtyping; unwrapped back to its
    /// projection whenever it surfaces in a result.
    ForSubtyping,
    /// Created by capture conversion of an expression's type.
    FromExpression,
}

/// A use-site type argument: either the star projection or a type with a
/// use-site variance (`Invariant` meaning a plain argument).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum TypeArg {
    Star,
    Arg { variance: Variance, ty: Box<Type> },
}

impl TypeArg {
    pub fn of(variance: Variance, ty: Type) -> TypeArg {
        TypeArg::Arg {
            variance,
            ty: Box::new(ty),
        }
    }

    /// A plain (invariant-use-site) argument.
    pub fn inv(ty: Type) -> TypeArg {
        TypeArg::of(Variance::Invariant, ty)
    }

    pub fn out(ty: Type) -> TypeArg {
        TypeArg::of(Variance::Out, ty)
    }

    pub fn in_(ty: Type) -> TypeArg {
        TypeArg::of(Variance::In, ty)
    }

    pub fn is_star(&self) -> bool {
        matches!(self, TypeArg::Star)
    }

    pub fn ty(&self) -> Option<&Type> {
        match self {
            TypeArg::Star => None,
            TypeArg::Arg { ty, .. } => Some(ty),
        }
    }

    pub fn variance(&self) -> Option<Variance> {
        match self {
            TypeArg::Star => None,
            TypeArg::Arg { variance, .. } => Some(*variance),
        }
    }
}

/// A captured type argument: the result of fixing a projection at some
/// position to a fresh, opaque type. Compares and hashes by [`CaptureId`].
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct CapturedType {
    pub id: CaptureId,
    /// The projection the capture was created from.
    pub projection: TypeArg,
    /// Upper bounds of the capture (the projected type for `out` projections,
    /// the parameter bounds for `in`/star projections).
    pub supertypes: Vec<Type>,
    pub status: CaptureStatus,
}

impl PartialEq for CapturedType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CapturedType {}

impl std::hash::Hash for CapturedType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Diagnostic payload of an error type: the operands that made the
/// computation impossible, kept for message rendering.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ErrorInfo {
    pub reason: String,
    pub operands: Vec<Type>,
}

/// The head (constructor) of a rigid type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Head {
    /// A nominal class or interface constructor.
    Class(CtorId),
    /// A reference to a formal type parameter (appears in declared
    /// supertypes and in generic member signatures).
    Param(TypeParamId),
    /// An intersection of member types. Members are stored
    /// nullability-stripped; the rigid type's own marker carries it.
    Intersection(Vec<Type>),
    /// An integer literal whose concrete width is not fixed yet. `widths`
    /// lists the admissible numeric constructors, preferred width first.
    IntegerLiteral { widths: Vec<CtorId> },
    /// A stub standing in for an unresolved inference variable.
    Stub { origin: StubOrigin, id: StubId },
    Captured(Box<CapturedType>),
    /// Propagated from an upstream resolution failure.
    Error(ErrorInfo),
}

impl Head {
    pub fn as_class(&self) -> Option<CtorId> {
        match self {
            Head::Class(id) => Some(*id),
            _ => None,
        }
    }
}

/// A rigid type: a head applied to arguments, plus nullability.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct RigidType {
    pub head: Head,
    pub args: Vec<TypeArg>,
    pub nullability: Nullability,
    /// Marks function types that are callable with receiver syntax. Joins
    /// only preserve the marker when every operand carries it.
    pub is_extension_fn: bool,
}

impl RigidType {
    pub fn new(head: Head, args: Vec<TypeArg>) -> RigidType {
        RigidType {
            head,
            args,
            nullability: Nullability::NotMarked,
            is_extension_fn: false,
        }
    }

    pub fn class(id: CtorId, args: Vec<TypeArg>) -> RigidType {
        RigidType::new(Head::Class(id), args)
    }

    pub fn with_nullability(&self, nullability: Nullability) -> RigidType {
        if self.nullability == nullability {
            return self.clone();
        }
        RigidType {
            nullability,
            ..self.clone()
        }
    }

    pub fn is_marked_nullable(&self) -> bool {
        self.nullability == Nullability::Nullable
    }

    pub fn is_definitely_not_null(&self) -> bool {
        self.nullability == Nullability::DefinitelyNotNull
    }

    /// The underlying type of a definitely-not-null type; `self` otherwise.
    pub fn original_if_definitely_not_null(&self) -> RigidType {
        if self.is_definitely_not_null() {
            self.with_nullability(Nullability::NotMarked)
        } else {
            self.clone()
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.head, Head::Error(_))
    }

    pub fn is_stub_for_subtyping_variable(&self) -> bool {
        matches!(
            self.head,
            Head::Stub {
                origin: StubOrigin::SubtypingVariable,
                ..
            }
        )
    }

    pub fn is_stub_for_builder_inference(&self) -> bool {
        matches!(
            self.head,
            Head::Stub {
                origin: StubOrigin::BuilderInference,
                ..
            }
        )
    }

    pub fn is_integer_literal(&self) -> bool {
        matches!(self.head, Head::IntegerLiteral { .. })
    }

    pub fn as_captured(&self) -> Option<&CapturedType> {
        match &self.head {
            Head::Captured(c) => Some(c),
            _ => None,
        }
    }

    /// A captured type whose projection is the star projection.
    pub fn is_captured_star(&self) -> bool {
        self.as_captured().is_some_and(|c| c.projection.is_star())
    }

    /// A capture of the dynamic type absorbs joins the same way the dynamic
    /// type itself does.
    pub fn is_captured_dynamic(&self, env: &dyn TypeEnv) -> bool {
        self.as_captured()
            .and_then(|c| c.projection.ty())
            .is_some_and(|ty| ty.is_dynamic(env))
    }

    /// A capture created (for subtyping) around a stub type variable. Such
    /// operands are inference variables, not proper types.
    pub fn is_captured_subtyping_stub(&self) -> bool {
        let Some(captured) = self.as_captured() else {
            return false;
        };
        let Some(ty) = captured.projection.ty() else {
            return false;
        };
        match ty {
            Type::Rigid(r) => r.is_stub_for_subtyping_variable(),
            Type::Flexible(_) => false,
        }
    }

    pub fn is_nothing(&self, env: &dyn TypeEnv) -> bool {
        self.head == Head::Class(env.well_known().nothing) && !self.is_marked_nullable()
    }

    pub fn is_top(&self, env: &dyn TypeEnv) -> bool {
        self.head == Head::Class(env.well_known().any) && self.args.is_empty()
    }

    /// Whether this type's nullability is still undetermined: its head is an
    /// inference variable, a type parameter, or a capture, so the marker may
    /// be refined once the variable is resolved.
    pub fn can_have_undefined_nullability(&self) -> bool {
        matches!(
            self.head,
            Head::Stub { .. } | Head::Param(_) | Head::Captured(_)
        )
    }

    /// Structural nesting depth: 1 for an unparameterized type, one more for
    /// each level of argument nesting. Star projections count as leaves.
    pub fn type_depth(&self) -> i32 {
        1 + self
            .args
            .iter()
            .filter_map(|a| a.ty())
            .map(Type::type_depth)
            .max()
            .unwrap_or(0)
    }
}

/// A flexible type: a range `lower..upper` of rigid types.
///
/// Invariant: `lower` is a subtype of `upper`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FlexibleType {
    pub lower: RigidType,
    pub upper: RigidType,
}

impl FlexibleType {
    /// The dynamic type is the full range `bottom..top?`: it accepts and
    /// produces anything. Recognized structurally, not by flag.
    pub fn is_dynamic(&self, env: &dyn TypeEnv) -> bool {
        self.lower.is_nothing(env)
            && self.upper.is_top(env)
            && self.upper.is_marked_nullable()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Type {
    Rigid(RigidType),
    Flexible(FlexibleType),
}

impl Type {
    pub fn class(id: CtorId, args: Vec<TypeArg>) -> Type {
        Type::Rigid(RigidType::class(id, args))
    }

    pub fn flexible(lower: RigidType, upper: RigidType) -> Type {
        Type::Flexible(FlexibleType { lower, upper })
    }

    pub fn as_rigid(&self) -> Option<&RigidType> {
        match self {
            Type::Rigid(r) => Some(r),
            Type::Flexible(_) => None,
        }
    }

    pub fn is_flexible(&self) -> bool {
        matches!(self, Type::Flexible(_))
    }

    pub fn lower_if_flexible(&self) -> &RigidType {
        match self {
            Type::Rigid(r) => r,
            Type::Flexible(f) => &f.lower,
        }
    }

    pub fn upper_if_flexible(&self) -> &RigidType {
        match self {
            Type::Rigid(r) => r,
            Type::Flexible(f) => &f.upper,
        }
    }

    pub fn is_dynamic(&self, env: &dyn TypeEnv) -> bool {
        match self {
            Type::Rigid(_) => false,
            Type::Flexible(f) => f.is_dynamic(env),
        }
    }

    pub fn with_nullability(&self, nullability: Nullability) -> Type {
        match self {
            Type::Rigid(r) => Type::Rigid(r.with_nullability(nullability)),
            Type::Flexible(f) => Type::Flexible(FlexibleType {
                lower: f.lower.with_nullability(nullability),
                upper: f.upper.with_nullability(nullability),
            }),
        }
    }

    pub fn type_depth(&self) -> i32 {
        match self {
            Type::Rigid(r) => r.type_depth(),
            Type::Flexible(f) => f.lower.type_depth().max(f.upper.type_depth()),
        }
    }
}

/// A formal type parameter declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TypeParamDecl {
    pub name: String,
    pub variance: Variance,
}

/// A nominal constructor declaration: its formal parameters and its declared
/// supertypes (instantiations over those parameters). A constructor declared
/// with no supertypes implicitly extends the top type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CtorDecl {
    pub name: String,
    pub params: Vec<TypeParamId>,
    pub supertypes: Vec<RigidType>,
}

/// Declaration access for type algorithms.
///
/// All relational primitives (`is_subtype_of`, `find_corresponding_supertypes`,
/// `intersect_types`, the join engine) are functions over `&dyn TypeEnv`, so
/// they can run against the production store or a small fixed lattice built
/// in a test.
pub trait TypeEnv {
    fn ctor(&self, id: CtorId) -> Option<&CtorDecl>;
    fn type_param(&self, id: TypeParamId) -> Option<&TypeParamDecl>;
    fn lookup_ctor(&self, name: &str) -> Option<CtorId>;
    fn well_known(&self) -> &WellKnown;
}
