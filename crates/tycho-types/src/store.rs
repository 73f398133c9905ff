//! The constructor/parameter registry backing [`TypeEnv`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CaptureId, CaptureStatus, CapturedType, CtorDecl, CtorId, Head, Nullability, RigidType,
    StubId, StubOrigin, Type, TypeArg, TypeEnv, TypeParamDecl, TypeParamId, Variance,
};

/// Constructors every algorithm needs to know about: the top and bottom of
/// the lattice plus the builtin value hierarchy used by literal widening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellKnown {
    pub any: CtorId,
    pub nothing: CtorId,
    pub string: CtorId,
    pub char_sequence: CtorId,
    pub comparable: CtorId,
    pub number: CtorId,
    pub int: CtorId,
    pub long: CtorId,
    pub short: CtorId,
    pub byte: CtorId,
    pub iterable: CtorId,
    pub collection: CtorId,
    pub list: CtorId,
    pub mutable_list: CtorId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("constructor `{name}` is declared more than once")]
    DuplicateConstructor { name: String },
    #[error("constructor id {id} was interned but never defined")]
    UndefinedConstructor { id: u32 },
    #[error("supertype of `{ctor}` references an unknown constructor")]
    UnknownSupertype { ctor: String },
    #[error("supertype `{supertype}` of `{ctor}` expects {expected} type arguments, found {found}")]
    SupertypeArity {
        ctor: String,
        supertype: String,
        expected: usize,
        found: usize,
    },
    #[error("supertype of `{ctor}` references type parameter `{param}` not declared by `{ctor}`")]
    ForeignParameter { ctor: String, param: String },
}

/// The declaration store. Mutation is additive: declared constructors and
/// parameters are never removed or edited in place, so shared references
/// handed out through [`TypeEnv`] stay valid for the store's lifetime.
#[derive(Clone, Debug)]
pub struct TypeStore {
    ctors: Vec<Option<CtorDecl>>,
    params: Vec<TypeParamDecl>,
    by_name: HashMap<String, CtorId>,
    duplicates: Vec<String>,
    well_known: WellKnown,
    next_stub: u32,
    next_capture: u32,
}

impl TypeStore {
    /// A store seeded with the builtin lattice: `Any`/`Nothing`, the string
    /// and numeric hierarchy, `Comparable<in T>` and the collection
    /// interfaces. Enough for literal widening and for most tests.
    pub fn with_builtins() -> TypeStore {
        let mut store = TypeStore {
            ctors: Vec::new(),
            params: Vec::new(),
            by_name: HashMap::new(),
            duplicates: Vec::new(),
            // Placeholder until the builtins below are declared.
            well_known: WellKnown {
                any: CtorId(0),
                nothing: CtorId(0),
                string: CtorId(0),
                char_sequence: CtorId(0),
                comparable: CtorId(0),
                number: CtorId(0),
                int: CtorId(0),
                long: CtorId(0),
                short: CtorId(0),
                byte: CtorId(0),
                iterable: CtorId(0),
                collection: CtorId(0),
                list: CtorId(0),
                mutable_list: CtorId(0),
            },
            next_stub: 0,
            next_capture: 0,
        };

        let any = store.add_ctor(CtorDecl {
            name: "Any".to_string(),
            params: vec![],
            supertypes: vec![],
        });
        store.well_known.any = any;

        let nothing = store.add_ctor(CtorDecl {
            name: "Nothing".to_string(),
            params: vec![],
            supertypes: vec![],
        });

        let comparable_t = store.add_type_param("T", Variance::In);
        let comparable = store.add_ctor(CtorDecl {
            name: "Comparable".to_string(),
            params: vec![comparable_t],
            supertypes: vec![],
        });

        let char_sequence = store.add_ctor(CtorDecl {
            name: "CharSequence".to_string(),
            params: vec![],
            supertypes: vec![],
        });
        let string = store.intern_ctor_id("String");
        store.define_ctor(
            string,
            CtorDecl {
                name: "String".to_string(),
                params: vec![],
                supertypes: vec![
                    RigidType::class(char_sequence, vec![]),
                    RigidType::class(
                        comparable,
                        vec![TypeArg::inv(Type::class(string, vec![]))],
                    ),
                ],
            },
        );

        let number = store.add_ctor(CtorDecl {
            name: "Number".to_string(),
            params: vec![],
            supertypes: vec![],
        });
        let int = store.add_numeric("Int", number, comparable);
        let long = store.add_numeric("Long", number, comparable);
        let short = store.add_numeric("Short", number, comparable);
        let byte = store.add_numeric("Byte", number, comparable);

        let iterable_t = store.add_type_param("T", Variance::Out);
        let iterable = store.add_ctor(CtorDecl {
            name: "Iterable".to_string(),
            params: vec![iterable_t],
            supertypes: vec![],
        });

        let collection_e = store.add_type_param("E", Variance::Out);
        let collection = store.add_ctor(CtorDecl {
            name: "Collection".to_string(),
            params: vec![collection_e],
            supertypes: vec![RigidType::class(
                iterable,
                vec![TypeArg::inv(Type::Rigid(RigidType::new(
                    Head::Param(collection_e),
                    vec![],
                )))],
            )],
        });

        let list_e = store.add_type_param("E", Variance::Out);
        let list = store.add_ctor(CtorDecl {
            name: "List".to_string(),
            params: vec![list_e],
            supertypes: vec![RigidType::class(
                collection,
                vec![TypeArg::inv(Type::Rigid(RigidType::new(
                    Head::Param(list_e),
                    vec![],
                )))],
            )],
        });

        let mutable_list_e = store.add_type_param("E", Variance::Invariant);
        let mutable_list = store.add_ctor(CtorDecl {
            name: "MutableList".to_string(),
            params: vec![mutable_list_e],
            supertypes: vec![RigidType::class(
                list,
                vec![TypeArg::inv(Type::Rigid(RigidType::new(
                    Head::Param(mutable_list_e),
                    vec![],
                )))],
            )],
        });

        store.well_known = WellKnown {
            any,
            nothing,
            string,
            char_sequence,
            comparable,
            number,
            int,
            long,
            short,
            byte,
            iterable,
            collection,
            list,
            mutable_list,
        };

        debug_assert!(store.validate().is_ok());
        store
    }

    fn add_numeric(&mut self, name: &str, number: CtorId, comparable: CtorId) -> CtorId {
        let id = self.intern_ctor_id(name);
        self.define_ctor(
            id,
            CtorDecl {
                name: name.to_string(),
                params: vec![],
                supertypes: vec![
                    RigidType::class(number, vec![]),
                    RigidType::class(comparable, vec![TypeArg::inv(Type::class(id, vec![]))]),
                ],
            },
        );
        id
    }

    /// Reserve a constructor id before defining it, for self-referential
    /// hierarchies (`Enum<E : Enum<E>>`-style declarations).
    pub fn intern_ctor_id(&mut self, name: &str) -> CtorId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = CtorId(self.ctors.len() as u32);
        self.ctors.push(None);
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn define_ctor(&mut self, id: CtorId, mut decl: CtorDecl) {
        self.ensure_implicit_top(&mut decl, id);
        if self.ctors[id.0 as usize].is_some() {
            self.duplicates.push(decl.name.clone());
        }
        self.ctors[id.0 as usize] = Some(decl);
    }

    pub fn add_ctor(&mut self, decl: CtorDecl) -> CtorId {
        if self.by_name.contains_key(&decl.name) {
            self.duplicates.push(decl.name.clone());
        }
        let id = CtorId(self.ctors.len() as u32);
        self.by_name.insert(decl.name.clone(), id);
        let mut decl = decl;
        self.ensure_implicit_top(&mut decl, id);
        self.ctors.push(Some(decl));
        id
    }

    fn ensure_implicit_top(&self, decl: &mut CtorDecl, id: CtorId) {
        // `Any` is the only constructor with an empty supertype list; it is
        // always declared first.
        if decl.supertypes.is_empty() && id != self.well_known.any {
            decl.supertypes.push(RigidType::class(self.well_known.any, vec![]));
        }
    }

    pub fn add_type_param(&mut self, name: &str, variance: Variance) -> TypeParamId {
        let id = TypeParamId(self.params.len() as u32);
        self.params.push(TypeParamDecl {
            name: name.to_string(),
            variance,
        });
        id
    }

    /// A fresh stub type for the given inference-variable kind.
    pub fn new_stub(&mut self, origin: StubOrigin) -> RigidType {
        let id = StubId(self.next_stub);
        self.next_stub += 1;
        RigidType::new(Head::Stub { origin, id }, vec![])
    }

    /// A fresh captured type for `projection`, with the given upper bounds.
    pub fn new_capture(
        &mut self,
        projection: TypeArg,
        supertypes: Vec<Type>,
        status: CaptureStatus,
    ) -> RigidType {
        let id = CaptureId(self.next_capture);
        self.next_capture += 1;
        RigidType::new(
            Head::Captured(Box::new(CapturedType {
                id,
                projection,
                supertypes,
                status,
            })),
            vec![],
        )
    }

    /// The nullable top type, the fallback when operands are incomparable.
    pub fn nullable_top(&self) -> RigidType {
        RigidType::class(self.well_known.any, vec![]).with_nullability(Nullability::Nullable)
    }

    /// Check referential integrity of all declarations: every interned id is
    /// defined, supertype heads resolve, supertype arguments match the
    /// target's arity, and parameter references belong to the declaring
    /// constructor.
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(name) = self.duplicates.first() {
            return Err(StoreError::DuplicateConstructor { name: name.clone() });
        }
        for (index, slot) in self.ctors.iter().enumerate() {
            let Some(decl) = slot else {
                return Err(StoreError::UndefinedConstructor { id: index as u32 });
            };
            for st in &decl.supertypes {
                let Head::Class(super_id) = st.head else {
                    // Error-typed supertypes are allowed: they model an
                    // unresolved `extends` clause.
                    if matches!(st.head, Head::Error(_)) {
                        continue;
                    }
                    return Err(StoreError::UnknownSupertype {
                        ctor: decl.name.clone(),
                    });
                };
                let Some(Some(super_decl)) = self.ctors.get(super_id.0 as usize) else {
                    return Err(StoreError::UnknownSupertype {
                        ctor: decl.name.clone(),
                    });
                };
                if super_decl.params.len() != st.args.len() {
                    return Err(StoreError::SupertypeArity {
                        ctor: decl.name.clone(),
                        supertype: super_decl.name.clone(),
                        expected: super_decl.params.len(),
                        found: st.args.len(),
                    });
                }
                self.check_param_refs(decl, st)?;
            }
        }
        Ok(())
    }

    fn check_param_refs(&self, decl: &CtorDecl, ty: &RigidType) -> Result<(), StoreError> {
        if let Head::Param(p) = ty.head {
            if !decl.params.contains(&p) {
                let param = self
                    .params
                    .get(p.0 as usize)
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| format!("#{}", p.0));
                return Err(StoreError::ForeignParameter {
                    ctor: decl.name.clone(),
                    param,
                });
            }
        }
        for arg in &ty.args {
            let Some(ty) = arg.ty() else { continue };
            match ty {
                Type::Rigid(r) => self.check_param_refs(decl, r)?,
                Type::Flexible(f) => {
                    self.check_param_refs(decl, &f.lower)?;
                    self.check_param_refs(decl, &f.upper)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        TypeStore::with_builtins()
    }
}

impl TypeEnv for TypeStore {
    fn ctor(&self, id: CtorId) -> Option<&CtorDecl> {
        self.ctors.get(id.0 as usize)?.as_ref()
    }

    fn type_param(&self, id: TypeParamId) -> Option<&TypeParamDecl> {
        self.params.get(id.0 as usize)
    }

    fn lookup_ctor(&self, name: &str) -> Option<CtorId> {
        self.by_name.get(name).copied()
    }

    fn well_known(&self) -> &WellKnown {
        &self.well_known
    }
}
