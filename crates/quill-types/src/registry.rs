//! The type registry.
//!
//! The registry owns every type handle and the counter that issues them.
//! Arrays, function signatures and anonymous structs are interned by shape:
//! asking for the same shape twice yields the same handle, and the shape is
//! lowered to an LLVM type exactly once, on first request. Named structs
//! are nominal and get a fresh handle per definition.
//!
//! A registry built with [`TypeRegistry::new`] has no lowering attached. It
//! interns and describes types the same way but holds no LLVM types, which
//! is all the analyzer needs.

use inkwell::context::Context;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use rustc_hash::FxHashMap;

use crate::id::TypeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Primitive,
    Array { element: TypeId, length: u64 },
    Function { params: Vec<TypeId>, ret: TypeId },
    NamedStruct { name: String, members: Vec<(String, TypeId)> },
    AnonStruct { members: Vec<TypeId> },
}

/// The LLVM representation of a registered type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoweredType<'ctx> {
    Void,
    Basic(BasicTypeEnum<'ctx>),
    Function(FunctionType<'ctx>),
}

impl<'ctx> LoweredType<'ctx> {
    /// The type of a value that can be stored, passed or returned.
    pub fn basic(self) -> Option<BasicTypeEnum<'ctx>> {
        match self {
            LoweredType::Basic(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Builds the LLVM types the registry stores.
///
/// The registry calls the composite constructors at most once per distinct
/// shape; the components passed in are already lowered.
pub trait LowerType<'ctx> {
    fn lower_primitive(&mut self, id: TypeId) -> Option<LoweredType<'ctx>>;

    fn lower_array(&mut self, element: BasicTypeEnum<'ctx>, length: u32) -> BasicTypeEnum<'ctx>;

    /// `ret` is `None` for a function returning `void`.
    fn lower_function(
        &mut self,
        params: &[BasicTypeEnum<'ctx>],
        ret: Option<BasicTypeEnum<'ctx>>,
    ) -> FunctionType<'ctx>;

    fn lower_struct(&mut self, members: &[BasicTypeEnum<'ctx>]) -> BasicTypeEnum<'ctx>;
}

/// Lowering into an LLVM context.
pub struct LlvmLowering<'ctx> {
    context: &'ctx Context,
}

impl<'ctx> LlvmLowering<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        LlvmLowering { context }
    }
}

impl<'ctx> LowerType<'ctx> for LlvmLowering<'ctx> {
    fn lower_primitive(&mut self, id: TypeId) -> Option<LoweredType<'ctx>> {
        let ty: BasicTypeEnum<'ctx> = match id {
            TypeId::VOID => return Some(LoweredType::Void),
            TypeId::F32 => self.context.f32_type().into(),
            TypeId::F64 => self.context.f64_type().into(),
            _ => match id.int_bits()? {
                1 => self.context.bool_type().into(),
                8 => self.context.i8_type().into(),
                16 => self.context.i16_type().into(),
                32 => self.context.i32_type().into(),
                64 => self.context.i64_type().into(),
                _ => self.context.i128_type().into(),
            },
        };
        Some(LoweredType::Basic(ty))
    }

    fn lower_array(&mut self, element: BasicTypeEnum<'ctx>, length: u32) -> BasicTypeEnum<'ctx> {
        element.array_type(length).into()
    }

    fn lower_function(
        &mut self,
        params: &[BasicTypeEnum<'ctx>],
        ret: Option<BasicTypeEnum<'ctx>>,
    ) -> FunctionType<'ctx> {
        let params: Vec<BasicMetadataTypeEnum<'ctx>> = params.iter().map(|p| (*p).into()).collect();
        match ret {
            Some(ret) => ret.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        }
    }

    fn lower_struct(&mut self, members: &[BasicTypeEnum<'ctx>]) -> BasicTypeEnum<'ctx> {
        self.context.struct_type(members, false).into()
    }
}

struct Entry<'ctx> {
    ty: Type,
    lowered: Option<LoweredType<'ctx>>,
}

pub struct TypeRegistry<'ctx> {
    /// Indexed by handle. Sentinels and literal kinds have no entry.
    entries: Vec<Option<Entry<'ctx>>>,
    aliases: FxHashMap<String, TypeId>,
    arrays: FxHashMap<(TypeId, u64), TypeId>,
    functions: FxHashMap<(Vec<TypeId>, TypeId), TypeId>,
    anon_structs: FxHashMap<Vec<TypeId>, TypeId>,
    lowering: Option<Box<dyn LowerType<'ctx> + 'ctx>>,
}

impl<'ctx> TypeRegistry<'ctx> {
    /// A registry that interns without lowering.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A registry whose types live in `context`.
    pub fn in_context(context: &'ctx Context) -> Self {
        Self::with_lowering(Box::new(LlvmLowering::new(context)))
    }

    pub fn with_lowering(lowering: Box<dyn LowerType<'ctx> + 'ctx>) -> Self {
        Self::build(Some(lowering))
    }

    fn build(mut lowering: Option<Box<dyn LowerType<'ctx> + 'ctx>>) -> Self {
        let entries = (0..TypeId::PRIMITIVE_BOUND)
            .map(|raw| {
                let id = TypeId(raw);
                primitive_name(id)?;
                Some(Entry {
                    ty: Type::Primitive,
                    lowered: lowering.as_mut().and_then(|l| l.lower_primitive(id)),
                })
            })
            .collect();
        TypeRegistry {
            entries,
            aliases: FxHashMap::default(),
            arrays: FxHashMap::default(),
            functions: FxHashMap::default(),
            anon_structs: FxHashMap::default(),
            lowering,
        }
    }

    /// Resolve a type name through the alias table.
    pub fn id_of(&self, name: &str) -> TypeId {
        self.aliases
            .get(name)
            .copied()
            .unwrap_or(TypeId::UNDETERMINED)
    }

    pub fn alias(&mut self, name: impl Into<String>, id: TypeId) {
        self.aliases.insert(name.into(), id);
    }

    pub fn describe(&self, id: TypeId) -> Option<&Type> {
        self.entry(id).map(|entry| &entry.ty)
    }

    /// LLVM type built when the handle was issued.
    pub fn lowered(&self, id: TypeId) -> Option<LoweredType<'ctx>> {
        self.entry(id)?.lowered
    }

    pub fn basic_type(&self, id: TypeId) -> Option<BasicTypeEnum<'ctx>> {
        self.lowered(id)?.basic()
    }

    pub fn function_type(&self, id: TypeId) -> Option<FunctionType<'ctx>> {
        match self.lowered(id)? {
            LoweredType::Function(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_function(&self, id: TypeId) -> bool {
        matches!(self.describe(id), Some(Type::Function { .. }))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.describe(id), Some(Type::Array { .. }))
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(
            self.describe(id),
            Some(Type::NamedStruct { .. } | Type::AnonStruct { .. })
        )
    }

    /// Parameters and return type of a function handle.
    pub fn signature(&self, id: TypeId) -> Option<(&[TypeId], TypeId)> {
        match self.describe(id)? {
            Type::Function { params, ret } => Some((params, *ret)),
            _ => None,
        }
    }

    pub fn intern_array(&mut self, element: TypeId, length: u64) -> TypeId {
        if let Some(id) = self.arrays.get(&(element, length)) {
            return *id;
        }
        let Ok(llvm_length) = u32::try_from(length) else {
            return TypeId::UNDETERMINED;
        };
        if !self.is_storable(element) {
            return TypeId::UNDETERMINED;
        }
        let elem = self.basic_type(element);
        let lowered = match (self.lowering.as_mut(), elem) {
            (Some(lowering), Some(elem)) => {
                Some(LoweredType::Basic(lowering.lower_array(elem, llvm_length)))
            }
            _ => None,
        };
        let id = self.issue(Type::Array { element, length }, lowered);
        self.arrays.insert((element, length), id);
        id
    }

    pub fn intern_function(&mut self, params: &[TypeId], ret: TypeId) -> TypeId {
        let key = (params.to_vec(), ret);
        if let Some(id) = self.functions.get(&key) {
            return *id;
        }
        if !params.iter().all(|p| self.is_storable(*p)) {
            return TypeId::UNDETERMINED;
        }
        if ret != TypeId::VOID && !self.is_storable(ret) {
            return TypeId::UNDETERMINED;
        }
        let lowered_params = self.basic_types(params);
        let lowered_ret = self.basic_type(ret);
        let lowered = match (self.lowering.as_mut(), lowered_params) {
            (Some(lowering), Some(lowered_params)) => Some(LoweredType::Function(
                lowering.lower_function(&lowered_params, lowered_ret),
            )),
            _ => None,
        };
        let id = self.issue(
            Type::Function {
                params: params.to_vec(),
                ret,
            },
            lowered,
        );
        self.functions.insert(key, id);
        id
    }

    pub fn intern_anon_struct(&mut self, members: &[TypeId]) -> TypeId {
        if let Some(id) = self.anon_structs.get(members) {
            return *id;
        }
        if !members.iter().all(|m| self.is_storable(*m)) {
            return TypeId::UNDETERMINED;
        }
        let lowered = self.lower_members(members);
        let id = self.issue(
            Type::AnonStruct {
                members: members.to_vec(),
            },
            lowered,
        );
        self.anon_structs.insert(members.to_vec(), id);
        id
    }

    /// Define a nominal struct. Always issues a new handle and points the
    /// alias `name` at it.
    pub fn define_struct(&mut self, name: &str, members: Vec<(String, TypeId)>) -> TypeId {
        let member_types: Vec<TypeId> = members.iter().map(|(_, ty)| *ty).collect();
        if !member_types.iter().all(|m| self.is_storable(*m)) {
            return TypeId::UNDETERMINED;
        }
        let lowered = self.lower_members(&member_types);
        let id = self.issue(
            Type::NamedStruct {
                name: name.to_string(),
                members,
            },
            lowered,
        );
        self.alias(name, id);
        id
    }

    /// Human-readable name, used by diagnostics.
    pub fn display(&self, id: TypeId) -> String {
        match id {
            TypeId::UNDETERMINED => return "{unknown}".to_string(),
            TypeId::UNSET => return "{unset}".to_string(),
            TypeId::U_LITERAL => return "{integer}".to_string(),
            TypeId::I_LITERAL => return "{signed integer}".to_string(),
            TypeId::FP_LITERAL => return "{float}".to_string(),
            _ => {}
        }
        if let Some(name) = primitive_name(id) {
            return name.to_string();
        }
        let join = |ids: &[TypeId]| {
            ids.iter()
                .map(|id| self.display(*id))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.describe(id) {
            Some(Type::Array { element, length }) => {
                format!("[{}; {length}]", self.display(*element))
            }
            Some(Type::Function { params, ret }) => {
                format!("fn({}) -> {}", join(params), self.display(*ret))
            }
            Some(Type::NamedStruct { name, .. }) => name.clone(),
            Some(Type::AnonStruct { members }) => format!("({})", join(members)),
            Some(Type::Primitive) | None => format!("{{type {}}}", id.index()),
        }
    }

    /// Number of handles issued so far, reserved ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: TypeId) -> Option<&Entry<'ctx>> {
        self.entries.get(id.index() as usize)?.as_ref()
    }

    fn issue(&mut self, ty: Type, lowered: Option<LoweredType<'ctx>>) -> TypeId {
        let id = TypeId(self.entries.len() as u32);
        tracing::trace!(id = id.index(), ?ty, "issued type handle");
        self.entries.push(Some(Entry { ty, lowered }));
        id
    }

    /// A type that can be a member, element or parameter: registered,
    /// concrete, and neither `void` nor a function.
    fn is_storable(&self, id: TypeId) -> bool {
        id != TypeId::VOID
            && id.is_concrete()
            && self.describe(id).is_some()
            && !self.is_function(id)
    }

    fn basic_types(&self, ids: &[TypeId]) -> Option<Vec<BasicTypeEnum<'ctx>>> {
        ids.iter().map(|id| self.basic_type(*id)).collect()
    }

    fn lower_members(&mut self, members: &[TypeId]) -> Option<LoweredType<'ctx>> {
        let lowered_members = self.basic_types(members)?;
        let lowering = self.lowering.as_mut()?;
        Some(LoweredType::Basic(lowering.lower_struct(&lowered_members)))
    }
}

impl Default for TypeRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical source name of each primitive.
pub fn primitive_name(id: TypeId) -> Option<&'static str> {
    Some(match id {
        TypeId::VOID => "void",
        TypeId::BOOL => "bool",
        TypeId::CHAR => "char",
        TypeId::U8 => "u8",
        TypeId::U16 => "u16",
        TypeId::U32 => "u32",
        TypeId::U64 => "u64",
        TypeId::U128 => "u128",
        TypeId::I8 => "i8",
        TypeId::I16 => "i16",
        TypeId::I32 => "i32",
        TypeId::I64 => "i64",
        TypeId::I128 => "i128",
        TypeId::F32 => "f32",
        TypeId::F64 => "f64",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_described_and_lowered() {
        let context = Context::create();
        let reg = TypeRegistry::in_context(&context);
        assert_eq!(reg.describe(TypeId::I32), Some(&Type::Primitive));
        assert_eq!(reg.basic_type(TypeId::BOOL), Some(context.bool_type().into()));
        assert_eq!(
            reg.basic_type(TypeId::U128),
            Some(context.i128_type().into())
        );
        assert_eq!(reg.basic_type(TypeId::F64), Some(context.f64_type().into()));
        assert_eq!(reg.lowered(TypeId::VOID), Some(LoweredType::Void));
        assert_eq!(reg.describe(TypeId::U_LITERAL), None);
        assert_eq!(reg.describe(TypeId::UNDETERMINED), None);
    }

    #[test]
    fn unlowered_registry_still_interns() {
        let mut reg = TypeRegistry::new();
        assert_eq!(reg.describe(TypeId::I32), Some(&Type::Primitive));
        assert_eq!(reg.lowered(TypeId::I32), None);
        let arr = reg.intern_array(TypeId::U8, 4);
        assert_eq!(reg.intern_array(TypeId::U8, 4), arr);
        assert!(reg.is_array(arr));
        assert_eq!(reg.lowered(arr), None);
    }

    #[test]
    fn unknown_names_are_undetermined() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.id_of("i32"), TypeId::UNDETERMINED);
    }

    #[test]
    fn issued_handles_start_after_primitives() {
        let mut reg = TypeRegistry::new();
        let arr = reg.intern_array(TypeId::U8, 4);
        assert_eq!(arr.index(), TypeId::PRIMITIVE_BOUND);
        assert!(reg.is_array(arr));
        assert!(!reg.is_function(arr));
    }

    #[test]
    fn named_structs_are_nominal() {
        let context = Context::create();
        let mut reg = TypeRegistry::in_context(&context);
        let members = vec![("x".to_string(), TypeId::I32), ("y".to_string(), TypeId::I32)];
        let a = reg.define_struct("Point", members.clone());
        let b = reg.define_struct("Pair", members);
        let anon = reg.intern_anon_struct(&[TypeId::I32, TypeId::I32]);
        assert_ne!(a, b);
        assert_ne!(a, anon);
        assert!(reg.is_struct(a) && reg.is_struct(anon));
        assert_eq!(reg.id_of("Point"), a);
        assert_eq!(reg.basic_type(a), reg.basic_type(anon));
    }

    #[test]
    fn invalid_components_are_rejected() {
        let mut reg = TypeRegistry::new();
        assert_eq!(reg.intern_array(TypeId::VOID, 3), TypeId::UNDETERMINED);
        assert_eq!(
            reg.intern_array(TypeId::U8, u64::from(u32::MAX) + 1),
            TypeId::UNDETERMINED
        );
        assert_eq!(
            reg.intern_function(&[TypeId::U_LITERAL], TypeId::I32),
            TypeId::UNDETERMINED
        );
        assert_eq!(
            reg.intern_anon_struct(&[TypeId::UNDETERMINED]),
            TypeId::UNDETERMINED
        );
        let unit = reg.intern_function(&[], TypeId::VOID);
        assert!(reg.is_function(unit));
        assert_eq!(reg.intern_array(unit, 2), TypeId::UNDETERMINED);
    }

    #[test]
    fn function_types_lower_to_llvm_signatures() {
        let context = Context::create();
        let mut reg = TypeRegistry::in_context(&context);
        let func = reg.intern_function(&[TypeId::I32, TypeId::F64], TypeId::VOID);
        let ty = reg.function_type(func).expect("lowered signature");
        assert_eq!(ty.count_param_types(), 2);
        assert!(ty.get_return_type().is_none());
        assert_eq!(reg.basic_type(func), None);
    }
}
