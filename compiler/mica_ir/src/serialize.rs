//! JSON serialization of IR.
//!
//! The cache format encodes runtime types compactly: primitive types as
//! their bare name string, `void` as the string `"void"`, instances as the
//! class's fully-qualified name, and the structural types (`RTuple`,
//! `RUnion`) as objects carrying a `.class` discriminator.
//!
//! Classes refer to functions and functions refer back to classes, so
//! deserialization runs in three passes over a [`DeserMaps`]:
//!
//! 1. empty class shells (claims every class name);
//! 2. function declarations, signatures, and bodies (may reference
//!    classes);
//! 3. class bodies (may reference functions).

use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::block::{BasicBlock, BlockId};
use crate::class_ir::{ClassIR, ClassId, FuncId, IrArena};
use crate::env::{Environment, ValueData, ValueId};
use crate::func::{ArgKind, FuncDecl, FuncIR, FuncKind, FuncSignature, RuntimeArg};
use crate::ops::{BranchKind, Op, OpKind, StaticNamespace};
use crate::primitives;
use crate::rtypes::{RTuple, RType, RUnion, TypeRegistry};

/// Deserialization failure.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unexpected .class {0}")]
    UnexpectedClass(String),
    #[error("can't find class {0}")]
    UnknownClass(String),
    #[error("can't find function {0}")]
    UnknownFunction(String),
    #[error("malformed IR json: {0}")]
    Malformed(String),
}

/// Name-to-id maps built up across the deserialization passes.
#[derive(Debug, Default)]
pub struct DeserMaps {
    pub classes: FxHashMap<String, ClassId>,
    pub functions: FxHashMap<String, FuncId>,
}

// ── Types ───────────────────────────────────────────────────────────

pub fn serialize_rtype(t: &RType, arena: &IrArena, registry: &TypeRegistry) -> Value {
    match t {
        RType::Primitive(p) => Value::String(registry.name(*p).to_owned()),
        RType::Void => Value::String("void".to_owned()),
        RType::Instance(c) => Value::String(arena.class(*c).fullname()),
        RType::Tuple(tup) => json!({
            ".class": "RTuple",
            "types": tup.types.iter()
                .map(|x| serialize_rtype(x, arena, registry))
                .collect::<Vec<_>>(),
        }),
        RType::Union(u) => json!({
            ".class": "RUnion",
            "types": u.items.iter()
                .map(|x| serialize_rtype(x, arena, registry))
                .collect::<Vec<_>>(),
        }),
    }
}

pub fn deserialize_rtype(
    data: &Value,
    maps: &DeserMaps,
    registry: &TypeRegistry,
) -> Result<RType, SerializeError> {
    match data {
        Value::String(name) => {
            if name == "void" {
                return Ok(RType::Void);
            }
            if let Some(prim) = registry.lookup(name) {
                return Ok(RType::Primitive(prim));
            }
            maps.classes
                .get(name.as_str())
                .map(|&c| RType::Instance(c))
                .ok_or_else(|| SerializeError::UnknownClass(name.clone()))
        }
        Value::Object(obj) => {
            let class = obj
                .get(".class")
                .and_then(Value::as_str)
                .ok_or_else(|| SerializeError::Malformed("type object without .class".into()))?;
            let types = obj
                .get("types")
                .and_then(Value::as_array)
                .ok_or_else(|| SerializeError::Malformed("type object without types".into()))?
                .iter()
                .map(|v| deserialize_rtype(v, maps, registry))
                .collect::<Result<Vec<_>, _>>()?;
            match class {
                "RTuple" => Ok(RType::Tuple(RTuple::new(types))),
                "RUnion" => Ok(RType::Union(RUnion::new(types))),
                other => Err(SerializeError::UnexpectedClass(other.to_owned())),
            }
        }
        other => Err(SerializeError::Malformed(format!(
            "expected type encoding, got {other}"
        ))),
    }
}

// ── Signatures and declarations ─────────────────────────────────────

fn serialize_arg(arg: &RuntimeArg, arena: &IrArena, registry: &TypeRegistry) -> Value {
    let kind = match arg.kind {
        ArgKind::Pos => "pos",
        ArgKind::Opt => "opt",
        ArgKind::Star => "star",
        ArgKind::Named => "named",
        ArgKind::NamedOpt => "named_opt",
        ArgKind::Star2 => "star2",
    };
    json!({
        "name": arg.name,
        "type": serialize_rtype(&arg.rtype, arena, registry),
        "kind": kind,
    })
}

fn deserialize_arg(
    data: &Value,
    maps: &DeserMaps,
    registry: &TypeRegistry,
) -> Result<RuntimeArg, SerializeError> {
    let name = str_field(data, "name")?;
    let rtype = deserialize_rtype(field(data, "type")?, maps, registry)?;
    let kind = match str_field(data, "kind")?.as_str() {
        "pos" => ArgKind::Pos,
        "opt" => ArgKind::Opt,
        "star" => ArgKind::Star,
        "named" => ArgKind::Named,
        "named_opt" => ArgKind::NamedOpt,
        "star2" => ArgKind::Star2,
        other => return Err(SerializeError::Malformed(format!("bad arg kind {other}"))),
    };
    Ok(RuntimeArg {
        name,
        rtype,
        kind,
    })
}

pub fn serialize_signature(sig: &FuncSignature, arena: &IrArena, registry: &TypeRegistry) -> Value {
    json!({
        "args": sig.args.iter().map(|a| serialize_arg(a, arena, registry)).collect::<Vec<_>>(),
        "ret_type": serialize_rtype(&sig.ret_type, arena, registry),
    })
}

pub fn deserialize_signature(
    data: &Value,
    maps: &DeserMaps,
    registry: &TypeRegistry,
) -> Result<FuncSignature, SerializeError> {
    let args = array_field(data, "args")?
        .iter()
        .map(|a| deserialize_arg(a, maps, registry))
        .collect::<Result<Vec<_>, _>>()?;
    let ret_type = deserialize_rtype(field(data, "ret_type")?, maps, registry)?;
    Ok(FuncSignature::new(args, ret_type))
}

pub fn serialize_decl(decl: &FuncDecl, arena: &IrArena, registry: &TypeRegistry) -> Value {
    let kind = match decl.kind {
        FuncKind::Normal => "normal",
        FuncKind::StaticMethod => "staticmethod",
        FuncKind::ClassMethod => "classmethod",
    };
    json!({
        "name": decl.name,
        "class_name": decl.class_name,
        "module_name": decl.module_name,
        "sig": serialize_signature(&decl.sig, arena, registry),
        "kind": kind,
        "is_prop_setter": decl.is_prop_setter,
        "is_prop_getter": decl.is_prop_getter,
    })
}

pub fn deserialize_decl(
    data: &Value,
    maps: &DeserMaps,
    registry: &TypeRegistry,
) -> Result<FuncDecl, SerializeError> {
    let kind = match str_field(data, "kind")?.as_str() {
        "normal" => FuncKind::Normal,
        "staticmethod" => FuncKind::StaticMethod,
        "classmethod" => FuncKind::ClassMethod,
        other => return Err(SerializeError::Malformed(format!("bad func kind {other}"))),
    };
    Ok(FuncDecl {
        name: str_field(data, "name")?,
        class_name: field(data, "class_name")?.as_str().map(str::to_owned),
        module_name: str_field(data, "module_name")?,
        sig: deserialize_signature(field(data, "sig")?, maps, registry)?,
        kind,
        is_prop_setter: bool_field(data, "is_prop_setter")?,
        is_prop_getter: bool_field(data, "is_prop_getter")?,
    })
}

// ── Ops and blocks ──────────────────────────────────────────────────

fn vid(v: ValueId) -> Value {
    Value::from(v.raw())
}

fn bid(b: BlockId) -> Value {
    Value::from(b.raw())
}

fn vids(vs: &[ValueId]) -> Value {
    Value::Array(vs.iter().map(|&v| vid(v)).collect())
}

#[allow(clippy::too_many_lines)]
fn serialize_op(op: &Op) -> Value {
    let mut obj = Map::new();
    obj.insert("result".into(), vid(op.result));
    obj.insert("line".into(), Value::from(op.line));
    let (class, fields): (&str, Vec<(&str, Value)>) = match &op.kind {
        OpKind::Assign { dest, src } => ("Assign", vec![("dest", vid(*dest)), ("src", vid(*src))]),
        OpKind::LoadInt { value } => ("LoadInt", vec![("value", Value::from(*value))]),
        OpKind::LoadErrorValue { undefines } => {
            ("LoadErrorValue", vec![("undefines", Value::from(*undefines))])
        }
        OpKind::GetAttr { obj: o, attr } => (
            "GetAttr",
            vec![("obj", vid(*o)), ("attr", Value::from(attr.clone()))],
        ),
        OpKind::SetAttr { obj: o, attr, src } => (
            "SetAttr",
            vec![
                ("obj", vid(*o)),
                ("attr", Value::from(attr.clone())),
                ("src", vid(*src)),
            ],
        ),
        OpKind::LoadStatic {
            identifier,
            module_name,
            namespace,
        } => (
            "LoadStatic",
            vec![
                ("identifier", Value::from(identifier.clone())),
                ("module_name", json!(module_name)),
                ("namespace", Value::from(namespace.as_str())),
            ],
        ),
        OpKind::InitStatic {
            value,
            identifier,
            module_name,
            namespace,
        } => (
            "InitStatic",
            vec![
                ("value", vid(*value)),
                ("identifier", Value::from(identifier.clone())),
                ("module_name", json!(module_name)),
                ("namespace", Value::from(namespace.as_str())),
            ],
        ),
        OpKind::TupleGet { src, index } => (
            "TupleGet",
            vec![("src", vid(*src)), ("index", Value::from(*index))],
        ),
        OpKind::TupleSet { items } => ("TupleSet", vec![("items", vids(items))]),
        OpKind::Cast { src } => ("Cast", vec![("src", vid(*src))]),
        OpKind::Box { src } => ("Box", vec![("src", vid(*src))]),
        OpKind::Unbox { src } => ("Unbox", vec![("src", vid(*src))]),
        OpKind::RaiseStandardError {
            class_name,
            message,
        } => (
            "RaiseStandardError",
            vec![
                ("class_name", Value::from(class_name.clone())),
                ("message", json!(message)),
            ],
        ),
        OpKind::Call { func, args } => (
            "Call",
            vec![("func", Value::from(func.clone())), ("args", vids(args))],
        ),
        OpKind::MethodCall { obj: o, method, args } => (
            "MethodCall",
            vec![
                ("obj", vid(*o)),
                ("method", Value::from(method.clone())),
                ("args", vids(args)),
            ],
        ),
        OpKind::Primitive { desc, args } => (
            "Primitive",
            vec![("desc", Value::from(desc.name)), ("args", vids(args))],
        ),
        OpKind::IncRef { src } => ("IncRef", vec![("src", vid(*src))]),
        OpKind::DecRef { src, is_xdec } => (
            "DecRef",
            vec![("src", vid(*src)), ("is_xdec", Value::from(*is_xdec))],
        ),
        OpKind::Goto { target } => ("Goto", vec![("target", bid(*target))]),
        OpKind::Branch {
            value,
            true_target,
            false_target,
            kind,
            negated,
            traceback_entry,
            rare,
        } => (
            "Branch",
            vec![
                ("value", vid(*value)),
                ("true_target", bid(*true_target)),
                ("false_target", bid(*false_target)),
                (
                    "kind",
                    Value::from(match kind {
                        BranchKind::BoolExpr => "bool_expr",
                        BranchKind::IsError => "is_error",
                    }),
                ),
                ("negated", Value::from(*negated)),
                ("traceback_entry", json!(traceback_entry)),
                ("rare", Value::from(*rare)),
            ],
        ),
        OpKind::Return { value } => ("Return", vec![("value", vid(*value))]),
        OpKind::Unreachable => ("Unreachable", vec![]),
    };
    obj.insert(".class".into(), Value::from(class));
    for (key, value) in fields {
        obj.insert(key.into(), value);
    }
    Value::Object(obj)
}

fn value_id_field(data: &Value, name: &str) -> Result<ValueId, SerializeError> {
    u32_field(data, name).map(ValueId::from_raw)
}

fn block_id_field(data: &Value, name: &str) -> Result<BlockId, SerializeError> {
    u32_field(data, name).map(BlockId::from_raw)
}

fn value_ids_field(data: &Value, name: &str) -> Result<Vec<ValueId>, SerializeError> {
    array_field(data, name)?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| ValueId::from_raw(n as u32))
                .ok_or_else(|| SerializeError::Malformed(format!("bad value id in {name}")))
        })
        .collect()
}

fn namespace_field(data: &Value) -> Result<StaticNamespace, SerializeError> {
    match str_field(data, "namespace")?.as_str() {
        "static" => Ok(StaticNamespace::Static),
        "type" => Ok(StaticNamespace::Type),
        "module" => Ok(StaticNamespace::Module),
        other => Err(SerializeError::Malformed(format!("bad namespace {other}"))),
    }
}

#[allow(clippy::too_many_lines)]
fn deserialize_op(data: &Value) -> Result<Op, SerializeError> {
    let class = str_field(data, ".class")?;
    let result = value_id_field(data, "result")?;
    let line = field(data, "line")?
        .as_i64()
        .ok_or_else(|| SerializeError::Malformed("bad op line".into()))?;
    let kind = match class.as_str() {
        "Assign" => OpKind::Assign {
            dest: value_id_field(data, "dest")?,
            src: value_id_field(data, "src")?,
        },
        "LoadInt" => OpKind::LoadInt {
            value: field(data, "value")?
                .as_i64()
                .ok_or_else(|| SerializeError::Malformed("bad LoadInt value".into()))?,
        },
        "LoadErrorValue" => OpKind::LoadErrorValue {
            undefines: bool_field(data, "undefines")?,
        },
        "GetAttr" => OpKind::GetAttr {
            obj: value_id_field(data, "obj")?,
            attr: str_field(data, "attr")?,
        },
        "SetAttr" => OpKind::SetAttr {
            obj: value_id_field(data, "obj")?,
            attr: str_field(data, "attr")?,
            src: value_id_field(data, "src")?,
        },
        "LoadStatic" => OpKind::LoadStatic {
            identifier: str_field(data, "identifier")?,
            module_name: field(data, "module_name")?.as_str().map(str::to_owned),
            namespace: namespace_field(data)?,
        },
        "InitStatic" => OpKind::InitStatic {
            value: value_id_field(data, "value")?,
            identifier: str_field(data, "identifier")?,
            module_name: field(data, "module_name")?.as_str().map(str::to_owned),
            namespace: namespace_field(data)?,
        },
        "TupleGet" => OpKind::TupleGet {
            src: value_id_field(data, "src")?,
            index: u32_field(data, "index")? as usize,
        },
        "TupleSet" => OpKind::TupleSet {
            items: value_ids_field(data, "items")?,
        },
        "Cast" => OpKind::Cast {
            src: value_id_field(data, "src")?,
        },
        "Box" => OpKind::Box {
            src: value_id_field(data, "src")?,
        },
        "Unbox" => OpKind::Unbox {
            src: value_id_field(data, "src")?,
        },
        "RaiseStandardError" => OpKind::RaiseStandardError {
            class_name: str_field(data, "class_name")?,
            message: field(data, "message")?.as_str().map(str::to_owned),
        },
        "Call" => OpKind::Call {
            func: str_field(data, "func")?,
            args: value_ids_field(data, "args")?,
        },
        "MethodCall" => OpKind::MethodCall {
            obj: value_id_field(data, "obj")?,
            method: str_field(data, "method")?,
            args: value_ids_field(data, "args")?,
        },
        "Primitive" => {
            let name = str_field(data, "desc")?;
            let desc = primitives::by_name(&name)
                .ok_or_else(|| SerializeError::Malformed(format!("unknown primitive {name}")))?;
            OpKind::Primitive {
                desc,
                args: value_ids_field(data, "args")?,
            }
        }
        "IncRef" => OpKind::IncRef {
            src: value_id_field(data, "src")?,
        },
        "DecRef" => OpKind::DecRef {
            src: value_id_field(data, "src")?,
            is_xdec: bool_field(data, "is_xdec")?,
        },
        "Goto" => OpKind::Goto {
            target: block_id_field(data, "target")?,
        },
        "Branch" => OpKind::Branch {
            value: value_id_field(data, "value")?,
            true_target: block_id_field(data, "true_target")?,
            false_target: block_id_field(data, "false_target")?,
            kind: match str_field(data, "kind")?.as_str() {
                "bool_expr" => BranchKind::BoolExpr,
                "is_error" => BranchKind::IsError,
                other => {
                    return Err(SerializeError::Malformed(format!("bad branch kind {other}")))
                }
            },
            negated: bool_field(data, "negated")?,
            traceback_entry: field(data, "traceback_entry")?.as_array().and_then(|arr| {
                Some((arr.first()?.as_str()?.to_owned(), arr.get(1)?.as_i64()?))
            }),
            rare: bool_field(data, "rare")?,
        },
        "Return" => OpKind::Return {
            value: value_id_field(data, "value")?,
        },
        "Unreachable" => OpKind::Unreachable,
        other => return Err(SerializeError::UnexpectedClass(other.to_owned())),
    };
    Ok(Op { result, line, kind })
}

fn serialize_env(env: &Environment, arena: &IrArena, registry: &TypeRegistry) -> Value {
    Value::Array(
        env.values()
            .map(|(_, v)| {
                json!({
                    "name": v.name,
                    "type": serialize_rtype(&v.rtype, arena, registry),
                    "is_register": v.is_register,
                    "is_arg": v.is_arg,
                    "is_borrowed": v.is_borrowed,
                })
            })
            .collect(),
    )
}

fn deserialize_env(
    data: &Value,
    maps: &DeserMaps,
    registry: &TypeRegistry,
) -> Result<Environment, SerializeError> {
    let mut env = Environment::new();
    let entries = data
        .as_array()
        .ok_or_else(|| SerializeError::Malformed("env is not an array".into()))?;
    for entry in entries {
        let value = ValueData {
            name: str_field(entry, "name")?,
            rtype: deserialize_rtype(field(entry, "type")?, maps, registry)?,
            is_register: bool_field(entry, "is_register")?,
            is_arg: bool_field(entry, "is_arg")?,
            is_borrowed: bool_field(entry, "is_borrowed")?,
        };
        env.restore_value(value);
    }
    Ok(env)
}

pub fn serialize_func(func: &FuncIR, arena: &IrArena, registry: &TypeRegistry) -> Value {
    json!({
        "decl": serialize_decl(&func.decl, arena, registry),
        "line": func.line,
        "traceback_name": func.traceback_name,
        "env": serialize_env(&func.env, arena, registry),
        "blocks": func.blocks.iter().map(|b| json!({
            "error_handler": b.error_handler.map(BlockId::raw),
            "ops": b.ops.iter().map(serialize_op).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

pub fn deserialize_func(
    data: &Value,
    maps: &DeserMaps,
    registry: &TypeRegistry,
) -> Result<FuncIR, SerializeError> {
    let decl = deserialize_decl(field(data, "decl")?, maps, registry)?;
    let env = deserialize_env(field(data, "env")?, maps, registry)?;
    let mut blocks = Vec::new();
    for block_data in array_field(data, "blocks")? {
        let mut block = BasicBlock::new();
        block.error_handler = field(block_data, "error_handler")?
            .as_u64()
            .map(|n| BlockId::from_raw(n as u32));
        for op_data in array_field(block_data, "ops")? {
            block.ops.push(deserialize_op(op_data)?);
        }
        blocks.push(block);
    }
    let mut func = FuncIR::new(decl, blocks, env);
    func.line = field(data, "line")?.as_i64().unwrap_or(-1);
    func.traceback_name = field(data, "traceback_name")?.as_str().map(str::to_owned);
    Ok(func)
}

// ── Classes ─────────────────────────────────────────────────────────

pub fn serialize_class(class: &ClassIR, arena: &IrArena, registry: &TypeRegistry) -> Value {
    json!({
        "name": class.name,
        "module_name": class.module_name,
        "attributes": class.attributes.iter().map(|(name, t)| {
            json!([name, serialize_rtype(t, arena, registry)])
        }).collect::<Vec<_>>(),
        "methods": class.methods.iter().map(|(name, &func)| {
            json!([name, arena.func(func).fullname()])
        }).collect::<Vec<_>>(),
        "bases": class.bases.iter().map(|&b| arena.class(b).fullname()).collect::<Vec<_>>(),
        "mro": class.mro.iter().map(|&b| arena.class(b).fullname()).collect::<Vec<_>>(),
        "is_trait": class.is_trait,
        "is_abstract": class.is_abstract,
        "is_ext_class": class.is_ext_class,
    })
}

/// Serialize a whole compilation group.
pub fn serialize_arena(arena: &IrArena, registry: &TypeRegistry) -> Value {
    json!({
        "classes": arena.classes()
            .map(|(_, c)| serialize_class(c, arena, registry))
            .collect::<Vec<_>>(),
        "functions": arena.functions()
            .map(|(_, f)| serialize_func(f, arena, registry))
            .collect::<Vec<_>>(),
    })
}

/// Deserialize a whole compilation group with the three-pass scheme.
pub fn deserialize_arena(
    data: &Value,
    registry: &TypeRegistry,
) -> Result<IrArena, SerializeError> {
    let mut arena = IrArena::new();
    let mut maps = DeserMaps::default();

    // Pass 1: empty class shells, claiming every name.
    let class_entries = array_field(data, "classes")?;
    for entry in class_entries {
        let shell = ClassIR::new(&str_field(entry, "name")?, &str_field(entry, "module_name")?);
        let fullname = shell.fullname();
        let id = arena.add_class(shell);
        maps.classes.insert(fullname, id);
    }

    // Pass 2: functions (signatures and bodies may reference classes).
    for entry in array_field(data, "functions")? {
        let func = deserialize_func(entry, &maps, registry)?;
        let fullname = func.fullname();
        let id = arena.add_func(func);
        maps.functions.insert(fullname, id);
    }

    // Pass 3: class bodies (may reference functions).
    for (index, entry) in class_entries.iter().enumerate() {
        let id = ClassId::from_raw(index as u32);

        let mut attributes = indexmap::IndexMap::new();
        for pair in array_field(entry, "attributes")? {
            let arr = pair
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| SerializeError::Malformed("bad attribute entry".into()))?;
            let name = arr[0]
                .as_str()
                .ok_or_else(|| SerializeError::Malformed("bad attribute name".into()))?;
            attributes.insert(name.to_owned(), deserialize_rtype(&arr[1], &maps, registry)?);
        }

        let mut methods = indexmap::IndexMap::new();
        for pair in array_field(entry, "methods")? {
            let arr = pair
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| SerializeError::Malformed("bad method entry".into()))?;
            let name = arr[0]
                .as_str()
                .ok_or_else(|| SerializeError::Malformed("bad method name".into()))?;
            let func_name = arr[1]
                .as_str()
                .ok_or_else(|| SerializeError::Malformed("bad method target".into()))?;
            let func = maps
                .functions
                .get(func_name)
                .copied()
                .ok_or_else(|| SerializeError::UnknownFunction(func_name.to_owned()))?;
            methods.insert(name.to_owned(), func);
        }

        let lookup_classes = |key: &str| -> Result<Vec<ClassId>, SerializeError> {
            array_field(entry, key)?
                .iter()
                .map(|v| {
                    let name = v
                        .as_str()
                        .ok_or_else(|| SerializeError::Malformed(format!("bad {key} entry")))?;
                    maps.classes
                        .get(name)
                        .copied()
                        .ok_or_else(|| SerializeError::UnknownClass(name.to_owned()))
                })
                .collect()
        };
        let bases = lookup_classes("bases")?;
        let mro = lookup_classes("mro")?;

        let class = arena.class_mut(id);
        class.attributes = attributes;
        class.methods = methods;
        class.bases = bases;
        class.mro = mro;
        class.is_trait = bool_field(entry, "is_trait")?;
        class.is_abstract = bool_field(entry, "is_abstract")?;
        class.is_ext_class = bool_field(entry, "is_ext_class")?;
    }

    Ok(arena)
}

// ── Field helpers ───────────────────────────────────────────────────

fn field<'a>(data: &'a Value, name: &str) -> Result<&'a Value, SerializeError> {
    data.get(name)
        .ok_or_else(|| SerializeError::Malformed(format!("missing field {name}")))
}

fn str_field(data: &Value, name: &str) -> Result<String, SerializeError> {
    field(data, name)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| SerializeError::Malformed(format!("field {name} is not a string")))
}

fn bool_field(data: &Value, name: &str) -> Result<bool, SerializeError> {
    field(data, name)?
        .as_bool()
        .ok_or_else(|| SerializeError::Malformed(format!("field {name} is not a bool")))
}

fn u32_field(data: &Value, name: &str) -> Result<u32, SerializeError> {
    field(data, name)?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SerializeError::Malformed(format!("field {name} is not a u32")))
}

fn array_field<'a>(data: &'a Value, name: &str) -> Result<&'a Vec<Value>, SerializeError> {
    field(data, name)?
        .as_array()
        .ok_or_else(|| SerializeError::Malformed(format!("field {name} is not an array")))
}
