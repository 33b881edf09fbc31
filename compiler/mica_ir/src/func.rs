//! Function IR: declarations, signatures, and bodies.

use crate::block::BasicBlock;
use crate::env::Environment;
use crate::rtypes::RType;

/// How an argument is passed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Pos,
    Opt,
    Star,
    Named,
    NamedOpt,
    Star2,
}

impl ArgKind {
    pub fn is_optional(self) -> bool {
        matches!(self, ArgKind::Opt | ArgKind::NamedOpt)
    }
}

/// A runtime argument: name, representation, passing kind.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeArg {
    pub name: String,
    pub rtype: RType,
    pub kind: ArgKind,
}

impl RuntimeArg {
    pub fn new(name: &str, rtype: RType) -> Self {
        RuntimeArg {
            name: name.to_owned(),
            rtype,
            kind: ArgKind::Pos,
        }
    }
}

/// A function signature at the runtime representation level.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncSignature {
    pub args: Vec<RuntimeArg>,
    pub ret_type: RType,
}

impl FuncSignature {
    pub fn new(args: Vec<RuntimeArg>, ret_type: RType) -> Self {
        FuncSignature { args, ret_type }
    }
}

/// What kind of callable a declaration is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FuncKind {
    Normal,
    StaticMethod,
    ClassMethod,
}

/// A function declaration: everything about a function except its body.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub class_name: Option<String>,
    pub module_name: String,
    pub sig: FuncSignature,
    pub kind: FuncKind,
    pub is_prop_setter: bool,
    pub is_prop_getter: bool,
}

impl FuncDecl {
    pub fn new(name: &str, class_name: Option<&str>, module_name: &str, sig: FuncSignature) -> Self {
        FuncDecl {
            name: name.to_owned(),
            class_name: class_name.map(str::to_owned),
            module_name: module_name.to_owned(),
            sig,
            kind: FuncKind::Normal,
            is_prop_setter: false,
            is_prop_getter: false,
        }
    }

    /// The signature a bound method call sees (no `self` argument).
    /// Static methods bind nothing.
    pub fn bound_sig(&self) -> Option<FuncSignature> {
        self.class_name.as_ref()?;
        if self.kind == FuncKind::StaticMethod {
            return Some(self.sig.clone());
        }
        Some(FuncSignature::new(
            self.sig.args.get(1..).unwrap_or_default().to_vec(),
            self.sig.ret_type.clone(),
        ))
    }

    pub fn shortname(&self) -> String {
        match &self.class_name {
            Some(class_name) => format!("{}.{}", class_name, self.name),
            None => self.name.clone(),
        }
    }

    pub fn fullname(&self) -> String {
        format!("{}.{}", self.module_name, self.shortname())
    }
}

/// Intermediate representation of a function with contextual information.
///
/// A `FuncIR` exclusively owns its environment and basic blocks; a block's
/// error handler is a back reference by id into `blocks`.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncIR {
    pub decl: FuncDecl,
    pub blocks: Vec<BasicBlock>,
    pub env: Environment,
    pub line: i64,
    /// Name shown for this function in tracebacks; omitted from
    /// tracebacks when `None`.
    pub traceback_name: Option<String>,
}

impl FuncIR {
    pub fn new(decl: FuncDecl, blocks: Vec<BasicBlock>, env: Environment) -> Self {
        FuncIR {
            decl,
            blocks,
            env,
            line: -1,
            traceback_name: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn fullname(&self) -> String {
        self.decl.fullname()
    }

    pub fn ret_type(&self) -> &RType {
        &self.decl.sig.ret_type
    }

    /// Assign dense printable labels to all blocks.
    pub fn number_blocks(&mut self) {
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.label = i64::try_from(i).unwrap_or(-1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sig() -> FuncSignature {
        FuncSignature::new(
            vec![
                RuntimeArg::new("self", RType::object()),
                RuntimeArg::new("x", RType::int()),
            ],
            RType::bool_(),
        )
    }

    #[test]
    fn names_compose() {
        let decl = FuncDecl::new("meth", Some("C"), "pkg.mod", sig());
        assert_eq!(decl.shortname(), "C.meth");
        assert_eq!(decl.fullname(), "pkg.mod.C.meth");

        let free = FuncDecl::new("f", None, "m", sig());
        assert_eq!(free.shortname(), "f");
        assert_eq!(free.fullname(), "m.f");
    }

    #[test]
    fn bound_sig_drops_self_except_for_static_methods() {
        let decl = FuncDecl::new("meth", Some("C"), "m", sig());
        let bound = decl.bound_sig().unwrap();
        assert_eq!(bound.args.len(), 1);
        assert_eq!(bound.args[0].name, "x");

        let mut stat = FuncDecl::new("s", Some("C"), "m", sig());
        stat.kind = FuncKind::StaticMethod;
        assert_eq!(stat.bound_sig().unwrap().args.len(), 2);

        let free = FuncDecl::new("f", None, "m", sig());
        assert!(free.bound_sig().is_none());
    }

    #[test]
    fn number_blocks_assigns_dense_labels() {
        let decl = FuncDecl::new("f", None, "m", FuncSignature::new(vec![], RType::Void));
        let mut func = FuncIR::new(
            decl,
            vec![BasicBlock::new(), BasicBlock::new()],
            Environment::new(),
        );
        assert_eq!(func.blocks[0].label, -1);
        func.number_blocks();
        assert_eq!(func.blocks[0].label, 0);
        assert_eq!(func.blocks[1].label, 1);
    }
}
