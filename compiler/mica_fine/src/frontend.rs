//! Minimal bundled front end.
//!
//! The real parser and semantic analyzer live upstream; this module
//! implements the [`ModuleAnalyzer`] boundary for a small, line-oriented
//! statement subset so the engine (and its tests, and the demo driver)
//! can run end to end:
//!
//! ```text
//! import mod
//! NAME = <expr>
//! NAME: Final = <int expr>          # folded at analysis time
//! def f(a: int, b: float) -> bool:  # body lines are ignored
//! f(1)                              # call checking, argument by argument
//! mod.NAME                          # cross-module references
//! ```
//!
//! Each `def` is its own target; everything else belongs to the module's
//! top-level target (whose fully-qualified name is the module id itself).

use mica_diagnostic::Diagnostic;
use mica_types::{
    constant_fold_expr, incompatible_argument, is_compatible, missing_module_stub,
    name_not_defined, CallableSig, ConstExpr, ConstantValue, FinalScope, PromotionTable, Type,
    TypeInfoPool,
};

use crate::analyzer::{
    AnalyzeContext, ModuleAnalysis, ModuleAnalyzer, SignatureMap, SymbolSig, TargetAnalysis,
};
use crate::triggers::make_trigger;

/// The bundled analyzer: a type-info pool, the promotion table, and
/// nothing else.
pub struct BasicAnalyzer {
    pool: TypeInfoPool,
    promotions: PromotionTable,
}

impl Default for BasicAnalyzer {
    fn default() -> Self {
        BasicAnalyzer::new()
    }
}

impl BasicAnalyzer {
    pub fn new() -> Self {
        BasicAnalyzer {
            pool: TypeInfoPool::with_builtins(),
            promotions: PromotionTable::standard(),
        }
    }

    pub fn pool(&self) -> &TypeInfoPool {
        &self.pool
    }

    fn named_type(&self, name: &str) -> Option<Type> {
        match name {
            "None" => Some(Type::none()),
            "int" | "float" | "bool" | "str" | "bytes" | "object" | "list" | "dict" | "set" => {
                self.pool
                    .lookup(&format!("builtins.{name}"))
                    .map(Type::instance)
            }
            _ => None,
        }
    }

    /// Parse `def f(a: int, b: float) -> bool:` into a signature.
    fn parse_def(&self, line: &str) -> Option<(String, CallableSig)> {
        let rest = line.strip_prefix("def ")?;
        let open = rest.find('(')?;
        let name = rest[..open].trim().to_owned();
        let close = rest.rfind(')')?;
        let params_text = &rest[open + 1..close];
        let tail = rest[close + 1..].trim();

        let mut arg_names = Vec::new();
        let mut params = Vec::new();
        for part in split_top_level(params_text, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (arg_name, annotation) = match part.split_once(':') {
                Some((n, t)) => (n.trim().to_owned(), self.named_type(t.trim())),
                None => (part.to_owned(), None),
            };
            arg_names.push(arg_name);
            params.push(annotation.unwrap_or_else(Type::any));
        }
        let ret = tail
            .strip_prefix("->")
            .map(|r| r.trim().trim_end_matches(':').trim())
            .and_then(|r| self.named_type(r))
            .unwrap_or_else(Type::none);
        Some((name, CallableSig::new(arg_names, params, ret)))
    }

    /// Analyze the module's top level: imports, assignments, expression
    /// statements. Returns the top-level target.
    fn analyze_top_level(&mut self, ctx: &AnalyzeContext<'_>, local_defs: &SignatureMap) -> TargetAnalysis {
        let module = ctx.module_id;
        let path_str = ctx
            .path
            .map_or_else(|| format!("{module}.py"), |p| p.display().to_string());
        let mut target = TargetAnalysis {
            fqname: module.to_owned(),
            ..TargetAnalysis::default()
        };
        let mut finals = FinalScope::new();
        let mut locals = SignatureMap::new();

        for (index, raw_line) in ctx.source.lines().enumerate() {
            let line_no = i64::try_from(index + 1).unwrap_or(-1);
            let line = raw_line.trim_end();
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with(' ')
                || line.starts_with('\t')
                || line.starts_with("def ")
            {
                continue;
            }

            if let Some(imported) = line.strip_prefix("import ") {
                let imported = imported.trim();
                target.deps.push(make_trigger(imported));
                if !ctx.exports.has_module(imported) {
                    target
                        .diagnostics
                        .push(Diagnostic::error(&path_str, line_no, missing_module_stub(imported)));
                }
                continue;
            }

            // NAME: Final = <expr>
            if let Some((head, expr)) = line.split_once('=') {
                let head = head.trim();
                let expr = expr.trim();
                if let Some(name) = head.strip_suffix(": Final") {
                    let name = name.trim();
                    let folded = to_const_expr(expr, module, &locals)
                        .and_then(|ce| constant_fold_expr(&ce, module, &finals));
                    let ty = match &folded {
                        Some(ConstantValue::Bool(_)) => self
                            .named_type("bool")
                            .unwrap_or_else(Type::any),
                        Some(ConstantValue::Float(_)) => self
                            .named_type("float")
                            .unwrap_or_else(Type::any),
                        Some(ConstantValue::Str(_)) => {
                            self.named_type("str").unwrap_or_else(Type::any)
                        }
                        _ => self.named_type("int").unwrap_or_else(Type::any),
                    };
                    if let Some(value) = &folded {
                        finals.insert(&format!("{module}.{name}"), value.clone());
                    }
                    locals.insert(name.to_owned(), SymbolSig::Final { ty, value: folded });
                    continue;
                }
                // Plain NAME = <expr>
                if is_identifier(head) {
                    let ty = self.infer_expr(expr, ctx, local_defs, &locals, &mut target, &path_str, line_no);
                    locals.insert(head.to_owned(), SymbolSig::Var(ty));
                    continue;
                }
            }

            // Bare expression statement.
            self.infer_expr(line, ctx, local_defs, &locals, &mut target, &path_str, line_no);
        }

        target.outputs = locals;
        target
    }

    /// Infer an expression's type, recording diagnostics and trigger
    /// dependencies on the way.
    #[allow(clippy::too_many_arguments)]
    fn infer_expr(
        &self,
        expr: &str,
        ctx: &AnalyzeContext<'_>,
        local_defs: &SignatureMap,
        locals: &SignatureMap,
        target: &mut TargetAnalysis,
        path_str: &str,
        line_no: i64,
    ) -> Type {
        let expr = expr.trim();
        // Lowest precedence: additive, then multiplicative.
        for ops in [&["+", "-"][..], &["*", "//", "%"][..]] {
            if let Some((left, _op, right)) = split_binary(expr, ops) {
                let lt = self.infer_expr(&left, ctx, local_defs, locals, target, path_str, line_no);
                let rt = self.infer_expr(&right, ctx, local_defs, locals, target, path_str, line_no);
                return self.numeric_join(&lt, &rt);
            }
        }
        self.infer_atom(expr, ctx, local_defs, locals, target, path_str, line_no)
    }

    #[allow(clippy::too_many_arguments)]
    fn infer_atom(
        &self,
        atom: &str,
        ctx: &AnalyzeContext<'_>,
        local_defs: &SignatureMap,
        locals: &SignatureMap,
        target: &mut TargetAnalysis,
        path_str: &str,
        line_no: i64,
    ) -> Type {
        let atom = atom.trim();
        if atom.is_empty() {
            return Type::any();
        }
        if let Some(inner) = atom.strip_prefix('(').and_then(|a| a.strip_suffix(')')) {
            return self.infer_expr(inner, ctx, local_defs, locals, target, path_str, line_no);
        }
        if let Some(rest) = atom.strip_prefix('-') {
            return self.infer_atom(rest, ctx, local_defs, locals, target, path_str, line_no);
        }
        if atom == "True" || atom == "False" {
            return self.named_type("bool").unwrap_or_else(Type::any);
        }
        if atom == "None" {
            return Type::none();
        }
        if atom.parse::<i64>().is_ok() {
            return self.named_type("int").unwrap_or_else(Type::any);
        }
        if atom.parse::<f64>().is_ok() && atom.contains('.') {
            return self.named_type("float").unwrap_or_else(Type::any);
        }
        if (atom.starts_with('\'') && atom.ends_with('\''))
            || (atom.starts_with('"') && atom.ends_with('"'))
        {
            return self.named_type("str").unwrap_or_else(Type::any);
        }

        // Call: callee(args)
        if let Some(open) = atom.find('(') {
            if atom.ends_with(')') && is_dotted_identifier(&atom[..open]) {
                let callee = &atom[..open];
                let args_text = &atom[open + 1..atom.len() - 1];
                return self.check_call(
                    callee, args_text, ctx, local_defs, locals, target, path_str, line_no,
                );
            }
        }

        // Dotted reference: mod.NAME
        if let Some((module, name)) = atom.split_once('.') {
            if is_identifier(module) && is_identifier(name) {
                return self.lookup_qualified(module, name, ctx, target, path_str, line_no);
            }
        }

        // Plain name.
        if is_identifier(atom) {
            if let Some(sig) = locals.get(atom).or_else(|| local_defs.get(atom)) {
                return self.sig_type(sig);
            }
            target
                .diagnostics
                .push(Diagnostic::error(path_str, line_no, name_not_defined(atom)));
            return Type::any();
        }

        Type::any()
    }

    #[allow(clippy::too_many_arguments)]
    fn check_call(
        &self,
        callee: &str,
        args_text: &str,
        ctx: &AnalyzeContext<'_>,
        local_defs: &SignatureMap,
        locals: &SignatureMap,
        target: &mut TargetAnalysis,
        path_str: &str,
        line_no: i64,
    ) -> Type {
        // Resolve the callee to a signature, subscribing to its trigger.
        let (display_name, sig) = match callee.split_once('.') {
            Some((module, name)) => {
                target.deps.push(make_trigger(&format!("{module}.{name}")));
                if !ctx.exports.has_module(module) {
                    // The import statement already reported the missing
                    // module; stay quiet here.
                    return Type::any();
                }
                match ctx.exports.lookup(module, name) {
                    Some(sig) => (name.to_owned(), sig.clone()),
                    None => {
                        target.diagnostics.push(Diagnostic::error(
                            path_str,
                            line_no,
                            name_not_defined(&format!("{module}.{name}")),
                        ));
                        return Type::any();
                    }
                }
            }
            None => {
                target
                    .deps
                    .push(make_trigger(&format!("{}.{}", ctx.module_id, callee)));
                match locals.get(callee).or_else(|| local_defs.get(callee)) {
                    Some(sig) => (callee.to_owned(), sig.clone()),
                    None => {
                        target.diagnostics.push(Diagnostic::error(
                            path_str,
                            line_no,
                            name_not_defined(callee),
                        ));
                        return Type::any();
                    }
                }
            }
        };

        let SymbolSig::Func(func) = sig else {
            // Calling a non-function: nothing useful to check here.
            return Type::any();
        };

        let args: Vec<String> = split_top_level(args_text, ',')
            .into_iter()
            .map(|a| a.trim().to_owned())
            .filter(|a| !a.is_empty())
            .collect();
        for (position, arg) in args.iter().enumerate() {
            let got = self.infer_expr(arg, ctx, local_defs, locals, target, path_str, line_no);
            let Some(want) = func.params.get(position) else {
                continue;
            };
            if !is_compatible(&got, want, &self.pool, &self.promotions) {
                target.diagnostics.push(Diagnostic::error(
                    path_str,
                    line_no,
                    incompatible_argument(
                        position + 1,
                        &display_name,
                        &got.display(&self.pool),
                        &want.display(&self.pool),
                    ),
                ));
            }
        }
        (*func.ret).clone()
    }

    fn lookup_qualified(
        &self,
        module: &str,
        name: &str,
        ctx: &AnalyzeContext<'_>,
        target: &mut TargetAnalysis,
        path_str: &str,
        line_no: i64,
    ) -> Type {
        target.deps.push(make_trigger(&format!("{module}.{name}")));
        if !ctx.exports.has_module(module) {
            // The import line already carries the missing-module error.
            return Type::any();
        }
        match ctx.exports.lookup(module, name) {
            Some(sig) => self.sig_type(sig),
            None => {
                target.diagnostics.push(Diagnostic::error(
                    path_str,
                    line_no,
                    name_not_defined(&format!("{module}.{name}")),
                ));
                Type::any()
            }
        }
    }

    fn sig_type(&self, sig: &SymbolSig) -> Type {
        match sig {
            SymbolSig::Var(t) | SymbolSig::Final { ty: t, .. } => t.clone(),
            SymbolSig::Func(_) => Type::any(),
        }
    }

    fn numeric_join(&self, left: &Type, right: &Type) -> Type {
        let float = self.named_type("float").unwrap_or_else(Type::any);
        if left == &float || right == &float {
            return float;
        }
        if left.is_any() || right.is_any() {
            return Type::any();
        }
        left.clone()
    }
}

impl ModuleAnalyzer for BasicAnalyzer {
    fn scan_imports(&mut self, source: &str) -> Vec<String> {
        source
            .lines()
            .filter_map(|line| line.trim_end().strip_prefix("import "))
            .map(|m| m.trim().to_owned())
            .collect()
    }

    fn analyze_module(&mut self, ctx: &AnalyzeContext<'_>) -> ModuleAnalysis {
        let imports = self.scan_imports(ctx.source);
        let mut targets = Vec::new();

        // Function targets first: the top level sees their signatures.
        let mut local_defs = SignatureMap::new();
        for line in ctx.source.lines() {
            let line = line.trim_end();
            if let Some((name, sig)) = self.parse_def(line) {
                let fqname = format!("{}.{}", ctx.module_id, name);
                local_defs.insert(name.clone(), SymbolSig::Func(sig.clone()));
                targets.push(TargetAnalysis {
                    fqname,
                    deps: Vec::new(),
                    outputs: SignatureMap::from([(name, SymbolSig::Func(sig))]),
                    diagnostics: Vec::new(),
                    failed: false,
                });
            }
        }
        targets.push(self.analyze_top_level(ctx, &local_defs));

        ModuleAnalysis { imports, targets }
    }

    fn analyze_target(&mut self, ctx: &AnalyzeContext<'_>, fqname: &str) -> TargetAnalysis {
        if fqname == ctx.module_id {
            let mut local_defs = SignatureMap::new();
            for line in ctx.source.lines() {
                if let Some((name, sig)) = self.parse_def(line.trim_end()) {
                    local_defs.insert(name, SymbolSig::Func(sig));
                }
            }
            return self.analyze_top_level(ctx, &local_defs);
        }
        // A def target: re-extract that signature.
        let short = fqname
            .strip_prefix(ctx.module_id)
            .and_then(|s| s.strip_prefix('.'))
            .unwrap_or(fqname);
        for line in ctx.source.lines() {
            if let Some((name, sig)) = self.parse_def(line.trim_end()) {
                if name == short {
                    return TargetAnalysis {
                        fqname: fqname.to_owned(),
                        deps: Vec::new(),
                        outputs: SignatureMap::from([(name, SymbolSig::Func(sig))]),
                        diagnostics: Vec::new(),
                        failed: false,
                    };
                }
            }
        }
        // The def is gone; an empty output set retracts its exports.
        TargetAnalysis {
            fqname: fqname.to_owned(),
            ..TargetAnalysis::default()
        }
    }
}

// ── Text utilities ──────────────────────────────────────────────────

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

fn is_dotted_identifier(text: &str) -> bool {
    !text.is_empty() && text.split('.').all(is_identifier)
}

/// Split on a separator at paren/quote depth zero.
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut current = String::new();
    for c in text.chars() {
        match in_quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_quote = Some(c);
                    current.push(c);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth -= 1;
                    current.push(c);
                }
                c if c == separator && depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                c => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

/// Find the rightmost top-level occurrence of any operator in `ops` and
/// split there (left associativity).
fn split_binary(expr: &str, ops: &[&str]) -> Option<(String, String, String)> {
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut in_quote: Option<u8> = None;
    let mut best: Option<(usize, &str)> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                b'\'' | b'"' => in_quote = Some(c),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                _ if depth == 0 && expr.is_char_boundary(i) => {
                    for op in ops {
                        if expr[i..].starts_with(op) {
                            // A minus that starts the expression (or
                            // follows another operator) is unary.
                            let prefix = expr[..i].trim_end();
                            let unary = prefix.is_empty()
                                || prefix.ends_with(&['+', '-', '*', '%', '/', '(', ','][..]);
                            if !unary {
                                best = Some((i, op));
                            }
                            // `//` must win over a hypothetical `/`.
                            if *op == "//" {
                                i += 1;
                            }
                            break;
                        }
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    let (index, op) = best?;
    Some((
        expr[..index].trim().to_owned(),
        op.to_owned(),
        expr[index + op.len()..].trim().to_owned(),
    ))
}

fn to_const_expr(expr: &str, module: &str, locals: &SignatureMap) -> Option<ConstExpr> {
    let expr = expr.trim();
    for ops in [&["+", "-"][..], &["*", "//", "%"][..]] {
        if let Some((left, op, right)) = split_binary(expr, ops) {
            return Some(ConstExpr::Binary {
                op,
                left: Box::new(to_const_expr(&left, module, locals)?),
                right: Box::new(to_const_expr(&right, module, locals)?),
            });
        }
    }
    if let Some(rest) = expr.strip_prefix('-') {
        return Some(ConstExpr::Unary {
            op: "-".to_owned(),
            operand: Box::new(to_const_expr(rest, module, locals)?),
        });
    }
    if let Some(inner) = expr.strip_prefix('(').and_then(|e| e.strip_suffix(')')) {
        return to_const_expr(inner, module, locals);
    }
    if let Ok(n) = expr.parse::<i64>() {
        return Some(ConstExpr::Int(n));
    }
    if expr == "True" || expr == "False" {
        return Some(ConstExpr::Name(expr.to_owned()));
    }
    if is_identifier(expr) && locals.contains_key(expr) {
        return Some(ConstExpr::Name(format!("{module}.{expr}")));
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::analyzer::Exports;
    use pretty_assertions::assert_eq;

    fn analyze(source: &str, exports: &Exports) -> ModuleAnalysis {
        let mut analyzer = BasicAnalyzer::new();
        let ctx = AnalyzeContext {
            module_id: "m",
            path: None,
            source,
            exports,
        };
        analyzer.analyze_module(&ctx)
    }

    fn all_diagnostics(analysis: &ModuleAnalysis) -> Vec<String> {
        analysis
            .targets
            .iter()
            .flat_map(|t| t.diagnostics.iter())
            .flat_map(Diagnostic::render)
            .collect()
    }

    #[test]
    fn def_and_call_with_promotion_is_clean() {
        let mut exports = Exports::new();
        exports.insert_module("m", SignatureMap::new());
        let analysis = analyze("def f(x: float) -> None:\nf(1)\n", &exports);
        assert_eq!(all_diagnostics(&analysis), Vec::<String>::new());
    }

    #[test]
    fn bad_argument_type_is_reported() {
        let mut exports = Exports::new();
        exports.insert_module("m", SignatureMap::new());
        let analysis = analyze("def f(x: bool) -> None:\nf(1)\n", &exports);
        assert_eq!(
            all_diagnostics(&analysis),
            vec![
                "m.py:2: error: Argument 1 to \"f\" has incompatible type \"int\"; expected \"bool\""
            ]
        );
    }

    #[test]
    fn missing_import_is_reported() {
        let exports = Exports::new();
        let analysis = analyze("import ghost\n", &exports);
        assert_eq!(
            all_diagnostics(&analysis),
            vec![
                "m.py:1: error: Cannot find implementation or library stub for module named \"ghost\""
            ]
        );
    }

    #[test]
    fn cross_module_reference_types_and_subscribes() {
        let mut exports = Exports::new();
        let mut a = SignatureMap::new();
        let analyzer = BasicAnalyzer::new();
        let int = analyzer.named_type("int").unwrap();
        a.insert("X".to_owned(), SymbolSig::Var(int));
        exports.insert_module("a", a);
        exports.insert_module("m", SignatureMap::new());

        let analysis = analyze("import a\nY = a.X + 1\n", &exports);
        assert_eq!(all_diagnostics(&analysis), Vec::<String>::new());
        let top = analysis.targets.last().unwrap();
        assert!(top.deps.contains(&"<a>".to_owned()));
        assert!(top.deps.contains(&"<a.X>".to_owned()));
        assert!(matches!(top.outputs.get("Y"), Some(SymbolSig::Var(_))));
    }

    #[test]
    fn final_constant_is_folded() {
        let mut exports = Exports::new();
        exports.insert_module("m", SignatureMap::new());
        let analysis = analyze("N: Final = 3 + 5 * 2\n", &exports);
        let top = analysis.targets.last().unwrap();
        let Some(SymbolSig::Final { value, .. }) = top.outputs.get("N") else {
            panic!("expected folded final");
        };
        assert_eq!(value, &Some(ConstantValue::Int(13)));
    }

    #[test]
    fn final_division_by_zero_does_not_fold() {
        let mut exports = Exports::new();
        exports.insert_module("m", SignatureMap::new());
        let analysis = analyze("N: Final = 13 // 0\n", &exports);
        let top = analysis.targets.last().unwrap();
        let Some(SymbolSig::Final { value, .. }) = top.outputs.get("N") else {
            panic!("expected final");
        };
        assert_eq!(value, &None);
    }

    #[test]
    fn undefined_local_name_is_reported() {
        let mut exports = Exports::new();
        exports.insert_module("m", SignatureMap::new());
        let analysis = analyze("Y = missing + 1\n", &exports);
        assert_eq!(
            all_diagnostics(&analysis),
            vec!["m.py:1: error: Name \"missing\" is not defined"]
        );
    }

    #[test]
    fn def_targets_are_separate_from_top_level() {
        let mut exports = Exports::new();
        exports.insert_module("m", SignatureMap::new());
        let analysis = analyze("def f(x: int) -> bool:\nX = 1\n", &exports);
        let names: Vec<&str> = analysis.targets.iter().map(|t| t.fqname.as_str()).collect();
        assert_eq!(names, vec!["m.f", "m"]);
    }
}
