//! Script assets.
//!
//! Sources are parsed with oxc once; the AST never leaves [`analyze`]. What
//! survives is a list of dependency sites and byte-span rewrites, applied to
//! the original text during generation. Untouched scripts pass through as-is.

use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};

use super::{Asset, AssetContext, AssetError, AssetType, Dependency, Generated, ParseState};
use crate::builtins::BUNDLE_LOADER;
use crate::diagnostics::line_column;

const GLOBAL_BINDING: &str = "var global = arguments[3];\n";
const ES_MODULE_FLAG: &str = "Object.defineProperty(exports, \"__esModule\", { value: true });\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteKind {
    Static,
    Require { optional: bool },
    Dynamic,
    Url,
}

/// A dependency reference found in the source.
#[derive(Debug, Clone)]
struct Site {
    specifier: String,
    kind: SiteKind,
    /// Offset of the specifier literal.
    offset: u32,
    /// Span rewritten for dynamic imports and URL references.
    span: Span,
}

#[derive(Debug, Clone)]
struct Edit {
    start: u32,
    end: u32,
    text: String,
}

impl Edit {
    fn replace(span: Span, text: impl Into<String>) -> Self {
        Self {
            start: span.start,
            end: span.end,
            text: text.into(),
        }
    }
}

/// ES module syntax lowered to the CommonJS registry format.
#[derive(Debug, Default)]
struct ModuleLowering {
    is_esm: bool,
    edits: Vec<Edit>,
    /// Export getters hoisted to the top of the module.
    header: Vec<String>,
    temps: usize,
}

#[derive(Debug, Default)]
struct Structure {
    sites: Vec<Site>,
    env_refs: Vec<Span>,
    uses_global: bool,
    lowering: ModuleLowering,
}

/// A JavaScript module.
pub struct JsAsset {
    path: PathBuf,
    source: String,
    state: ParseState,
    structure: Option<Structure>,
    edits: Vec<Edit>,
    prologue: String,
}

impl JsAsset {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            source: String::new(),
            state: ParseState::Unparsed,
            structure: None,
            edits: Vec::new(),
            prologue: String::new(),
        }
    }
}

impl Asset for JsAsset {
    fn asset_type(&self) -> AssetType {
        AssetType::Js
    }

    fn source(&self) -> &str {
        &self.source
    }

    fn set_source(&mut self, source: String) {
        self.source = source;
        self.state = ParseState::Unparsed;
        self.structure = None;
        self.edits.clear();
        self.prologue.clear();
    }

    fn parse_state(&self) -> ParseState {
        self.state
    }

    fn parse(&mut self, _cx: &AssetContext<'_>) -> Result<(), AssetError> {
        self.structure = Some(analyze(&self.path, &self.source)?);
        self.state = ParseState::Parsed;
        Ok(())
    }

    fn collect_dependencies(
        &mut self,
        cx: &AssetContext<'_>,
    ) -> Result<Vec<Dependency>, AssetError> {
        let Some(structure) = self.structure.as_ref() else {
            return Ok(Vec::new());
        };

        let mut deps = Vec::new();
        let mut edits = Vec::new();
        let mut needs_loader = false;

        for site in &structure.sites {
            let loc = line_column(&self.source, site.offset as usize);
            match site.kind {
                SiteKind::Static => deps.push(Dependency::new(&site.specifier).at(loc)),
                SiteKind::Require { optional } => {
                    deps.push(Dependency::new(&site.specifier).optional(optional).at(loc))
                }
                SiteKind::Dynamic => {
                    if !needs_loader {
                        deps.push(Dependency::new(BUNDLE_LOADER));
                        needs_loader = true;
                    }
                    deps.push(Dependency::dynamic(&site.specifier).at(loc));
                    edits.push(Edit::replace(
                        site.span,
                        format!(
                            "require({})(require.resolve({}))",
                            quote(BUNDLE_LOADER),
                            quote(&site.specifier)
                        ),
                    ));
                }
                SiteKind::Url => {
                    let url = match cx.url_target(&site.specifier) {
                        Some(target) => {
                            let url = cx.public_url_for(&target);
                            deps.push(Dependency::url(&site.specifier, target).at(loc));
                            url
                        }
                        None => site.specifier.clone(),
                    };
                    // `import.meta` is not valid inside the registry's function wrappers
                    edits.push(Edit::replace(
                        site.span,
                        format!("new URL({}, location.href)", quote(&url)),
                    ));
                }
            }
        }

        if !edits.is_empty() {
            self.edits.extend(edits);
            self.state.mark_dirty();
        }
        Ok(deps)
    }

    fn transform(&mut self, cx: &AssetContext<'_>) -> Result<(), AssetError> {
        let Some(structure) = self.structure.as_ref() else {
            return Ok(());
        };
        let mut changed = false;

        let env = quote(cx.node_env());
        for span in &structure.env_refs {
            self.edits.push(Edit::replace(*span, env.clone()));
            changed = true;
        }

        if structure.uses_global {
            self.prologue.push_str(GLOBAL_BINDING);
            changed = true;
        }

        let lowering = &structure.lowering;
        if lowering.is_esm {
            self.prologue.push_str(ES_MODULE_FLAG);
            for line in &lowering.header {
                self.prologue.push_str(line);
                self.prologue.push('\n');
            }
            self.edits.extend(lowering.edits.iter().cloned());
            changed = true;
        }

        if changed {
            self.state.mark_dirty();
        }
        Ok(())
    }

    fn generate(&mut self, _cx: &AssetContext<'_>) -> Result<Generated, AssetError> {
        let code = if self.state == ParseState::Dirty {
            apply_edits(&self.source, &self.prologue, &mut self.edits)
        } else {
            self.source.clone()
        };

        let mut generated = Generated::new();
        generated.insert(AssetType::Js, code);
        Ok(generated)
    }
}

fn analyze(path: &Path, source: &str) -> Result<Structure, AssetError> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or(SourceType::mjs());
    let ret = Parser::new(&allocator, source, source_type).parse();

    if let Some(error) = ret.errors.first() {
        let offset = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or(0);
        return Err(AssetError::new(path, error.to_string()).at_offset(source, offset));
    }

    let mut collector = Collector {
        structure: Structure::default(),
        try_depth: 0,
    };
    collector.visit_program(&ret.program);

    let mut structure = collector.structure;
    structure.lowering = lower_module_syntax(&ret.program);
    Ok(structure)
}

struct Collector {
    structure: Structure,
    try_depth: usize,
}

impl Collector {
    fn push(&mut self, literal: &StringLiteral<'_>, kind: SiteKind, span: Span) {
        self.structure.sites.push(Site {
            specifier: literal.value.to_string(),
            kind,
            offset: literal.span.start,
            span,
        });
    }
}

impl<'a> Visit<'a> for Collector {
    fn visit_import_declaration(&mut self, decl: &ImportDeclaration<'a>) {
        if !decl.import_kind.is_type() {
            self.push(&decl.source, SiteKind::Static, decl.source.span);
        }
        walk::walk_import_declaration(self, decl);
    }

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &decl.source {
            if !decl.export_kind.is_type() {
                self.push(source, SiteKind::Static, source.span);
            }
        }
        walk::walk_export_named_declaration(self, decl);
    }

    fn visit_export_all_declaration(&mut self, decl: &ExportAllDeclaration<'a>) {
        if !decl.export_kind.is_type() {
            self.push(&decl.source, SiteKind::Static, decl.source.span);
        }
        walk::walk_export_all_declaration(self, decl);
    }

    fn visit_try_statement(&mut self, stmt: &TryStatement<'a>) {
        self.try_depth += 1;
        self.visit_block_statement(&stmt.block);
        self.try_depth -= 1;

        if let Some(handler) = &stmt.handler {
            self.visit_catch_clause(handler);
        }
        if let Some(finalizer) = &stmt.finalizer {
            self.visit_block_statement(finalizer);
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            if callee.name.as_str() == "require" && call.arguments.len() == 1 {
                if let Some(Argument::StringLiteral(literal)) = call.arguments.first() {
                    let kind = SiteKind::Require {
                        optional: self.try_depth > 0,
                    };
                    self.push(literal, kind, literal.span);
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &expr.source {
            self.push(literal, SiteKind::Dynamic, expr.span);
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_new_expression(&mut self, expr: &NewExpression<'a>) {
        if let Expression::Identifier(callee) = &expr.callee {
            if callee.name.as_str() == "URL" && expr.arguments.len() == 2 {
                if let (Some(Argument::StringLiteral(literal)), Some(base)) =
                    (expr.arguments.first(), expr.arguments.get(1))
                {
                    if is_import_meta_url(base) {
                        self.push(literal, SiteKind::Url, expr.span);
                        return;
                    }
                }
            }
        }
        walk::walk_new_expression(self, expr);
    }

    fn visit_static_member_expression(&mut self, expr: &StaticMemberExpression<'a>) {
        if expr.property.name.as_str() == "NODE_ENV" {
            if let Expression::StaticMemberExpression(env) = &expr.object {
                let on_process = matches!(
                    &env.object,
                    Expression::Identifier(object) if object.name.as_str() == "process"
                );
                if on_process && env.property.name.as_str() == "env" {
                    self.structure.env_refs.push(expr.span);
                    return;
                }
            }
        }
        walk::walk_static_member_expression(self, expr);
    }

    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        if ident.name.as_str() == "global" {
            self.structure.uses_global = true;
        }
    }
}

fn is_import_meta_url(arg: &Argument<'_>) -> bool {
    let Argument::StaticMemberExpression(member) = arg else {
        return false;
    };
    if member.property.name.as_str() != "url" {
        return false;
    }
    matches!(
        &member.object,
        Expression::MetaProperty(meta)
            if meta.meta.name.as_str() == "import" && meta.property.name.as_str() == "meta"
    )
}

/// Rewrite top-level `import`/`export` statements into `require` calls and
/// `exports` getters.
fn lower_module_syntax(program: &Program<'_>) -> ModuleLowering {
    let mut lowering = ModuleLowering::default();

    for stmt in &program.body {
        let Some(decl) = stmt.as_module_declaration() else {
            continue;
        };

        match decl {
            ModuleDeclaration::ImportDeclaration(import) => {
                lowering.is_esm = true;
                if import.import_kind.is_type() {
                    lowering.remove(import.span);
                    continue;
                }
                let text = lowering.lower_import(import);
                lowering.edits.push(Edit::replace(import.span, text));
            }
            ModuleDeclaration::ExportAllDeclaration(all) => {
                lowering.is_esm = true;
                if all.export_kind.is_type() {
                    lowering.remove(all.span);
                    continue;
                }
                let temp = lowering.temp();
                let mut text = format!("var {temp} = require({});", quote(&all.source.value));
                match &all.exported {
                    Some(name) => text.push_str(&getter(&export_name(name), &temp)),
                    None => text.push_str(&format!(
                        " Object.keys({temp}).forEach(function (key) {{ if (key !== \"default\" && !(key in exports)) Object.defineProperty(exports, key, {{ enumerable: true, get: function () {{ return {temp}[key]; }} }}); }});"
                    )),
                }
                lowering.edits.push(Edit::replace(all.span, text));
            }
            ModuleDeclaration::ExportNamedDeclaration(named) => {
                lowering.is_esm = true;
                if named.export_kind.is_type() {
                    lowering.remove(named.span);
                } else if let Some(source) = &named.source {
                    let temp = lowering.temp();
                    let mut text = format!("var {temp} = require({});", quote(&source.value));
                    for spec in named.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                        let local = format!("{temp}[{}]", quote(&export_name(&spec.local)));
                        text.push_str(&getter(&export_name(&spec.exported), &local));
                    }
                    lowering.edits.push(Edit::replace(named.span, text));
                } else if let Some(declaration) = &named.declaration {
                    let prefix = Span::new(named.span.start, declaration.span().start);
                    lowering.remove(prefix);
                    for name in declared_names(declaration) {
                        lowering.header.push(getter(&name, &name));
                    }
                } else {
                    for spec in named.specifiers.iter().filter(|s| !s.export_kind.is_type()) {
                        lowering
                            .header
                            .push(getter(&export_name(&spec.exported), &export_name(&spec.local)));
                    }
                    lowering.remove(named.span);
                }
            }
            ModuleDeclaration::ExportDefaultDeclaration(default) => {
                lowering.is_esm = true;
                let prefix = Span::new(default.span.start, default.declaration.span().start);
                let hoisted = match &default.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        func.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        class.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                        lowering.remove(default.span);
                        continue;
                    }
                    _ => None,
                };
                match hoisted {
                    Some(name) => {
                        lowering.remove(prefix);
                        lowering.header.push(getter("default", &name));
                    }
                    None => lowering
                        .edits
                        .push(Edit::replace(prefix, "exports.default = ")),
                }
            }
            _ => {}
        }
    }

    lowering
}

impl ModuleLowering {
    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("_satchel_import{}", self.temps)
    }

    fn remove(&mut self, span: Span) {
        self.edits.push(Edit::replace(span, ""));
    }

    fn lower_import(&mut self, import: &ImportDeclaration<'_>) -> String {
        let source = quote(&import.source.value);
        let specifiers = match &import.specifiers {
            Some(specifiers) if !specifiers.is_empty() => specifiers,
            _ => return format!("require({source});"),
        };

        let temp = self.temp();
        let mut text = format!("var {temp} = require({source});");
        for spec in specifiers.iter() {
            match spec {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(default) => {
                    text.push_str(&format!(
                        " var {} = {temp} && {temp}.__esModule ? {temp}.default : {temp};",
                        default.local.name
                    ));
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(namespace) => {
                    text.push_str(&format!(" var {} = {temp};", namespace.local.name));
                }
                ImportDeclarationSpecifier::ImportSpecifier(named) => {
                    if named.import_kind.is_type() {
                        continue;
                    }
                    text.push_str(&format!(
                        " var {} = {temp}[{}];",
                        named.local.name,
                        quote(&export_name(&named.imported))
                    ));
                }
            }
        }
        text
    }
}

fn getter(exported: &str, expr: &str) -> String {
    format!(
        " Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {expr}; }} }});",
        quote(exported)
    )
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                binding_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            names.extend(func.id.as_ref().map(|id| id.name.to_string()));
        }
        Declaration::ClassDeclaration(class) => {
            names.extend(class.id.as_ref().map(|id| id.name.to_string()));
        }
        _ => {}
    }
    names
}

fn binding_names(pattern: &BindingPattern<'_>, out: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(ident) => out.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                binding_names(&property.value, out);
            }
            if let Some(rest) = &object.rest {
                binding_names(&rest.argument, out);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                binding_names(element, out);
            }
            if let Some(rest) = &array.rest {
                binding_names(&rest.argument, out);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => binding_names(&assign.left, out),
    }
}

fn apply_edits(source: &str, prologue: &str, edits: &mut [Edit]) -> String {
    edits.sort_by_key(|edit| (edit.start, edit.end));

    let mut out = String::with_capacity(prologue.len() + source.len());
    out.push_str(prologue);

    let mut cursor = 0usize;
    for edit in edits.iter() {
        let (start, end) = (edit.start as usize, edit.end as usize);
        // overlapping rewrites keep the first one
        if start < cursor {
            continue;
        }
        out.push_str(source.get(cursor..start).unwrap_or_default());
        out.push_str(&edit.text);
        cursor = end;
    }
    out.push_str(source.get(cursor..).unwrap_or_default());
    out
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use crate::asset::{AssetType, test_support};
    use crate::runtime::MemoryRuntime;

    fn js(source: &str) -> MemoryRuntime {
        MemoryRuntime::new().with_file("/app/index.js", source)
    }

    #[test]
    fn collects_static_dependencies_in_source_order() {
        let runtime = js("import a from './a';\nexport { b } from './b';\nexport * from './c';\nconst d = require('./d');\n");
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();

        let specs: Vec<_> = out.dependencies.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specs, ["./a", "./b", "./c", "./d"]);
        assert!(out.dependencies.iter().all(|d| !d.dynamic));
        assert_eq!(out.dependencies[3].meta.loc.map(|l| l.line), Some(4));
    }

    #[test]
    fn require_inside_try_is_optional() {
        let runtime = js("try { require('fsevents'); } catch (e) {}\nrequire('./needed');\n");
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();

        assert!(out.dependencies[0].meta.optional);
        assert!(!out.dependencies[1].meta.optional);
    }

    #[test]
    fn dynamic_import_goes_through_the_bundle_loader() {
        let runtime = js("import('./lazy').then(function (m) { m.run(); });\n");
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();

        assert_eq!(out.dependencies[0].specifier, "satchel/bundle-loader");
        assert!(!out.dependencies[0].dynamic);
        assert_eq!(out.dependencies[1].specifier, "./lazy");
        assert!(out.dependencies[1].dynamic);

        let code = out.output(&AssetType::Js).unwrap();
        assert!(code.starts_with(
            "require(\"satchel/bundle-loader\")(require.resolve(\"./lazy\")).then("
        ));
    }

    #[test]
    fn untouched_scripts_pass_through() {
        let source = "const a = require('./a');\nmodule.exports = a;\n";
        let runtime = js(source);
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();
        assert_eq!(out.output(&AssetType::Js), Some(source));
    }

    #[test]
    fn node_env_is_inlined() {
        let runtime = js("if (process.env.NODE_ENV !== 'production') { debug(); }\n");
        let options = test_support::options().production(true);
        let out = test_support::run(&runtime, &options, "/app/index.js").unwrap();
        assert_eq!(
            out.output(&AssetType::Js),
            Some("if (\"production\" !== 'production') { debug(); }\n")
        );
    }

    #[test]
    fn global_reference_injects_binding() {
        let runtime = js("global.x = 1;\n");
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();
        assert_eq!(
            out.output(&AssetType::Js),
            Some("var global = arguments[3];\nglobal.x = 1;\n")
        );
    }

    #[test]
    fn es_modules_are_lowered_to_the_registry_format() {
        let runtime = js(
            "import def, { named as alias } from './dep';\nexport const value = def + alias;\nexport default function main() {}\n",
        );
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();
        let code = out.output(&AssetType::Js).unwrap();

        assert!(code.starts_with("Object.defineProperty(exports, \"__esModule\""));
        assert!(code.contains("var _satchel_import1 = require(\"./dep\");"));
        assert!(code.contains("var alias = _satchel_import1[\"named\"];"));
        assert!(code.contains("Object.defineProperty(exports, \"value\""));
        assert!(code.contains("Object.defineProperty(exports, \"default\""));
        assert!(code.contains("\nconst value = def + alias;"));
        assert!(code.contains("\nfunction main() {}"));
        assert!(!code.contains("import "));
        assert!(!code.contains("export "));
    }

    #[test]
    fn anonymous_default_export_is_assigned() {
        let runtime = js("export default 42;\n");
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();
        assert!(out.output(&AssetType::Js).unwrap().ends_with("exports.default = 42;\n"));
    }

    #[test]
    fn url_references_are_rewritten() {
        let runtime = MemoryRuntime::new()
            .with_file("/app/index.js", "const img = new URL('./logo.png', import.meta.url);\n")
            .with_file("/app/logo.png", vec![0u8]);
        let out = test_support::run(&runtime, &test_support::options(), "/app/index.js").unwrap();

        let dep = &out.dependencies[0];
        assert!(dep.dynamic);
        assert!(dep.meta.is_url);
        assert_eq!(dep.meta.url_target.as_deref(), Some(std::path::Path::new("/app/logo.png")));

        let code = out.output(&AssetType::Js).unwrap();
        assert!(code.contains("new URL(\"/logo."));
        assert!(code.contains(".png\", location.href)"));
        assert!(!code.contains("import.meta"));
    }

    #[test]
    fn syntax_errors_carry_a_code_frame() {
        let runtime = js("const ok = 1;\nconst broken = ;\n");
        let err = test_support::run(&runtime, &test_support::options(), "/app/index.js")
            .unwrap_err();

        assert_eq!(err.loc.map(|l| l.line), Some(2));
        assert!(err.code_frame.unwrap().contains("> 2 | const broken = ;"));
    }
}
