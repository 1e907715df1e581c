use anyhow::Result;
use dashmap::DashMap;
use log::{debug, trace, warn};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::SourceType;
use std::path::{Path, PathBuf};

use crate::fs::FileSystem;

pub type ImportCache = DashMap<PathBuf, Vec<String>>;

/// Raw import specifiers of `file` in source order, parsed at most once per
/// cache.
pub fn imports_for(fs: &dyn FileSystem, file: &Path, cache: &ImportCache) -> Result<Vec<String>> {
    if let Some(v) = cache.get(file) {
        trace!("Cache hit for imports: {}", file.display());
        return Ok(v.clone());
    }
    trace!("Parsing file for imports: {}", file.display());
    let src = fs.read_to_string(file)?;
    let specs = parse_imports(file, &src);
    cache.insert(file.to_path_buf(), specs.clone());
    Ok(specs)
}

/// Every module specifier in `src`: static and type-only imports,
/// re-exports, `import x = require()`, `require()` calls and dynamic
/// `import()` expressions, wherever they appear.
pub fn parse_imports(file: &Path, src: &str) -> Vec<String> {
    let st = source_type_for(file);
    let allocator = Allocator::default();
    let ParserReturn { program, errors, .. } = OxcParser::new(&allocator, src, st).parse();
    if !errors.is_empty() {
        warn!("{} parse errors in {}, imports may be incomplete", errors.len(), file.display());
    }

    let mut collector = ImportCollector::default();
    collector.visit_program(&program);

    debug!("Found {} import specifiers in {}", collector.specs.len(), file.display());
    collector.specs
}

/// Walks the whole program, so imports nested in functions, classes, blocks
/// or `export default` are found too.
#[derive(Default)]
struct ImportCollector {
    specs: Vec<String>,
}

impl<'a> Visit<'a> for ImportCollector {
    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        trace!("Found static import: '{}'", it.source.value);
        self.specs.push(it.source.value.to_string());
    }

    fn visit_export_all_declaration(&mut self, it: &ExportAllDeclaration<'a>) {
        trace!("Found re-export: '{}'", it.source.value);
        self.specs.push(it.source.value.to_string());
    }

    fn visit_export_named_declaration(&mut self, it: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &it.source {
            trace!("Found named re-export: '{}'", source.value);
            self.specs.push(source.value.to_string());
        }
        walk::walk_export_named_declaration(self, it);
    }

    fn visit_ts_import_equals_declaration(&mut self, it: &TSImportEqualsDeclaration<'a>) {
        if let TSModuleReference::ExternalModuleReference(ext) = &it.module_reference {
            trace!("Found import-equals: '{}'", ext.expression.value);
            self.specs.push(ext.expression.value.to_string());
        }
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Expression::StringLiteral(sl) = &it.source {
            trace!("Found dynamic import(): '{}'", sl.value);
            self.specs.push(sl.value.to_string());
        }
        walk::walk_import_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &it.callee
            && callee.name.as_str() == "require"
            && let Some(Expression::StringLiteral(sl)) = it.arguments.first().and_then(|a| a.as_expression())
        {
            trace!("Found require() call: '{}'", sl.value);
            self.specs.push(sl.value.to_string());
        }
        walk::walk_call_expression(self, it);
    }
}

fn source_type_for(path: &Path) -> SourceType {
    let ext = path.extension().and_then(|e| e.to_str());

    let mut st = SourceType::default()
        .with_jsx(matches!(ext, Some("tsx") | Some("jsx")))
        .with_typescript(matches!(ext, Some("ts") | Some("tsx") | Some("mts") | Some("cts")));

    // import/export syntax is everywhere in the projects we analyze
    if !matches!(ext, Some("cjs") | Some("cts")) {
        st = st.with_module(true);
    }

    st
}
