//! Constants for file extensions and resolution strategies.
//!
//! Parsing, resolution and the source walk all read from here so the set of
//! recognized TypeScript/JavaScript files stays consistent.

/// File extensions for JavaScript/TypeScript files that should be analyzed
pub const JS_TS_EXTENSIONS: &[&str] = &[
    "ts",  // TypeScript
    "tsx", // TypeScript with JSX
    "mts", // TypeScript module
    "cts", // TypeScript CommonJS
    "js",  // JavaScript
    "jsx", // JavaScript with JSX
    "mjs", // JavaScript module
    "cjs", // JavaScript CommonJS
];

/// Extensions to try when resolving module imports (in priority order)
pub const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Index file names to try when resolving directory imports
pub const INDEX_FILES: &[&str] = &[
    "index.ts",
    "index.tsx",
    "index.mts",
    "index.cts",
    "index.js",
    "index.jsx",
    "index.mjs",
    "index.cjs",
];

/// Imports ending in one of these are assets, not modules, and are dropped
/// before classification.
pub const DEFAULT_IGNORED_EXTENSIONS: &[&str] =
    &["css", "scss", "sass", "less", "html", "svg", "png", "jpg", "jpeg", "gif", "json"];

/// Node.js core modules, importable without a `node:` prefix.
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "crypto",
    "dgram",
    "dns",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "querystring",
    "readline",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

pub const TSCONFIG_FILE: &str = "tsconfig.json";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_extensions_matches_js_ts_extensions() {
        assert_eq!(RESOLVE_EXTENSIONS.len(), JS_TS_EXTENSIONS.len());
        for ext in RESOLVE_EXTENSIONS {
            assert!(
                JS_TS_EXTENSIONS.contains(ext),
                "RESOLVE_EXTENSIONS contains '{}' which is not in JS_TS_EXTENSIONS",
                ext
            );
        }
    }

    #[test]
    fn test_index_files_uses_all_extensions() {
        assert_eq!(INDEX_FILES.len(), JS_TS_EXTENSIONS.len());
        for ext in JS_TS_EXTENSIONS {
            let expected = format!("index.{}", ext);
            assert!(INDEX_FILES.contains(&expected.as_str()), "INDEX_FILES missing '{}'", expected);
        }
    }

    #[test]
    fn test_ignored_extensions_never_overlap_sources() {
        for ext in DEFAULT_IGNORED_EXTENSIONS {
            assert!(!JS_TS_EXTENSIONS.contains(ext), "'{}' is both ignored and a source", ext);
        }
    }
}
