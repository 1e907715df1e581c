use anyhow::Result;
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use oxifence_core::{to_slash, traverse_all_files};

use crate::{
    dep_rules::{DependencyRuleViolation, check_dependency_rule_violations},
    encapsulation::check_encapsulation_violations,
    project::{Analyzer, EntryPoint, ProjectInfo},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    /// Root-relative path of the offending file.
    pub file: String,
    pub encapsulations: Vec<String>,
    pub dependency_rules: Vec<DependencyRuleViolation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_name: Option<String>,
    pub entry_file: String,
    pub files_analyzed: usize,
    pub dependency_rule_violation_count: usize,
    pub encapsulation_violation_count: usize,
    pub records: Vec<ViolationRecord>,
    pub success: bool,
}

/// Checks every file reachable from the entry. Only files with at least one
/// violation get a record.
pub fn verify(project: &ProjectInfo) -> Result<VerifyReport> {
    let mut records = Vec::new();
    let mut files_analyzed = 0;
    let (mut dependency_count, mut encapsulation_count) = (0, 0);

    for file in traverse_all_files(&project.graph) {
        files_analyzed += 1;
        let encapsulations = check_encapsulation_violations(&file.path, project);
        let dependency_rules = check_dependency_rule_violations(&file.path, project)?;
        if encapsulations.is_empty() && dependency_rules.is_empty() {
            continue;
        }
        encapsulation_count += encapsulations.len();
        dependency_count += dependency_rules.len();
        records.push(ViolationRecord {
            file: to_slash(&project.root_dir, &file.path),
            encapsulations,
            dependency_rules,
        });
    }

    let report = VerifyReport {
        entry_name: project.entry.name.clone(),
        entry_file: to_slash(&project.root_dir, &project.entry.file),
        files_analyzed,
        dependency_rule_violation_count: dependency_count,
        encapsulation_violation_count: encapsulation_count,
        success: records.is_empty(),
        records,
    };
    info!(
        "Verified {} files from {}: {} dependency rule and {} encapsulation violations",
        report.files_analyzed,
        report.entry_file,
        report.dependency_rule_violation_count,
        report.encapsulation_violation_count
    );
    Ok(report)
}

/// Verifies each entry point independently and in parallel. Reports keep the
/// order of `entries`; the first configuration error aborts the run.
pub fn verify_entry_points(analyzer: &Analyzer, entries: &[EntryPoint]) -> Result<Vec<VerifyReport>> {
    debug!("Verifying {} entry points", entries.len());
    entries
        .par_iter()
        .map(|entry| {
            let project = analyzer.build_project_info(entry)?;
            verify(&project)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxifence_core::{MemoryFileSystem, OsFileSystem, user_error};
    use std::{
        fs,
        path::{Path, PathBuf},
    };
    use tempfile::TempDir;

    const RULES: &str = r#"{
        "modules": { "src/customers": "customers", "src/holidays": "holidays" },
        "depRules": { "root": ["customers", "holidays"], "customers": [], "holidays": [] },
        "entryFile": "src/main.ts"
    }"#;

    fn create_test_file(dir: &Path, path: &str, content: &str) -> PathBuf {
        let file_path = dir.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    fn clean_project(fs: MemoryFileSystem) -> MemoryFileSystem {
        fs.with_file("src/main.ts", "import { a } from './customers';\nimport { b } from './holidays';")
            .with_file("src/customers/index.ts", "export * from './customer.component';")
            .with_file("src/customers/customer.component.ts", "export const a = 1;")
            .with_file("src/holidays/index.ts", "export * from './holidays.component';")
    }

    fn run(fs: &MemoryFileSystem) -> Result<Vec<VerifyReport>> {
        let analyzer = Analyzer::load(fs, Path::new("/p"), None)?;
        let entries = analyzer.entries(None)?;
        verify_entry_points(&analyzer, &entries)
    }

    fn run_one(fs: &MemoryFileSystem) -> VerifyReport {
        run(fs).unwrap().remove(0)
    }

    #[test]
    fn test_clean_project() {
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", RULES))
            .with_file("src/holidays/holidays.component.ts", "export const b = 2;");
        let report = run_one(&fs);
        assert!(report.success);
        assert_eq!(report.files_analyzed, 5);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_dependency_violation() {
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", RULES))
            .with_file("src/holidays/holidays.component.ts", "import { a } from '../customers';");
        let report = run_one(&fs);
        assert!(!report.success);
        assert_eq!(report.dependency_rule_violation_count, 1);
        assert_eq!(report.encapsulation_violation_count, 0);
        assert_eq!(
            report.records,
            vec![ViolationRecord {
                file: "src/holidays/holidays.component.ts".into(),
                encapsulations: vec![],
                dependency_rules: vec![DependencyRuleViolation {
                    from_tag: "holidays".into(),
                    to_tags: vec!["customers".into()],
                    raw_import: "../customers".into(),
                }],
            }]
        );
    }

    #[test]
    fn test_deep_import() {
        let config = RULES.replace(r#""holidays": []"#, r#""holidays": ["customers"]"#);
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", &config))
            .with_file(
                "src/holidays/holidays.component.ts",
                "import { a } from '../customers/customer.component';",
            );
        let report = run_one(&fs);
        assert_eq!(report.dependency_rule_violation_count, 0);
        assert_eq!(report.encapsulation_violation_count, 1);
        assert_eq!(report.records[0].encapsulations, vec!["../customers/customer.component"]);
    }

    #[test]
    fn test_unresolved_import_is_not_a_violation() {
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", RULES))
            .with_file("src/holidays/holidays.component.ts", "import { x } from 'not-installed';");
        let report = run_one(&fs);
        assert!(report.success);

        let analyzer = Analyzer::load(&fs, Path::new("/p"), None).unwrap();
        let info = analyzer.build_project_info(&analyzer.entries(None).unwrap()[0]).unwrap();
        let unresolved: Vec<_> = info.graph.unresolved().map(|(_, raw)| raw).collect();
        assert_eq!(unresolved, vec!["not-installed"]);
    }

    #[test]
    fn test_self_imports_are_never_violations() {
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", RULES))
            .with_file(
                "src/holidays/holidays.component.ts",
                "import { h } from './data/holiday';\nimport { idx } from './index';",
            )
            .with_file("src/holidays/data/holiday.ts", "import { b } from '../holidays.component';");
        let report = run_one(&fs);
        assert!(report.success, "{:?}", report.records);
    }

    #[test]
    fn test_multiple_entry_points_are_independent() {
        let config = r#"{
            "modules": { "apps/<app>/features/<feature>": ["feature"], "libs/<lib>": ["lib"] },
            "depRules": { "root": ["feature"], "feature": ["lib"], "lib": [] },
            "entryPoints": { "web": "apps/web/main.ts", "admin": "apps/admin/main.ts" }
        }"#;
        let fs = MemoryFileSystem::new("/p")
            .with_file("oxifence.config.json", config)
            .with_file("apps/web/main.ts", "import './features/home';")
            .with_file("apps/web/features/home/index.ts", "import '../../../../libs/ui';")
            .with_file("libs/ui/index.ts", "")
            .with_file("apps/admin/main.ts", "import './features/users';")
            .with_file("apps/admin/features/users/index.ts", "import '../../../../libs/ui/button';")
            .with_file("libs/ui/button.ts", "");

        let reports = run(&fs).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].entry_name.as_deref(), Some("web"));
        assert!(reports[0].success);
        assert_eq!(reports[1].entry_name.as_deref(), Some("admin"));
        assert_eq!(reports[1].encapsulation_violation_count, 1);
        assert_eq!(reports[1].files_analyzed, 3);
    }

    #[test]
    fn test_widening_star_never_adds_violations() {
        let project = |config: &str| {
            clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", config))
                .with_file("src/holidays/holidays.component.ts", "import { a } from '../customers';")
        };
        let narrow = RULES.replace(r#""customers": []"#, r#""*": [], "customers": []"#);
        let wide = RULES.replace(r#""customers": []"#, r#""*": ["customers"], "customers": []"#);
        let before = run_one(&project(&narrow)).dependency_rule_violation_count;
        let after = run_one(&project(&wide)).dependency_rule_violation_count;
        assert_eq!(before, 1);
        assert_eq!(after, 0);
    }

    #[test]
    fn test_missing_config_checks_encapsulation_only() {
        let fs = MemoryFileSystem::new("/p")
            .with_file("src/main.ts", "import './customers/customer';\nimport './holidays';")
            .with_file("src/customers/index.ts", "")
            .with_file("src/customers/customer.ts", "")
            .with_file("src/holidays/index.ts", "");
        let analyzer = Analyzer::load(&fs, Path::new("/p"), None).unwrap();
        let entries = analyzer.entries(Some("src/main.ts")).unwrap();
        let report = verify_entry_points(&analyzer, &entries).unwrap().remove(0);
        assert_eq!(report.dependency_rule_violation_count, 0);
        assert_eq!(report.records[0].encapsulations, vec!["./customers/customer"]);
    }

    #[test]
    fn test_untagged_rule_is_fatal() {
        let config = r#"{
            "modules": { "src/customers": "customers", "src/holidays": "holidays" },
            "depRules": { "root": ["customers", "holidays"] },
            "entryFile": "src/main.ts"
        }"#;
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", config))
            .with_file("src/holidays/holidays.component.ts", "import { a } from '../customers';");
        let err = run(&fs).unwrap_err();
        assert_eq!(user_error(&err).unwrap().code(), "OXF-004");
    }

    #[test]
    fn test_exclude_root() {
        let config = r#"{
            "modules": { "src/customers": "customers" },
            "depRules": { "customers": [] },
            "excludeRoot": true,
            "entryFile": "src/main.ts"
        }"#;
        let fs = MemoryFileSystem::new("/p")
            .with_file("oxifence.config.json", config)
            .with_file("src/main.ts", "import './customers';")
            .with_file("src/customers/index.ts", "");
        assert!(run_one(&fs).success);
    }

    #[test]
    fn test_barrel_less_modules() {
        let config = r#"{
            "modules": { "src/<domain>": "domain:<domain>" },
            "depRules": { "*": ["domain:*"], "root": ["domain:*"] },
            "enableBarrelLess": true,
            "entryFile": "src/main.ts"
        }"#;
        let fs = MemoryFileSystem::new("/p")
            .with_file("oxifence.config.json", config)
            .with_file("src/main.ts", "import './billing/invoice';\nimport './billing/internal/tax';")
            .with_file("src/billing/invoice.ts", "import './internal/tax';")
            .with_file("src/billing/internal/tax.ts", "");
        let report = run_one(&fs);
        assert_eq!(report.encapsulation_violation_count, 1);
        assert_eq!(report.records[0].file, "src/main.ts");
        assert_eq!(report.records[0].encapsulations, vec!["./billing/internal/tax"]);
    }

    #[test]
    fn test_barrel_less_disabled_exposes_nothing() {
        let config = r#"{
            "modules": { "src/<domain>": "domain:<domain>" },
            "depRules": { "*": ["domain:*"], "root": ["domain:*"] },
            "entryFile": "src/main.ts"
        }"#;
        let fs = MemoryFileSystem::new("/p")
            .with_file("oxifence.config.json", config)
            .with_file("src/main.ts", "import './billing/invoice';")
            .with_file("src/billing/invoice.ts", "");
        assert_eq!(run_one(&fs).encapsulation_violation_count, 1);
    }

    #[test]
    fn test_repeated_forbidden_import_counts_each_time() {
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", RULES))
            .with_file(
                "src/holidays/holidays.component.ts",
                "import { a } from '../customers';\nimport type { C } from '../customers';",
            );
        let report = run_one(&fs);
        assert_eq!(report.dependency_rule_violation_count, 2);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].dependency_rules.len(), 2);
    }

    #[test]
    fn test_encapsulation_pattern_in_barrel_less_modules() {
        let config = r#"{
            "modules": { "src/<domain>": "domain:<domain>" },
            "depRules": { "*": ["domain:*"], "root": ["domain:*"] },
            "enableBarrelLess": true,
            "encapsulationPattern": "*.private.ts",
            "entryFile": "src/main.ts"
        }"#;
        let fs = MemoryFileSystem::new("/p")
            .with_file("oxifence.config.json", config)
            .with_file(
                "src/main.ts",
                "import './billing/invoice';\nimport './billing/internal/helper';\nimport './billing/tax.private';",
            )
            .with_file("src/billing/invoice.ts", "import './tax.private';\nimport './model/rate.private';")
            .with_file("src/billing/tax.private.ts", "")
            .with_file("src/billing/model/rate.private.ts", "")
            .with_file("src/billing/internal/helper.ts", "");
        let report = run_one(&fs);
        // the pattern replaces the default `internal` folder
        assert_eq!(report.encapsulation_violation_count, 1);
        assert_eq!(report.records[0].file, "src/main.ts");
        assert_eq!(report.records[0].encapsulations, vec!["./billing/tax.private"]);
    }

    #[test]
    fn test_configured_ignored_extensions_replace_defaults() {
        let config = r#"{
            "autoTagging": true,
            "ignoreFileExtensions": ["graphql"],
            "entryFile": "src/main.ts"
        }"#;
        let fs = MemoryFileSystem::new("/p")
            .with_file("oxifence.config.json", config)
            .with_file("src/main.ts", "import './schema.graphql';\nimport './styles.css';")
            .with_file("src/schema.graphql", "type Query { a: Int }");
        assert!(run_one(&fs).success);

        let analyzer = Analyzer::load(&fs, Path::new("/p"), None).unwrap();
        let info = analyzer.build_project_info(&analyzer.entries(None).unwrap()[0]).unwrap();
        let unresolved: Vec<_> = info.graph.unresolved().map(|(_, raw)| raw).collect();
        assert_eq!(unresolved, vec!["./styles.css"]);
        assert_eq!(info.graph.len(), 1);
    }

    #[test]
    fn test_verify_on_disk_with_path_aliases() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "tsconfig.json",
            r#"{ "compilerOptions": { "baseUrl": ".", "paths": { "@app/*": ["src/*"] } } }"#,
        );
        create_test_file(
            root,
            "oxifence.config.json",
            r#"{ "autoTagging": true,
                 "depRules": { "root": ["src/customers", "src/holidays"], "src/customers": [], "src/holidays": [] },
                 "entryFile": "src/main.ts" }"#,
        );
        create_test_file(root, "src/main.ts", "import '@app/customers';\nimport '@app/holidays';");
        create_test_file(root, "src/customers/index.ts", "import '@app/holidays/holiday';");
        create_test_file(root, "src/holidays/index.ts", "");
        create_test_file(root, "src/holidays/holiday.ts", "");

        let analyzer = Analyzer::load(&OsFileSystem, root, None).unwrap();
        let entries = analyzer.entries(None).unwrap();
        let report = verify_entry_points(&analyzer, &entries).unwrap().remove(0);

        assert_eq!(report.files_analyzed, 4);
        assert_eq!(report.encapsulation_violation_count, 1);
        assert_eq!(report.dependency_rule_violation_count, 1);
        let record = &report.records[0];
        assert_eq!(record.file, "src/customers/index.ts");
        assert_eq!(record.dependency_rules[0].from_tag, "src/customers");
        assert_eq!(record.dependency_rules[0].to_tags, vec!["src/holidays"]);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let fs = clean_project(MemoryFileSystem::new("/p").with_file("oxifence.config.json", RULES))
            .with_file("src/holidays/holidays.component.ts", "import { a } from '../customers';");
        let json = serde_json::to_value(run_one(&fs)).unwrap();
        assert_eq!(json["dependencyRuleViolationCount"], 1);
        assert_eq!(json["records"][0]["dependencyRules"][0]["fromTag"], "holidays");
        assert!(json.get("entryName").is_none());
    }
}
