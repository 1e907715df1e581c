//! Module boundaries on top of the import graph.
//!
//! - Loading and normalizing `oxifence.config.json`
//! - Matching directory templates and assigning modules and tags
//! - Checking imports against the dependency rules
//! - Detecting deep imports past a module's barrel
//! - Assembling per-entry project information and verification reports

mod config;
mod dep_rules;
mod encapsulation;
mod project;
mod tagging;
mod template;
mod verify;

// Re-export public API
pub use config::{
    CONFIG_FILE, Config, DEFAULT_BARREL_FILE, DEFAULT_ENCAPSULATED_FOLDER, Encapsulation,
    EntrySpec, ModuleRule, ROOT_TAG, RawConfig, TaggingMode, load_config,
};
pub use dep_rules::{DependencyRuleViolation, DependencyRules, check_dependency_rule_violations};
pub use encapsulation::{EncapsulationPolicy, check_encapsulation_violations};
pub use project::{
    Analyzer, EntryPoint, FileData, ProjectData, ProjectDataOptions, ProjectInfo,
    build_project_info,
};
pub use tagging::{ModuleInfo, ModuleTable, ModuleType};
pub use template::{Captures, PathTemplate, fill};
pub use verify::{VerifyReport, ViolationRecord, verify, verify_entry_points};
