use std::path::PathBuf;

/// Fatal configuration errors.
///
/// Each variant maps to a stable code so tooling can filter on it; the
/// `Display` text names the offending file, tag, alias or placeholder and is
/// meant to be shown verbatim. These travel inside `anyhow::Error`; use
/// `err.downcast_ref::<UserError>()` to get them back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserError {
    #[error("path alias '{alias}' in {config} points to '{target}', which does not exist")]
    InvalidPath { alias: String, target: PathBuf, config: PathBuf },

    #[error("cannot resolve '{target}' extended by {config}")]
    UnresolvedExtends { target: String, config: PathBuf },

    #[error("module {directory} has no assigned tag")]
    NoAssignedTag { directory: String },

    #[error("no dependency rule defined for tag '{tag}'")]
    NoDependencyRuleForTag { tag: String },

    #[error("'modules' and 'tagging' cannot be used together; 'tagging' is the legacy name of 'modules'")]
    TaggingAndModules,

    #[error("'modules' cannot be combined with 'autoTagging: true'")]
    ModulesAndAutoTagging,

    #[error("configuration declares neither 'modules' nor 'autoTagging'")]
    NoTaggingMode,

    #[error("placeholder <{placeholder}> in tag '{tag}' for {file} does not appear in module path '{template}'")]
    PlaceholderNotFound { placeholder: String, tag: String, template: String, file: String },

    #[error("placeholder <{placeholder}> appears more than once in module path '{template}'")]
    DuplicatePlaceholder { placeholder: String, template: String },

    #[error("'encapsulatedFolderNameForBarrelLess' and 'encapsulationPattern' cannot be used together")]
    EncapsulationConflict,

    #[error("'entryFile' and 'entryPoints' cannot be used together")]
    EntryFileAndEntryPoints,

    #[error("no entry file declared; set 'entryFile', 'entryPoints' or pass one explicitly")]
    MissingEntry,

    #[error("invalid configuration in {file}: {reason}")]
    InvalidConfig { file: String, reason: String },
}

impl UserError {
    pub fn code(&self) -> &'static str {
        match self {
            UserError::InvalidPath { .. } => "OXF-001",
            UserError::UnresolvedExtends { .. } => "OXF-002",
            UserError::NoAssignedTag { .. } => "OXF-003",
            UserError::NoDependencyRuleForTag { .. } => "OXF-004",
            UserError::TaggingAndModules => "OXF-005",
            UserError::ModulesAndAutoTagging => "OXF-006",
            UserError::NoTaggingMode => "OXF-007",
            UserError::PlaceholderNotFound { .. } => "OXF-008",
            UserError::DuplicatePlaceholder { .. } => "OXF-009",
            UserError::EncapsulationConflict => "OXF-010",
            UserError::EntryFileAndEntryPoints => "OXF-011",
            UserError::MissingEntry => "OXF-012",
            UserError::InvalidConfig { .. } => "OXF-013",
        }
    }
}

/// Pulls the configuration error out of an `anyhow` chain, if there is one.
pub fn user_error(err: &anyhow::Error) -> Option<&UserError> {
    err.chain().find_map(|e| e.downcast_ref::<UserError>())
}
