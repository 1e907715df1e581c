use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::Path,
};

use colored::Colorize;
use log::{debug, trace};

use oxifence_core::relative_path;
use oxifence_rules::{ModuleType, ProjectData, VerifyReport};

/// Relativize a root-relative path to the current working directory for
/// clickable links
fn relativize_to_cwd(root: &Path, cwd: &Path, relative_to_root: &str) -> String {
    let abs_path = root.join(relative_to_root);
    match relative_path(cwd, &abs_path) {
        Some(rel_path) => {
            let result = rel_path.to_string_lossy().to_string();
            trace!("Relativized '{}' to '{}'", relative_to_root, result);
            result
        }
        None => relative_to_root.to_string(),
    }
}

fn entry_label(report: &VerifyReport) -> String {
    match &report.entry_name {
        Some(name) => format!("{} ({})", name, report.entry_file),
        None => report.entry_file.clone(),
    }
}

pub fn print_report<W: Write>(
    writer: &mut W,
    report: &VerifyReport,
    root: &Path,
    cwd: &Path,
) -> io::Result<()> {
    debug!("Printing report for {} with {} records", report.entry_file, report.records.len());

    if report.success {
        writeln!(
            writer,
            "{} {}: no boundary violations in {} files",
            "✓".green().bold(),
            entry_label(report),
            report.files_analyzed.to_string().cyan()
        )?;
        return Ok(());
    }

    writeln!(writer, "{} {}: boundary violations found\n", "⚠".yellow().bold(), entry_label(report))?;

    for record in &report.records {
        writeln!(writer, "{}", relativize_to_cwd(root, cwd, &record.file).bright_white().bold())?;

        let lines: Vec<String> = record
            .encapsulations
            .iter()
            .map(|raw| format!("{} {}", "deep import".yellow(), raw))
            .chain(record.dependency_rules.iter().map(|v| {
                format!(
                    "{} {} ({} may not import {})",
                    "dependency rule".red(),
                    v.raw_import,
                    v.from_tag.bold(),
                    v.to_tags.join(", ").bold()
                )
            }))
            .collect();

        for (idx, line) in lines.iter().enumerate() {
            let prefix = if idx == lines.len() - 1 { "└──" } else { "├──" };
            writeln!(writer, "{}  {}", prefix.dimmed(), line)?;
        }
        writeln!(writer)?;
    }

    writeln!(writer, "{}", "─".repeat(60).dimmed())?;
    writeln!(writer, "{}", "Summary".bold())?;
    writeln!(writer, "  Files analyzed: {}", report.files_analyzed.to_string().cyan())?;
    writeln!(
        writer,
        "  Encapsulation violations: {}",
        report.encapsulation_violation_count.to_string().yellow().bold()
    )?;
    writeln!(
        writer,
        "  Dependency rule violations: {}",
        report.dependency_rule_violation_count.to_string().red().bold()
    )?;
    writer.flush()?;
    Ok(())
}

/// Modules of the project with their type, tags and file count.
pub fn print_modules<W: Write>(writer: &mut W, data: &ProjectData) -> io::Result<()> {
    let mut modules: BTreeMap<&str, (ModuleType, &[String], usize)> = BTreeMap::new();
    for file in data.values() {
        modules.entry(&file.module).or_insert((file.module_type, file.tags.as_slice(), 0)).2 += 1;
    }
    debug!("Listing {} modules", modules.len());

    for (name, (module_type, tags, files)) in modules {
        let kind = match module_type {
            ModuleType::Barrel => "barrel",
            ModuleType::BarrelLess => "barrel-less",
            ModuleType::Root => "root",
        };
        writeln!(
            writer,
            "{} {} [{}] {} files",
            name.blue(),
            kind.dimmed(),
            tags.join(", ").green(),
            files.to_string().cyan()
        )?;
    }
    writer.flush()?;
    Ok(())
}
