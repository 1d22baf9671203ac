#![forbid(unsafe_code)]

//! Subcommand implementations. Each writes its result to `out`; progress
//! and fallbacks go to the log.

use std::io::Write;
use std::path::Path;

use dashgrid::layout::{
    CompactNode, CompactionMode, IssueSeverity, LayoutValidationError, ValidatedLayout,
    ValidationReport, compact, validate_text,
};
use dashgrid::{Dashboard, DashboardBuilder, FileStore, HeadlessEngine, WidgetTypeRegistry};
use tracing::{info, warn};

use crate::cli::{CompactArgs, ImportArgs, StoreArgs, ValidateArgs};
use crate::error::{CliError, Result};

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::ReadInput {
        path: path.to_path_buf(),
        source,
    })
}

fn open_dashboard(args: &StoreArgs) -> Result<Dashboard<FileStore, HeadlessEngine>> {
    let storage = FileStore::open(args.store.clone()).map_err(dashgrid::Error::from)?;
    let mut builder = DashboardBuilder::new(storage);
    if let Some(config) = &args.config {
        builder = builder.config_file(config)?;
    }
    Ok(builder.build_headless())
}

fn write_issues(report: &ValidationReport, out: &mut dyn Write) -> Result<()> {
    for issue in &report.issues {
        let level = match issue.severity {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
        };
        let at = match (&issue.id, issue.index) {
            (Some(id), _) => format!(" [{id}]"),
            (None, Some(index)) => format!(" [#{index}]"),
            (None, None) => String::new(),
        };
        writeln!(out, "{level}{at}: {}", issue.message)?;
    }
    Ok(())
}

/// Parse and validate a layout file, reporting rejected input.
fn load_layout(path: &Path, registry: &WidgetTypeRegistry, out: &mut dyn Write) -> Result<ValidatedLayout> {
    let text = read_input(path)?;
    match validate_text(&text, registry) {
        Ok(validated) => Ok(validated),
        Err(LayoutValidationError::Malformed {
            reason,
            line,
            column,
        }) => Err(CliError::MalformedLayout {
            path: path.to_path_buf(),
            reason: format!("not valid JSON at line {line}, column {column}: {reason}"),
        }),
        Err(LayoutValidationError::Invalid { report }) => {
            write_issues(&report, out)?;
            Err(CliError::InvalidLayout {
                path: path.to_path_buf(),
                errors: report.errors().count(),
            })
        }
    }
}

pub fn run_validate(args: &ValidateArgs, out: &mut dyn Write) -> Result<()> {
    let registry = WidgetTypeRegistry::builtin();
    if args.json {
        let text = read_input(&args.file)?;
        let (report, errors) = match validate_text(&text, &registry) {
            Ok(validated) => (validated.report, 0),
            Err(LayoutValidationError::Invalid { report }) => {
                let errors = report.errors().count();
                (report, errors)
            }
            Err(LayoutValidationError::Malformed { reason, .. }) => {
                return Err(CliError::MalformedLayout {
                    path: args.file.clone(),
                    reason,
                });
            }
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        if errors > 0 {
            return Err(CliError::InvalidLayout {
                path: args.file.clone(),
                errors,
            });
        }
        return Ok(());
    }

    let validated = load_layout(&args.file, &registry, out)?;
    write_issues(&validated.report, out)?;
    writeln!(
        out,
        "ok: {} widget(s), {} warning(s)",
        validated.layout.len(),
        validated.report.warnings().count()
    )?;
    Ok(())
}

pub fn run_export(args: &StoreArgs, out: &mut dyn Write) -> Result<()> {
    let mut dash = open_dashboard(args)?;
    let report = dash.start(args.device.into())?;
    if report.used_default() {
        warn!(source = ?report.source, "store had no usable layout; exporting the default");
    }
    let text = dash.copy_text()?;
    dash.shutdown();
    writeln!(out, "{text}")?;
    Ok(())
}

pub fn run_import(args: &ImportArgs, out: &mut dyn Write) -> Result<()> {
    let text = read_input(&args.file)?;
    let mut dash = open_dashboard(&args.store)?;
    dash.start(args.store.device.into())?;
    let report = dash.paste_text(&text)?;
    let widgets = dash.current_layout().len();
    let saves = dash.shutdown();
    info!(saves = saves.len(), "import persisted");
    writeln!(
        out,
        "imported {widgets} widget(s): {} added, {} updated, {} removed",
        report.added.len(),
        report.updated.len(),
        report.removed.len()
    )?;
    Ok(())
}

pub fn run_reset(args: &StoreArgs, out: &mut dyn Write) -> Result<()> {
    let mut dash = open_dashboard(args)?;
    dash.start(args.device.into())?;
    dash.reset()?;
    let widgets = dash.current_layout().len();
    dash.shutdown();
    writeln!(out, "reset to the default layout ({widgets} widget(s))")?;
    Ok(())
}

pub fn run_compact(args: &CompactArgs, out: &mut dyn Write) -> Result<()> {
    let registry = WidgetTypeRegistry::builtin();
    let mut validated = load_layout(&args.file, &registry, &mut std::io::sink())?;
    let mode = if args.vertical {
        CompactionMode::VerticalOnly
    } else {
        CompactionMode::Full
    };

    let nodes: Vec<CompactNode> = validated
        .layout
        .iter()
        .map(|record| CompactNode::new(record.id.clone(), record.rect()))
        .collect();
    let outcome = compact(&nodes, mode);
    for node_move in &outcome.moves {
        if let Some(record) = validated.layout.get_mut(&node_move.id) {
            record.set_rect(node_move.to);
        }
    }
    info!(
        moved = outcome.moves.len(),
        pushed_down = outcome.pushed_down,
        attempts = outcome.attempts,
        "layout compacted"
    );
    writeln!(out, "{}", serde_json::to_string_pretty(&validated.layout)?)?;
    Ok(())
}

pub fn run_widgets(out: &mut dyn Write) -> Result<()> {
    let registry = WidgetTypeRegistry::builtin();
    for (name, spec) in registry.iter() {
        let max = match (spec.max_w, spec.max_h) {
            (None, None) => "-".to_owned(),
            (w, h) => format!(
                "{}x{}",
                w.map_or_else(|| "*".to_owned(), |w| w.to_string()),
                h.map_or_else(|| "*".to_owned(), |h| h.to_string())
            ),
        };
        writeln!(
            out,
            "{name:<10} {:<10} min {}x{}  default {}x{}  max {max}",
            spec.label, spec.min_w, spec.min_h, spec.default_w, spec.default_h
        )?;
    }
    Ok(())
}
