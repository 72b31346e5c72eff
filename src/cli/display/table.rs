//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::cluster::ValidationOutcome;
use crate::domain::orchestrator::{CategoryReport, LivePlanEntry, UpReport};
use crate::domain::reconcile::{ChangeRecord, ChangeValue};
use crate::domain::state::DesiredState;
use chrono::{DateTime, Local};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};
use std::path::Path;

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .into_iter()
                .map(|h| Cell::new(h).set_alignment(CellAlignment::Left))
                .collect::<Vec<_>>(),
        );
    table
}

fn banner(title: &str, detail: String) -> String {
    format!("╭─ {} {} ─╮\n", title, detail.bright_black())
}

impl TableRenderer {
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    pub fn render_change_set(&self, changes: &[ChangeRecord]) -> String {
        if changes.is_empty() {
            return format!("{} No changes", StatusIcon::SUCCESS.green());
        }

        let mut table = new_table(vec!["CHANGE", "PATH", "DETAIL"]);
        for change in changes {
            table.add_row(vec![
                Cell::new(format!(
                    "{} {}",
                    change.kind.symbol(),
                    StatusIcon::change_text(change.kind)
                ))
                .fg(self.theme.change_color(change.kind)),
                Cell::new(change.path.join(".")),
                Cell::new(describe_change(change)),
            ]);
        }

        let mut output = banner("Change Set", format!("[{} changes]", changes.len()));
        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    pub fn render_live_plan(&self, plan: &[LivePlanEntry]) -> String {
        if plan.is_empty() {
            return "No live updates declared".to_string();
        }

        let mut table = new_table(vec!["IMAGE", "STEP", "ACTION"]);
        for entry in plan {
            for (index, step) in entry.steps.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(if index == 0 { entry.image.as_str() } else { "" }),
                    Cell::new(index + 1).set_alignment(CellAlignment::Right),
                    Cell::new(step).fg(self.theme.info),
                ]);
            }
        }

        let mut output = banner("Live Update Plan", format!("[{} images]", plan.len()));
        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    pub fn render_up_summary(&self, report: &UpReport) -> String {
        let mut table = new_table(vec!["CATEGORY", "APPLIED", "REMOVED", "FAILED", "STATUS"]);
        for (name, category) in [("Builds", &report.builds), ("Manifests", &report.manifests)] {
            table.add_row(self.category_row(name, category));
        }

        let mut output = banner(
            "Reconciliation",
            format!("[{} changes]", report.changes.len()),
        );
        output.push_str(&table.to_string());
        output.push('\n');

        for (resource, reason) in report.builds.failed.iter().chain(report.manifests.failed.iter()) {
            output.push_str(&format!(
                "{} {}: {}\n",
                StatusIcon::ERROR.red(),
                resource,
                reason
            ));
        }
        for warning in &report.warnings {
            output.push_str(&format!("{} {}\n", StatusIcon::WARNING.yellow(), warning));
        }
        for image in &report.sessions {
            output.push_str(&format!("{} live sync active for {}\n", StatusIcon::LIVE.cyan(), image));
        }
        if !report.persisted {
            output.push_str(&format!(
                "{} state not persisted\n",
                StatusIcon::WARNING.yellow()
            ));
        }
        output
    }

    fn category_row(&self, name: &str, category: &CategoryReport) -> Vec<Cell> {
        let ok = category.success();
        vec![
            Cell::new(name),
            Cell::new(category.applied.len()).set_alignment(CellAlignment::Right),
            Cell::new(category.removed.len()).set_alignment(CellAlignment::Right),
            Cell::new(category.failed.len())
                .set_alignment(CellAlignment::Right)
                .fg(if ok { self.theme.muted } else { self.theme.error }),
            Cell::new(format!(
                "{} {}",
                StatusIcon::outcome_icon(ok),
                if ok { "OK" } else { "Failed" }
            ))
            .fg(self.theme.outcome_color(ok)),
        ]
    }

    pub fn render_status(
        &self,
        state: &DesiredState,
        state_file: &Path,
        last_persisted: Option<DateTime<Local>>,
        pending: usize,
    ) -> String {
        let mut output = String::new();

        let mut settings = Table::new();
        settings
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        settings.add_row(vec![Cell::new("Registry"), Cell::new(&state.registry)]);
        settings.add_row(vec![Cell::new("Context"), Cell::new(&state.cluster_context)]);
        settings.add_row(vec![Cell::new("Namespace"), Cell::new(&state.namespace)]);
        settings.add_row(vec![
            Cell::new("State file"),
            Cell::new(state_file.display()).fg(self.theme.muted),
        ]);
        settings.add_row(vec![
            Cell::new("Last persisted"),
            match last_persisted {
                Some(at) => Cell::new(at.format("%Y-%m-%d %H:%M:%S")),
                None => Cell::new("never").fg(self.theme.muted),
            },
        ]);
        settings.add_row(vec![
            Cell::new("Pending changes"),
            Cell::new(pending).fg(if pending == 0 {
                self.theme.success
            } else {
                self.theme.warning
            }),
        ]);
        output.push_str(&settings.to_string());
        output.push('\n');

        if state.build_specs.is_empty() {
            output.push_str("No builds registered\n");
        } else {
            let mut builds = new_table(vec!["IMAGE", "CONTEXT", "DOCKERFILE", "ARGS", "LIVE STEPS"]);
            for spec in state.build_specs.values() {
                let live_steps = spec
                    .hot_reload
                    .as_ref()
                    .map(|h| h.live_steps.len())
                    .unwrap_or(0);
                builds.add_row(vec![
                    Cell::new(&spec.image_name),
                    Cell::new(&spec.build_context.dir),
                    Cell::new(&spec.build_context.dockerfile),
                    Cell::new(spec.build_context.args.len()).set_alignment(CellAlignment::Right),
                    Cell::new(live_steps)
                        .set_alignment(CellAlignment::Right)
                        .fg(if live_steps > 0 {
                            self.theme.info
                        } else {
                            self.theme.muted
                        }),
                ]);
            }
            output.push_str(&banner("Builds", format!("[{}]", state.build_specs.len())));
            output.push_str(&builds.to_string());
            output.push('\n');
        }

        if state.manifest_specs.is_empty() {
            output.push_str("No manifests registered\n");
        } else {
            let mut manifests = new_table(vec!["MANIFEST"]);
            for key in state.manifest_specs.keys() {
                manifests.add_row(vec![Cell::new(key)]);
            }
            output.push_str(&banner("Manifests", format!("[{}]", state.manifest_specs.len())));
            output.push_str(&manifests.to_string());
            output.push('\n');
        }

        output
    }

    pub fn render_validation(&self, outcomes: &[ValidationOutcome], root: &Path) -> String {
        if outcomes.is_empty() {
            return "No manifest files to validate".to_string();
        }

        let mut table = new_table(vec!["FILE", "RESULT", "DETAIL"]);
        for outcome in outcomes {
            let ok = outcome.is_valid();
            let file = outcome.file.strip_prefix(root).unwrap_or(&outcome.file);
            table.add_row(vec![
                Cell::new(file.display()),
                Cell::new(format!(
                    "{} {}",
                    StatusIcon::outcome_icon(ok),
                    if ok { "Valid" } else { "Invalid" }
                ))
                .fg(self.theme.outcome_color(ok)),
                Cell::new(
                    outcome
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                ),
            ]);
        }

        let invalid = outcomes.iter().filter(|o| !o.is_valid()).count();
        let mut output = banner(
            "Manifest Validation",
            format!("[{} files, {} invalid]", outcomes.len(), invalid),
        );
        output.push_str(&table.to_string());
        output.push('\n');
        output
    }
}

fn describe_change(change: &ChangeRecord) -> String {
    let value = change.new_value.as_ref().or(change.old_value.as_ref());
    match value {
        Some(ChangeValue::Setting(_)) => {
            let old = setting(change.old_value.as_ref());
            let new = setting(change.new_value.as_ref());
            format!("{} → {}", old, new)
        }
        Some(ChangeValue::Build(spec)) => {
            let live = if spec.has_live_steps() { ", live" } else { "" };
            format!("context {}{}", spec.build_context.dir, live)
        }
        Some(ChangeValue::Manifest(spec)) => spec.path.clone(),
        None => String::new(),
    }
}

fn setting(value: Option<&ChangeValue>) -> &str {
    match value {
        Some(ChangeValue::Setting(s)) => s.as_str(),
        _ => "",
    }
}
