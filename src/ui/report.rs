//! Human-readable rendering of runs, events, checkpoints and cleanup reports.
//!
//! `format_*` functions return strings so they can be tested; `print_*`
//! functions write them to stdout.

use console::{Emoji, style};
use runway_common::{Checkpoint, Event, PhaseRecord, PhaseStatus, Run, RunStatus};

use super::icons::{
    ARCHIVE, CANCELLED, CHECK, CHECKPOINT, CLOCK, CROSS, FILE_DEL, GATE, PAUSED, PENDING, RETRY,
    RUNNING, SKIPPED,
};
use crate::cleanup::CleanupReport;
use crate::provider::{WorkItem, WorkItemState};
use crate::registry::RunView;

pub fn status_icon(status: RunStatus) -> Emoji<'static, 'static> {
    match status {
        RunStatus::Pending => PENDING,
        RunStatus::InProgress => RUNNING,
        RunStatus::Paused => PAUSED,
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Cancelled => CANCELLED,
    }
}

pub fn phase_icon(status: PhaseStatus) -> Emoji<'static, 'static> {
    match status {
        PhaseStatus::Pending => PENDING,
        PhaseStatus::InProgress => RUNNING,
        PhaseStatus::Completed => CHECK,
        PhaseStatus::Failed => CROSS,
        PhaseStatus::Skipped => SKIPPED,
    }
}

fn styled_status(status: RunStatus) -> String {
    let text = status.as_str();
    match status {
        RunStatus::Completed => style(text).green().to_string(),
        RunStatus::Failed => style(text).red().bold().to_string(),
        RunStatus::Paused => style(text).yellow().to_string(),
        RunStatus::InProgress => style(text).cyan().to_string(),
        RunStatus::Pending | RunStatus::Cancelled => style(text).dim().to_string(),
    }
}

pub fn format_phase_line(record: &PhaseRecord, current: bool) -> String {
    let marker = if current { "→" } else { " " };
    let mut line = format!(
        "  {} {}{:<10} {}",
        marker,
        phase_icon(record.status),
        record.phase.as_str(),
        record.status
    );
    if record.retry_count > 0 {
        line.push_str(&format!(" {}retries: {}", RETRY, record.retry_count));
    }
    if let (Some(start), Some(end)) = (record.started_at, record.ended_at) {
        let secs = (end - start).num_seconds().max(0);
        line.push_str(&format!(" {}{}s", CLOCK, secs));
    }
    line
}

pub fn format_run_row(run: &Run) -> String {
    format!(
        "{}{}  {:<11}  {:<9}  {:<10}  {}",
        status_icon(run.status),
        run.run_id,
        run.status.as_str(),
        run.current_phase.map(|p| p.as_str()).unwrap_or("-"),
        run.workflow_id,
        run.updated_at.format("%Y-%m-%d %H:%M")
    )
}

pub fn format_event_line(event: &Event) -> String {
    let mut line = format!(
        "{:>5}  {}  {:<20}",
        event.sequence,
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.event_type
    );
    if let Some(phase) = event.phase {
        line.push_str(&format!(" [{}]", phase));
    }
    if let Some(status) = &event.status {
        line.push_str(&format!(" {}", status));
    }
    if let Some(message) = &event.message {
        let first = message.lines().next().unwrap_or_default();
        line.push_str(&format!(" - {}", first));
    }
    if let Some(error) = &event.error {
        line.push_str(&format!(" ({}: {})", error.code, error.message));
    }
    line
}

pub fn print_run(view: &RunView) {
    let run = &view.run;
    println!();
    println!(
        "{}{}",
        status_icon(run.status),
        style(run.run_id.to_string()).bold()
    );
    println!("  Status:    {}", styled_status(run.status));
    println!("  Workflow:  {}", run.workflow_id);
    println!("  Autonomy:  {}", run.autonomy_level.as_str());
    if let Some(item) = &run.work_item_id {
        match run.metadata.get("work_item_title").and_then(|v| v.as_str()) {
            Some(title) => println!("  Work item: {} ({})", item, title),
            None => println!("  Work item: {}", item),
        }
    }
    if let Some(step) = &run.current_step {
        println!("  Step:      {}", step);
    }
    if let Some(gate) = run.pending_gate {
        println!(
            "  {}{}",
            GATE,
            style(format!("Awaiting approval after {}; run 'runway resume' to continue", gate))
                .yellow()
        );
    }
    if let Some(count) = view.event_count {
        println!("  Events:    {}", count);
    }
    println!(
        "  Updated:   {}",
        run.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    for record in &run.phases {
        println!("{}", format_phase_line(record, run.current_phase == Some(record.phase)));
    }
    println!();
}

pub fn print_run_table(runs: &[Run]) {
    if runs.is_empty() {
        println!("No runs found.");
        return;
    }
    println!(
        "{}",
        style(format!(
            "   {:<58}  {:<11}  {:<9}  {:<10}  {}",
            "RUN", "STATUS", "PHASE", "WORKFLOW", "UPDATED"
        ))
        .dim()
    );
    for run in runs {
        println!("{}", format_run_row(run));
    }
}

pub fn print_events(events: &[Event]) {
    if events.is_empty() {
        println!("No events.");
        return;
    }
    for event in events {
        println!("{}", format_event_line(event));
    }
}

pub fn print_checkpoint(checkpoint: &Checkpoint) {
    println!(
        "{}{}  {}  {}{}",
        CHECKPOINT,
        style(&checkpoint.checkpoint_id).bold(),
        checkpoint.created_at.format("%Y-%m-%d %H:%M:%S"),
        checkpoint.phase.map(|p| p.as_str()).unwrap_or("-"),
        checkpoint
            .step
            .as_deref()
            .map(|s| format!(" / {}", s))
            .unwrap_or_default()
    );
}

pub fn print_cleanup(report: &CleanupReport, dry_run: bool) {
    if dry_run {
        if report.candidates.is_empty() {
            println!("Nothing to clean up.");
        }
        for run_id in &report.candidates {
            println!("{}would remove {}", PENDING, run_id);
        }
    }
    for run_id in &report.deleted {
        println!("{}deleted {}", FILE_DEL, run_id);
    }
    for run_id in &report.archived {
        println!("{}archived {}", ARCHIVE, run_id);
    }
    for failure in &report.errors {
        println!(
            "{}{} {} ({})",
            CROSS,
            style(&failure.run_id).red(),
            failure.message,
            failure.cause
        );
    }
    if !dry_run {
        println!(
            "\n{} deleted, {} archived, {} failed",
            report.deleted.len(),
            report.archived.len(),
            report.errors.len()
        );
    }
}

pub fn print_work_item(item: &WorkItem) {
    let state = match item.state {
        WorkItemState::Open => style("open").green(),
        WorkItemState::Closed => style("closed").dim(),
    };
    println!("{}  {}  [{}]", style(&item.id).bold(), item.title, state);
    if !item.labels.is_empty() {
        println!("  Labels:    {}", item.labels.join(", "));
    }
    if let Some(milestone) = &item.milestone {
        println!("  Milestone: {}", milestone);
    }
    if !item.body.is_empty() {
        println!();
        for line in item.body.lines() {
            println!("  {}", line);
        }
    }
    for comment in &item.comments {
        println!();
        println!(
            "  {} {}",
            style(comment.created_at.format("%Y-%m-%d %H:%M")).dim(),
            comment.body
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use runway_common::{AutonomyLevel, EventType, PhaseName, RunId};
    use std::collections::BTreeMap;

    fn event(message: Option<&str>) -> Event {
        Event {
            run_id: RunId::generate("acme", "billing").unwrap(),
            sequence: 7,
            event_type: EventType::PhaseRetried,
            phase: Some(PhaseName::Build),
            step: None,
            status: Some("in_progress".to_string()),
            message: message.map(str::to_string),
            metadata: BTreeMap::new(),
            artifacts: Vec::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_line_shows_first_message_line_only() {
        let line = format_event_line(&event(Some("NO-GO: coverage\nmore detail")));
        assert!(line.contains("phase_retried"));
        assert!(line.contains("[build]"));
        assert!(line.contains("NO-GO: coverage"));
        assert!(!line.contains("more detail"));
    }

    #[test]
    fn test_phase_line_shows_retries_and_duration() {
        let mut record = PhaseRecord::new(PhaseName::Build);
        let start = Utc::now();
        record.start(start);
        record.finish(PhaseStatus::Completed, start + Duration::seconds(42));
        record.retry_count = 1;

        let line = format_phase_line(&record, true);
        assert!(line.contains("→"));
        assert!(line.contains("build"));
        assert!(line.contains("completed"));
        assert!(line.contains("retries: 1"));
        assert!(line.contains("42s"));
    }

    #[test]
    fn test_run_row_without_current_phase() {
        let mut run = Run::new(
            RunId::generate("acme", "billing").unwrap(),
            "hotfix",
            None,
            AutonomyLevel::Assist,
            1,
            &PhaseName::ALL,
        );
        run.status = RunStatus::Completed;
        let row = format_run_row(&run);
        assert!(row.contains("acme/billing/"));
        assert!(row.contains("completed"));
        assert!(row.contains(" - "));
        assert!(row.contains("hotfix"));
    }
}
