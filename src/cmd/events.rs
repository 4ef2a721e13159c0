//! Event log access: `runway emit`, `runway events`, `runway consolidate`.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use runway::errors::RunwayError;
use runway::events::{EventFilter, EventLog};
use runway::ui::print_events;
use runway::ui::icons::CHECK;
use runway_common::{EventDraft, EventType, PhaseName, RunId};
use std::io::Read;

use super::Session;

pub struct EmitArgs {
    pub event_type: Option<String>,
    pub phase: Option<String>,
    pub step: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub meta: Vec<String>,
    pub data: Option<String>,
}

pub struct EventQuery {
    pub phase: Option<String>,
    pub event_type: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub after: Option<u64>,
}

/// Split `key=value`; the value is JSON when it parses as JSON, else a string.
pub fn parse_meta(entry: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = entry.split_once('=') else {
        bail!("Invalid --meta '{}': expected key=value", entry);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid --meta '{}': key is empty", entry);
    }
    let value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn parse_time(flag: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid {} '{}': expected an RFC 3339 timestamp", flag, value))
}

fn read_draft(data: &str) -> Result<EventDraft> {
    let raw = if data == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read event from stdin")?;
        buffer
    } else {
        data.to_string()
    };
    serde_json::from_str(&raw).context("Invalid event JSON")
}

pub fn build_draft(args: EmitArgs) -> Result<EventDraft> {
    let mut draft = match &args.data {
        Some(data) => read_draft(data)?,
        None => EventDraft::default(),
    };
    if let Some(event_type) = args.event_type {
        draft.event_type = Some(event_type);
    }
    if let Some(phase) = &args.phase {
        draft.phase = Some(
            phase
                .parse::<PhaseName>()
                .with_context(|| format!("Invalid --phase '{}'", phase))?,
        );
    }
    if args.step.is_some() {
        draft.step = args.step;
    }
    if args.status.is_some() {
        draft.status = args.status;
    }
    if args.message.is_some() {
        draft.message = args.message;
    }
    for entry in &args.meta {
        let (key, value) = parse_meta(entry)?;
        draft.metadata.insert(key, value);
    }
    Ok(draft)
}

pub fn cmd_emit(session: &Session, run: &str, args: EmitArgs) -> Result<()> {
    let draft = build_draft(args)?;
    let run_id: RunId = run.parse().map_err(RunwayError::from)?;
    if !session.registry().exists(&run_id) {
        return Err(RunwayError::RunNotFound(run_id.to_string()).into());
    }

    let event = EventLog::new(session.layout()).emit(run, draft)?;
    if session.json {
        return session.print_json(&event);
    }
    println!(
        "{}Appended {} #{} to {}",
        CHECK, event.event_type, event.sequence, event.run_id
    );
    Ok(())
}

pub fn cmd_events(session: &Session, run: Option<&str>, query: EventQuery) -> Result<()> {
    let run_id = session.resolve_run(run)?;
    if !session.registry().exists(&run_id) {
        return Err(RunwayError::RunNotFound(run_id.to_string()).into());
    }

    let mut filter = EventFilter::default();
    if let Some(phase) = &query.phase {
        filter = filter.phase(
            phase
                .parse::<PhaseName>()
                .with_context(|| format!("Invalid --phase '{}'", phase))?,
        );
    }
    if let Some(event_type) = query.event_type {
        filter = filter.event_type(EventType::from(event_type));
    }
    if let Some(since) = &query.since {
        filter = filter.since(parse_time("--since", since)?);
    }
    if let Some(until) = &query.until {
        filter = filter.until(parse_time("--until", until)?);
    }
    if let Some(after) = query.after {
        filter = filter.after_sequence(after);
    }

    let events = EventLog::new(session.layout())
        .read(&run_id, filter)?
        .collect_events()?;
    if session.json {
        return session.print_json(&events);
    }
    print_events(&events);
    Ok(())
}

pub fn cmd_consolidate(session: &Session, run: Option<&str>) -> Result<()> {
    let run_id = session.resolve_run(run)?;
    let report = EventLog::new(session.layout()).consolidate(&run_id)?;
    if session.json {
        return session.print_json(&report);
    }
    println!(
        "{}Consolidated {} events into {}",
        CHECK,
        report.events_consolidated,
        report.path.display()
    );
    println!("  sha256: {}", report.digest);
    if !report.changed {
        println!("  (unchanged)");
    }
    Ok(())
}
