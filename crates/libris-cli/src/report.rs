use chrono::SecondsFormat;
use libris_db::{MigrationStatus, RunReport};

pub fn print_run_report(report: &RunReport) {
    if report.is_noop() {
        println!(
            "Database is up to date ({} migrations already applied).",
            report.skipped.len()
        );
        return;
    }

    for id in &report.applied {
        println!("  applied  {id}");
    }
    println!(
        "Applied {} migration{}, {} already up to date.",
        report.applied.len(),
        if report.applied.len() == 1 { "" } else { "s" },
        report.skipped.len()
    );
}

pub fn print_status(status: &MigrationStatus) {
    if status.migrations.is_empty() && status.unknown.is_empty() {
        println!("No migrations registered.");
        return;
    }

    let id_w = status
        .migrations
        .iter()
        .map(|m| m.id.len())
        .chain(status.unknown.iter().map(String::len))
        .max()
        .unwrap_or(0);

    for m in &status.migrations {
        let state = match m.applied_at {
            Some(at) => format!("applied {}", at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => "pending".to_string(),
        };
        println!("  {:<id_w$}  {:<28}  {}", m.id, state, m.description);
    }
    for id in &status.unknown {
        println!("  {id:<id_w$}  applied (not registered in this build)");
    }

    let pending = status.pending().count();
    if pending == 0 {
        println!("Database is up to date.");
    } else {
        println!("{pending} pending. Run `libris migrate` to apply.");
    }
}
