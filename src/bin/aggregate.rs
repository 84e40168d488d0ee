//! cartally-aggregate — one-shot CLI: read a day's event log and print a
//! volume/speed report.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use cartally::aggregator::aggregate_day;
use cartally::eventlog::{date_label_from_filename, read_events};

fn main() -> Result<()> {
    let path = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => bail!("usage: cartally-aggregate <event-log-file> [--json]"),
    };
    let as_json = std::env::args().any(|a| a == "--json");

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let label = date_label_from_filename(&filename).to_string();

    let events = read_events(&path).with_context(|| format!("failed to read {path:?}"))?;
    let Some(report) = aggregate_day(events) else {
        println!("{label}: no events");
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&label, &report);
    }
    Ok(())
}

fn print_report(label: &str, report: &cartally::aggregator::Report) {
    println!("{label} ({})", report.weekday);
    println!(
        "  total: up={} dn={}",
        report.total.up_count, report.total.dn_count
    );
    if let Some(avg) = report.total.up_speed.average() {
        println!("  up avg speed: {avg:.1} mph (max {:.1})", report.total.up_speed.max);
    }
    if let Some(avg) = report.total.dn_speed.average() {
        println!("  dn avg speed: {avg:.1} mph (max {:.1})", report.total.dn_speed.max);
    }
    if let Some(avg) = report.total.overall_speed.average() {
        println!("  overall avg speed: {avg:.1} mph (max {:.1})", report.total.overall_speed.max);
    }
    println!(
        "  early (00:00-06:00): up={} dn={}",
        report.early.up_count, report.early.dn_count
    );
    println!(
        "  late  (22:00-24:00): up={} dn={}",
        report.late.up_count, report.late.dn_count
    );
    for (i, bin) in report.daytime.iter().enumerate() {
        if bin.up_count == 0 && bin.dn_count == 0 {
            continue;
        }
        let quarter_hour = i + 24;
        let hour = quarter_hour / 4;
        let minute = (quarter_hour % 4) * 15;
        println!("  {hour:02}:{minute:02} up={} dn={}", bin.up_count, bin.dn_count);
    }
}
