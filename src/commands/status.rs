// src/commands/status.rs
//! Stage status report

use crate::cli::OutputFormat;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use taxi::{Agency, PackageController, StatusReport};

/// Width of a text report line
const LINE_WIDTH: usize = 78;

const TIME_FORMAT: &str = "%A, %B %d %Y, %H:%M W%V";

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Stage header, then one dotted `name ..... time` line per entry
pub fn render_text(report: &StatusReport) -> String {
    let mut out = String::new();
    for (stage, entries) in report {
        out.push_str(&stage.to_string().to_uppercase());
        out.push('\n');
        for entry in entries {
            let width = LINE_WIDTH.saturating_sub(entry.name.len());
            out.push_str(&format!(
                "{} {:.>width$}\n",
                entry.name,
                format_time(entry.modification_time),
                width = width
            ));
        }
    }
    out
}

/// Report keyed by uppercase stage name, in pipeline order
struct StageKeyed<'a>(&'a StatusReport);

impl Serialize for StageKeyed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|(stage, entries)| (stage.to_string().to_uppercase(), entries)),
        )
    }
}

/// `{"STAGE": [entries]}`
pub fn render_json(report: &StatusReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(&StageKeyed(report))?)
}

/// List packages per stage on an agency server
pub fn cmd_status(
    controller: &mut PackageController,
    agency: Option<String>,
    stage: Option<taxi::Stage>,
    format: OutputFormat,
) -> Result<()> {
    let report = controller.status(&Agency::from(agency), stage)?;
    match format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taxi::{RemoteEntry, Stage};

    fn report() -> StatusReport {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap();
        StatusReport::from([
            (
                Stage::Open,
                vec![RemoteEntry {
                    name: "Acme-en_US-fr_FR-20240115".to_string(),
                    is_directory: true,
                    modification_time: Some(time),
                }],
            ),
            (Stage::Done, Vec::new()),
        ])
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&report());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "OPEN");
        assert!(lines[1].starts_with("Acme-en_US-fr_FR-20240115 ...."));
        assert!(lines[1].ends_with("Monday, January 15 2024, 09:30 W03"));
        assert_eq!(lines[1].len(), LINE_WIDTH + 1);
        assert_eq!(lines[2], "DONE");
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["OPEN"][0]["name"], "Acme-en_US-fr_FR-20240115");
        assert_eq!(value["OPEN"][0]["is_directory"], true);
        assert!(value["OPEN"][0]["modification_time"].is_string());
        assert_eq!(value["DONE"], serde_json::json!([]));
    }

    #[test]
    fn test_render_json_keeps_pipeline_order() {
        let mut report = report();
        report.insert(Stage::Deploy, Vec::new());
        let json = render_json(&report).unwrap();
        let open = json.find("\"OPEN\"").unwrap();
        let deploy = json.find("\"DEPLOY\"").unwrap();
        let done = json.find("\"DONE\"").unwrap();
        assert!(open < deploy && deploy < done);
    }
}
