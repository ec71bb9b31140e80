use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::Write;

use crate::orchestrator::{RunReport, TargetReport};
use crate::targets::Target;

/// Top-level document written for a run
#[derive(Serialize)]
pub struct ExportReport<'a> {
    pub success: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub files_copied: u64,
    pub targets: Vec<&'a TargetReport>,
}

/// Options for customizing the JSON export
pub struct ExportOptions {
    /// Only list targets that produced no job, so they can be retried
    pub failed_only: bool,
}

/// Build the export document for a report
pub fn report_to_export<'a>(report: &'a RunReport, options: &ExportOptions) -> ExportReport<'a> {
    let targets = if options.failed_only {
        report.failed().collect()
    } else {
        report.targets.iter().collect()
    };

    ExportReport {
        success: report.is_success(),
        started_at: report.started_at,
        finished_at: report.finished_at,
        files_copied: report.files_copied(),
        targets,
    }
}

/// Export a run report to JSON format
///
/// # Returns
/// * `Ok(())` on success
/// * `Err(std::io::Error)` on write failure
pub fn export_json(
    report: &RunReport,
    options: &ExportOptions,
    writer: &mut impl Write,
) -> Result<(), std::io::Error> {
    let export = report_to_export(report, options);
    serde_json::to_writer_pretty(writer, &export)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Export a resolved target list to JSON format
pub fn export_targets_json(
    targets: &[Target],
    writer: &mut impl Write,
) -> Result<(), std::io::Error> {
    serde_json::to_writer_pretty(writer, targets)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionJob, FileError};
    use crate::orchestrator::{FailureStage, TargetOutcome};
    use std::path::PathBuf;

    fn create_test_report() -> RunReport {
        let now = Local::now();
        let ok = Target::new("10.0.0.1").with_label("Press 1");
        let job = ExtractionJob {
            target: ok.clone(),
            destination: PathBuf::from("/out/Press 1-10.0.0.1-2024-01-01_00-00-00"),
            started_at: now,
            files_total: 3,
            files_copied: 2,
            errors: vec![FileError {
                file: PathBuf::from(r"\\10.0.0.1\mtxuser\Fail_9.jpg"),
                cause: "access denied".to_string(),
            }],
        };

        RunReport {
            started_at: now,
            finished_at: now,
            targets: vec![
                TargetReport {
                    target: ok,
                    outcome: TargetOutcome::Extracted {
                        job,
                        connection_lost: false,
                        teardown_error: None,
                    },
                },
                TargetReport {
                    target: Target::new("10.0.0.2"),
                    outcome: TargetOutcome::Failed {
                        stage: FailureStage::Connect,
                        cause: "10.0.0.2 is unreachable".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_export_json_full_report() {
        let report = create_test_report();
        let options = ExportOptions { failed_only: false };

        let mut buffer = Vec::new();
        export_json(&report, &options, &mut buffer).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["files_copied"], 2);
        assert_eq!(value["targets"].as_array().unwrap().len(), 2);
        assert_eq!(value["targets"][0]["status"], "extracted");
        assert_eq!(value["targets"][0]["target"]["label"], "Press 1");
        assert_eq!(value["targets"][0]["job"]["errors"][0]["cause"], "access denied");
        assert_eq!(value["targets"][1]["status"], "failed");
        assert_eq!(value["targets"][1]["stage"], "connect");
    }

    #[test]
    fn test_export_json_failed_only() {
        let report = create_test_report();
        let options = ExportOptions { failed_only: true };

        let mut buffer = Vec::new();
        export_json(&report, &options, &mut buffer).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        let targets = value["targets"].as_array().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0]["target"]["address"], "10.0.0.2");
    }

    #[test]
    fn test_export_targets() {
        let targets = vec![Target::new("10.0.0.1").with_label("A"), Target::new("10.0.0.2")];

        let mut buffer = Vec::new();
        export_targets_json(&targets, &mut buffer).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value[0]["label"], "A");
        assert!(value[1].get("label").is_none());
    }
}
