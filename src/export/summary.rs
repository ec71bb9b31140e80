use std::io::Write;

use crate::orchestrator::{RunReport, TargetOutcome};

/// Write a short plain-text account of a run, one block per target.
pub fn write_summary(report: &RunReport, writer: &mut impl Write) -> Result<(), std::io::Error> {
    for entry in &report.targets {
        match &entry.outcome {
            TargetOutcome::Extracted {
                job,
                connection_lost,
                teardown_error,
            } => {
                writeln!(
                    writer,
                    "ok      {}: {}/{} files -> {}",
                    entry.target.display(),
                    job.files_copied,
                    job.files_total,
                    job.destination.display()
                )?;
                if job.has_errors() {
                    for error in &job.errors {
                        writeln!(
                            writer,
                            "          failed {}: {}",
                            error.file.display(),
                            error.cause
                        )?;
                    }
                }
                if *connection_lost {
                    writeln!(writer, "          connection lost during extraction")?;
                }
                if let Some(e) = teardown_error {
                    writeln!(writer, "          disconnect failed: {}", e)?;
                }
            }
            TargetOutcome::Failed { stage, cause } => {
                writeln!(writer, "failed  {} at {:?}: {}", entry.target.display(), stage, cause)?;
            }
        }
    }

    let failed = report.failed().count();
    writeln!(
        writer,
        "{} target(s), {} failed, {} file(s) copied in {}s",
        report.targets.len(),
        failed,
        report.files_copied(),
        (report.finished_at - report.started_at).num_seconds()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionJob, FileError};
    use crate::orchestrator::{FailureStage, TargetReport};
    use crate::targets::Target;
    use chrono::Local;
    use std::path::PathBuf;

    #[test]
    fn test_summary_lists_each_target() {
        let now = Local::now();
        let target = Target::new("10.0.0.1").with_label("Press 1");
        let report = RunReport {
            started_at: now,
            finished_at: now,
            targets: vec![
                TargetReport {
                    target: target.clone(),
                    outcome: TargetOutcome::Extracted {
                        job: ExtractionJob {
                            target,
                            destination: PathBuf::from("out"),
                            started_at: now,
                            files_total: 2,
                            files_copied: 1,
                            errors: vec![FileError {
                                file: PathBuf::from("b.jpg"),
                                cause: "denied".to_string(),
                            }],
                        },
                        connection_lost: true,
                        teardown_error: None,
                    },
                },
                TargetReport {
                    target: Target::new("10.0.0.2"),
                    outcome: TargetOutcome::Failed {
                        stage: FailureStage::Authenticate,
                        cause: "bad password".to_string(),
                    },
                },
            ],
        };

        let mut buffer = Vec::new();
        write_summary(&report, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("ok      Press 1 (10.0.0.1): 1/2 files"));
        assert!(text.contains("failed b.jpg: denied"));
        assert!(text.contains("connection lost"));
        assert!(text.contains("failed  10.0.0.2 at Authenticate: bad password"));
        assert!(text.contains("2 target(s), 1 failed, 1 file(s) copied"));
    }
}
