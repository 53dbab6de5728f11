use gradekeeper::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use gradekeeper::cli::{Command, GradekeeperCli};

    #[test]
    fn batch_command_honors_worker_flag() {
        let cli = GradekeeperCli::parse_from([
            "gradekeeper",
            "batch",
            "--jobs",
            "12",
            "-w",
            "3",
            "--fail-every",
            "4",
        ]);
        match cli.command() {
            Command::Batch {
                jobs,
                workers,
                fail_every,
                progress,
            } => {
                assert_eq!(*jobs, 12);
                assert_eq!(*workers, 3);
                assert_eq!(*fail_every, Some(4));
                assert!(!progress);
            }
            other => panic!("expected batch command, got {other:?}"),
        }
    }

    #[test]
    fn audit_command_accepts_global_config() {
        let cli = GradekeeperCli::parse_from([
            "gradekeeper",
            "audit",
            "--operation",
            "BATCH_JOB",
            "--failures",
            "--config",
            "gradekeeper.toml",
        ]);
        match cli.command() {
            Command::Audit {
                operation,
                failures,
                limit,
                ..
            } => {
                assert_eq!(operation.as_deref(), Some("BATCH_JOB"));
                assert!(*failures);
                assert_eq!(*limit, 50);
            }
            other => panic!("expected audit command, got {other:?}"),
        }
    }
}
