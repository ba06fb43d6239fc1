//! CLI command implementations.

use anyhow::Context;
use ferry_migrate::{
    ConsoleProgressReporter, Credential, EngineConfig, JobStatus, MigrationDirection,
    MigrationEngine, MigrationJob, MigrationOutcome, MigrationProgress, TransformOptions,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::MigrateArgs;

/// Exit code for a job that finished with recorded failures.
pub const EXIT_PARTIAL: i32 = 2;

/// Exit code for a job stopped with Ctrl-C.
pub const EXIT_CANCELLED: i32 = 130;

/// Build the job described by `args`.
pub fn build_job(args: &MigrateArgs) -> MigrationJob {
    let mut job = MigrationJob::new(args.kind).with_groups(args.groups.iter().cloned());

    if let Some(token) = &args.source_token {
        job = job.with_source(Credential::new(token.as_str()));
    }
    if let Some(token) = &args.target_token {
        job = job.with_target(Credential::new(token.as_str()));
    }
    if args.add_prefix.is_some() || args.remove_prefix.is_some() {
        let mut transform = TransformOptions::new();
        transform.add_prefix = args.add_prefix.clone();
        transform.remove_prefix = args.remove_prefix.clone();
        job = job.with_transform(transform);
    }
    if args.reverse {
        job = job.with_direction(MigrationDirection::TargetToSource);
    }
    job
}

/// Process exit code for a finished job.
pub fn exit_code(outcome: &MigrationOutcome) -> i32 {
    match outcome.status {
        JobStatus::Completed => 0,
        JobStatus::PartiallyFailed => EXIT_PARTIAL,
        JobStatus::Cancelled => EXIT_CANCELLED,
    }
}

/// Run a migration job.
pub async fn migrate(config: EngineConfig, args: MigrateArgs) -> anyhow::Result<i32> {
    let engine = MigrationEngine::new(config).context("failed to start migration engine")?;
    let job = build_job(&args);

    tracing::info!(
        job_id = %job.id,
        kind = %job.kind,
        groups = job.selected_group_ids.len(),
        "Submitting migration job"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current item");
            on_interrupt.cancel();
        }
    });

    let reporter = (!args.json && !args.no_progress).then(ConsoleProgressReporter::new);
    let progress = match &reporter {
        Some(reporter) => MigrationProgress::with_callback(reporter.callback()),
        None => MigrationProgress::new(),
    };

    let mut orchestrator = engine
        .orchestrator()
        .with_progress(Arc::new(progress))
        .with_cancellation(cancel);
    let result = orchestrator.run(&job).await;

    if let Some(reporter) = &reporter {
        reporter.finish("done");
    }
    let outcome = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        outcome.print_summary();
    }

    Ok(exit_code(&outcome))
}

/// Validate one credential and print the identity behind it.
pub async fn validate(
    config: EngineConfig,
    token: &str,
    force: bool,
    json: bool,
) -> anyhow::Result<i32> {
    let engine = MigrationEngine::new(config).context("failed to start migration engine")?;
    let credential = Credential::new(token);
    let validation = engine.validator().validate(&credential, force).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&validation)?);
    } else if validation.valid {
        let identity = validation.identity.as_ref();
        println!("Credential {} is valid", credential.fingerprint());
        if let Some(user) = identity.and_then(|i| i.display_name()) {
            println!("  User:    {user}");
        }
        if let Some(id) = identity.and_then(|i| i.user_id()) {
            println!("  User id: {id}");
        }
    } else {
        println!(
            "Credential {} is invalid: {}",
            credential.fingerprint(),
            validation.reason.as_deref().unwrap_or("unknown reason")
        );
    }

    Ok(if validation.valid { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn migrate_args(extra: &[&str]) -> MigrateArgs {
        #[derive(Parser)]
        struct Harness {
            #[command(flatten)]
            args: MigrateArgs,
        }

        let mut argv = vec!["ferry", "--kind", "tag", "--group", "1"];
        argv.extend_from_slice(extra);
        Harness::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_build_job_defaults() {
        let job = build_job(&migrate_args(&[]));
        assert!(job.transform.is_none());
        assert_eq!(job.direction, MigrationDirection::SourceToTarget);
        assert_eq!(job.selected_group_ids.len(), 1);
    }

    #[test]
    fn test_build_job_with_transform_and_reverse() {
        let job = build_job(&migrate_args(&[
            "--add-prefix",
            "A_",
            "--reverse",
            "--source-token",
            "s",
        ]));

        let transform = job.transform.unwrap();
        assert_eq!(transform.add_prefix.as_deref(), Some("A_"));
        assert!(transform.remove_prefix.is_none());
        assert_eq!(job.direction, MigrationDirection::TargetToSource);
        assert!(job.source_credential.is_some());
    }
}
