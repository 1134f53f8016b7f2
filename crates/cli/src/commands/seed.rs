use crate::commands::{db_context, CommandResult, ErrorClass};
use opsboard_db::{connect, migrations, seed_demo_incidents, seed_reference_data, verify_seed};

pub fn run(include_demo: bool) -> CommandResult {
    let context = match db_context("seed") {
        Ok(context) => context,
        Err(result) => return result,
    };

    let result = context.runtime.block_on(async {
        let pool = connect(&context.config.database)
            .await
            .map_err(|error| (ErrorClass::DbConnectivity, error.to_string()))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| (ErrorClass::Migration, error.to_string()))?;

        seed_reference_data(&pool)
            .await
            .map_err(|error| (ErrorClass::SeedExecution, error.to_string()))?;
        if include_demo {
            seed_demo_incidents(&pool)
                .await
                .map_err(|error| (ErrorClass::SeedExecution, error.to_string()))?;
        }

        let report = verify_seed(&pool)
            .await
            .map_err(|error| (ErrorClass::SeedVerification, error.to_string()))?;

        let run_result = if report.reference_data_complete() {
            Ok(report)
        } else {
            Err((
                ErrorClass::SeedVerification,
                "reference tables are incomplete after seeding".to_string(),
            ))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(report) => CommandResult::success(
            "seed",
            format!(
                "seeded {} environments, {} segments, {} incident types, {} criticalities ({} incidents on file)",
                report.environments,
                report.segments,
                report.incident_types,
                report.criticalities,
                report.incidents
            ),
        ),
        Err((class, message)) => CommandResult::failure("seed", class, message),
    }
}
