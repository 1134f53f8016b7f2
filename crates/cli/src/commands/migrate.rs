use crate::commands::{db_context, CommandResult, ErrorClass};
use opsboard_db::{connect, migrations};

pub fn run() -> CommandResult {
    let context = match db_context("migrate") {
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
        let applied = migrations::applied_count(&pool)
            .await
            .map_err(|error| (ErrorClass::Migration, error.to_string()))?;

        pool.close().await;
        Ok::<i64, (ErrorClass, String)>(applied)
    });

    match result {
        Ok(applied) => CommandResult::success(
            "migrate",
            format!("database schema is current ({applied} migrations applied)"),
        ),
        Err((class, message)) => CommandResult::failure("migrate", class, message),
    }
}
