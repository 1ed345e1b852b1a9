use crate::commands::{block_on, load_config, open_database, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("migrate", async {
        let pool = open_database(&config).await?;
        pool.close().await;
        Ok(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
