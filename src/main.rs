// src/main.rs

use opsflow::results::TaskStatus;
use opsflow::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(Some(status)) if status != TaskStatus::Success => std::process::exit(2),
        Ok(_) => {}
        Err(err) => {
            eprintln!("opsflow error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<Option<TaskStatus>> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
