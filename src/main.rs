use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use msg_queue::{Cli, MessageQueue, QueueServer};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not usage errors
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing();

    // Startup failures are reported but do not change the exit status.
    if let Err(err) = serve(cli).await {
        eprintln!("Exception: {err:#}");
    }

    ExitCode::SUCCESS
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let config = cli.into_config()?;

    // One queue for the whole process, shared by every session
    let queue = Arc::new(MessageQueue::new());

    let server = QueueServer::bind(&config, queue).await?;
    tracing::info!("msg-queue listening on {}", server.local_addr()?);

    server.run_until_ctrl_c().await;
    Ok(())
}
