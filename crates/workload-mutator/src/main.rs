use std::backtrace::Backtrace;

use anyhow::Result;
use tracing::error;

use workload_mutator::{
    cli, config::Config, fatal_error, tracing::setup_tracing, MutatorServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let config = Config::from_args(&matches)?;

    setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color)?;

    // panics are caught per request, log them together with the place they
    // were raised at
    std::panic::set_hook(Box::new(|panic_info| {
        error!(
            panic = %panic_info,
            backtrace = %Backtrace::force_capture(),
            "unexpected panic"
        );
    }));

    let server = match MutatorServer::new_from_config(config).await {
        Ok(server) => server,
        Err(e) => fatal_error(e.to_string()),
    };
    if let Err(e) = server.run().await {
        fatal_error(e.to_string());
    }

    Ok(())
}
