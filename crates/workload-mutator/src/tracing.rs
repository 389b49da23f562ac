use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_tracing(log_level: &str, log_fmt: &str, log_no_color: bool) -> Result<()> {
    // some of our dependencies generate trace events too, but we don't care about them ->
    // let's filter them
    let filter_layer = EnvFilter::builder()
        .parse(log_level)
        .map_err(|e| anyhow!("invalid log level {log_level}: {e}"))?
        .add_directive(directive("h2=off")?)
        .add_directive(directive("hyper=off")?)
        .add_directive(directive("rustls=off")?);

    match log_fmt {
        "json" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().json())
            .try_init()?,
        "text" => {
            let fmt_layer = fmt::layer().with_ansi(!log_no_color);

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init()?
        }
        _ => return Err(anyhow!("Unknown log message format")),
    };
    crate::mark_trace_system_initialized();

    Ok(())
}

fn directive(value: &str) -> Result<tracing_subscriber::filter::Directive> {
    value
        .parse()
        .map_err(|e| anyhow!("invalid log directive {value}: {e}"))
}
