use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use checkpoint_calc::cli::{parse_args, print_help, Args};
use checkpoint_calc::config::Config;
use checkpoint_calc::range::DATE_TIME_FORMAT;
use checkpoint_calc::scheduler::run_scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    if args.help {
        print_help();
        return Ok(());
    }

    // Initialize logging; windows go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("checkpoint_calc=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Checkpoint calculator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Anchor: {} ({})", config.anchor.format(DATE_TIME_FORMAT), config.tz);
    info!("  Period: {} {}", config.period_amount, config.period_unit);
    info!(
        "  Bounds: lead {} min, lag {} min",
        config.max_lead_minutes, config.max_lag_minutes
    );
    info!(
        "  Filters: {} weekday(s), {} drop range(s), {} limit(s), {} whitelist range(s)",
        config.drop_weekdays.len(),
        config.drop_ranges.len(),
        config.limit_ranges.len(),
        config.whitelist_ranges.len()
    );

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    if args.once {
        info!("Running single calculation (--once mode)");
        run_calculation(&config, config.effective_now(), &args);
        return Ok(());
    }

    if config.now.is_some() {
        warn!("CHECKPOINT_NOW is ignored by the minute scheduler");
    }

    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, stopping"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        shutdown.cancel();
    });

    run_scheduler(cancel_token, |now| {
        run_calculation(&config, now.with_timezone(&config.tz), &args);
    })
    .await;

    Ok(())
}

fn run_calculation(config: &Config, now: DateTime<Tz>, args: &Args) {
    let calc = config.calculator(now);

    if args.trace {
        for evaluation in calc.execute_traced() {
            if args.json {
                print_json(&evaluation);
            } else {
                println!("{}  {}", evaluation.window, evaluation.outcome);
            }
        }
        return;
    }

    for window in calc.execute() {
        if args.json {
            print_json(&window);
        } else {
            println!("{}", window);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}
