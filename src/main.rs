use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::{StreamExt, stream};
use psicash::client::{SimulatedAdClient, SimulatedRewardClient};
use psicash::core::config;
use psicash::core::notifier::{ChannelNotifier, Notification};
use psicash::pipeline::ActionProcessor;
use psicash::script;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

#[derive(Parser)]
#[command(name = "psicash", about = "Runs PsiCash wallet actions through the result pipeline")]
struct Args {
    /// JSON-lines action script (reads stdin when omitted)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Delay between consecutive actions, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    interval_ms: u64,

    /// Starting balance of the simulated wallet
    #[arg(short, long)]
    balance: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Initialize file logger - writes to psicash.log in current directory
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();

    if let Ok(log_file) = File::create("psicash.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    log::info!("PsiCash starting up");

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let resolved = config::resolve(&config, args.balance);
    log::debug!("Resolved config: {:?}", resolved);

    let actions = match script::read_script(args.script.as_deref()) {
        Ok(actions) => actions,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("Loaded {} actions", actions.len());

    let Some(purchase_duration) = resolved.purchase_duration() else {
        eprintln!(
            "purchase_duration_secs out of range: {}",
            resolved.purchase_duration_secs
        );
        return ExitCode::FAILURE;
    };
    let latency = Duration::from_millis(resolved.latency_ms);
    let ledger = Arc::new(
        SimulatedRewardClient::new(resolved.starting_balance)
            .with_latency(latency)
            .with_purchase_duration(purchase_duration),
    );
    let ads = SimulatedAdClient::new(ledger.clone(), resolved.video_reward).with_latency(latency);
    let (notifier, mut notifications) = ChannelNotifier::new();
    let processor = ActionProcessor::new(ledger.clone(), Arc::new(ads), Arc::new(notifier))
        .with_video_event_buffer(resolved.video_event_buffer);

    let interval = Duration::from_millis(args.interval_ms);
    let paced = stream::iter(actions)
        .enumerate()
        .then(move |(index, action)| async move {
            if index > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            action
        });

    let mut exit = ExitCode::SUCCESS;
    let mut results = processor.process(paced);
    while let Some(item) = results.next().await {
        match item {
            Ok(result) => println!("{result}"),
            Err(e) => {
                log::error!("Pipeline stopped: {e}");
                eprintln!("error: {e}");
                exit = ExitCode::FAILURE;
            }
        }

        while let Ok(notification) = notifications.try_recv() {
            match notification {
                Notification::NewExpiringPurchase(purchase) => println!(
                    "  notify: new {} purchase {}, expires {}",
                    purchase.purchase.transaction_class,
                    purchase.purchase.id,
                    purchase
                        .expiry()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                ),
                Notification::NewReward(amount) => println!("  notify: earned {amount}"),
            }
        }
    }

    let wallet = ledger.server_balance();
    println!(
        "wallet: balance {}, {} purchases",
        wallet.balance,
        wallet.purchases.len()
    );
    log::info!("PsiCash shutting down");
    exit
}
