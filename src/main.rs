use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paygate::application::PaymentGateway;
use paygate::config::AppConfig;
use paygate::dispatch::RequestContext;
use paygate::domain::ports::{PaymentStore, PaymentStoreRef};
use paygate::infrastructure::in_memory::InMemoryPaymentStore;
use paygate::interfaces::csv::order_reader::{OrderReader, OrderRow};
use paygate::interfaces::csv::payment_writer::PaymentWriter;
use paygate::metrics::encode_text;
use prometheus::Registry;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input orders CSV file (order_id, amount, ttl_ms)
    input: PathBuf,

    /// YAML configuration file, overridden by PAYGATE_* environment variables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print collected metrics to stderr after the run
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var("PAYGATE_LOG")
        .from_env()
        .into_diagnostic()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).into_diagnostic()?;

    let store = Arc::new(InMemoryPaymentStore::new());
    let registry = Registry::new();
    let gateway = PaymentGateway::build(&config, Arc::clone(&store) as PaymentStoreRef, &registry)
        .into_diagnostic()?;

    // Submit orders
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OrderReader::new(file);
    for row in reader.orders() {
        match row {
            Ok(order) => submit(&gateway, order).await,
            Err(e) => {
                eprintln!("Error reading order: {}", e);
            }
        }
    }

    gateway.shutdown().await;

    // Output final state
    let payments = store.all_payments().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(&payments).into_diagnostic()?;

    if cli.metrics {
        eprint!("{}", encode_text(&registry).into_diagnostic()?);
    }

    Ok(())
}

async fn submit(gateway: &PaymentGateway, order: OrderRow) {
    let order_id = order.order_id.unwrap_or_else(Uuid::new_v4);
    let payment_id = Uuid::new_v4();
    let ttl = ChronoDuration::from_std(order.ttl()).unwrap_or(ChronoDuration::MAX);
    let deadline = Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

    let result = RequestContext::new_request()
        .scope(
            gateway
                .payer()
                .process_payment(order_id, order.amount, payment_id, deadline),
        )
        .await;
    if let Err(e) = result {
        eprintln!("Error submitting order {}: {}", order_id, e);
    }
}
