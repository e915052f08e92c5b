use clap::Parser;
use log::*;
use miette::{IntoDiagnostic, Result};
use payment_saga::application::locks::PaymentLocks;
use payment_saga::application::reconciliation::WebhookReconciler;
use payment_saga::application::saga::PaymentSaga;
use payment_saga::application::service::PaymentService;
use payment_saga::config::{AppConfig, Secret};
use payment_saga::domain::ports::{EventPublisherArc, PaymentGatewayArc, PaymentRepositoryArc};
use payment_saga::infrastructure::breaker::CircuitBreaker;
use payment_saga::infrastructure::in_memory::{InMemoryPaymentRepository, LogEventPublisher};
use payment_saga::infrastructure::resilient::ResilientGateway;
use payment_saga::infrastructure::signature::WebhookVerifier;
use payment_saga::infrastructure::simulated::SimulatedProcessor;
use payment_saga::interfaces::csv::command_reader::CommandReader;
use payment_saga::interfaces::csv::payment_writer::PaymentWriter;
use payment_saga::interfaces::script::ScriptRunner;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payment script CSV file
    input: PathBuf,

    /// Have the simulated processor decline authorizations above this amount.
    #[arg(long)]
    decline_over: Option<i64>,

    /// Latency added to every simulated processor call, in milliseconds.
    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    /// Webhook signing secret. Overrides PAYSAGA_WEBHOOK_SECRET.
    #[arg(long)]
    webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env_or_default();
    if let Some(secret) = cli.webhook_secret {
        config.gateway.webhook_secret = Some(Secret::new(secret));
    }
    if config.gateway.webhook_secret.is_none() {
        info!("🔐️ Using an ephemeral webhook secret for this run");
        config.gateway.webhook_secret = Some(Secret::new(format!("whsec_{}", Uuid::new_v4().simple())));
    }

    let processor = SimulatedProcessor::new()
        .with_decline_over(cli.decline_over)
        .with_latency(Duration::from_millis(cli.latency_ms));
    let breaker = Arc::new(CircuitBreaker::new("processor", config.breaker.clone()));
    let gateway: PaymentGatewayArc = Arc::new(ResilientGateway::new(
        Arc::new(processor),
        breaker,
        &config.gateway,
    ));
    let repository: PaymentRepositoryArc = Arc::new(InMemoryPaymentRepository::new());
    let publisher: EventPublisherArc = Arc::new(LogEventPublisher);

    let saga = Arc::new(PaymentSaga::new(
        Arc::clone(&repository),
        Arc::clone(&gateway),
        publisher,
        config.saga.clone(),
    ));
    let locks = Arc::new(PaymentLocks::new());
    let service = Arc::new(PaymentService::new(
        Arc::clone(&repository),
        Arc::clone(&saga),
        Arc::clone(&locks),
        config.deadlines.clone(),
    ));
    let reconciler = Arc::new(WebhookReconciler::new(gateway, repository, locks));
    let signer = WebhookVerifier::new(
        config.gateway.webhook_secret.clone(),
        config.gateway.signature_tolerance,
    );
    let mut runner = ScriptRunner::new(service, reconciler, signer, CancellationToken::new());

    // Run the script
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command_result in reader.commands() {
        match command_result {
            Ok(command) => {
                if let Err(e) = runner.apply(command).await {
                    eprintln!("Error applying command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Let any compensating refunds settle before reporting
    saga.wait_for_compensations().await;

    let records = runner.records().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(records).into_diagnostic()?;

    Ok(())
}
