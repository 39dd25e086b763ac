use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use gateway_checkout::app::config::Config;
use gateway_checkout::models::{CardDetails, MethodDetails};
use gateway_checkout::services::{
    CheckoutOptions, HostBridge, InProcessSurface, PaymentServiceClient, SessionOutcome,
    SharedPaymentApi,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    Upi,
    Card,
}

#[derive(Parser)]
#[command(author, version, about = "Run one embedded checkout session against a payment service")]
struct Cli {
    /// Amount in minor units (10000 = 100.00)
    #[arg(long)]
    amount: u64,

    /// Currency code, defaults to the configured currency
    #[arg(long)]
    currency: Option<String>,

    /// Order note as key=value, may be repeated
    #[arg(long = "note", value_parser = parse_note)]
    notes: Vec<(String, String)>,

    #[arg(long)]
    receipt: Option<String>,

    #[arg(long, value_enum, default_value_t = Method::Upi)]
    method: Method,

    /// UPI address, required for --method upi
    #[arg(long)]
    vpa: Option<String>,

    /// Card number, required for --method card
    #[arg(long)]
    card_number: Option<String>,

    #[arg(long, default_value_t = 12)]
    expiry_month: u8,

    #[arg(long, default_value_t = 2030)]
    expiry_year: u16,

    #[arg(long, default_value = "123")]
    cvv: String,

    /// TOML config file. Without it, configuration comes from GATEWAY_* variables.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn method_details(&self) -> Result<MethodDetails> {
        let details = match self.method {
            Method::Upi => MethodDetails::Upi {
                vpa: self.vpa.clone().unwrap_or_default(),
            },
            Method::Card => MethodDetails::Card {
                card: CardDetails {
                    number: self.card_number.clone().unwrap_or_default(),
                    expiry_month: self.expiry_month,
                    expiry_year: self.expiry_year,
                    cvv: self.cvv.clone(),
                },
            },
        };

        if let Some(field) = details.missing_field() {
            bail!("{} is required for {} payments", field, details.method());
        }
        Ok(details)
    }
}

fn parse_note(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {:?}", raw)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            let config = Config::from_env();
            config.validate()?;
            config
        }
    };
    let details = cli.method_details()?;

    info!("Using payment service at {}", config.api_base_url);

    let api: SharedPaymentApi = Arc::new(PaymentServiceClient::new(&config)?);
    let surface = Arc::new(InProcessSurface::new(api.clone(), config.poll_policy(), Some(details)));
    let bridge = HostBridge::new(api, surface, &config)?;

    let mut options = CheckoutOptions::new(cli.amount);
    options.currency = cli.currency.clone();
    options.receipt = cli.receipt.clone();
    for (key, value) in &cli.notes {
        options = options.note(key.clone(), value.clone());
    }

    let handle = bridge.open(options).await?;
    let order = handle.order.clone();
    info!("Checkout for order {} opened at {}", order.id, handle.surface_url);

    let outcome = tokio::select! {
        outcome = handle.outcome() => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling checkout");
            bridge.cancel();
            None
        }
    };

    let (status, payment) = match outcome {
        Some(SessionOutcome::Succeeded(payment)) => ("succeeded", Some(payment)),
        Some(SessionOutcome::Failed(payment)) => ("failed", payment),
        None => bail!("checkout for order {} ended without an outcome", order.id),
    };

    let report = serde_json::json!({
        "status": status,
        "order": order,
        "payment": payment,
        "metrics": bridge.metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if status != "succeeded" {
        bail!("payment for order {} failed", order.id);
    }
    Ok(())
}
