//! Sensor simulator - pushes synthetic readings at the ingest endpoint
//!
//! Stands in for the serial capture script during local testing. Generates
//! plausible current/temperature/pressure values and derives the CO2
//! components with the same demo coefficients the firmware uses.
//!
//! Usage:
//!   cargo run --bin sim -- --url http://localhost:8080 --count 10

use clap::Parser;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sim")]
#[command(about = "Push synthetic sensor readings at a carbon-gateway")]
struct Args {
    /// Base URL of the gateway
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Number of readings to push (0 = run until interrupted)
    #[arg(long, default_value = "0")]
    count: u64,

    /// Delay between readings in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,
}

/// Cheap xorshift PRNG; statistical quality is irrelevant here
struct Rng(u64);

impl Rng {
    fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as u64 | 1)
            .unwrap_or(0x9e37_79b9);
        Self(seed)
    }

    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let endpoint = format!("{}/sensor-data", args.url.trim_end_matches('/'));
    let client = reqwest::Client::new();
    let mut rng = Rng::new();

    info!(endpoint = %endpoint, count = %args.count, "sim_started");

    let mut sent = 0u64;
    loop {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
        let current = rng.range(0.1, 0.6);
        let temp = rng.range(31.0, 33.0);
        let pressure = rng.range(0.0, 65.0).floor();

        // Demo carbon coefficients, matching the firmware's simulation mode
        let co2_shred = pressure * 4e-9;
        let co2_heating = temp * 3.3e-5;
        let co2_mould = current * 1e-6;

        let payload = json!({
            "time": now,
            "current_A": current,
            "temp_C": temp,
            "pressure": pressure,
            "co2_shred": co2_shred,
            "co2_heating": co2_heating,
            "co2_mould": co2_mould,
            "co2_total": co2_shred + co2_heating + co2_mould,
        });

        match client.post(&endpoint).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(time = %now, "reading_pushed");
            }
            Ok(response) => {
                error!(status = %response.status(), "reading_rejected");
            }
            Err(e) => {
                error!(error = %e, "push_failed");
            }
        }

        sent += 1;
        if args.count > 0 && sent >= args.count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    info!(sent = %sent, "sim_finished");
    Ok(())
}
