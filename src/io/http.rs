//! HTTP API for the aggregation engine
//!
//! Exposes ingest, carbon-footprint queries, reset, health, and a Prometheus
//! text endpoint. Uses hyper for the HTTP server with hand-rolled routing;
//! API responses carry a permissive CORS header for the dashboard.
//!
//! Routes:
//! - `POST /sensor-data` - ingest one reading
//! - `GET /carbon-footprint/minute` - per-minute summaries
//! - `GET /carbon-footprint/hourly` - per-hour summaries
//! - `DELETE /reset-data` - clear log and caches
//! - `GET /` - health/status
//! - `GET /metrics` - Prometheus exposition

use crate::domain::{BucketRow, Granularity, SensorPayload};
use crate::infra::metrics::{Metrics, MetricsSummary, REFRESH_BUCKET_BOUNDS, REFRESH_NUM_BUCKETS};
use crate::infra::EngineError;
use crate::services::CarbonEngine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Carbon-footprint query response body
#[derive(Debug, Serialize)]
struct QueryResponse {
    unit: &'static str,
    data: Vec<BucketRow>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build a JSON response with CORS headers
fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = match serde_json::to_string(body) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "response_serialization_failed");
            return Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::from(r#"{"error":"serialization failed"}"#)))
                .expect("static response should not fail");
        }
    };
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    json_response(status, &ErrorResponse { error: message })
}

/// Map an engine error to its HTTP status
fn status_for(err: &EngineError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Handle `POST /sensor-data`
fn handle_ingest(engine: &CarbonEngine, body: &[u8]) -> Response<Full<Bytes>> {
    let payload: SensorPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            engine.metrics().record_malformed();
            let err = EngineError::MalformedInput(e.to_string());
            return error_response(status_for(&err), err.to_string());
        }
    };

    match engine.ingest(&payload) {
        Ok(()) => json_response(StatusCode::OK, &StatusResponse { status: "sensor data saved" }),
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

/// Handle `GET /carbon-footprint/{minute,hourly}`
fn handle_query(engine: &CarbonEngine, granularity: Granularity) -> Response<Full<Bytes>> {
    let snapshot = engine.query(granularity);
    let data = snapshot
        .buckets
        .iter()
        .map(|summary| BucketRow::from_summary(summary, granularity))
        .collect();
    json_response(StatusCode::OK, &QueryResponse { unit: "mg CO2", data })
}

/// Handle `DELETE /reset-data`
fn handle_reset(engine: &CarbonEngine) -> Response<Full<Bytes>> {
    match engine.reset() {
        Ok(()) => json_response(StatusCode::OK, &StatusResponse { status: "all data cleared" }),
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

/// Write a counter or gauge in Prometheus text format with site label
fn write_metric(output: &mut String, name: &str, help: &str, typ: &str, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {typ}");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Format engine metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site: &str) -> String {
    let summary: MetricsSummary = metrics.report();
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "carbon_readings_ingested_total",
        "Readings accepted into the record log",
        "counter",
        site,
        summary.ingested_total,
    );
    write_metric(
        &mut output,
        "carbon_readings_rejected_total",
        "Readings rejected for implausible timestamps",
        "counter",
        site,
        summary.rejected_total,
    );
    write_metric(
        &mut output,
        "carbon_payloads_malformed_total",
        "Ingest payloads that failed validation",
        "counter",
        site,
        summary.malformed_total,
    );
    write_metric(
        &mut output,
        "carbon_queries_total",
        "Carbon-footprint queries served",
        "counter",
        site,
        summary.queries_total,
    );
    write_metric(
        &mut output,
        "carbon_refresh_total",
        "Completed aggregate refresh cycles",
        "counter",
        site,
        summary.refresh_total,
    );
    write_metric(
        &mut output,
        "carbon_refresh_failed_total",
        "Failed aggregate refresh cycles",
        "counter",
        site,
        summary.refresh_failed_total,
    );
    write_metric(
        &mut output,
        "carbon_refresh_skipped_total",
        "Refresh cycles skipped while another ran",
        "counter",
        site,
        summary.refresh_skipped_total,
    );
    write_metric(
        &mut output,
        "carbon_resets_total",
        "Bulk data resets",
        "counter",
        site,
        summary.resets_total,
    );

    let _ = writeln!(output, "# HELP carbon_refresh_duration_us Refresh duration in microseconds");
    let _ = writeln!(output, "# TYPE carbon_refresh_duration_us histogram");
    let mut cumulative = 0u64;
    for (i, &bound) in REFRESH_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += summary.refresh_buckets[i];
        let _ = writeln!(
            output,
            "carbon_refresh_duration_us_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}"
        );
    }
    cumulative += summary.refresh_buckets[REFRESH_NUM_BUCKETS - 1];
    let _ = writeln!(
        output,
        "carbon_refresh_duration_us_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}"
    );
    let _ = writeln!(output, "carbon_refresh_duration_us_count{{site=\"{site}\"}} {cumulative}");

    write_metric(
        &mut output,
        "carbon_refresh_last_us",
        "Duration of the most recent refresh",
        "gauge",
        site,
        summary.refresh_last_us,
    );
    write_metric(
        &mut output,
        "carbon_refresh_max_us",
        "Maximum refresh duration",
        "gauge",
        site,
        summary.refresh_max_us,
    );

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    engine: Arc<CarbonEngine>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => json_response(
            StatusCode::OK,
            &serde_json::json!({
                "status": "ok",
                "service": "carbon-gateway",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        ),
        (&Method::POST, "/sensor-data") => match req.into_body().collect().await {
            Ok(collected) => handle_ingest(&engine, &collected.to_bytes()),
            Err(e) => error_response(StatusCode::BAD_REQUEST, format!("body read failed: {}", e)),
        },
        (&Method::GET, "/carbon-footprint/minute") => handle_query(&engine, Granularity::Minute),
        (&Method::GET, "/carbon-footprint/hourly") => handle_query(&engine, Granularity::Hour),
        (&Method::DELETE, "/reset-data") => handle_reset(&engine),
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(format_prometheus_metrics(engine.metrics(), &site_id))))
            .expect("static response should not fail"),
        // CORS preflight for the dashboard
        (&Method::OPTIONS, _) => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail"),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail"),
    };

    Ok(response)
}

/// Start the HTTP API server
pub async fn start_http_server(
    bind_address: String,
    port: u16,
    engine: Arc<CarbonEngine>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(addr = %addr, site = %site_id, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let engine = engine.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let engine = engine.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, engine, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Config;
    use tempfile::tempdir;

    fn test_engine(dir: &tempfile::TempDir) -> Arc<CarbonEngine> {
        let config = Config::default()
            .with_log_file(dir.path().join("sensor.csv").to_str().unwrap());
        Arc::new(CarbonEngine::new(&config, Arc::new(Metrics::new())))
    }

    fn body_string(response: Response<Full<Bytes>>) -> String {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let collected = rt.block_on(response.into_body().collect()).unwrap();
        String::from_utf8(collected.to_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_ingest_saves_and_confirms() {
        let dir = tempdir().unwrap();
        let engine = test_engine(&dir);

        let body = serde_json::json!({
            "time": 1_700_000_000i64,
            "current_A": 0.3,
            "temp_C": 32.0,
            "pressure": 50.0,
            "co2_shred": 0.001,
            "co2_heating": 0.002,
            "co2_mould": 0.0005,
            "co2_total": 0.0035,
        });
        let response = handle_ingest(&engine, body.to_string().as_bytes());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).contains("sensor data saved"));
        assert_eq!(engine.log().replay().unwrap().len(), 1);
    }

    #[test]
    fn test_ingest_rejects_malformed_payload() {
        let dir = tempdir().unwrap();
        let engine = test_engine(&dir);

        let response = handle_ingest(&engine, b"{\"time\": \"not a number\"}");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).contains("malformed sensor payload"));
        assert!(engine.log().replay().unwrap().is_empty());
        assert_eq!(engine.metrics().report().malformed_total, 1);
    }

    #[test]
    fn test_ingest_rejects_implausible_timestamp() {
        let dir = tempdir().unwrap();
        let engine = test_engine(&dir);

        let body = serde_json::json!({
            "time": 500,
            "current_A": 0.3,
            "temp_C": 32.0,
            "pressure": 50.0,
            "co2_shred": 0.001,
            "co2_heating": 0.0,
            "co2_mould": 0.0,
        });
        let response = handle_ingest(&engine, body.to_string().as_bytes());
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).contains("minimum plausible epoch"));
    }

    #[test]
    fn test_query_reports_mg_unit_and_labels() {
        let dir = tempdir().unwrap();
        let engine = test_engine(&dir);

        let payload = SensorPayload {
            time: 1_700_000_000,
            current_a: 0.3,
            temp_c: 32.0,
            pressure: 50.0,
            co2_shred: 0.001,
            co2_heating: 0.002,
            co2_mould: 0.0005,
            co2_total: None,
        };
        engine.ingest(&payload).unwrap();
        engine.refresh().unwrap();

        let response = handle_query(&engine, Granularity::Minute);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["unit"], "mg CO2");
        assert_eq!(parsed["data"][0]["bucket_label"], "2023-11-14 22:13");
        assert_eq!(parsed["data"][0]["total_carbon_mg"], 3500.0);
    }

    #[test]
    fn test_reset_confirms() {
        let dir = tempdir().unwrap();
        let engine = test_engine(&dir);
        let response = handle_reset(&engine);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).contains("all data cleared"));
    }

    #[test]
    fn test_prometheus_format() {
        let dir = tempdir().unwrap();
        let engine = test_engine(&dir);
        engine.metrics().record_ingested();
        engine.metrics().record_refresh(150);

        let output = format_prometheus_metrics(engine.metrics(), "lab");
        assert!(output.contains("carbon_readings_ingested_total{site=\"lab\"} 1"));
        assert!(output.contains("carbon_refresh_duration_us_bucket{site=\"lab\",le=\"200\"} 1"));
        assert!(output.contains("carbon_refresh_total{site=\"lab\"} 1"));
    }
}
