use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    ScenarioRequest, Strategy, WithdrawalEvent, WithdrawalKind, run_simulation,
};

/// Wire shape of a simulation request. Every field is optional at the serde
/// layer so that missing or incomplete payloads surface as the engine's own
/// descriptive errors rather than opaque deserialization failures.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SimulatePayload {
    initial_investment: Option<f64>,
    allocation_a: Option<f64>,
    returns_a: Option<Vec<f64>>,
    returns_b: Option<Vec<f64>>,
    withdrawals: Option<Vec<WithdrawalPayload>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WithdrawalPayload {
    year: Option<i64>,
    strategy: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Parser, Debug)]
#[command(
    name = "rebal",
    about = "Dual-strategy growth, withdrawal and rebalancing simulator"
)]
struct Cli {
    #[arg(long, help = "Starting capital in USD")]
    initial_investment: f64,
    #[arg(
        long,
        help = "Percentage of capital allocated to strategy A; B receives the remainder"
    )]
    allocation_a: f64,
    #[arg(
        long,
        value_delimiter = ',',
        required = true,
        help = "Per-year strategy A returns in percent, e.g. 15.1,2.1,16.0"
    )]
    returns_a: Vec<f64>,
    #[arg(
        long,
        value_delimiter = ',',
        required = true,
        help = "Per-year strategy B returns in percent; same length as --returns-a"
    )]
    returns_b: Vec<f64>,
    #[arg(
        long = "withdrawal",
        help = "Withdrawal event as YEAR:STRATEGY:TYPE:VALUE, e.g. 3:A:usd:5000 or 4:B:pct:10; repeatable, applied in order"
    )]
    withdrawals: Vec<String>,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/simulate", post(simulate_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("Rebalancing simulator HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

/// Parses the process arguments as a one-shot simulation and returns the
/// result JSON for stdout.
pub fn run_cli() -> Result<String, String> {
    let cli = Cli::parse();
    let request = build_request(cli)?;
    let result = run_simulation(&request)?;
    serde_json::to_string_pretty(&result).map_err(|e| format!("failed to encode result: {e}"))
}

async fn healthz_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(Json(payload): Json<SimulatePayload>) -> Response {
    let request = match request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match run_simulation(&request) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn request_from_json(json: &str) -> Result<ScenarioRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid JSON payload: {e}"))?;
    request_from_payload(payload)
}

fn request_from_payload(payload: SimulatePayload) -> Result<ScenarioRequest, String> {
    let initial_investment = payload
        .initial_investment
        .ok_or_else(|| "initial_investment is required".to_string())?;
    let allocation_a = payload
        .allocation_a
        .ok_or_else(|| "allocation_a is required".to_string())?;
    let returns_a = payload
        .returns_a
        .ok_or_else(|| "returns_a is required".to_string())?;
    let returns_b = payload
        .returns_b
        .ok_or_else(|| "returns_b is required".to_string())?;

    let withdrawals = payload
        .withdrawals
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, event)| event_from_payload(index, event))
        .collect::<Result<Vec<_>, String>>()?;

    Ok(ScenarioRequest {
        initial_investment,
        allocation_a,
        returns_a,
        returns_b,
        withdrawals,
    })
}

fn event_from_payload(index: usize, payload: &WithdrawalPayload) -> Result<WithdrawalEvent, String> {
    let label = index + 1;

    let year = payload
        .year
        .ok_or_else(|| format!("withdrawal {label}: year is required"))?;
    if !(1..=i64::from(u32::MAX)).contains(&year) {
        return Err(format!(
            "withdrawal {label}: year must be a positive integer; got {year}"
        ));
    }

    let strategy = match payload.strategy.as_deref() {
        Some("A") | Some("a") => Strategy::A,
        Some("B") | Some("b") => Strategy::B,
        Some(other) => {
            return Err(format!(
                "withdrawal {label}: unknown strategy {other:?}; expected \"A\" or \"B\""
            ));
        }
        None => return Err(format!("withdrawal {label}: strategy is required")),
    };

    let kind = match payload.kind.as_deref() {
        Some("usd") => WithdrawalKind::Usd,
        Some("pct") => WithdrawalKind::Pct,
        Some(other) => {
            return Err(format!(
                "withdrawal {label}: unknown type {other:?}; expected \"usd\" or \"pct\""
            ));
        }
        None => return Err(format!("withdrawal {label}: type is required")),
    };

    let value = payload
        .value
        .ok_or_else(|| format!("withdrawal {label}: value is required"))?;

    Ok(WithdrawalEvent {
        year: year as u32,
        strategy,
        kind,
        value,
    })
}

fn build_request(cli: Cli) -> Result<ScenarioRequest, String> {
    let withdrawals = cli
        .withdrawals
        .iter()
        .map(|spec| parse_withdrawal_spec(spec))
        .collect::<Result<Vec<_>, String>>()?;

    Ok(ScenarioRequest {
        initial_investment: cli.initial_investment,
        allocation_a: cli.allocation_a,
        returns_a: cli.returns_a,
        returns_b: cli.returns_b,
        withdrawals,
    })
}

fn parse_withdrawal_spec(spec: &str) -> Result<WithdrawalEvent, String> {
    let parts = spec.split(':').collect::<Vec<_>>();
    let [year, strategy, kind, value] = parts.as_slice() else {
        return Err(format!(
            "invalid withdrawal spec {spec:?}; expected YEAR:STRATEGY:TYPE:VALUE"
        ));
    };

    let year = year
        .parse::<u32>()
        .map_err(|_| format!("invalid withdrawal year in {spec:?}"))?;
    let strategy = match *strategy {
        "A" | "a" => Strategy::A,
        "B" | "b" => Strategy::B,
        other => return Err(format!("unknown strategy {other:?} in withdrawal spec {spec:?}")),
    };
    let kind = match *kind {
        "usd" => WithdrawalKind::Usd,
        "pct" => WithdrawalKind::Pct,
        other => return Err(format!("unknown type {other:?} in withdrawal spec {spec:?}")),
    };
    let value = value
        .parse::<f64>()
        .map_err(|_| format!("invalid withdrawal value in {spec:?}"))?;

    Ok(WithdrawalEvent {
        year,
        strategy,
        kind,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_golden_snapshot(path: &str, actual: &str) {
        let update = matches!(
            std::env::var("UPDATE_GOLDEN").as_deref(),
            Ok("1") | Ok("true") | Ok("TRUE")
        );
        let snapshot_path = Path::new(path);

        if update {
            if let Some(parent) = snapshot_path.parent() {
                fs::create_dir_all(parent).expect("failed to create snapshot directory");
            }
            fs::write(snapshot_path, actual).expect("failed to write golden snapshot");
            return;
        }

        let expected = fs::read_to_string(snapshot_path).unwrap_or_else(|_| {
            panic!("missing golden snapshot at {path}; run with UPDATE_GOLDEN=1 to generate")
        });
        assert_eq!(
            actual, expected,
            "snapshot mismatch for {path}; run with UPDATE_GOLDEN=1 to refresh if expected"
        );
    }

    #[test]
    fn request_from_json_parses_full_payload() {
        let json = r#"{
          "initial_investment": 10000,
          "allocation_a": 60,
          "returns_a": [15.1, 2.1, 16.0],
          "returns_b": [5.5, 5.4, 5.3],
          "withdrawals": [
            { "year": 2, "strategy": "A", "type": "usd", "value": 500 },
            { "year": 3, "strategy": "B", "type": "pct", "value": 10 }
          ]
        }"#;
        let request = request_from_json(json).expect("json should parse");

        assert_approx(request.initial_investment, 10_000.0);
        assert_approx(request.allocation_a, 60.0);
        assert_approx(request.allocation_b(), 40.0);
        assert_eq!(request.horizon(), 3);
        assert_eq!(request.withdrawals.len(), 2);
        assert_eq!(
            request.withdrawals[0],
            WithdrawalEvent {
                year: 2,
                strategy: Strategy::A,
                kind: WithdrawalKind::Usd,
                value: 500.0,
            }
        );
        assert_eq!(request.withdrawals[1].kind, WithdrawalKind::Pct);
    }

    #[test]
    fn request_from_json_defaults_withdrawals_to_empty() {
        let json = r#"{
          "initial_investment": 1000,
          "allocation_a": 50,
          "returns_a": [10],
          "returns_b": [0]
        }"#;
        let request = request_from_json(json).expect("json should parse");
        assert!(request.withdrawals.is_empty());
    }

    #[test]
    fn request_from_json_reports_missing_fields() {
        let err = request_from_json(r#"{ "allocation_a": 50 }"#).expect_err("must reject");
        assert!(err.contains("initial_investment is required"));

        let err = request_from_json(r#"{ "initial_investment": 1000 }"#).expect_err("must reject");
        assert!(err.contains("allocation_a is required"));
    }

    #[test]
    fn request_from_json_rejects_unknown_withdrawal_tags() {
        let json = r#"{
          "initial_investment": 1000,
          "allocation_a": 50,
          "returns_a": [10],
          "returns_b": [0],
          "withdrawals": [{ "year": 1, "strategy": "C", "type": "usd", "value": 5 }]
        }"#;
        let err = request_from_json(json).expect_err("must reject strategy");
        assert!(err.contains("unknown strategy \"C\""));

        let json = r#"{
          "initial_investment": 1000,
          "allocation_a": 50,
          "returns_a": [10],
          "returns_b": [0],
          "withdrawals": [{ "year": 1, "strategy": "A", "type": "eur", "value": 5 }]
        }"#;
        let err = request_from_json(json).expect_err("must reject type");
        assert!(err.contains("unknown type \"eur\""));
    }

    #[test]
    fn request_from_json_rejects_non_positive_withdrawal_year() {
        let json = r#"{
          "initial_investment": 1000,
          "allocation_a": 50,
          "returns_a": [10],
          "returns_b": [0],
          "withdrawals": [{ "year": 0, "strategy": "A", "type": "usd", "value": 5 }]
        }"#;
        let err = request_from_json(json).expect_err("must reject");
        assert!(err.contains("year must be a positive integer"));
    }

    #[test]
    fn request_from_json_reports_missing_withdrawal_fields() {
        let json = r#"{
          "initial_investment": 1000,
          "allocation_a": 50,
          "returns_a": [10],
          "returns_b": [0],
          "withdrawals": [{ "year": 1, "strategy": "A", "type": "usd" }]
        }"#;
        let err = request_from_json(json).expect_err("must reject");
        assert!(err.contains("withdrawal 1: value is required"));
    }

    #[test]
    fn parse_withdrawal_spec_accepts_both_event_kinds() {
        let usd = parse_withdrawal_spec("3:A:usd:5000").expect("valid spec");
        assert_eq!(usd.year, 3);
        assert_eq!(usd.strategy, Strategy::A);
        assert_eq!(usd.kind, WithdrawalKind::Usd);
        assert_approx(usd.value, 5_000.0);

        let pct = parse_withdrawal_spec("4:b:pct:10.5").expect("valid spec");
        assert_eq!(pct.strategy, Strategy::B);
        assert_eq!(pct.kind, WithdrawalKind::Pct);
        assert_approx(pct.value, 10.5);
    }

    #[test]
    fn parse_withdrawal_spec_rejects_malformed_input() {
        assert!(parse_withdrawal_spec("3:A:usd").is_err());
        assert!(parse_withdrawal_spec("x:A:usd:100").is_err());
        assert!(parse_withdrawal_spec("3:C:usd:100").is_err());
        assert!(parse_withdrawal_spec("3:A:eur:100").is_err());
        assert!(parse_withdrawal_spec("3:A:usd:lots").is_err());
    }

    #[test]
    fn build_request_carries_cli_fields_through() {
        let cli = Cli {
            initial_investment: 2_500.0,
            allocation_a: 70.0,
            returns_a: vec![10.0, -5.0],
            returns_b: vec![4.0, 4.0],
            withdrawals: vec!["2:A:usd:100".to_string(), "2:A:pct:50".to_string()],
        };

        let request = build_request(cli).expect("valid cli");
        assert_approx(request.initial_investment, 2_500.0);
        assert_eq!(request.horizon(), 2);
        assert_eq!(request.withdrawals.len(), 2);
        // Spec order is preserved; it is significant for stacked events.
        assert_eq!(request.withdrawals[0].kind, WithdrawalKind::Usd);
        assert_eq!(request.withdrawals[1].kind, WithdrawalKind::Pct);
    }

    #[test]
    fn simulation_result_serializes_with_wire_field_names() {
        let request = request_from_json(
            r#"{
              "initial_investment": 1000,
              "allocation_a": 50,
              "returns_a": [10],
              "returns_b": [0]
            }"#,
        )
        .expect("json should parse");
        let result = run_simulation(&request).expect("valid request");
        let json = serde_json::to_string(&result).expect("result should serialize");

        assert!(json.contains("\"full_a\""));
        assert!(json.contains("\"full_b\""));
        assert!(json.contains("\"no_rebalance\""));
        assert!(json.contains("\"annual_rebalance\""));
        assert!(json.contains("\"annual_rebalance_details\""));
        assert!(json.contains("\"pre_a_pct\""));
        assert!(json.contains("\"post_total\""));
    }

    #[test]
    fn error_payload_serializes_with_error_key() {
        let json = serde_json::to_string(&ErrorResponse {
            error: "allocation_a is required".to_string(),
        })
        .expect("error should serialize");
        assert_eq!(json, r#"{"error":"allocation_a is required"}"#);
    }

    #[test]
    fn golden_snapshot_full_allocation_json() {
        let request = request_from_json(
            r#"{
              "initial_investment": 1000,
              "allocation_a": 100,
              "returns_a": [100],
              "returns_b": [50]
            }"#,
        )
        .expect("json should parse");
        let result = run_simulation(&request).expect("valid request");
        let json = format!(
            "{}\n",
            serde_json::to_string(&result).expect("result should serialize")
        );

        assert_golden_snapshot("tests/golden/simulate_full_allocation.json", &json);
    }

    #[test]
    fn golden_snapshot_total_loss_then_rebalance_json() {
        let request = request_from_json(
            r#"{
              "initial_investment": 1000,
              "allocation_a": 75,
              "returns_a": [-100, 100],
              "returns_b": [0, 100],
              "withdrawals": [{ "year": 2, "strategy": "A", "type": "pct", "value": 50 }]
            }"#,
        )
        .expect("json should parse");
        let result = run_simulation(&request).expect("valid request");
        let json = format!(
            "{}\n",
            serde_json::to_string(&result).expect("result should serialize")
        );

        assert_golden_snapshot("tests/golden/simulate_total_loss_rebalance.json", &json);
    }
}
