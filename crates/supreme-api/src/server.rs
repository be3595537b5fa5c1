//! HTTP server implementation using axum.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use supreme_core::cadence::{decode_ufix64, to_plain};
use supreme_core::CadenceValue;
use supreme_ledger::{FlowAddress, SubmitOptions, TxKind};
use supreme_oracle::OracleHealth;
use supreme_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::multiplier::{duration_blocks, duration_secs, multiplier, round2};
use crate::state::ApiState;

pub const GET_POSITIONS_CDC: &str = include_str!("../cadence/get_positions.cdc");
pub const GET_FLOW_BALANCE_CDC: &str = include_str!("../cadence/get_flow_balance.cdc");
pub const FUND_ACCOUNT_CDC: &str = include_str!("../cadence/fund_account.cdc");

/// Create the axum router.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/price", get(price))
        .route("/api/house-balance", get(house_balance))
        .route("/api/positions/{address}", get(positions))
        .route("/api/sign-bet", post(sign_bet))
        .route("/api/sign", post(co_sign))
        .route("/api/fund-account", post(fund_account))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn run_server(state: ApiState, shutdown: CancellationToken) -> ApiResult<()> {
    let port = state.config.port;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("API server stopped");
    Ok(())
}

fn parse_address(raw: &str) -> ApiResult<FlowAddress> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid address: {raw}")))
}

// ============================================================================
// Oracle
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    oracle: OracleHealth,
    admin_address: String,
    pool_size: usize,
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let oracle = state.oracle.health();
    Json(HealthResponse {
        status: if oracle.is_stale { "degraded" } else { "healthy" },
        oracle,
        admin_address: state.submitter.admin_address().to_string(),
        pool_size: state.submitter.pool_size(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    price: Option<Decimal>,
    stale: bool,
    last_push_ms: u64,
}

async fn price(State(state): State<ApiState>) -> Json<PriceResponse> {
    let health = state.oracle.health();
    Json(PriceResponse {
        price: health.price,
        stale: health.is_stale,
        last_push_ms: health.last_push_age_ms,
    })
}

// ============================================================================
// Ledger reads
// ============================================================================

async fn house_balance(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let balance = state.house.house_balance().await?;
    Ok(Json(json!({ "balance": balance })))
}

async fn positions(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Value>> {
    let address = parse_address(&address)?;
    let result = state
        .submitter
        .query(GET_POSITIONS_CDC, vec![CadenceValue::address(&address.to_string())])
        .await?;
    let positions = match to_plain(&result) {
        Value::Null => Value::Array(Vec::new()),
        other => other,
    };
    Ok(Json(json!({ "positions": positions })))
}

// ============================================================================
// Bet signing
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignBetRequest {
    pub target_price: Option<Decimal>,
    pub above_target: Option<bool>,
    pub bet_size: Option<Decimal>,
    pub row_dist: Option<f64>,
    pub col_dist: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignBetResponse {
    pub entry_price: Decimal,
    pub multiplier: f64,
    pub duration_blocks: u64,
    pub expiry_timestamp: u64,
    pub above_target: bool,
}

async fn sign_bet(
    State(state): State<ApiState>,
    Json(req): Json<SignBetRequest>,
) -> ApiResult<Json<SignBetResponse>> {
    let (Some(target_price), Some(bet_size), Some(row_dist), Some(col_dist)) =
        (req.target_price, req.bet_size, req.row_dist, req.col_dist)
    else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };
    if bet_size <= Decimal::ZERO {
        return Err(ApiError::BadRequest("betSize must be positive".to_string()));
    }
    if target_price <= Decimal::ZERO {
        return Err(ApiError::BadRequest("targetPrice must be positive".to_string()));
    }
    if !row_dist.is_finite() || !col_dist.is_finite() {
        return Err(ApiError::BadRequest("rowDist and colDist must be finite".to_string()));
    }

    let entry_price = state
        .oracle
        .latest_price()
        .ok_or_else(|| ApiError::NotReady("Oracle not ready, no price available".to_string()))?
        .inner();

    let now_secs = state.clock.now_ms() / 1000;
    let response = SignBetResponse {
        entry_price,
        multiplier: round2(multiplier(row_dist, col_dist)),
        duration_blocks: duration_blocks(col_dist),
        expiry_timestamp: now_secs + duration_secs(col_dist).round() as u64,
        above_target: req.above_target.unwrap_or(target_price > entry_price),
    };
    debug!(
        %entry_price,
        %target_price,
        multiplier = response.multiplier,
        duration_blocks = response.duration_blocks,
        "Bet parameters computed"
    );
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CoSignRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoSignResponse {
    pub addr: String,
    pub key_id: u32,
    pub signature: String,
}

async fn co_sign(
    State(state): State<ApiState>,
    Json(req): Json<CoSignRequest>,
) -> ApiResult<Json<CoSignResponse>> {
    let message = req
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing message".to_string()))?;
    let bytes = hex::decode(message.trim_start_matches("0x"))
        .map_err(|_| ApiError::BadRequest("message must be hex".to_string()))?;

    let (address, key_id, signature) = state.submitter.co_sign(&bytes)?;
    Ok(Json(CoSignResponse {
        addr: address.to_string(),
        key_id,
        signature: hex::encode(signature),
    }))
}

// ============================================================================
// Account funding
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FundAccountRequest {
    pub address: Option<String>,
}

async fn fund_account(
    State(state): State<ApiState>,
    Json(req): Json<FundAccountRequest>,
) -> ApiResult<Json<Value>> {
    let raw = req
        .address
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing address".to_string()))?;
    let address = parse_address(&raw)?;
    let key = address.to_string();

    // Claimed before any await so concurrent requests fund at most once.
    if !state.funded.insert(key.clone()) {
        return Ok(Json(json!({ "status": "already_funded" })));
    }

    match fund(&state, address).await {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            state.funded.remove(&key);
            Err(e)
        }
    }
}

async fn fund(state: &ApiState, address: FlowAddress) -> ApiResult<Value> {
    let recipient = CadenceValue::address(&address.to_string());

    match state
        .submitter
        .query(GET_FLOW_BALANCE_CDC, vec![recipient.clone()])
        .await
        .map_err(ApiError::from)
        .and_then(|v| Ok(decode_ufix64(&v)?))
    {
        Ok(balance) if balance >= state.config.fund_skip_balance => {
            debug!(%address, %balance, "Account already holds enough FLOW");
            return Ok(json!({ "status": "already_funded", "balance": balance }));
        }
        Ok(_) => {}
        // Account may not exist yet; fund anyway.
        Err(e) => debug!(%address, error = %e, "Balance lookup failed"),
    }

    let amount = state.config.fund_amount;
    info!(%address, %amount, "Funding account");
    let tx = state
        .submitter
        .submit(
            FUND_ACCOUNT_CDC,
            vec![recipient, CadenceValue::ufix64(amount)?],
            SubmitOptions::new(TxKind::AccountFunding).waiting(),
        )
        .await?;
    info!(%address, tx_id = %tx.short_id(), "Account funded");
    Ok(json!({ "status": "funded", "txId": tx.id }))
}

// ============================================================================
// Metrics
// ============================================================================

async fn metrics() -> ApiResult<impl IntoResponse> {
    let text = Metrics::gather_text()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use supreme_core::{ManualClock, Price, TradeTick};
    use supreme_keeper::{BalanceGuard, HouseConfig};
    use supreme_ledger::{
        ContractAddresses, KeyPool, KeyRing, MockLedger, Submitter, SubmitterConfig,
    };
    use supreme_oracle::{OracleHandle, SharedOracleState};
    use tower::ServiceExt;

    const ADMIN: &str = "0x01cf0e2f2f715450";
    const T0: u64 = 1_700_000_000_000;

    struct Fixture {
        router: Router,
        ledger: Arc<MockLedger>,
        oracle: SharedOracleState,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MockLedger::new(2));
        let ring = KeyRing::from_hex_list(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        let mut config = SubmitterConfig::new(ADMIN.parse().unwrap());
        config.seal_poll_interval = Duration::from_millis(10);
        let submitter = Arc::new(Submitter::new(
            ledger.clone(),
            Arc::new(KeyPool::new(2)),
            Arc::new(ring),
            [("PredictionGame", ADMIN), ("FlowToken", "0x7e60df042a9c0868")]
                .into_iter()
                .collect::<ContractAddresses>(),
            config,
        ));
        let clock = Arc::new(ManualClock::new(T0));
        let oracle = SharedOracleState::new();
        let house = Arc::new(BalanceGuard::new(submitter.clone(), HouseConfig::default()));
        let state = ApiState::new(
            submitter,
            OracleHandle::new(oracle.clone(), clock.clone(), 30_000),
            house,
            clock,
            ApiConfig::default(),
        );
        Fixture {
            router: create_router(state),
            ledger,
            oracle,
        }
    }

    async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn seed_price(oracle: &SharedOracleState, price: Decimal) {
        oracle.record_tick(
            TradeTick {
                price: Price::new(price),
                trade_time_ms: T0,
            },
            T0,
            4000,
        );
    }

    #[tokio::test]
    async fn test_health_degraded_before_first_push() {
        let f = fixture();
        let (status, body) = call(&f.router, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["adminAddress"], ADMIN);
        assert_eq!(body["poolSize"], 2);
        assert_eq!(body["oracle"]["isStale"], true);
    }

    #[tokio::test]
    async fn test_price_reports_latest_tick() {
        let f = fixture();
        seed_price(&f.oracle, dec!(64000.5));
        let (status, body) = call(&f.router, get_req("/api/price")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], "64000.5");
        assert_eq!(body["stale"], true);
    }

    #[tokio::test]
    async fn test_sign_bet_without_price_is_503() {
        let f = fixture();
        let (status, body) = call(
            &f.router,
            post_req(
                "/api/sign-bet",
                json!({"targetPrice": 64100, "betSize": 10, "rowDist": 1, "colDist": 1}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("not ready"));
    }

    #[tokio::test]
    async fn test_sign_bet_computes_parameters() {
        let f = fixture();
        seed_price(&f.oracle, dec!(64000));
        let (status, body) = call(
            &f.router,
            post_req(
                "/api/sign-bet",
                json!({"targetPrice": 64100, "betSize": 10, "rowDist": 1, "colDist": 1}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entryPrice"], "64000");
        assert_eq!(body["multiplier"], 2.24);
        assert_eq!(body["durationBlocks"], 5);
        assert_eq!(body["expiryTimestamp"], T0 / 1000 + 5);
        assert_eq!(body["aboveTarget"], true);
    }

    #[tokio::test]
    async fn test_sign_bet_validation() {
        let f = fixture();
        seed_price(&f.oracle, dec!(64000));
        let (status, _) = call(
            &f.router,
            post_req("/api/sign-bet", json!({"targetPrice": 64100})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &f.router,
            post_req(
                "/api/sign-bet",
                json!({"targetPrice": 64100, "betSize": 0, "rowDist": 1, "colDist": 1}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "betSize must be positive");
    }

    #[tokio::test]
    async fn test_co_sign_returns_admin_signature() {
        let f = fixture();
        let (status, body) = call(&f.router, post_req("/api/sign", json!({"message": "deadbeef"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["addr"], ADMIN);
        assert_eq!(body["keyId"], 0);
        assert_eq!(body["signature"].as_str().unwrap().len(), 128);

        let (status, _) = call(&f.router, post_req("/api/sign", json!({"message": "xyz"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&f.router, post_req("/api/sign", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fund_account_once_per_process() {
        let f = fixture();
        let req = || post_req("/api/fund-account", json!({"address": "0xf8d6e0586b0a20c7"}));

        let (status, body) = call(&f.router, req()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "funded");
        assert!(body["txId"].is_string());

        let sent = f.ledger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.script.contains("import FlowToken from 0x7e60df042a9c0868"));
        assert_eq!(
            MockLedger::decoded_arguments(&sent[0]),
            vec![
                json!({"type": "Address", "value": "0xf8d6e0586b0a20c7"}),
                json!({"type": "UFix64", "value": "100.00000000"}),
            ]
        );

        let (status, body) = call(&f.router, req()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "already_funded");
        assert_eq!(f.ledger.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_fund_account_skips_rich_account() {
        let f = fixture();
        f.ledger.set_script_result(
            "getAccount(address).balance",
            json!({"type": "UFix64", "value": "50.00000000"}),
        );
        let (status, body) = call(
            &f.router,
            post_req("/api/fund-account", json!({"address": "f8d6e0586b0a20c7"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "already_funded");
        assert_eq!(f.ledger.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_fund_account_failure_allows_retry() {
        let f = fixture();
        f.ledger
            .push_send_error(supreme_ledger::LedgerError::Http("boom".to_string()));
        let req = || post_req("/api/fund-account", json!({"address": "0xf8d6e0586b0a20c7"}));

        let (status, body) = call(&f.router, req()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");

        let (status, body) = call(&f.router, req()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "funded");
    }

    #[tokio::test]
    async fn test_positions_and_house_balance() {
        let f = fixture();
        f.ledger.set_script_result(
            "listUserPositions",
            json!({"type": "Array", "value": [{
                "type": "Struct",
                "value": {
                    "id": "A.01cf0e2f2f715450.PredictionGame.Position",
                    "fields": [
                        {"name": "id", "value": {"type": "UInt64", "value": "3"}},
                        {"name": "settled", "value": {"type": "Bool", "value": false}}
                    ]
                }
            }]}),
        );
        f.ledger.set_script_result(
            "getHouseBalance",
            json!({"type": "UFix64", "value": "12345.50000000"}),
        );

        let (status, body) = call(&f.router, get_req("/api/positions/0xf8d6e0586b0a20c7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["positions"], json!([{"id": "3", "settled": false}]));

        let (status, _) = call(&f.router, get_req("/api/positions/not-an-address")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&f.router, get_req("/api/house-balance")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], "12345.50000000");
    }

    #[tokio::test]
    async fn test_metrics_exposed() {
        let f = fixture();
        let resp = f.router.clone().oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
