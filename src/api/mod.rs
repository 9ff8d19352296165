//! HTTP API exposing operator reads, sends and allocation runs

use crate::allocation::{AllocationEngine, AllocationOutcome};
use crate::config::ApiConfig;
use crate::error::{OperatorError, OperatorResult};
use crate::operator::{DeployedStake, Operator, SponsorshipsAndEarnings, UndelegationEntry};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::types::{Address, H256, U256};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub operator: Operator,
    pub engine: AllocationEngine,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/operator", get(get_operator))
        .route("/operator/valuewithoutearnings", get(value_without_earnings))
        .route("/operator/stakedinto/:address", get(staked_into))
        .route("/operator/deployedstake", get(deployed_stake))
        .route(
            "/operator/sponsorshipsandearnings",
            get(sponsorships_and_earnings),
        )
        .route("/operator/undelegationqueue", get(undelegation_queue))
        .route("/operator/stake/:sponsorship/:amount", post(stake))
        .route(
            "/operator/reducestaketo/:sponsorship/:amount",
            post(reduce_stake_to),
        )
        .route("/operator/withdrawearnings", post(withdraw_earnings))
        .route(
            "/operator/withdrawearningsandcompound",
            post(withdraw_and_compound),
        )
        .route("/operator/stakeprorata", post(stake_pro_rata))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> OperatorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| OperatorError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| OperatorError::Internal(e.to_string()))
}

/// `OperatorError` rendered as an HTTP response
pub struct ApiError(OperatorError);

impl From<OperatorError> for ApiError {
    fn from(e: OperatorError) -> Self {
        Self(e)
    }
}

fn status_for(error: &OperatorError) -> StatusCode {
    match error {
        OperatorError::Encoding { .. } => StatusCode::BAD_REQUEST,
        OperatorError::Allocation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OperatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        OperatorError::Remote(_)
        | OperatorError::Broadcast(_)
        | OperatorError::GasEstimation(_)
        | OperatorError::Decoding { .. } => StatusCode::BAD_GATEWAY,
        OperatorError::PartialSubmission { source, .. } => status_for(source),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
            submitted: self.0.submitted(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|_| ApiError(OperatorError::encoding("address", format!("invalid address {}", raw))))
}

fn parse_amount(raw: &str) -> Result<U256, ApiError> {
    U256::from_dec_str(raw)
        .map_err(|_| ApiError(OperatorError::encoding("amount", format!("invalid amount {}", raw))))
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_operator(State(state): State<AppState>) -> impl IntoResponse {
    let operator = &state.operator;
    Json(OperatorResponse {
        contract: operator.address(),
        owner: operator.owner(),
        signer: operator.signer_address(),
        next_nonce: operator.transactions().next_nonce().await,
    })
}

async fn value_without_earnings(State(state): State<AppState>) -> ApiResult<ValueResponse> {
    let value = state.operator.value_without_earnings().await?;
    Ok(Json(ValueResponse { value }))
}

async fn staked_into(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<ValueResponse> {
    let sponsorship = parse_address(&address)?;
    let value = state.operator.staked_into(sponsorship).await?;
    Ok(Json(ValueResponse { value }))
}

async fn deployed_stake(State(state): State<AppState>) -> ApiResult<DeployedStake> {
    Ok(Json(state.operator.deployed_stake().await?))
}

async fn sponsorships_and_earnings(
    State(state): State<AppState>,
) -> ApiResult<SponsorshipsAndEarnings> {
    Ok(Json(state.operator.sponsorships_and_earnings().await?))
}

async fn undelegation_queue(State(state): State<AppState>) -> ApiResult<Vec<UndelegationEntry>> {
    Ok(Json(state.operator.undelegation_queue().await?))
}

async fn stake(
    State(state): State<AppState>,
    Path((sponsorship, amount)): Path<(String, String)>,
) -> ApiResult<TxResponse> {
    let sponsorship = parse_address(&sponsorship)?;
    let amount = parse_amount(&amount)?;
    let tx_hash = state.operator.stake(sponsorship, amount).await?;
    Ok(Json(TxResponse { tx_hash }))
}

async fn reduce_stake_to(
    State(state): State<AppState>,
    Path((sponsorship, amount)): Path<(String, String)>,
) -> ApiResult<TxResponse> {
    let sponsorship = parse_address(&sponsorship)?;
    let amount = parse_amount(&amount)?;
    let tx_hash = state.operator.reduce_stake_to(sponsorship, amount).await?;
    Ok(Json(TxResponse { tx_hash }))
}

/// Withdraw from every sponsorship that currently has earnings
async fn withdraw_earnings(State(state): State<AppState>) -> ApiResult<TxResponse> {
    let listing = state.operator.sponsorships_and_earnings().await?;
    let earning: Vec<Address> = listing
        .iter()
        .filter(|(_, earnings)| !earnings.is_zero())
        .map(|(sponsorship, _)| sponsorship)
        .collect();
    if earning.is_empty() {
        return Err(OperatorError::Allocation("no sponsorship has earnings".into()).into());
    }

    let tx_hash = state.operator.withdraw_earnings(&earning).await?;
    Ok(Json(TxResponse { tx_hash }))
}

async fn withdraw_and_compound(State(state): State<AppState>) -> ApiResult<AllocationOutcome> {
    Ok(Json(state.engine.withdraw_and_compound().await?))
}

async fn stake_pro_rata(State(state): State<AppState>) -> ApiResult<AllocationOutcome> {
    Ok(Json(state.engine.stake_pro_rata().await?))
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct OperatorResponse {
    contract: Address,
    owner: Address,
    signer: Address,
    next_nonce: u64,
}

#[derive(Serialize)]
struct ValueResponse {
    value: U256,
}

#[derive(Serialize)]
struct TxResponse {
    tx_hash: H256,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    submitted: Vec<H256>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::calls;
    use crate::operator::tests::{operator_on, script_stakes};
    use crate::testing::TestChain;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ethers::abi::Token;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app_on(chain: Arc<TestChain>) -> Router {
        let operator = operator_on(chain).await;
        let engine = AllocationEngine::new(operator.clone(), 5);
        router(AppState { operator, engine })
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_on(TestChain::new(0)).await;
        let (status, body) = send(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_value_read() {
        let chain = TestChain::new(0);
        chain.respond(calls::VALUE_WITHOUT_EARNINGS, |_| {
            Ok(vec![Token::Uint(U256::from(255))])
        });
        let app = app_on(chain).await;

        let (status, body) = send(app, "GET", "/operator/valuewithoutearnings").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], "0xff");
    }

    #[tokio::test]
    async fn test_stake_route() {
        let chain = TestChain::new(4);
        let app = app_on(chain.clone()).await;
        let sponsorship = format!("{:?}", Address::repeat_byte(0x42));

        let (status, body) = send(
            app,
            "POST",
            &format!("/operator/stake/{}/1000", sponsorship),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["tx_hash"],
            format!("{:?}", chain.broadcasts()[0].hash)
        );
        assert_eq!(chain.nonces(), vec![4]);
    }

    #[tokio::test]
    async fn test_bad_path_params_are_rejected() {
        let chain = TestChain::new(0);
        let app = app_on(chain.clone()).await;

        let (status, body) = send(app.clone(), "POST", "/operator/stake/0xnope/1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["retryable"], false);

        let sponsorship = format!("{:?}", Address::repeat_byte(1));
        let (status, _) = send(
            app,
            "POST",
            &format!("/operator/reducestaketo/{}/-5", sponsorship),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(chain.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_revert_maps_to_bad_gateway() {
        let app = app_on(TestChain::new(0)).await;
        let (status, body) = send(app, "GET", "/operator/undelegationqueue").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("reverted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_submission_lists_hashes() {
        let chain = TestChain::new(0);
        chain.fail_broadcast(1);
        chain.respond(calls::VALUE_WITHOUT_EARNINGS, |_| {
            Ok(vec![Token::Uint(U256::from(1100))])
        });
        script_stakes(
            &chain,
            &[(Address::repeat_byte(1), 300, 0), (Address::repeat_byte(2), 700, 0)],
        );
        let app = app_on(chain.clone()).await;

        let (status, body) = send(app, "POST", "/operator/stakeprorata").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["retryable"], true);
        assert_eq!(
            body["submitted"],
            serde_json::json!([format!("{:?}", chain.broadcasts()[0].hash)])
        );
    }
}
