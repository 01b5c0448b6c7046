use crate::access::AdminList;
use crate::api::*;
use crate::clock::{Clock, SystemClock};
use crate::db::SQLite;
use crate::error::map_ledger_err;
use crate::funding_source::{FundingSource, TestFundingSource};
use crate::ledger::Ledger;
use crate::settings::{Args, Settings};
use anyhow::{bail, Result};
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

mod access;
mod api;
#[cfg(test)]
mod client;
mod clock;
mod db;
mod error;
mod funding_source;
mod ledger;
mod payout;
mod settings;

#[derive(Clone)]
struct AppState {
    ledger: Arc<RwLock<Ledger>>,
    admins: Arc<AdminList>,
}

fn verify<T: Serialize>(request: &PostRequest<T>) -> Result<UserPubKey, (StatusCode, String)> {
    request
        .verify()
        .map_err(|e| (StatusCode::UNAUTHORIZED, map_any_err(e)))
}

#[debug_handler]
async fn add_admin(
    State(state): State<AppState>,
    Json(request): Json<PostRequest<AdminRequest>>,
) -> Result<(), (StatusCode, String)> {
    let caller = verify(&request)?;
    let ledger = state.ledger.write().await;
    ledger
        .use_nonce(&request.access)
        .await
        .map_err(map_ledger_err)?;
    state
        .admins
        .add_admin(&caller, request.data.admin)
        .map_err(map_ledger_err)?;
    Ok(())
}
async fn remove_admin(
    State(state): State<AppState>,
    Json(request): Json<PostRequest<AdminRequest>>,
) -> Result<(), (StatusCode, String)> {
    let caller = verify(&request)?;
    let ledger = state.ledger.write().await;
    ledger
        .use_nonce(&request.access)
        .await
        .map_err(map_ledger_err)?;
    state
        .admins
        .remove_admin(&caller, &request.data.admin)
        .map_err(map_ledger_err)?;
    Ok(())
}
#[debug_handler]
async fn create_prediction(
    State(state): State<AppState>,
    Json(request): Json<PostRequest<NewPredictionRequest>>,
) -> Result<(StatusCode, Json<PredictionId>), (StatusCode, String)> {
    let caller = verify(&request)?;
    let ledger = state.ledger.write().await;
    ledger
        .use_nonce(&request.access)
        .await
        .map_err(map_ledger_err)?;
    let prediction = request.data;
    let id = ledger
        .create_prediction(
            &caller,
            prediction.title.clone(),
            prediction.description,
            prediction.options,
            prediction.deadline,
        )
        .await
        .map_err(map_ledger_err)?;
    info!("Created Prediction {}: {}", id, prediction.title);
    Ok((StatusCode::CREATED, Json(id)))
}
async fn place_bet(
    State(state): State<AppState>,
    Json(request): Json<PostRequest<PlaceBetRequest>>,
) -> Result<(), (StatusCode, String)> {
    let caller = verify(&request)?;
    let ledger = state.ledger.write().await;
    ledger
        .use_nonce(&request.access)
        .await
        .map_err(map_ledger_err)?;
    let request = request.data;
    ledger
        .place_bet(&caller, request.prediction, &request.option, request.amount)
        .await
        .map_err(map_ledger_err)?;
    Ok(())
}
async fn end_prediction(
    State(state): State<AppState>,
    Json(request): Json<PostRequest<EndPredictionRequest>>,
) -> Result<Json<Settlement>, (StatusCode, String)> {
    let caller = verify(&request)?;
    let ledger = state.ledger.write().await;
    ledger
        .use_nonce(&request.access)
        .await
        .map_err(map_ledger_err)?;
    let request = request.data;
    let settlement = ledger
        .end_prediction(&caller, request.prediction, &request.winning_option)
        .await
        .map_err(map_ledger_err)?;
    info!(
        "Ended prediction {} with '{}', paid out {}",
        settlement.prediction,
        settlement.winning_option,
        settlement.paid_out()
    );
    Ok(Json(settlement))
}
async fn retry_payout(
    State(state): State<AppState>,
    Json(request): Json<PostRequest<RetryPayoutRequest>>,
) -> Result<Json<PayoutReceipt>, (StatusCode, String)> {
    let caller = verify(&request)?;
    let ledger = state.ledger.write().await;
    ledger
        .use_nonce(&request.access)
        .await
        .map_err(map_ledger_err)?;
    let request = request.data;
    let receipt = ledger
        .retry_payout(&caller, request.prediction, &request.participant)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(receipt))
}

async fn get_prediction(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Prediction>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let prediction = ledger
        .get_prediction(request.prediction)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(prediction))
}
async fn get_predictions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Prediction>>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let predictions = ledger.get_predictions().await.map_err(map_ledger_err)?;
    Ok(Json(predictions))
}
async fn get_options(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let options = ledger
        .get_options(request.prediction)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(options))
}
async fn get_total_stake(
    State(state): State<AppState>,
    Json(request): Json<TotalStakeRequest>,
) -> Result<Json<Amount>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let total = ledger
        .get_total_stake(request.prediction, &request.option)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(total))
}
async fn get_participant_stake(
    State(state): State<AppState>,
    Json(request): Json<ParticipantStakeRequest>,
) -> Result<Json<Amount>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let stake = ledger
        .get_participant_stake(request.prediction, &request.option, &request.participant)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(stake))
}
async fn get_pools(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Vec<OptionPool>>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let pools = ledger
        .get_pools(request.prediction)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(pools))
}
async fn get_prediction_overview(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionOverviewResponse>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let overview = ledger
        .get_overview(request.prediction)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(overview))
}
async fn get_payouts(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Vec<PayoutReceipt>>, (StatusCode, String)> {
    let ledger = state.ledger.read().await;
    let payouts = ledger
        .get_payouts(request.prediction)
        .await
        .map_err(map_ledger_err)?;
    Ok(Json(payouts))
}
async fn get_role(
    State(state): State<AppState>,
    Json(user): Json<UserPubKey>,
) -> Json<RoleResponse> {
    Json(RoleResponse {
        user,
        role: state.admins.role(&user),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load(&Args::parse())?;
    Builder::default()
        .parse_filters(&settings.log)
        .write_style(WriteStyle::Always)
        .init();
    if !settings.test {
        bail!("Only the in-memory test funding source is available, start with --test");
    }
    warn!("Running with the in-memory test funding source, balances are lost on restart");
    let (_port, handle) = run_server(
        Some(settings.port),
        settings.owner,
        settings.admins,
        settings.db,
        Arc::new(TestFundingSource::default()),
        Arc::new(SystemClock),
    )
    .await?;
    handle.await?;
    Ok(())
}

async fn run_server(
    port: Option<u16>,
    owner: UserPubKey,
    admins: Vec<UserPubKey>,
    db_conn: Option<String>,
    funding: Arc<dyn FundingSource + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<(u16, JoinHandle<()>)> {
    let admins = Arc::new(AdminList::new(owner, admins));
    let ledger = Ledger::new(
        Arc::new(SQLite::new(db_conn).await?),
        funding,
        admins.clone(),
        clock,
    );
    let state = AppState {
        ledger: Arc::new(RwLock::new(ledger)),
        admins,
    };
    let app = Router::new()
        .route("/add_admin", post(add_admin))
        .route("/remove_admin", post(remove_admin))
        .route("/create_prediction", post(create_prediction))
        .route("/place_bet", post(place_bet))
        .route("/end_prediction", post(end_prediction))
        .route("/retry_payout", post(retry_payout))
        .route("/get_prediction", post(get_prediction))
        .route("/get_predictions", get(get_predictions))
        .route("/get_options", post(get_options))
        .route("/get_total_stake", post(get_total_stake))
        .route("/get_participant_stake", post(get_participant_stake))
        .route("/get_pools", post(get_pools))
        .route("/get_prediction_overview", post(get_prediction_overview))
        .route("/get_payouts", post(get_payouts))
        .route("/get_role", post(get_role))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port.unwrap_or(0)));
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    debug!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
