use anyhow::{bail, Result};
use chrono::Utc;
use reqwest::{Response, StatusCode};
use secp256k1::SecretKey;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::api::*;

#[derive(Debug)]
pub struct Client {
    url: String,
    client: reqwest::Client,
    last_nonce: AtomicU64,
}
impl Client {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self {
            url,
            client,
            last_nonce: AtomicU64::new(0),
        }
    }
    /// Microseconds since the epoch, so nonces keep growing across restarts,
    /// but always above the previous one of this client.
    fn next_nonce(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let mut last = self.last_nonce.load(Ordering::Relaxed);
        loop {
            let next = now.max(last.saturating_add(1));
            match self.last_nonce.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
    async fn post(
        &self,
        path: &'static str,
        request: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn post_signed<T: Serialize>(
        &self,
        path: &'static str,
        data: T,
        secret_key: &SecretKey,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let request = PostRequest::sign(data, self.next_nonce(), secret_key)?;
        self.post(path, request, expected_code).await
    }
    async fn get(&self, path: &'static str, expected_code: StatusCode) -> Result<Response> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        bail_if_err(response, expected_code).await
    }
    pub async fn add_admin(&self, admin: UserPubKey, secret_key: &SecretKey) -> Result<()> {
        self.post_signed(
            "/add_admin",
            AdminRequest { admin },
            secret_key,
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn remove_admin(&self, admin: UserPubKey, secret_key: &SecretKey) -> Result<()> {
        self.post_signed(
            "/remove_admin",
            AdminRequest { admin },
            secret_key,
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn create_prediction(
        &self,
        request: NewPredictionRequest,
        secret_key: &SecretKey,
    ) -> Result<PredictionId> {
        let response = self
            .post_signed(
                "/create_prediction",
                request,
                secret_key,
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json::<PredictionId>().await?)
    }
    pub async fn place_bet(&self, request: PlaceBetRequest, secret_key: &SecretKey) -> Result<()> {
        self.post_signed("/place_bet", request, secret_key, StatusCode::OK)
            .await?;
        Ok(())
    }
    pub async fn end_prediction(
        &self,
        request: EndPredictionRequest,
        secret_key: &SecretKey,
    ) -> Result<Settlement> {
        let response = self
            .post_signed("/end_prediction", request, secret_key, StatusCode::OK)
            .await?;
        Ok(response.json::<Settlement>().await?)
    }
    pub async fn retry_payout(
        &self,
        request: RetryPayoutRequest,
        secret_key: &SecretKey,
    ) -> Result<PayoutReceipt> {
        let response = self
            .post_signed("/retry_payout", request, secret_key, StatusCode::OK)
            .await?;
        Ok(response.json::<PayoutReceipt>().await?)
    }
    pub async fn get_prediction(&self, prediction: PredictionId) -> Result<Prediction> {
        let response = self
            .post(
                "/get_prediction",
                PredictionRequest { prediction },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<Prediction>().await?)
    }
    pub async fn get_predictions(&self) -> Result<Vec<Prediction>> {
        let response = self.get("/get_predictions", StatusCode::OK).await?;
        Ok(response.json::<Vec<Prediction>>().await?)
    }
    pub async fn get_options(&self, prediction: PredictionId) -> Result<Vec<String>> {
        let response = self
            .post(
                "/get_options",
                PredictionRequest { prediction },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<Vec<String>>().await?)
    }
    pub async fn get_total_stake(&self, request: TotalStakeRequest) -> Result<Amount> {
        let response = self
            .post("/get_total_stake", request, StatusCode::OK)
            .await?;
        Ok(response.json::<Amount>().await?)
    }
    pub async fn get_participant_stake(&self, request: ParticipantStakeRequest) -> Result<Amount> {
        let response = self
            .post("/get_participant_stake", request, StatusCode::OK)
            .await?;
        Ok(response.json::<Amount>().await?)
    }
    pub async fn get_pools(&self, prediction: PredictionId) -> Result<Vec<OptionPool>> {
        let response = self
            .post("/get_pools", PredictionRequest { prediction }, StatusCode::OK)
            .await?;
        Ok(response.json::<Vec<OptionPool>>().await?)
    }
    pub async fn get_prediction_overview(
        &self,
        prediction: PredictionId,
    ) -> Result<PredictionOverviewResponse> {
        let response = self
            .post(
                "/get_prediction_overview",
                PredictionRequest { prediction },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<PredictionOverviewResponse>().await?)
    }
    pub async fn get_payouts(&self, prediction: PredictionId) -> Result<Vec<PayoutReceipt>> {
        let response = self
            .post(
                "/get_payouts",
                PredictionRequest { prediction },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<Vec<PayoutReceipt>>().await?)
    }
    pub async fn get_role(&self, user: UserPubKey) -> Result<RoleResponse> {
        let response = self.post("/get_role", user, StatusCode::OK).await?;
        Ok(response.json::<RoleResponse>().await?)
    }
}

async fn bail_if_err(response: Response, expected_code: StatusCode) -> Result<Response> {
    if response.status() != expected_code {
        bail!("{}: {}", response.status(), response.text().await?)
    } else {
        Ok(response)
    }
}
