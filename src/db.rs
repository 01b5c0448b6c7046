use crate::api::*;
use crate::ledger::NewPrediction;
use crate::payout::Payout;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{query, Executor, Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

#[async_trait]
pub trait DB {
    /// Stores the prediction and its options together and returns the next sequential id.
    async fn add_prediction(&self, prediction: NewPrediction) -> Result<PredictionId>;
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>>;
    async fn get_predictions(&self) -> Result<Vec<Prediction>>;
    /// Flips an open prediction to resolved and records a pending receipt per payout,
    /// all in one transaction. Returns `false` if the prediction wasn't open anymore.
    async fn resolve_prediction(
        &self,
        prediction: PredictionId,
        winning_option: &str,
        payouts: &[Payout],
    ) -> Result<bool>;
    /// Adds to the option pool and the participant's stake in one transaction.
    async fn add_stake(
        &self,
        prediction: PredictionId,
        option: &str,
        user: &UserPubKey,
        amount: Amount,
    ) -> Result<()>;
    async fn get_total_stake(&self, prediction: PredictionId, option: &str) -> Result<Amount>;
    async fn get_participant_stake(
        &self,
        prediction: PredictionId,
        option: &str,
        user: &UserPubKey,
    ) -> Result<Amount>;
    async fn get_option_stakes(
        &self,
        prediction: PredictionId,
        option: &str,
    ) -> Result<Vec<(UserPubKey, Amount)>>;
    async fn get_pools(&self, prediction: PredictionId) -> Result<HashMap<String, Amount>>;
    async fn get_stakes_total(&self, prediction: PredictionId) -> Result<Amount>;
    async fn set_payout_outcome(
        &self,
        prediction: PredictionId,
        user: &UserPubKey,
        outcome: &TransferOutcome,
    ) -> Result<()>;
    async fn get_payout(
        &self,
        prediction: PredictionId,
        user: &UserPubKey,
    ) -> Result<Option<PayoutReceipt>>;
    async fn get_payouts(&self, prediction: PredictionId) -> Result<Vec<PayoutReceipt>>;
    /// Stores `nonce` as the latest one of `user` if it is greater than the stored one.
    /// Returns `false` if it wasn't, which means the request is a replay.
    async fn accept_nonce(&self, user: &UserPubKey, nonce: u64) -> Result<bool>;
}
pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    pub async fn new(db_conn: Option<String>) -> Result<Self> {
        let db_conn = db_conn.unwrap_or("sqlite::memory:".to_string());
        // A single connection that never expires keeps an in-memory database alive.
        let connection = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&db_conn)
            .await
            .with_context(|| format!("couldn't open database {}", db_conn))?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS predictions (\
            id INTEGER PRIMARY KEY,\
            title NOT NULL,\
            description NOT NULL,\
            deadline INTEGER NOT NULL,\
            state NOT NULL,\
            winning_option\
            )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS options (\
            prediction INTEGER NOT NULL,\
            position INTEGER NOT NULL,\
            label NOT NULL,\
            PRIMARY KEY (prediction,label)\
            )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS pools (\
            prediction INTEGER NOT NULL,\
            option NOT NULL,\
            total INTEGER NOT NULL,\
            PRIMARY KEY (prediction,option)\
            )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS stakes (\
            prediction INTEGER NOT NULL,\
            option NOT NULL,\
            user NOT NULL,\
            amount INTEGER NOT NULL,\
            PRIMARY KEY (prediction,option,user)\
            )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS payouts (\
            prediction INTEGER NOT NULL,\
            user NOT NULL,\
            amount INTEGER NOT NULL,\
            outcome NOT NULL,\
            reason,\
            PRIMARY KEY (prediction,user)\
            )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS nonces (\
            user PRIMARY KEY,\
            nonce INTEGER NOT NULL\
            )",
            )
            .await?;
        Ok(Self { connection })
    }
    async fn get_options(&self, prediction: PredictionId) -> Result<Vec<String>> {
        let rows = self
            .connection
            .fetch_all(
                query("SELECT label FROM options WHERE prediction = ? ORDER BY position")
                    .bind(prediction),
            )
            .await
            .with_context(|| format!("couldn't get options for prediction {}", prediction))?;
        Ok(rows.iter().map(|row| row.get("label")).collect())
    }
    async fn prediction_from_row(&self, row: SqliteRow) -> Result<Prediction> {
        let id: PredictionId = row.get("id");
        let deadline: i64 = row.get("deadline");
        let state = match row.get::<String, _>("state").as_str() {
            "Open" => PredictionState::Open,
            "Resolved" => PredictionState::Resolved(
                row.get::<Option<String>, _>("winning_option")
                    .with_context(|| format!("prediction {} has no winning option", id))?,
            ),
            e => bail!("Couldn't deserialize to PredictionState: {}", e),
        };
        Ok(Prediction {
            id,
            title: row.get("title"),
            description: row.get("description"),
            options: self.get_options(id).await?,
            deadline: Utc
                .timestamp_opt(deadline, 0)
                .single()
                .with_context(|| format!("invalid deadline {}", deadline))?,
            state,
        })
    }
}
fn to_db(amount: Amount) -> Result<i64> {
    i64::try_from(amount).with_context(|| format!("amount {} exceeds the storage range", amount))
}
fn from_db(amount: i64) -> Result<Amount> {
    Amount::try_from(amount).with_context(|| format!("negative amount {} in storage", amount))
}
fn user_from_db(user: &str) -> Result<UserPubKey> {
    UserPubKey::from_str(user).with_context(|| format!("invalid public key {} in storage", user))
}
#[async_trait]
impl DB for SQLite {
    async fn add_prediction(&self, prediction: NewPrediction) -> Result<PredictionId> {
        let mut tx = self.connection.begin().await?;
        let id: PredictionId = query("SELECT COALESCE(MAX(id) + 1, 0) AS id FROM predictions")
            .fetch_one(&mut *tx)
            .await?
            .get("id");
        query(
            "INSERT INTO predictions (\
            id,\
            title,\
            description,\
            deadline,\
            state)\
            VALUES (?,?,?,?,'Open')",
        )
        .bind(id)
        .bind(prediction.title)
        .bind(prediction.description)
        .bind(prediction.deadline.timestamp())
        .execute(&mut *tx)
        .await?;
        for (position, label) in prediction.options.into_iter().enumerate() {
            let stmt = query(
                "INSERT INTO options (\
            prediction,\
            position,\
            label)\
            VALUES (?,?,?)",
            );
            stmt.bind(id)
                .bind(position as i64)
                .bind(label)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(id)
    }
    async fn get_prediction(&self, prediction: PredictionId) -> Result<Option<Prediction>> {
        let row = self
            .connection
            .fetch_optional(query("SELECT * FROM predictions WHERE id = ?").bind(prediction))
            .await
            .with_context(|| format!("couldn't get prediction {}", prediction))?;
        match row {
            Some(row) => Ok(Some(self.prediction_from_row(row).await?)),
            None => Ok(None),
        }
    }
    async fn get_predictions(&self) -> Result<Vec<Prediction>> {
        let rows = self
            .connection
            .fetch_all(query("SELECT * FROM predictions ORDER BY id"))
            .await?;
        let mut predictions = Vec::with_capacity(rows.len());
        for row in rows {
            predictions.push(self.prediction_from_row(row).await?);
        }
        Ok(predictions)
    }
    async fn resolve_prediction(
        &self,
        prediction: PredictionId,
        winning_option: &str,
        payouts: &[Payout],
    ) -> Result<bool> {
        let mut tx = self.connection.begin().await?;
        let updated = query(
            "UPDATE predictions \
                SET state = 'Resolved', winning_option = ? \
                WHERE id = ? AND state = 'Open'",
        )
        .bind(winning_option)
        .bind(prediction)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated != 1 {
            tx.rollback().await?;
            return Ok(false);
        }
        for payout in payouts {
            let stmt = query(
                "INSERT INTO payouts (\
            prediction,\
            user,\
            amount,\
            outcome) \
            VALUES (?,?,?,?)",
            );
            stmt.bind(prediction)
                .bind(payout.participant.to_string())
                .bind(to_db(payout.amount)?)
                .bind(TransferOutcome::Pending.kind())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }
    async fn add_stake(
        &self,
        prediction: PredictionId,
        option: &str,
        user: &UserPubKey,
        amount: Amount,
    ) -> Result<()> {
        let amount = to_db(amount)?;
        let mut tx = self.connection.begin().await?;
        query(
            "INSERT INTO pools (prediction, option, total) VALUES (?,?,?) \
            ON CONFLICT (prediction, option) DO UPDATE SET total = total + excluded.total",
        )
        .bind(prediction)
        .bind(option)
        .bind(amount)
        .execute(&mut *tx)
        .await?;
        query(
            "INSERT INTO stakes (prediction, option, user, amount) VALUES (?,?,?,?) \
            ON CONFLICT (prediction, option, user) DO UPDATE SET amount = amount + excluded.amount",
        )
        .bind(prediction)
        .bind(option)
        .bind(user.to_string())
        .bind(amount)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
    async fn get_total_stake(&self, prediction: PredictionId, option: &str) -> Result<Amount> {
        let total: Option<i64> = self
            .connection
            .fetch_optional(
                query("SELECT total FROM pools WHERE prediction = ? AND option = ?")
                    .bind(prediction)
                    .bind(option),
            )
            .await?
            .map(|row| row.get("total"));
        from_db(total.unwrap_or_default())
    }
    async fn get_participant_stake(
        &self,
        prediction: PredictionId,
        option: &str,
        user: &UserPubKey,
    ) -> Result<Amount> {
        let amount: Option<i64> = self
            .connection
            .fetch_optional(
                query("SELECT amount FROM stakes WHERE prediction = ? AND option = ? AND user = ?")
                    .bind(prediction)
                    .bind(option)
                    .bind(user.to_string()),
            )
            .await?
            .map(|row| row.get("amount"));
        from_db(amount.unwrap_or_default())
    }
    async fn get_option_stakes(
        &self,
        prediction: PredictionId,
        option: &str,
    ) -> Result<Vec<(UserPubKey, Amount)>> {
        let rows = self
            .connection
            .fetch_all(
                query("SELECT user, amount FROM stakes WHERE prediction = ? AND option = ?")
                    .bind(prediction)
                    .bind(option),
            )
            .await?;
        let mut stakes = Vec::with_capacity(rows.len());
        for row in rows {
            stakes.push((user_from_db(row.get("user"))?, from_db(row.get("amount"))?));
        }
        Ok(stakes)
    }
    async fn get_pools(&self, prediction: PredictionId) -> Result<HashMap<String, Amount>> {
        let rows = self
            .connection
            .fetch_all(query("SELECT option, total FROM pools WHERE prediction = ?").bind(prediction))
            .await?;
        let mut pools = HashMap::new();
        for row in rows {
            pools.insert(row.get("option"), from_db(row.get("total"))?);
        }
        Ok(pools)
    }
    async fn get_stakes_total(&self, prediction: PredictionId) -> Result<Amount> {
        let total: i64 = self
            .connection
            .fetch_one(
                query("SELECT COALESCE(SUM(amount), 0) AS total FROM stakes WHERE prediction = ?")
                    .bind(prediction),
            )
            .await?
            .get("total");
        from_db(total)
    }
    async fn set_payout_outcome(
        &self,
        prediction: PredictionId,
        user: &UserPubKey,
        outcome: &TransferOutcome,
    ) -> Result<()> {
        let reason = match outcome {
            TransferOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        let updated = self
            .connection
            .execute(
                query(
                    "UPDATE payouts SET \
                outcome = ?, \
                reason = ? \
                WHERE prediction = ? AND user = ?",
                )
                .bind(outcome.kind())
                .bind(reason)
                .bind(prediction)
                .bind(user.to_string()),
            )
            .await?
            .rows_affected();
        if updated != 1 {
            bail!("There is no payout for {} on prediction {}", user, prediction)
        }
        Ok(())
    }
    async fn get_payout(
        &self,
        prediction: PredictionId,
        user: &UserPubKey,
    ) -> Result<Option<PayoutReceipt>> {
        let row = self
            .connection
            .fetch_optional(
                query(
                    "SELECT user, amount, outcome, reason FROM payouts \
                WHERE prediction = ? AND user = ?",
                )
                .bind(prediction)
                .bind(user.to_string()),
            )
            .await?;
        row.map(receipt_from_row).transpose()
    }
    async fn get_payouts(&self, prediction: PredictionId) -> Result<Vec<PayoutReceipt>> {
        let rows = self
            .connection
            .fetch_all(
                query(
                    "SELECT user, amount, outcome, reason FROM payouts \
                WHERE prediction = ? ORDER BY rowid",
                )
                .bind(prediction),
            )
            .await?;
        rows.into_iter().map(receipt_from_row).collect()
    }
    async fn accept_nonce(&self, user: &UserPubKey, nonce: u64) -> Result<bool> {
        let nonce = i64::try_from(nonce).with_context(|| format!("nonce {} is too large", nonce))?;
        let updated = self
            .connection
            .execute(
                query(
                    "INSERT INTO nonces (user, nonce) VALUES (?,?) \
                ON CONFLICT (user) DO UPDATE SET nonce = excluded.nonce \
                WHERE excluded.nonce > nonces.nonce",
                )
                .bind(user.to_string())
                .bind(nonce),
            )
            .await?
            .rows_affected();
        Ok(updated == 1)
    }
}
fn receipt_from_row(row: SqliteRow) -> Result<PayoutReceipt> {
    Ok(PayoutReceipt {
        participant: user_from_db(row.get("user"))?,
        amount: from_db(row.get("amount"))?,
        outcome: TransferOutcome::from_parts(row.get("outcome"), row.get("reason"))?,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration;
    use secp256k1::{generate_keypair, rand};

    fn new_prediction(options: &[&str]) -> NewPrediction {
        NewPrediction {
            title: "Prediction Title".into(),
            description: "Prediction Description".into(),
            options: options.iter().map(|o| o.to_string()).collect(),
            deadline: Utc.timestamp_opt(Utc::now().timestamp(), 0).unwrap() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn ids_are_sequential_from_zero() {
        let db = SQLite::new(None).await.unwrap();
        let first = db.add_prediction(new_prediction(&["A", "B"])).await.unwrap();
        let second = db.add_prediction(new_prediction(&["C", "D"])).await.unwrap();
        assert_eq!((first, second), (0, 1));

        let prediction = db.get_prediction(second).await.unwrap().unwrap();
        assert_eq!(prediction.options, vec!["C".to_string(), "D".to_string()]);
        assert_eq!(prediction.state, PredictionState::Open);
        assert_eq!(db.get_predictions().await.unwrap().len(), 2);
        assert!(db.get_prediction(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stakes_accumulate_and_pools_match() {
        let db = SQLite::new(None).await.unwrap();
        let (_, u1) = generate_keypair(&mut rand::thread_rng());
        let (_, u2) = generate_keypair(&mut rand::thread_rng());
        let id = db.add_prediction(new_prediction(&["A", "B"])).await.unwrap();

        db.add_stake(id, "A", &u1, 3).await.unwrap();
        db.add_stake(id, "A", &u1, 4).await.unwrap();
        db.add_stake(id, "A", &u2, 1).await.unwrap();
        db.add_stake(id, "B", &u1, 2).await.unwrap();

        assert_eq!(db.get_participant_stake(id, "A", &u1).await.unwrap(), 7);
        assert_eq!(db.get_participant_stake(id, "B", &u2).await.unwrap(), 0);
        assert_eq!(db.get_total_stake(id, "A").await.unwrap(), 8);
        assert_eq!(db.get_total_stake(id, "B").await.unwrap(), 2);

        let pools = db.get_pools(id).await.unwrap();
        assert_eq!(pools.values().sum::<Amount>(), 10);
        assert_eq!(db.get_stakes_total(id).await.unwrap(), 10);

        let mut stakes = db.get_option_stakes(id, "A").await.unwrap();
        stakes.sort_by_key(|(_, amount)| *amount);
        assert_eq!(stakes, vec![(u2, 1), (u1, 7)]);
    }

    #[tokio::test]
    async fn resolution_happens_once() {
        let db = SQLite::new(None).await.unwrap();
        let (_, u1) = generate_keypair(&mut rand::thread_rng());
        let id = db.add_prediction(new_prediction(&["A", "B"])).await.unwrap();
        let payouts = [Payout {
            participant: u1,
            amount: 5,
        }];

        assert!(db.resolve_prediction(id, "A", &payouts).await.unwrap());
        assert!(!db.resolve_prediction(id, "B", &payouts).await.unwrap());

        let prediction = db.get_prediction(id).await.unwrap().unwrap();
        assert_eq!(prediction.state, PredictionState::Resolved("A".into()));
        assert_eq!(
            db.get_payouts(id).await.unwrap(),
            vec![PayoutReceipt {
                participant: u1,
                amount: 5,
                outcome: TransferOutcome::Pending,
            }]
        );
    }

    #[tokio::test]
    async fn payout_outcomes_are_updated() {
        let db = SQLite::new(None).await.unwrap();
        let (_, u1) = generate_keypair(&mut rand::thread_rng());
        let (_, u2) = generate_keypair(&mut rand::thread_rng());
        let id = db.add_prediction(new_prediction(&["A", "B"])).await.unwrap();
        db.resolve_prediction(
            id,
            "A",
            &[Payout {
                participant: u1,
                amount: 5,
            }],
        )
        .await
        .unwrap();

        let failed = TransferOutcome::Failed("rejected".into());
        db.set_payout_outcome(id, &u1, &failed).await.unwrap();
        assert_eq!(db.get_payout(id, &u1).await.unwrap().unwrap().outcome, failed);
        db.set_payout_outcome(id, &u1, &TransferOutcome::Transferred)
            .await
            .unwrap();
        assert_eq!(
            db.get_payout(id, &u1).await.unwrap().unwrap().outcome,
            TransferOutcome::Transferred
        );
        assert!(db
            .set_payout_outcome(id, &u2, &TransferOutcome::Transferred)
            .await
            .is_err());
        assert!(db.get_payout(id, &u2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nonces_only_increase() {
        let db = SQLite::new(None).await.unwrap();
        let (_, u1) = generate_keypair(&mut rand::thread_rng());
        let (_, u2) = generate_keypair(&mut rand::thread_rng());

        assert!(db.accept_nonce(&u1, 5).await.unwrap());
        assert!(!db.accept_nonce(&u1, 5).await.unwrap());
        assert!(!db.accept_nonce(&u1, 4).await.unwrap());
        assert!(db.accept_nonce(&u1, 6).await.unwrap());
        // tracked per user
        assert!(db.accept_nonce(&u2, 1).await.unwrap());
        assert!(db.accept_nonce(&u1, u64::MAX).await.is_err());
        assert!(!db.accept_nonce(&u1, 6).await.unwrap());
    }
}
