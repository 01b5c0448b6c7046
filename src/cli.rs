#![allow(dead_code)]
use std::str::FromStr;

use anyhow::{Context, Result};
use api::*;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use secp256k1::{generate_keypair, rand, SecretKey};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::client::Client;

mod api;
mod client;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,
}
#[derive(Subcommand)]
enum Commands {
    GenerateKeys,
    AddAdmin {
        #[arg(short, long)]
        admin: UserPubKey,
    },
    RemoveAdmin {
        #[arg(short, long)]
        admin: UserPubKey,
    },
    CreatePrediction {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Repeat once per option.
        #[arg(short, long, required = true)]
        option: Vec<String>,
        /// RFC 3339, e.g. 2030-01-01T12:00:00Z
        #[arg(long)]
        deadline: DateTime<Utc>,
    },
    PlaceBet {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long)]
        option: String,
        #[arg(short, long)]
        amount: Amount,
    },
    EndPrediction {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long)]
        winning_option: String,
    },
    RetryPayout {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(long)]
        participant: UserPubKey,
    },
    GetPredictions,
    GetPrediction {
        #[arg(short, long)]
        prediction: PredictionId,
    },
    GetStake {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long)]
        option: String,
        /// Defaults to the total of the option.
        #[arg(long)]
        participant: Option<UserPubKey>,
    },
    GetPayouts {
        #[arg(short, long)]
        prediction: PredictionId,
    },
    GetRole {
        /// Defaults to the key in ecdsa.pub
        #[arg(short, long)]
        user: Option<UserPubKey>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let client = Client::new(cli.url);

    match cli.command {
        Commands::GenerateKeys => {
            let keys = generate_keypair(&mut rand::thread_rng());
            println!("Pubkey: {}", keys.1);
            let mut private = File::create("ecdsa.key").await?;
            let mut public = File::create("ecdsa.pub").await?;
            private
                .write_all(format!("{}", keys.0.display_secret()).as_bytes())
                .await?;
            public.write_all(keys.1.to_string().as_bytes()).await?;
        }
        Commands::AddAdmin { admin } => {
            client.add_admin(admin, &read_secret().await?).await?;
            println!("Added admin {}", admin);
        }
        Commands::RemoveAdmin { admin } => {
            client.remove_admin(admin, &read_secret().await?).await?;
            println!("Removed admin {}", admin);
        }
        Commands::CreatePrediction {
            title,
            description,
            option,
            deadline,
        } => {
            let request = NewPredictionRequest {
                title,
                description,
                options: option,
                deadline,
            };
            let id = client
                .create_prediction(request, &read_secret().await?)
                .await?;
            println!("Created new prediction: {}", id);
        }
        Commands::PlaceBet {
            prediction,
            option,
            amount,
        } => {
            let request = PlaceBetRequest {
                prediction,
                option,
                amount,
            };
            client.place_bet(request, &read_secret().await?).await?;
        }
        Commands::EndPrediction {
            prediction,
            winning_option,
        } => {
            let request = EndPredictionRequest {
                prediction,
                winning_option,
            };
            let settlement = client
                .end_prediction(request, &read_secret().await?)
                .await?;
            println!("{:#?}", settlement);
            for receipt in settlement.unpaid() {
                println!(
                    "Payout of {} to {} is unpaid: {}",
                    receipt.amount, receipt.participant, receipt.outcome
                );
            }
        }
        Commands::RetryPayout {
            prediction,
            participant,
        } => {
            let request = RetryPayoutRequest {
                prediction,
                participant,
            };
            let receipt = client
                .retry_payout(request, &read_secret().await?)
                .await?;
            println!("{}: {}", receipt.participant, receipt.outcome);
        }
        Commands::GetPredictions => {
            let response = client.get_predictions().await?;
            println!("{:#?}", response);
        }
        Commands::GetPrediction { prediction } => {
            let overview = client.get_prediction_overview(prediction).await?;
            println!("{:#?}", overview.prediction);
            for pool in overview.pools {
                match pool.odds {
                    Some(odds) => println!("{}: {} (pays {}x)", pool.option, pool.total, odds),
                    None => println!("{}: {}", pool.option, pool.total),
                }
            }
            println!("Total: {}", overview.total);
        }
        Commands::GetStake {
            prediction,
            option,
            participant,
        } => {
            let stake = match participant {
                Some(participant) => {
                    client
                        .get_participant_stake(ParticipantStakeRequest {
                            prediction,
                            option,
                            participant,
                        })
                        .await?
                }
                None => {
                    client
                        .get_total_stake(TotalStakeRequest { prediction, option })
                        .await?
                }
            };
            println!("{}", stake);
        }
        Commands::GetPayouts { prediction } => {
            for receipt in client.get_payouts(prediction).await? {
                println!(
                    "{}: {} {}",
                    receipt.participant, receipt.amount, receipt.outcome
                );
            }
        }
        Commands::GetRole { user } => {
            let user = match user {
                Some(user) => user,
                None => read_public().await?,
            };
            let response = client.get_role(user).await?;
            println!("{}: {}", response.user, response.role);
        }
    }
    Ok(())
}
async fn read_secret() -> Result<SecretKey> {
    let mut file = File::open("ecdsa.key")
        .await
        .context("couldn't open ecdsa.key, run generate-keys first")?;
    let mut contents = vec![];
    file.read_to_end(&mut contents).await?;
    Ok(SecretKey::from_str(String::from_utf8(contents)?.trim())?)
}
async fn read_public() -> Result<UserPubKey> {
    let mut file = File::open("ecdsa.pub")
        .await
        .context("couldn't open ecdsa.pub, run generate-keys first")?;
    let mut contents = vec![];
    file.read_to_end(&mut contents).await?;
    Ok(UserPubKey::from_str(String::from_utf8(contents)?.trim())?)
}
