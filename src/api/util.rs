use anyhow::{Context, Result};
use log::debug;
use secp256k1::hashes::sha256::Hash;
use secp256k1::{Message, SecretKey};
use serde::Serialize;

use super::*;

pub fn map_any_err(e: anyhow::Error) -> String {
    debug!("Error: {:#}", e);
    format!("{:#}", e)
}
/// Hash of the JSON encoding of `(nonce, data)`, which is what callers sign.
pub fn signing_message<T: Serialize>(nonce: u64, data: &T) -> Result<Message> {
    let bytes = serde_json::to_vec(&(nonce, data)).context("couldn't encode request data")?;
    Ok(Message::from_hashed_data::<Hash>(&bytes))
}
impl<T: Serialize> PostRequest<T> {
    pub fn sign(data: T, nonce: u64, secret_key: &SecretKey) -> Result<Self> {
        let sig = secret_key.sign_ecdsa(signing_message(nonce, &data)?);
        Ok(Self {
            access: AccessRequest {
                user: UserPubKey::from_secret_key_global(secret_key),
                nonce,
                sig,
            },
            data,
        })
    }
    /// Checks the signature and returns the identity that issued the request.
    /// Whether the nonce was used before is up to the caller.
    pub fn verify(&self) -> Result<UserPubKey> {
        self.access
            .sig
            .verify(
                &signing_message(self.access.nonce, &self.data)?,
                &self.access.user,
            )
            .with_context(|| format!("Access token for user {} is invalid", self.access.user))?;
        Ok(self.access.user)
    }
}
