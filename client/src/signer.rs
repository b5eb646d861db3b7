//! The external signing boundary.
//!
//! A signer receives an unsigned (or partially signed) envelope and hands
//! back a signed one. Nothing about its output format is trusted; see
//! [`crate::reconcile`].

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use stellar_xdr::curr::{
    BytesM, DecoratedSignature, Signature, SignatureHint, TransactionEnvelope,
    TransactionV1Envelope,
};

use crate::codec;
use crate::error::InvocationError;
use crate::transaction::{network_id, transaction_hash};
use crate::wallet::WalletConfig;

/// What came back from a signer. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerResponse {
    pub signed_envelope_xdr: Option<String>,
    pub error: Option<String>,
}

impl SignerResponse {
    pub fn signed(envelope_xdr: impl Into<String>) -> Self {
        Self {
            signed_envelope_xdr: Some(envelope_xdr.into()),
            error: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            signed_envelope_xdr: None,
            error: Some(reason.into()),
        }
    }

    /// The signed envelope, or the signer's error.
    ///
    /// An error field wins even if an envelope is also present, and a
    /// response with neither counts as a refusal.
    pub fn into_envelope(self) -> Result<String, InvocationError> {
        if let Some(error) = self.error {
            return Err(InvocationError::Signer(error));
        }
        match self.signed_envelope_xdr {
            Some(xdr) if !xdr.is_empty() => Ok(xdr),
            _ => Err(InvocationError::Signer(
                "signer returned no signed envelope".to_string(),
            )),
        }
    }
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, envelope_xdr: &str, network_passphrase: &str)
        -> SignerResponse;
}

/// Signs with a local ed25519 key.
pub struct LocalKeySigner {
    key: SigningKey,
}

impl LocalKeySigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_wallet(wallet: &WalletConfig) -> anyhow::Result<Self> {
        Ok(Self::new(wallet.signing_key()?))
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    fn decorated(&self, hash: &[u8; 32]) -> Result<DecoratedSignature, String> {
        let public = self.public_key();
        let signature = self.key.sign(hash).to_bytes();
        let bytes: BytesM<64> = signature
            .to_vec()
            .try_into()
            .map_err(|e| format!("signature: {}", e))?;
        Ok(DecoratedSignature {
            hint: SignatureHint([public[28], public[29], public[30], public[31]]),
            signature: Signature(bytes),
        })
    }

    fn sign_envelope(&self, envelope_xdr: &str, passphrase: &str) -> Result<String, String> {
        let envelope: TransactionEnvelope =
            codec::from_base64(envelope_xdr).map_err(|e| format!("unreadable envelope: {}", e))?;

        let TransactionEnvelope::Tx(TransactionV1Envelope { tx, signatures }) = envelope else {
            return Err("only v1 transaction envelopes are supported".to_string());
        };

        let hash = transaction_hash(&tx, passphrase).map_err(|e| e.to_string())?;
        let mut signatures = signatures.to_vec();
        signatures.push(self.decorated(&hash)?);

        let signed = TransactionEnvelope::Tx(TransactionV1Envelope {
            tx,
            signatures: signatures
                .try_into()
                .map_err(|e| format!("too many signatures: {}", e))?,
        });
        codec::to_base64(&signed).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl TransactionSigner for LocalKeySigner {
    async fn sign_transaction(
        &self,
        envelope_xdr: &str,
        network_passphrase: &str,
    ) -> SignerResponse {
        tracing::debug!(
            network = %hex::encode(&network_id(network_passphrase).0[..4]),
            "signing locally"
        );
        match self.sign_envelope(envelope_xdr, network_passphrase) {
            Ok(signed) => SignerResponse::signed(signed),
            Err(e) => SignerResponse::refused(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use ed25519_dalek::{Verifier, VerifyingKey};
    use stellar_xdr::curr::{ReadXdr, TransactionEnvelope};

    #[test]
    fn test_response_requires_envelope() {
        assert!(SignerResponse::signed("AAAA").into_envelope().is_ok());
        assert!(matches!(
            SignerResponse::default().into_envelope(),
            Err(InvocationError::Signer(_))
        ));
        assert!(matches!(
            SignerResponse::signed("").into_envelope(),
            Err(InvocationError::Signer(_))
        ));
        let both = SignerResponse {
            signed_envelope_xdr: Some("AAAA".to_string()),
            error: Some("user cancelled".to_string()),
        };
        assert!(matches!(both.into_envelope(), Err(InvocationError::Signer(e)) if e == "user cancelled"));
    }

    #[tokio::test]
    async fn test_local_signer_appends_valid_signature() {
        let signer = testutil::local_signer();
        let assembled = testutil::assembled_for(&signer, "revoke_warranty");
        let envelope = assembled.to_envelope_base64().unwrap();

        let signed = signer
            .sign_transaction(&envelope, testutil::PASSPHRASE)
            .await
            .into_envelope()
            .unwrap();

        let bytes = codec::decode_base64_bytes(&signed).unwrap();
        let TransactionEnvelope::Tx(env) =
            TransactionEnvelope::from_xdr(bytes, stellar_xdr::curr::Limits::none()).unwrap()
        else {
            panic!("expected v1 envelope");
        };
        assert_eq!(env.tx, assembled.tx);
        assert_eq!(env.signatures.len(), 1);

        let hash = assembled.hash(testutil::PASSPHRASE).unwrap();
        let key = VerifyingKey::from_bytes(&signer.public_key()).unwrap();
        let sig_bytes: [u8; 64] = env.signatures[0].signature.0.as_slice().try_into().unwrap();
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        assert!(key.verify(&hash, &sig).is_ok());
        assert_eq!(&env.signatures[0].hint.0[..], &signer.public_key()[28..]);
    }

    #[tokio::test]
    async fn test_local_signer_refuses_garbage() {
        let signer = testutil::local_signer();
        let resp = signer.sign_transaction("%%%", testutil::PASSPHRASE).await;
        assert!(resp.signed_envelope_xdr.is_none());
        assert!(resp.error.is_some());
    }
}
