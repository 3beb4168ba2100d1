//! Data signing and validation.
//!
//! Hello replies are signed before transmission and validated before they can
//! change adjacency state. The signer fills the key locator and signature
//! over the data packet's signed portion; validators check the signature
//! against locally configured trust anchors. A failed validation drops the
//! packet without touching protocol state.

use std::collections::BTreeMap;

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};

use namelink_core::{DataPacket, RouterName};

/// Reasons a data packet fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("data carries no key locator")]
    MissingKeyLocator,
    #[error("no trust anchor for key {0}")]
    UnknownKey(RouterName),
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature check failed for key {0}")]
    BadSignature(RouterName),
}

/// Signs outbound data packets in place.
pub trait Sign {
    fn sign(&self, data: &mut DataPacket);
}

/// Validates inbound data packets; the node drops failures.
pub trait Validate: Send {
    fn validate(&self, data: &DataPacket) -> Result<(), ValidationError>;
}

/// Ed25519 signer bound to a named key.
pub struct Ed25519Signer {
    key: SigningKey,
    key_name: RouterName,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey, key_name: RouterName) -> Self {
        Self { key, key_name }
    }

    /// Deterministic construction from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32], key_name: RouterName) -> Self {
        Self::new(SigningKey::from_bytes(&seed), key_name)
    }

    /// Generate an ephemeral signing key.
    pub fn generate(key_name: RouterName) -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng), key_name)
    }

    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn key_name(&self) -> &RouterName {
        &self.key_name
    }
}

impl Sign for Ed25519Signer {
    fn sign(&self, data: &mut DataPacket) {
        data.key_locator = Some(self.key_name.clone());
        let signature = self.key.sign(&data.signed_portion());
        data.signature = signature.to_bytes().to_vec();
    }
}

/// Ed25519 validator over a set of configured trust anchors, keyed by the
/// key name carried in the data's key locator.
#[derive(Default)]
pub struct Ed25519Validator {
    anchors: BTreeMap<RouterName, VerifyingKey>,
}

impl Ed25519Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_anchor(&mut self, key_name: RouterName, key: VerifyingKey) {
        self.anchors.insert(key_name, key);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl Validate for Ed25519Validator {
    fn validate(&self, data: &DataPacket) -> Result<(), ValidationError> {
        let locator = data
            .key_locator
            .as_ref()
            .ok_or(ValidationError::MissingKeyLocator)?;
        let key = self
            .anchors
            .get(locator)
            .ok_or_else(|| ValidationError::UnknownKey(locator.clone()))?;
        let signature = Signature::from_slice(&data.signature)
            .map_err(|_| ValidationError::MalformedSignature)?;
        key.verify_strict(&data.signed_portion(), &signature)
            .map_err(|_| ValidationError::BadSignature(locator.clone()))
    }
}

/// Accepts everything; used when no trust anchors are configured.
pub struct AcceptAllValidator;

impl Validate for AcceptAllValidator {
    fn validate(&self, _data: &DataPacket) -> Result<(), ValidationError> {
        Ok(())
    }
}
