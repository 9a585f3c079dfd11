//! Wallet challenge-response authentication.
//!
//! `Unauthenticated -> ChallengeIssued -> Authenticated`, with a session
//! token fast path for clients that cannot sign directly. Challenges are
//! single use: consumed on success, discarded on expiry, and expiry is
//! checked lazily on the next use rather than by a sweeper.

use crate::limits::RateLimiters;
use parking_lot::RwLock;
use pulse_crypto::{build_challenge, generate_nonce, recover_personal_signer};
use pulse_types::{
    EcdsaSignature, EthAddress, NodeId, PulseError, PulseResult, CHALLENGE_TTL_SECS,
    NODE_VALIDITY_SECS,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};


#[derive(Clone, Debug)]
struct PendingChallenge {
    challenge: String,
    wallet: EthAddress,
    issued_at: i64,
}

#[derive(Clone, Debug)]
struct SessionToken {
    wallet: EthAddress,
    node_id: NodeId,
    issued_at: i64,
}

/// Identity record that outlives any single connection. Task reports over
/// the stateless path are validated against this.
#[derive(Clone, Debug)]
pub struct AuthenticatedNode {
    pub wallet: EthAddress,
    pub node_id: NodeId,
    pub authenticated_at: i64,
}

impl AuthenticatedNode {
    pub fn is_valid_at(&self, now: i64) -> bool {
        now - self.authenticated_at < NODE_VALIDITY_SECS
    }
}

/// Successful handshake result handed back to the channel layer.
#[derive(Clone, Debug)]
pub struct AuthGrant {
    pub node_id: NodeId,
    pub wallet: EthAddress,
    pub session_token: Option<String>,
}

pub struct AuthEngine {
    limits: Arc<RateLimiters>,
    /// Keyed by (wallet hex, nonce) so a challenge binds one handshake.
    challenges: RwLock<HashMap<(String, String), PendingChallenge>>,
    tokens: RwLock<HashMap<String, SessionToken>>,
    nodes: RwLock<HashMap<String, AuthenticatedNode>>,
}

impl AuthEngine {
    pub fn new(limits: Arc<RateLimiters>) -> Self {
        Self {
            limits,
            challenges: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Registration without a signature: issue a challenge, subject to the
    /// per-wallet challenge quota.
    pub fn issue_challenge(&self, wallet: &EthAddress) -> PulseResult<(String, String)> {
        self.issue_challenge_at(wallet, chrono::Utc::now().timestamp())
    }

    pub(crate) fn issue_challenge_at(
        &self,
        wallet: &EthAddress,
        now: i64,
    ) -> PulseResult<(String, String)> {
        if !self.limits.challenges.check(&wallet.to_hex()) {
            warn!("Challenge quota exceeded for {}", wallet);
            return Err(PulseError::RateLimited(
                "Too many challenge requests, slow down".into(),
            ));
        }

        let nonce = generate_nonce();
        let challenge = build_challenge(wallet, &nonce, now);

        self.challenges.write().insert(
            (wallet.to_hex(), nonce.clone()),
            PendingChallenge {
                challenge: challenge.clone(),
                wallet: *wallet,
                issued_at: now,
            },
        );

        debug!("Issued challenge for {} (nonce {})", wallet, nonce);
        Ok((challenge, nonce))
    }

    /// Registration with a signature over a previously issued challenge.
    pub fn verify_signature(
        &self,
        wallet: &EthAddress,
        nonce: &str,
        signature: &EcdsaSignature,
    ) -> PulseResult<AuthGrant> {
        self.verify_signature_at(wallet, nonce, signature, chrono::Utc::now().timestamp())
    }

    pub(crate) fn verify_signature_at(
        &self,
        wallet: &EthAddress,
        nonce: &str,
        signature: &EcdsaSignature,
        now: i64,
    ) -> PulseResult<AuthGrant> {
        let key = (wallet.to_hex(), nonce.to_string());

        let pending = self
            .challenges
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| PulseError::Auth("No active challenge session".into()))?;

        if now - pending.issued_at >= CHALLENGE_TTL_SECS {
            self.challenges.write().remove(&key);
            return Err(PulseError::Auth("Challenge expired".into()));
        }

        let recovered = recover_personal_signer(signature, pending.challenge.as_bytes())?;
        if recovered != pending.wallet {
            warn!(
                "Signature mismatch for {}: recovered {}",
                pending.wallet, recovered
            );
            return Err(PulseError::Auth("Signature does not match wallet".into()));
        }

        // Consumed exactly once; a replayed signature finds nothing.
        self.challenges.write().remove(&key);

        let node_id = NodeId::generate();
        let token = pulse_crypto::random_hex::<32>();

        self.tokens.write().insert(
            token.clone(),
            SessionToken {
                wallet: *wallet,
                node_id: node_id.clone(),
                issued_at: now,
            },
        );

        self.nodes.write().insert(
            node_id.as_str().to_string(),
            AuthenticatedNode {
                wallet: *wallet,
                node_id: node_id.clone(),
                authenticated_at: now,
            },
        );

        info!("Node {} authenticated as {}", node_id, wallet);
        Ok(AuthGrant {
            node_id,
            wallet: *wallet,
            session_token: Some(token),
        })
    }

    /// Session-token fast path for clients without signing capability.
    pub fn verify_token(&self, wallet: &EthAddress, token: &str) -> PulseResult<AuthGrant> {
        self.verify_token_at(wallet, token, chrono::Utc::now().timestamp())
    }

    pub(crate) fn verify_token_at(
        &self,
        wallet: &EthAddress,
        token: &str,
        now: i64,
    ) -> PulseResult<AuthGrant> {
        let record = self
            .tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| PulseError::Auth("Invalid session token".into()))?;

        if now - record.issued_at >= NODE_VALIDITY_SECS {
            self.tokens.write().remove(token);
            return Err(PulseError::Auth("Session token expired".into()));
        }

        if record.wallet != *wallet {
            return Err(PulseError::Auth("Session token not bound to wallet".into()));
        }

        // Token use refreshes the node record's validity window.
        self.nodes.write().insert(
            record.node_id.as_str().to_string(),
            AuthenticatedNode {
                wallet: record.wallet,
                node_id: record.node_id.clone(),
                authenticated_at: now,
            },
        );

        info!("Node {} re-authenticated via session token", record.node_id);
        Ok(AuthGrant {
            node_id: record.node_id,
            wallet: *wallet,
            session_token: None,
        })
    }

    /// Validates a stateless (out-of-band) caller against the long-lived
    /// node record and its validity window.
    pub fn validate_node(&self, node_id: &str, wallet: &EthAddress) -> PulseResult<AuthenticatedNode> {
        self.validate_node_at(node_id, wallet, chrono::Utc::now().timestamp())
    }

    pub(crate) fn validate_node_at(
        &self,
        node_id: &str,
        wallet: &EthAddress,
        now: i64,
    ) -> PulseResult<AuthenticatedNode> {
        let record = self
            .nodes
            .read()
            .get(node_id)
            .cloned()
            .ok_or_else(|| PulseError::Auth("No node authenticated".into()))?;

        if !record.is_valid_at(now) {
            self.nodes.write().remove(node_id);
            return Err(PulseError::Auth("Node registration expired".into()));
        }

        if record.wallet != *wallet {
            return Err(PulseError::Auth("Wallet does not match node".into()));
        }

        Ok(record)
    }

    pub fn revoke(&self, node_id: &str) -> bool {
        let removed = self.nodes.write().remove(node_id).is_some();
        if removed {
            self.tokens.write().retain(|_, t| t.node_id.as_str() != node_id);
        }
        removed
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Lazily drops expired nodes and tokens; wired into the maintenance
    /// tick.
    pub fn prune_expired(&self) {
        let now = chrono::Utc::now().timestamp();
        self.nodes.write().retain(|_, n| n.is_valid_at(now));
        self.tokens
            .write()
            .retain(|_, t| now - t.issued_at < NODE_VALIDITY_SECS);
    }
}
