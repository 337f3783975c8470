/*! Control command authentication.

Control-plane commands (exposure setup, mode changes, resets) are
authenticated with HMAC-SHA256 over their canonical byte encoding using a
pre-shared key. The simulator validates tags; it never issues them. The tag
comparison is constant-time: a forged tag must not be distinguishable by
how quickly it is rejected.
*/
use hmac::{Hmac, Mac};
use log::debug;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 tag length in bytes. Anything else is rejected outright.
pub const TAG_LEN: usize = 32;

/// Outcome of a verification. Rejection carries no reason on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Tag matches the message under the shared key.
    Accepted,
    /// Tag missing, malformed, or wrong.
    Rejected,
}

/// SPI control command codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpiCommand {
    /// Register read.
    Read,
    /// Register write.
    Write,
    /// Soft reset.
    Reset,
}

impl SpiCommand {
    /// Wire code, first byte of the canonical encoding.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            SpiCommand::Read => 0x01,
            SpiCommand::Write => 0x02,
            SpiCommand::Reset => 0x03,
        }
    }
}

/// One control-plane transaction. Opaque to the frame path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpiTransaction {
    /// Command kind.
    pub command: SpiCommand,
    /// Command-specific bytes.
    pub data: Vec<u8>,
}

impl SpiTransaction {
    /// Canonical byte encoding signed by the controller:
    /// `[command code] || data`.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.command.code());
        out.extend(&self.data);
        out
    }
}

/// HMAC-SHA256 command authenticator with a pre-shared key.
pub struct AuthVerifier {
    key: Vec<u8>,
    accepted: u64,
    rejected: u64,
}

impl AuthVerifier {
    /// Create a verifier for the given pre-shared key.
    #[must_use]
    pub fn new<K: Into<Vec<u8>>>(key: K) -> Self {
        Self {
            key: key.into(),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Verify a tag over a message's canonical bytes.
    ///
    /// Only 32-byte tags can be accepted; the length check happens before
    /// any MAC computation. The tag comparison itself runs over all 32
    /// bytes regardless of where the first difference is.
    pub fn verify(&mut self, message: &[u8], signature: &[u8]) -> Verdict {
        if signature.len() != TAG_LEN {
            debug!("rejecting tag of length {} != {TAG_LEN}", signature.len());
            self.rejected += 1;
            return Verdict::Rejected;
        }
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(message);
        let want = mac.finalize().into_bytes();
        if bool::from(want.as_slice().ct_eq(signature)) {
            self.accepted += 1;
            Verdict::Accepted
        } else {
            self.rejected += 1;
            Verdict::Rejected
        }
    }

    /// Verify a signed transaction.
    pub fn verify_transaction(&mut self, txn: &SpiTransaction, signature: &[u8]) -> Verdict {
        self.verify(&txn.canonical_bytes(), signature)
    }

    /// [`AuthVerifier::verify`] as a `Result`, for call sites that
    /// propagate instead of branching.
    pub fn require(&mut self, message: &[u8], signature: &[u8]) -> Result<()> {
        match self.verify(message, signature) {
            Verdict::Accepted => Ok(()),
            Verdict::Rejected => Err(Error::AuthRejected),
        }
    }

    /// `(accepted, rejected)` counters since construction.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) {
        (self.accepted, self.rejected)
    }
}

impl std::fmt::Debug for AuthVerifier {
    // Key bytes stay out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthVerifier")
            .field("accepted", &self.accepted)
            .field("rejected", &self.rejected)
            .finish()
    }
}
