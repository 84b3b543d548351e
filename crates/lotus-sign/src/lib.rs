//! Remote signing authorization: signing challenges with TOTP or demo-code
//! confirmation, signature activation data (SAD) validation, one-shot
//! authorization grants, grant-gated key custody and timestamped signing.

pub mod challenge;
pub mod custody;
pub mod error;
pub mod sad;
pub mod signing;

pub use challenge::{
    ChallengeService, ChallengeStore, ChallengeTicket, CodePolicy, MemoryChallengeStore,
    MemoryTotpDirectory, SigningChallenge, TotpEnrollment,
};
pub use custody::{AuthorizationGrant, KeyCustody, SoftwareKeyCustody};
pub use error::{Rejection, Result, SignError};
pub use sad::{SadClaims, SadValidator};
pub use signing::{countersign_imprint_b64, RemoteSigningService, SignedOutcome};
