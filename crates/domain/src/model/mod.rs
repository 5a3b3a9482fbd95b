pub mod allowlist;
pub mod auth_profile;
pub mod context;
pub mod pairing;
pub mod reply;
pub mod run;
pub mod session;
pub mod session_key;

pub use allowlist::{AllowListEntry, AllowListFile};
pub use auth_profile::{AuthProfile, AuthProfileType, FailureReason, UsageStats};
pub use context::{Ctx, MsgContext};
pub use pairing::{PairingMeta, PairingRequest, PAIRING_CODE_ALPHABET, PAIRING_CODE_LEN};
pub use reply::ReplyPayload;
pub use run::{PendingPrompt, Run, SubAgentCleanup, SubAgentRun, TerminalState};
pub use session::{SendPolicy, SessionEntry};
pub use session_key::{compute_session_key, ChatType, DmScope, InboundMetadata, SessionKey, MAX_SESSION_KEY_BYTES};
