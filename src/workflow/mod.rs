pub mod detection_flow;
pub mod session;
pub mod session_ctx;

pub use detection_flow::{DetectionFlow, TickOutcome};
pub use session::{start_session, ProctorDevices, SessionHandle, SessionSnapshot, SessionState};
pub use session_ctx::SessionCtx;
