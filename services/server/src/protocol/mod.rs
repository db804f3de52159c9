//! Wire protocol: length-prefixed frames carrying JSON bodies.
//!
//! - `frame`: reads and writes `[u32 LE length][payload]` frames.
//! - `messages`: the request and response bodies.

pub mod frame;
pub mod messages;

pub use frame::{FrameError, read_frame, write_frame};
pub use messages::{ClientRequest, ConversationId, ServerResponse};
