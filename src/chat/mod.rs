//! IDE chat history: discovery, extraction, volume limiting and
//! conversation segmentation.
//!
//! ```text
//! locate ──▶ extract ──▶ limit ──▶ boundary
//! (paths)    (sqlx, ro)   (per role)  (time gaps)
//! ```

pub mod boundary;
pub mod extract;
pub mod limit;
pub mod locate;

pub use boundary::{segment, select_recent};
pub use extract::{extract_messages, sort_chronologically, Extraction, StoreFormat};
pub use limit::{limit_messages, LimitMetadata};
pub use locate::{locate_chat_databases, select_for_repo};
