//! # stockroom-assist: LLM Collaborator
//!
//! Optional helpers layered on top of the inventory:
//!
//! ```text
//! ┌─────────────┐   chat / restock    ┌──────────────────────────┐
//! │  API route  │ ──────────────────► │ OpenAI-compatible        │
//! │             │   photo (base64)    │ /chat/completions        │
//! │             │ ──────────────────► │                          │
//! └─────────────┘ ◄────────────────── └──────────────────────────┘
//!                  text / ProductHints
//! ```
//!
//! Nothing here writes to storage. Recognized products come back as
//! [`ProductHints`] for a person to confirm before creating anything.

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod types;

pub use client::{AssistClient, MAX_IMAGE_BYTES};
pub use config::AssistConfig;
pub use error::{AssistError, AssistResult};
pub use extract::{extract_json, hints_from_json};
pub use types::{ChatMessage, ChatRole, InventorySnapshot, ProductHints, StockLine};
