pub mod advisory;
pub mod client;
pub mod openai;
pub mod planner;

pub use advisory::{Advisor, Advisory};
pub use client::{GenerativeClient, LLMError, OfflineClient, Prompt};
pub use openai::OpenAIClient;
pub use planner::{FileContext, PatchPlanner};
