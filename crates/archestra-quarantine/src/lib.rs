//! Dual-LLM quarantine: a privileged model and a quarantined model that
//! never share a context window. The quarantined model is the only one
//! shown untrusted tool output; it may answer only multiple-choice
//! questions posed by the privileged model. The privileged model never
//! sees the untrusted data directly, only the quarantined model's answers,
//! and produces the summary that reaches the outer conversation.
//!
//! ```no_run
//! use archestra_llm::{LlmClient, LlmClientConfig, Provider};
//! use archestra_quarantine::{QuarantineAgent, QuarantineConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let privileged = LlmClient::new(LlmClientConfig::openai(
//!     "sk-...",
//!     "https://api.openai.com",
//!     "gpt-4o",
//! ))?;
//! let quarantined = LlmClient::new(LlmClientConfig::openai(
//!     "sk-...",
//!     "https://api.openai.com",
//!     "gpt-4o-mini",
//! ))?;
//! let config = QuarantineConfig {
//!     main_agent_prompt: "...".into(),
//!     quarantined_agent_prompt: "...".into(),
//!     summary_prompt: "...".into(),
//!     max_rounds: 5,
//! };
//! let agent = QuarantineAgent::new(&privileged, &quarantined, &config, Provider::Openai);
//! let outcome = agent.run(&[], "call_1").await?;
//! println!("{}", outcome.result);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod error;
pub mod extraction;

pub use agent::{QaTurn, QuarantineAgent, QuarantineConfig, QuarantineOutcome};
pub use error::{QuarantineError, Result};
