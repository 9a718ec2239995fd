//! Conversation driver for the Rudder agent.
//!
//! This crate owns the collaborator seams and the turn loop: the
//! [`LanguageModel`] trait and its validating adapter, the downstream
//! [`ResourceApi`] executor, the follow-up suggestion generator, and the
//! [`GraphDriver`] that composes them with the core router and approval
//! gate. Everything that talks to the outside world lives behind a trait so
//! tests run against scripted fakes.

pub mod driver;
pub mod executor;
pub mod http;
pub mod llm;
pub mod openai;
pub mod suggestions;

pub use driver::{GraphDriver, TurnInput, TurnOutput};
pub use executor::{ActionExecutor, Credentials, ResourceApi, ResourceApiError};
pub use http::HttpResourceApi;
pub use llm::{ActionProposal, CollaboratorError, LanguageModel, ModelTurn, ValidatingModel};
pub use openai::OpenAiModel;
pub use suggestions::{SuggestionGenerator, MAX_SUGGESTIONS};
