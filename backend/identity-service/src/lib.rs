/// Identity Service Library
///
/// Provides the identity and session layer for the drink log backend:
/// issuing and verifying signed session tokens, resolving provider
/// identities to durable accounts, and driving the sign-in callback
/// pipeline consumed by the web layer.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `adapter`: Identity storage boundary (Postgres and in-memory stores)
/// - `callbacks`: Sign-in callback pipeline and orchestrator
/// - `error`: Error types
/// - `models`: Accounts, provider identities, claims, sessions
/// - `token`: Session token codec
pub mod adapter;
pub mod callbacks;
pub mod config;
pub mod error;
pub mod models;
pub mod token;

// Re-export commonly used types
pub use callbacks::{AuthPipeline, DefaultCallbacks, SignInCallbacks, SignInOutcome};
pub use error::{IdentityError, Result};
pub use token::TokenCodec;
