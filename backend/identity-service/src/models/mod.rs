pub mod account;
pub mod session;

pub use account::{Account, Provider, ProviderIdentity};
pub use session::{Session, SessionClaims};
