mod error;
mod jwt;
mod memory;
pub mod metering;
mod pg;
mod refresh;
mod store;

pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, MintError};
pub use memory::MemoryTokenStore;
pub use pg::PgTokenStore;
pub use refresh::RefreshService;
pub use store::{StoreError, TokenContext, TokenStore, TokenStoreTx};
