pub mod store;
pub mod token;

pub use store::{TokenStorageError, TokenStore, TokenStoreFile};
pub use token::{
    GenerateTokenParams, GeneratedToken, StoredToken, TokenError, TokenMetadata, TokenService,
    ValidationOutcome,
};
