pub mod clock;
pub mod jwt;
pub mod session;
pub mod storage;
pub mod token;
pub mod token_store;

pub use clock::{Clock, SystemClock};
pub use session::{AuthLoginResult, AuthService, AuthStatus, SocialLogin};
pub use storage::{FileSecureStorage, MemorySecureStorage, SecureStorage};
pub use token::TokenRecord;
pub use token_store::TokenStore;
