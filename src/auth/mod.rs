pub mod claims;
pub mod cookies;
pub mod strategy;

pub use claims::{TokenClaims, TokenPair};
pub use cookies::{CookieDirective, CookieVariant, SameSite};
pub use strategy::{AuthHeaderStrategy, AuthMode};
