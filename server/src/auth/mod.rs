pub mod extractors;
pub mod jwt;
pub mod password;

pub use extractors::{AuthAdmin, AuthUser, BearerToken, OptionalAdmin};
pub use jwt::{Claims, PrincipalKind, TokenIssuer};
