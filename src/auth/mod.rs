//! Token acquisition chain: scraped secret material, OTP derivation and the
//! bearer token exchange built on both.

mod otp;
mod secrets;
mod token;

pub use otp::{hotp, totp, OtpSeedDeriver, PositionXorSeedDeriver};
pub use secrets::{
    parse_secrets_blob, SecretEntry, SecretFetcher, SecretMaterial, SecretMaterialCache,
    WebSecretSource, DEFAULT_LANDING_URL,
};
pub use token::{
    parse_token_response, AccessToken, TokenAuthManager, TokenExchanger, WebTokenExchanger,
    DEFAULT_TOKEN_URL,
};
