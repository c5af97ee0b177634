pub mod foreign_token;
pub mod home_bridge;
pub mod validator_proxy;
