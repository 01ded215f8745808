pub mod attendance;
pub mod audit;
pub mod code_issuer;
pub mod display;
