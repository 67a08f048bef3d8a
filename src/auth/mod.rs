pub mod accounts;
pub mod handlers;
pub mod oauth;
pub mod password;
pub mod session;
