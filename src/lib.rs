pub mod ai;
pub mod api;
pub mod classroom;
pub mod client;
pub mod db_store;
pub mod error;
pub mod feed;
pub mod logging;
pub mod mem_store;
pub mod password;
pub mod question;
pub mod server;
pub mod store;
pub mod user;

pub use classroom::Classroom;
pub use db_store::{can_connect_to_db, create_db_if_needed, reset_db};
pub use error::ClassroomError;
pub use logging::setup_log;
pub use server::start_server;

/// How many questions the weekly ranking returns.
pub const WEEKLY_TOP_COUNT: u32 = 5;

/// Row cap for the personal detail listings (own questions, received comments).
pub const DETAIL_LIMIT: u32 = 50;

/// Lifetime of a password-reset token.
pub const RESET_TOKEN_EXPIRY_SECONDS: i64 = 60 * 60;

/// Lifetime of the session cookies set at login.
pub const SESSION_COOKIE_MAX_AGE: u32 = 86400;
