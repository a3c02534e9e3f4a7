pub mod admin;

pub use admin::{router as admin_router, AdminState};
