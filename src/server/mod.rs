mod caller;
pub mod dto;
mod handlers;
pub mod response;
mod router;

pub use caller::{BRANCH_HEADER, Caller, HOST_HEADER, USER_HEADER};
pub use router::{AppState, create_router};
