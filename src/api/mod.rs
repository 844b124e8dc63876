// HTTP APIs

pub mod oauth;
pub mod upload;

pub use oauth::{
    create_auth_router, run_state_cleanup, AuthAppState, ProviderConfig, StateManager,
};
pub use upload::{create_upload_router, UploadAppState};
