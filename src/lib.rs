// Process configuration (TOML file + env secrets)
pub mod config;

// Per-user directory: profiles, encrypted secrets, uploaded files
pub mod directory;

// Google Drive API client
pub mod drive;

// Signed session tokens
pub mod session;

// HTTP APIs
pub mod api;
