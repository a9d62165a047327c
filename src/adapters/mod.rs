pub mod api_errors;
pub mod collaborators;
pub mod webhook;
