pub mod key_management_service;
pub mod token_service;
pub mod token_validator;
pub mod user_service;
