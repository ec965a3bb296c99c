pub mod gemini_live;
pub mod request;
pub mod rest_store;
pub mod runtime;
