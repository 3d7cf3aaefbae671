pub mod intent;
pub mod object_type;
pub mod request;
