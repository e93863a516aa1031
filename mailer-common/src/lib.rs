pub mod email;
pub mod request_io;
