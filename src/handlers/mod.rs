mod cgi;
mod static_file;

pub use cgi::{dispatch_cgi, handle_post};
pub use static_file::{handle_get, handle_head};
