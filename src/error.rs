use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

pub struct LisoError(pub Box<dyn Error>);

impl Debug for LisoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for LisoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for LisoError {}

/// Carrier for the `String`/`&str` conversions below.
#[derive(Debug)]
pub struct Message(pub String);

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for Message {}

impl From<std::io::Error> for LisoError {
    fn from(e: std::io::Error) -> Self {
        LisoError(Box::new(e))
    }
}

impl From<rustls::Error> for LisoError {
    fn from(e: rustls::Error) -> Self {
        LisoError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for LisoError {
    fn from(e: std::net::AddrParseError) -> Self {
        LisoError(Box::new(e))
    }
}

impl From<std::num::ParseIntError> for LisoError {
    fn from(e: std::num::ParseIntError) -> Self {
        LisoError(Box::new(e))
    }
}

impl From<String> for LisoError {
    fn from(s: String) -> Self {
        LisoError(Box::new(Message(s)))
    }
}

impl From<&str> for LisoError {
    fn from(s: &str) -> Self {
        LisoError(Box::new(Message(s.to_string())))
    }
}

pub type Result<T> = std::result::Result<T, LisoError>;
