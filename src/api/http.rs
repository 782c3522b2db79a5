//! Minimal HTTP/1.1 framing
//!
//! Just enough to serve a handful of routes from a fixed-size buffer: the
//! request line, `Content-Length` and the header terminator are parsed,
//! everything else is ignored. Every response closes the connection.

use core::fmt::{self, Write};

use thiserror_no_std::Error;

/// Largest request (head and body) accepted on one connection
pub const MAX_REQUEST_SIZE: usize = 1024;

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_METHODS: &str = "GET, POST, PUT";
const CORS_ALLOW_HEADERS: &str = "Content-Type";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpError {
    #[error("request head is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed request line or header")]
    MalformedHead,

    #[error("request larger than 1024 bytes")]
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Method {
    Get,
    Post,
    Put,
    Options,
    Other,
}

impl Method {
    fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "OPTIONS" => Method::Options,
            _ => Method::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Ok,
    NoContent,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    InternalServerError,
}

impl Status {
    pub const fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::NoContent => 204,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::PayloadTooLarge => 413,
            Status::InternalServerError => 500,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::NoContent => "No Content",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

/// Parsed request line and framing information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHead<'a> {
    pub method: Method,
    /// Path without the query string
    pub path: &'a str,
    /// Bytes up to and including the blank line
    pub header_len: usize,
    pub content_length: usize,
}

impl RequestHead<'_> {
    /// Size of the whole request, head plus body
    pub fn total_len(&self) -> usize {
        self.header_len + self.content_length
    }
}

/// Parse the head of a request.
///
/// Returns `Ok(None)` while the blank line ending the headers has not arrived.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead<'_>>, HttpError> {
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return if buf.len() >= MAX_REQUEST_SIZE {
            Err(HttpError::TooLarge)
        } else {
            Ok(None)
        };
    };
    let header_len = end + 4;
    let head = core::str::from_utf8(&buf[..end]).map_err(|_| HttpError::InvalidUtf8)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::MalformedHead);
    };
    if !version.starts_with("HTTP/1.") || parts.next().is_some() {
        return Err(HttpError::MalformedHead);
    }

    let mut content_length = None;
    for line in lines {
        let (name, value) = line.split_once(':').ok_or(HttpError::MalformedHead)?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::MalformedHead)?;
            content_length = Some(len);
        }
    }

    let method = Method::parse(method);
    // no Content-Length means no body, whatever the method
    let content_length = content_length.unwrap_or(0);
    if header_len + content_length > MAX_REQUEST_SIZE {
        return Err(HttpError::TooLarge);
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    Ok(Some(RequestHead {
        method,
        path,
        header_len,
        content_length,
    }))
}

/// Write the status line and headers of a response, blank line included
pub fn write_head<W: Write>(
    out: &mut W,
    status: Status,
    content_type: &str,
    content_length: usize,
) -> fmt::Result {
    write!(
        out,
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Access-Control-Allow-Origin: {}\r\n\
         Access-Control-Allow-Methods: {}\r\n\
         Access-Control-Allow-Headers: {}\r\n\
         Connection: close\r\n\
         Content-Length: {}\r\n\
         \r\n",
        status.code(),
        status.reason(),
        content_type,
        CORS_ALLOW_ORIGIN,
        CORS_ALLOW_METHODS,
        CORS_ALLOW_HEADERS,
        content_length,
    )
}
