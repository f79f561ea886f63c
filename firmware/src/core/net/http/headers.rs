use core::fmt::Write;

use embedded_io_async::Read;
use fleetlink_client::ports::Method;

use super::Error;

pub(crate) const HEADER_BUFFER_SIZE: usize = 1024;

/// Content type for JSON request bodies.
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";

/// Write the request line and headers.
///
/// A `Content-Type`/`Content-Length` pair is emitted only for requests that
/// carry a body; the connection is kept open for the rest of the cycle.
pub(crate) fn write_request_heading(
    writer: &mut impl Write,
    method: Method,
    path: &str,
    host: &str,
    content_length: Option<usize>,
) -> Result<(), core::fmt::Error> {
    write!(writer, "{} {} HTTP/1.1\r\n", method.as_str(), path)?;
    write!(writer, "Host: {}\r\n", host)?;
    write!(writer, "Connection: keep-alive\r\n")?;
    if let Some(content_length) = content_length {
        write!(writer, "Content-Type: {}\r\n", CONTENT_TYPE_JSON)?;
        write!(writer, "Content-Length: {}\r\n", content_length)?;
    }
    write!(writer, "\r\n")
}

/// Parse the status line, returning the status code.
pub(crate) fn parse_status_line(header_str: &str) -> Option<u16> {
    let line_end = header_str.find("\r\n").unwrap_or(header_str.len());
    let first_line = &header_str[..line_end];
    let mut parts = first_line.split_whitespace();

    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// Read the status line and headers from the stream.
///
/// Returns the position of the end of the headers and the length of the
/// data read so far. If the headers are not found, returns (0, 0).
pub(crate) async fn read_heading<S: Read>(
    buf: &mut [u8],
    stream: &mut S,
) -> Result<(usize, usize), Error> {
    let mut header_len = 0;
    let mut header_end = None;
    loop {
        let n = stream
            .read(&mut buf[header_len..])
            .await
            .map_err(|_| Error::Closed)?;
        if n == 0 {
            return Ok((0, 0));
        }
        header_len += n;
        // Check for end of headers
        if let Some(pos) = buf[..header_len].windows(4).position(|w| w == b"\r\n\r\n") {
            header_end = Some(pos + 4);
            break;
        }
        if header_len >= buf.len() {
            break;
        }
    }

    let header_end = header_end.unwrap_or(header_len);

    Ok((header_end, header_len))
}

/// Find the content length in the header string.
///
/// Returns the content length if found, otherwise None.
pub(crate) fn find_content_length(header: &str) -> Option<usize> {
    const TARGET: &str = "content-length:";
    for line in header.lines() {
        if line.len() >= TARGET.len() && line[..TARGET.len()].eq_ignore_ascii_case(TARGET) {
            return line[TARGET.len()..].trim().parse().ok();
        }
    }
    None
}
