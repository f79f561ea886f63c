use embedded_io_async::{Read, Write};
use fleetlink_client::ports::{Method, ResponseSink};
use heapless::String;

use super::Error;
use super::headers::{
    HEADER_BUFFER_SIZE,
    find_content_length,
    parse_status_line,
    read_heading,
    write_request_heading,
};

const HEADING_BUFFER_SIZE: usize = 512;
const BODY_RX_CHUNK_SIZE: usize = 512;

/// One HTTP request against an open stream.
pub(crate) struct ClientRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub host: &'a str,
    pub body: Option<&'a [u8]>,
}

/// Issue the request and stream the response body into the sink.
///
/// The sink learns the `Content-Length` before the first slice; the last
/// slice carries the final flag. Returns the response status code.
pub(crate) async fn exchange<S: Read + Write>(
    stream: &mut S,
    request: &ClientRequest<'_>,
    sink: &mut dyn ResponseSink,
) -> Result<u16, Error> {
    let mut heading: String<HEADING_BUFFER_SIZE> = String::new();
    write_request_heading(
        &mut heading,
        request.method,
        request.path,
        request.host,
        request.body.map(<[u8]>::len),
    )?;

    stream
        .write_all(heading.as_bytes())
        .await
        .map_err(|_| Error::Closed)?;
    if let Some(body) = request.body {
        stream.write_all(body).await.map_err(|_| Error::Closed)?;
    }
    stream.flush().await.map_err(|_| Error::Closed)?;

    let mut header_buf = [0u8; HEADER_BUFFER_SIZE];
    let (header_end, header_len) = read_heading(&mut header_buf, stream).await?;
    if header_end == 0 {
        return Err(Error::Closed);
    }

    let header_str =
        core::str::from_utf8(&header_buf[..header_end]).map_err(|_| Error::Parse)?;
    let status = parse_status_line(header_str).ok_or(Error::Parse)?;
    let content_length = find_content_length(header_str).unwrap_or(0);
    sink.on_content_length(content_length);

    if content_length == 0 {
        sink.on_body(&[], true).map_err(Error::Aborted)?;
        return Ok(status);
    }

    // Part of the body may already sit behind the headers.
    let mut delivered = 0usize;
    if header_len > header_end {
        let trailer = &header_buf[header_end..header_len];
        let take = trailer.len().min(content_length);
        delivered += take;
        sink.on_body(&trailer[..take], delivered == content_length)
            .map_err(Error::Aborted)?;
    }

    let mut chunk = [0u8; BODY_RX_CHUNK_SIZE];
    while delivered < content_length {
        let want = (content_length - delivered).min(chunk.len());
        let n = stream
            .read(&mut chunk[..want])
            .await
            .map_err(|_| Error::Closed)?;
        if n == 0 {
            return Err(Error::Closed);
        }
        delivered += n;
        sink.on_body(&chunk[..n], delivered == content_length)
            .map_err(Error::Aborted)?;
    }

    Ok(status)
}
