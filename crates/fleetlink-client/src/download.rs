//! Response assembly for artifact downloads: tee the body into the image
//! writer and keep progress accounting.

use crate::ports::{ImageSink, ResponseSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    Idle,
    Streaming,
    Complete,
}

/// Progress of one artifact download.
///
/// `downloaded_size` never exceeds `http_content_size`; the percentage is
/// `floor(100 * downloaded / total)` and only moves forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadState {
    pub http_content_size: usize,
    pub downloaded_size: usize,
    pub progress_percent: u8,
    pub status: DownloadStatus,
}

/// Streams a response body into the image writer.
pub struct ImageDownload<'a, W: ImageSink> {
    writer: &'a mut W,
    pub state: DownloadState,
}

impl<'a, W: ImageSink> ImageDownload<'a, W> {
    pub fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            state: DownloadState::default(),
        }
    }
}

impl<W: ImageSink> ResponseSink for ImageDownload<'_, W> {
    fn on_content_length(&mut self, length: usize) {
        self.state.http_content_size = length;
    }

    fn on_body(&mut self, chunk: &[u8], last: bool) -> Result<(), SinkError> {
        self.state.status = DownloadStatus::Streaming;
        self.writer
            .append_image(chunk, last)
            .map_err(|_| SinkError::Write)?;
        self.state.downloaded_size = self.writer.image_bytes_written();

        if self.state.http_content_size > 0 {
            let percent = (self.state.downloaded_size * 100 / self.state.http_content_size)
                .min(100) as u8;
            if percent > self.state.progress_percent {
                self.state.progress_percent = percent;
                log::debug!("download progress: {}%", percent);
            }
        }

        if last {
            self.state.status = DownloadStatus::Complete;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PlatformError;

    #[derive(Default)]
    struct RecordingWriter {
        received: usize,
        fail: bool,
    }

    impl ImageSink for RecordingWriter {
        fn begin_image(&mut self) -> Result<(), PlatformError> {
            self.received = 0;
            Ok(())
        }

        fn append_image(&mut self, chunk: &[u8], _last: bool) -> Result<(), PlatformError> {
            if self.fail {
                return Err(PlatformError::Flash);
            }
            self.received += chunk.len();
            Ok(())
        }

        fn image_bytes_written(&self) -> usize {
            self.received
        }
    }

    #[test]
    fn progress_is_monotone_and_bounded() {
        let mut writer = RecordingWriter::default();
        let mut download = ImageDownload::new(&mut writer);
        download.on_content_length(1000);

        let mut seen = 0u8;
        for i in 0..10 {
            download.on_body(&[0u8; 100], i == 9).unwrap();
            assert!(download.state.progress_percent >= seen);
            assert!(download.state.progress_percent <= 100);
            seen = download.state.progress_percent;
        }

        assert_eq!(download.state.progress_percent, 100);
        assert_eq!(download.state.downloaded_size, 1000);
        assert_eq!(download.state.status, DownloadStatus::Complete);
    }

    #[test]
    fn writer_failure_aborts_the_transfer() {
        let mut writer = RecordingWriter {
            fail: true,
            ..Default::default()
        };
        let mut download = ImageDownload::new(&mut writer);
        download.on_content_length(100);

        assert_eq!(
            download.on_body(&[0u8; 100], true),
            Err(SinkError::Write)
        );
        assert_eq!(download.state.status, DownloadStatus::Streaming);
    }

    #[test]
    fn percentage_is_floored() {
        let mut writer = RecordingWriter::default();
        let mut download = ImageDownload::new(&mut writer);
        download.on_content_length(3);

        download.on_body(&[0u8; 1], false).unwrap();
        assert_eq!(download.state.progress_percent, 33);
        download.on_body(&[0u8; 1], false).unwrap();
        assert_eq!(download.state.progress_percent, 66);
        download.on_body(&[0u8; 1], true).unwrap();
        assert_eq!(download.state.progress_percent, 100);
    }
}
