//! Streaming an image through a requester, shared by `push` and `simulate`.

use std::time::{Duration, Instant};

use uartdfu_frame::{errno, identify, IMAGE_HEADER_MAGIC, IMAGE_HEADER_SIZE};
use uartdfu_peer::{DfuError, Requester};
use uartdfu_transport::SerialPort;

/// Outcome of [`send_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStats {
    pub body_size: usize,
    pub resumed_from: usize,
    pub chunks: usize,
    pub elapsed: Duration,
}

impl TransferStats {
    /// Body bytes actually sent in this session.
    pub fn sent_bytes(&self) -> usize {
        self.body_size.saturating_sub(self.resumed_from)
    }
}

/// Prefix `image` with the UART image header unless it already carries one.
pub fn with_image_header(image: Vec<u8>) -> Vec<u8> {
    if identify(&image) {
        return image;
    }
    let mut framed = Vec::with_capacity(IMAGE_HEADER_SIZE + image.len());
    framed.extend_from_slice(&IMAGE_HEADER_MAGIC.to_le_bytes());
    framed.extend_from_slice(&image);
    framed
}

/// Send a header-prefixed image and finish the session.
///
/// The responder's reported offset after INIT decides where the body resumes;
/// the header always travels in the first write of the session and is
/// stripped before it is framed.
pub fn send_image<P: SerialPort>(
    requester: &mut Requester<P>,
    image: &[u8],
    image_id: u8,
    chunk_size: usize,
) -> Result<TransferStats, DfuError> {
    if !identify(image) {
        return Err(DfuError::InvalidArgument("image does not start with the image header"));
    }
    if chunk_size <= IMAGE_HEADER_SIZE {
        return Err(DfuError::InvalidArgument("chunk size must exceed the image header"));
    }
    let (header, body) = image.split_at(IMAGE_HEADER_SIZE);
    let body_size = u32::try_from(body.len())
        .map_err(|_| DfuError::InvalidArgument("image does not fit a 32-bit size"))?;

    let start = Instant::now();
    requester.init(body_size, image_id)?;

    let mut offset = requester.offset_get()? as usize;
    if offset > body.len() {
        tracing::warn!(offset, body_size, "responder holds more data than the image, restarting");
        requester.done(false)?;
        requester.init(body_size, image_id)?;
        offset = requester.offset_get()? as usize;
        if offset > body.len() {
            tracing::error!(offset, body_size, "responder kept its data across a restart");
            return Err(DfuError::Backend(-errno::EOVERFLOW));
        }
    }
    if offset > 0 {
        tracing::info!(offset, body_size, "resuming transfer");
    }
    let resumed_from = offset;

    let mut chunks = 0;
    if offset < body.len() {
        let take = (chunk_size - IMAGE_HEADER_SIZE).min(body.len() - offset);
        let mut first = Vec::with_capacity(IMAGE_HEADER_SIZE + take);
        first.extend_from_slice(header);
        first.extend_from_slice(&body[offset..offset + take]);
        requester.write(&first)?;
        offset += take;
        chunks += 1;

        for chunk in body[offset..].chunks(chunk_size) {
            requester.write(chunk)?;
            chunks += 1;
        }
    }

    requester.done(true)?;
    requester.schedule_update(image_id)?;

    Ok(TransferStats {
        body_size: body.len(),
        resumed_from,
        chunks,
        elapsed: start.elapsed(),
    })
}
