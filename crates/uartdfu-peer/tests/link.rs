#![cfg(unix)]

use std::os::unix::net::UnixStream;
use std::time::Duration;

use uartdfu_frame::{errno, IMAGE_HEADER_MAGIC};
use uartdfu_peer::{
    requester_over, responder_over, DfuError, ErrorKind, LinkConfig, MemoryBackend, Requester,
    ResponderHandle,
};
use uartdfu_transport::{RxPump, StreamPort};

type Link = (
    Requester<StreamPort<UnixStream>>,
    ResponderHandle<StreamPort<UnixStream>, MemoryBackend>,
    Vec<RxPump>,
);

fn config() -> LinkConfig {
    LinkConfig::default().with_timeout(Duration::from_secs(2))
}

fn link_with(backend: MemoryBackend, requester: LinkConfig, responder: LinkConfig) -> Link {
    let (near, far) = UnixStream::pair().unwrap();
    let (req, req_pump) = requester_over(near.try_clone().unwrap(), near, &requester).unwrap();
    let (resp, resp_pump) =
        responder_over(far.try_clone().unwrap(), far, backend, &responder).unwrap();
    (req, resp.spawn().unwrap(), vec![req_pump, resp_pump])
}

fn link(backend: MemoryBackend) -> Link {
    link_with(backend, config(), config())
}

fn image(len: usize) -> Vec<u8> {
    let mut image = IMAGE_HEADER_MAGIC.to_le_bytes().to_vec();
    image.extend((0..len).map(|i| (i % 251) as u8));
    image
}

#[test]
fn init_is_acknowledged() {
    let backend = MemoryBackend::new();
    let (mut req, handle, _pumps) = link(backend.clone());

    req.init(4096, 1).unwrap();

    handle.shutdown().unwrap();
    let state = backend.snapshot();
    assert_eq!(state.file_size, Some(4096));
    assert_eq!(state.image_id, Some(1));
}

#[test]
fn first_write_reaches_backend_without_header() {
    let backend = MemoryBackend::new();
    let (mut req, handle, _pumps) = link(backend.clone());

    req.init(4096, 1).unwrap();
    req.write(&[0xAA; 512]).unwrap();

    handle.shutdown().unwrap();
    let state = backend.snapshot();
    assert_eq!(state.writes, vec![508]);
    assert!(state.data.iter().all(|&b| b == 0xAA));
}

#[test]
fn offset_reports_stored_bytes() {
    let backend = MemoryBackend::new();
    backend.preload(&[0; 2048]);
    let (mut req, handle, _pumps) = link(backend);

    assert_eq!(req.offset_get().unwrap(), 2048);
    handle.shutdown().unwrap();
}

#[test]
fn full_transfer_delivers_image() {
    let backend = MemoryBackend::new();
    let (mut req, handle, _pumps) = link(backend.clone());

    let image = image(10_000);
    let body_len = (image.len() - 4) as u32;
    req.init(body_len, 0).unwrap();
    for chunk in image.chunks(1024) {
        req.write(chunk).unwrap();
    }
    assert_eq!(req.offset_get().unwrap(), body_len);
    req.done(true).unwrap();

    handle.shutdown().unwrap();
    let state = backend.snapshot();
    assert_eq!(state.data, &image[4..]);
    assert_eq!(state.finished, Some(true));
    assert_eq!(state.scheduled, Some(0));
}

#[test]
fn backend_error_is_returned_to_requester() {
    let backend = MemoryBackend::new();
    let (mut req, handle, _pumps) = link(backend);

    req.init(8, 0).unwrap();
    let err = req.write(&[0; 64]).unwrap_err();
    assert!(matches!(err, DfuError::Backend(code) if code == -errno::EFBIG));
    handle.shutdown().unwrap();
}

#[test]
fn silent_link_times_out_and_recovers() {
    let (near, far) = UnixStream::pair().unwrap();
    let quick = config().with_timeout(Duration::from_millis(100));
    let (mut req, _req_pump) = requester_over(near.try_clone().unwrap(), near, &quick).unwrap();

    let err = req.init(4, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // The unanswered request is still queued on the socket; the responder
    // answers it, and the next call must not mistake that reply for its own.
    let backend = MemoryBackend::new();
    backend.preload(&[0; 12]);
    let (resp, _resp_pump) =
        responder_over(far.try_clone().unwrap(), far, backend, &config()).unwrap();
    let handle = resp.spawn().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    req.set_timeout(Duration::from_secs(2));
    assert_eq!(req.offset_get().unwrap(), 12);
    handle.shutdown().unwrap();
}

#[test]
fn oversized_frame_is_dropped_by_responder() {
    let backend = MemoryBackend::new();
    let small = config().with_capacity(128);
    let quick = config().with_timeout(Duration::from_millis(200));
    let (mut req, handle, _pumps) = link_with(backend.clone(), quick, small);

    req.init(4096, 0).unwrap();
    let err = req.write(&[0; 512]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // Framing restarted; the link still works.
    assert_eq!(req.offset_get().unwrap(), 0);
    handle.shutdown().unwrap();
    assert!(backend.snapshot().writes.is_empty());
}

#[test]
fn aborted_session_is_still_scheduled() {
    let backend = MemoryBackend::new();
    let (mut req, handle, _pumps) = link(backend.clone());

    req.init(16, 3).unwrap();
    req.write(&image(8)).unwrap();
    req.done(false).unwrap();

    handle.shutdown().unwrap();
    let state = backend.snapshot();
    assert_eq!(state.finished, Some(false));
    assert_eq!(state.scheduled, Some(3));
    assert!(state.data.is_empty());
}
