use crate::cmd::SimulateArgs;
use crate::exit::CliResult;
use crate::output::OutputFormat;

const DEFAULT_SIZE: usize = 64 * 1024;

#[cfg(unix)]
pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    use std::os::unix::net::UnixStream;

    use uartdfu_frame::IMAGE_HEADER_SIZE;
    use uartdfu_peer::{requester_over, responder_over, LinkConfig, MemoryBackend};

    use crate::cmd::{check_chunk_size, parse_duration};
    use crate::exit::{dfu_error, io_error, CliError, DATA_INVALID, SUCCESS, USAGE};
    use crate::output::{print_transfer, throughput, TransferReport, TRANSFER_SCHEMA_ID};
    use crate::transfer::{send_image, with_image_header};

    let timeout = parse_duration(&args.timeout)?;
    let config = LinkConfig::default().with_timeout(timeout);
    check_chunk_size(args.chunk_size, config.max_chunk_size())?;

    let raw = match &args.image {
        Some(path) => std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => generated_image(args.size.unwrap_or(DEFAULT_SIZE)),
    };
    let image = with_image_header(raw);
    let body = &image[IMAGE_HEADER_SIZE..];
    if args.preload > body.len() {
        return Err(CliError::new(
            USAGE,
            format!("--preload must not exceed the image size ({})", body.len()),
        ));
    }

    let backend = MemoryBackend::new();
    backend.preload(&body[..args.preload]);

    let (near, far) = UnixStream::pair().map_err(|err| io_error("socket pair failed", err))?;
    let near_rx = near
        .try_clone()
        .map_err(|err| io_error("socket clone failed", err))?;
    let far_rx = far
        .try_clone()
        .map_err(|err| io_error("socket clone failed", err))?;

    let (responder, responder_pump) = responder_over(far_rx, far, backend.clone(), &config)
        .map_err(|err| dfu_error("responder setup failed", err))?;
    let worker = responder
        .spawn()
        .map_err(|err| dfu_error("responder setup failed", err))?;
    let (mut requester, requester_pump) = requester_over(near_rx, near, &config)
        .map_err(|err| dfu_error("requester setup failed", err))?;

    let transfer = send_image(&mut requester, &image, args.image_id, args.chunk_size);
    worker
        .shutdown()
        .map_err(|err| dfu_error("responder shutdown failed", err))?;
    drop(requester);
    responder_pump.stop();
    requester_pump.stop();
    let stats = transfer.map_err(|err| dfu_error("transfer failed", err))?;

    let state = backend.snapshot();
    let verified = state.data == body && state.scheduled == Some(args.image_id);
    if !verified {
        tracing::error!(
            received = state.data.len(),
            expected = body.len(),
            "received image does not match"
        );
    }

    let elapsed_ms = stats.elapsed.as_millis();
    let report = TransferReport {
        schema_id: TRANSFER_SCHEMA_ID,
        link: "simulated".to_string(),
        image_id: args.image_id,
        image_size: image.len(),
        body_size: stats.body_size,
        resumed_from: stats.resumed_from,
        chunk_size: args.chunk_size,
        chunks: stats.chunks,
        elapsed_ms,
        bytes_per_second: throughput(stats.sent_bytes(), elapsed_ms),
        verified: Some(verified),
    };
    print_transfer(&report, format);

    if verified {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(DATA_INVALID, "received image does not match"))
    }
}

#[cfg(not(unix))]
pub fn run(_args: SimulateArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "simulation requires Unix socket pairs",
    ))
}

fn generated_image(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_image_has_requested_size() {
        let image = generated_image(1000);
        assert_eq!(image.len(), 1000);
        assert_eq!(image[251], 0);
    }
}
