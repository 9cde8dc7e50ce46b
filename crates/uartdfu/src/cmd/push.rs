use crate::cmd::PushArgs;
use crate::exit::CliResult;
use crate::output::OutputFormat;

#[cfg(unix)]
pub fn run(args: PushArgs, format: OutputFormat) -> CliResult<i32> {
    use uartdfu_peer::{open_requester, LinkConfig};

    use crate::cmd::{check_chunk_size, parse_duration};
    use crate::exit::{dfu_error, io_error, SUCCESS};
    use crate::output::{print_transfer, throughput, TransferReport, TRANSFER_SCHEMA_ID};
    use crate::transfer::{send_image, with_image_header};

    let timeout = parse_duration(&args.timeout)?;
    let config = LinkConfig::default().with_timeout(timeout);
    check_chunk_size(args.chunk_size, config.max_chunk_size())?;

    let raw = std::fs::read(&args.image).map_err(|err| {
        io_error(&format!("failed reading {}", args.image.display()), err)
    })?;
    let image = with_image_header(raw);

    let (mut requester, pump) = open_requester(&args.device, args.baud, &config)
        .map_err(|err| dfu_error("open failed", err))?;
    tracing::info!(
        device = %args.device.display(),
        baud = args.baud,
        size = image.len(),
        "pushing image"
    );

    let stats = send_image(&mut requester, &image, args.image_id, args.chunk_size)
        .map_err(|err| dfu_error("transfer failed", err))?;
    pump.stop();

    let elapsed_ms = stats.elapsed.as_millis();
    let report = TransferReport {
        schema_id: TRANSFER_SCHEMA_ID,
        link: args.device.display().to_string(),
        image_id: args.image_id,
        image_size: image.len(),
        body_size: stats.body_size,
        resumed_from: stats.resumed_from,
        chunk_size: args.chunk_size,
        chunks: stats.chunks,
        elapsed_ms,
        bytes_per_second: throughput(stats.sent_bytes(), elapsed_ms),
        verified: None,
    };
    print_transfer(&report, format);
    Ok(SUCCESS)
}

#[cfg(not(unix))]
pub fn run(_args: PushArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "serial devices are only supported on Unix",
    ))
}
