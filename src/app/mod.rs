pub mod logging;
pub mod shutdown;

use crate::buffer::OutputBuffer;
use crate::config::{Cli, FlushMode};
use anyhow::Context;
use clap::Parser;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

/// Entry point of the `rask-output-buffer` binary: push every stdin line into
/// a buffer and close it at EOF or on SIGINT/SIGTERM.
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_level.into());

    let config = cli.buffer_config().context("invalid configuration")?;
    let buffer = OutputBuffer::new(config)?;

    match buffer.mode() {
        FlushMode::Ttl(ttl) => info!(
            "Buffering stdin to {} (flush every {}ms)",
            target_label(&buffer),
            ttl.as_millis()
        ),
        FlushMode::Size(size) => info!(
            "Buffering stdin to {} (flush at {} bytes)",
            target_label(&buffer),
            size
        ),
    }

    let stdin = BufReader::new(tokio::io::stdin());
    run(stdin, &buffer, shutdown::shutdown_signal()).await?;

    let stats = buffer.stats();
    info!(
        pushes = stats.pushes,
        flushes = stats.flushes,
        bytes = stats.bytes_flushed,
        rotations = stats.rotations,
        "Output buffer closed"
    );
    Ok(())
}

/// Pump `reader` into `buffer` until EOF or `shutdown`, then close the buffer.
/// The buffer is closed even when reading fails; the read error is returned
/// after the final flush.
pub async fn run<R, S>(reader: R, buffer: &OutputBuffer, shutdown: S) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    let pumped = tokio::select! {
        result = pump(reader, buffer) => Some(result),
        () = shutdown => None,
    };

    let closed = buffer.close().await.context("final flush failed");
    if let Some(result) = pumped {
        let lines = result?;
        info!("input closed after {} lines", lines);
    }
    closed
}

/// Push each line of `reader` into `buffer` as raw bytes, without its `\n`
/// or `\r\n` terminator. Returns the number of lines pushed.
pub async fn pump<R>(reader: R, buffer: &OutputBuffer) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    let mut count = 0;
    while let Some(mut line) = lines.next_segment().await.context("failed to read input")? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        buffer.push(line)?;
        count += 1;
    }
    Ok(count)
}

fn target_label(buffer: &OutputBuffer) -> String {
    buffer
        .filename()
        .map_or_else(|| "stdout".to_string(), |path| path.display().to_string())
}
