/*
 * SPDX-FileCopyrightText: 2022 perillamint
 *
 * SPDX-License-Identifier: MPL-2.0
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use btserial_link::consts::{DEFAULT_BAUD, DEFAULT_PEER};
use btserial_link::{
    BackoffConfig, ChannelSink, ConnectionSupervisor, FrameCodec, LinkConfig, LinkError,
    LinkEvent, SerialTransport, TcpTransport, Transport,
};
use futures::StreamExt;
use log::{debug, error};
use pretty_hex::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::codec::FramedRead;

use clap::Parser;

#[macro_use]
extern crate lazy_static;

#[derive(clap::ArgEnum, Clone, Copy, Debug)]
enum TransportKind {
    Serial,
    Tcp,
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Args {
    #[clap(long, short = 't', arg_enum, value_name = "TRANSPORT", default_value = "serial")]
    transport: TransportKind,
    /// Serial device (/dev/rfcomm0, COM5) or host:port
    #[clap(long, short = 'p', value_name = "PEER", default_value = DEFAULT_PEER)]
    peer: String,
    #[clap(long, short = 'b', default_value_t = DEFAULT_BAUD)]
    baud: u32,
    /// First delay between failed connect attempts, 0 retries back to back
    #[clap(long, default_value_t = 100)]
    backoff_ms: u64,
    #[clap(long, default_value_t = 5000)]
    max_backoff_ms: u64,
    #[clap(long)]
    connect_timeout_ms: Option<u64>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Print everything the peer sends, send stdin lines to it
    Monitor,
    /// Send one message and quit
    Send { message: String },
    /// Print the frames found in a captured byte stream
    Decode { file: PathBuf },
}

lazy_static! {
    static ref ARGS: Args = Args::parse();
}

fn link_config() -> LinkConfig {
    let mut config = LinkConfig::new(ARGS.peer.clone()).with_backoff(BackoffConfig {
        initial: Duration::from_millis(ARGS.backoff_ms),
        max: Duration::from_millis(ARGS.max_backoff_ms.max(ARGS.backoff_ms)),
        ..BackoffConfig::default()
    });
    if let Some(ms) = ARGS.connect_timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }
    config
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let res = match (&ARGS.command, ARGS.transport) {
        (Command::Decode { file }, _) => decode(file).await,
        (_, TransportKind::Serial) => with_transport(SerialTransport::serial(ARGS.baud)).await,
        (_, TransportKind::Tcp) => with_transport(TcpTransport::tcp()).await,
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn with_transport<T: Transport + 'static>(transport: T) -> Result<(), LinkError> {
    let (sink, events) = ChannelSink::new();
    let supervisor = Arc::new(ConnectionSupervisor::new(
        transport,
        link_config(),
        Arc::new(sink),
    ));

    if let Command::Send { message } = &ARGS.command {
        if let Err(e) = supervisor.connect().await {
            error!("Could not reach {}", supervisor.peer());
            return Err(e);
        }
        let res = supervisor.send_text(message).await;
        supervisor.disconnect().await;
        return res;
    }

    monitor(supervisor, events).await
}

async fn monitor<T: Transport + 'static>(
    supervisor: Arc<ConnectionSupervisor<T>>,
    mut events: impl futures::Stream<Item = LinkEvent> + Unpin,
) -> Result<(), LinkError> {
    println!("Monitoring {} (Ctrl-C to stop)", supervisor.peer());
    let handle = supervisor.spawn();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(LinkEvent::Status { state, detail }) => println!("[{}] {}", state, detail),
                Some(LinkEvent::Message(payload)) => {
                    println!("{}", String::from_utf8_lossy(&payload));
                    debug!("{}", payload.hex_dump());
                }
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = supervisor.send_text(&line).await {
                        eprintln!("{}", e);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    eprintln!("stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    supervisor.shutdown();
    if let Err(e) = handle.await {
        error!("Supervisor task failed: {}", e);
    }
    Ok(())
}

async fn decode(file: &PathBuf) -> Result<(), LinkError> {
    let capture = tokio::fs::File::open(file).await?;
    let mut frames = FramedRead::new(capture, FrameCodec::default());

    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        let payload = frame?;
        count += 1;
        println!("#{} ({} bytes)\n{}\n", count, payload.len(), payload.hex_dump());
    }

    println!(
        "{} frame(s), {} junk byte(s) skipped, {} byte(s) of truncated frame dropped",
        count,
        frames.decoder().skipped(),
        frames.decoder().truncated()
    );
    Ok(())
}
