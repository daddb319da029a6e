use std::{
    net::{SocketAddr, UdpSocket},
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vmc_capture_core::{osc, Frame, OscMessage, ReceiverConfig, VmcReceiver, DEFAULT_VMC_PORT};

fn main() -> vmc_capture_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen(args) => run_listen(args),
        Commands::DefaultConfig => {
            let json = ReceiverConfig::default().to_json_pretty()?;
            println!("{json}");
            Ok(())
        }
        Commands::SendTest { target, frames } => run_send_test(target, frames),
    }
}

fn run_listen(args: ListenArgs) -> vmc_capture_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => ReceiverConfig::load(path)?,
        None => ReceiverConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_name = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.force_update |= args.force_update;
    config.debug |= args.debug;

    tracing::info!(
        bind = %config.bind_name,
        port = config.port,
        force_update = config.force_update,
        "starting VMC receiver"
    );
    let receiver = VmcReceiver::from_config(&config)?;

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut frame = Frame::default();
    let mut last_report = Instant::now();

    loop {
        receiver.copy_into(&mut frame);

        if last_report.elapsed() >= Duration::from_secs(1) {
            let diagnostics = receiver.diagnostics();
            tracing::info!(
                packets = diagnostics.total_packets_received,
                bones = frame.bones.len(),
                curves = frame.curves.len(),
                has_root = diagnostics.has_received_root_translation,
                "receiver status"
            );
            last_report = Instant::now();
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        thread::sleep(tick);
    }

    tracing::info!(
        packets = receiver.total_packets_received(),
        "stopping VMC receiver"
    );
    Ok(())
}

fn run_send_test(target: SocketAddr, frames: u32) -> vmc_capture_core::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    tracing::info!(%target, frames, "sending synthetic VMC frames");

    for i in 0..frames {
        let phase = f64::from(i) / 60.0;
        let messages = [
            OscMessage::new("/VMC/Ext/Root/Pos")
                .with_string("root")
                .with_floats([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
            OscMessage::new("/VMC/Ext/Bone/Pos")
                .with_string("Hips")
                .with_floats([0.0, 1.0 + 0.05 * phase.sin(), 0.0, 0.0, 0.0, 0.0, 1.0]),
            OscMessage::new("/VMC/Ext/Blend/Val")
                .with_string("Blink")
                .with_floats([phase.sin().abs()]),
            OscMessage::new("/VMC/Ext/Blend/Apply"),
            OscMessage::new("/VMC/Ext/OK"),
        ];
        socket.send_to(&osc::encode_bundle(&messages)?, target)?;
        thread::sleep(Duration::from_millis(16));
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Receiver host for VMC motion capture", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen for VMC data and report what arrives.
    Listen(ListenArgs),
    /// Print the default receiver configuration as JSON.
    DefaultConfig,
    /// Send synthetic VMC frames to a receiver.
    SendTest {
        /// Receiver address.
        #[arg(short, long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_VMC_PORT)))]
        target: SocketAddr,
        /// Number of frames to send.
        #[arg(short, long, default_value_t = 120)]
        frames: u32,
    },
}

#[derive(clap::Args, Debug)]
struct ListenArgs {
    /// JSON configuration file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Local address to bind.
    #[arg(short, long)]
    bind: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    /// Publish after every sample instead of waiting for frame markers.
    #[arg(long)]
    force_update: bool,
    /// Log packet summaries.
    #[arg(long)]
    debug: bool,
    /// Consumer tick interval in milliseconds.
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// Stop after this many seconds instead of running until killed.
    #[arg(long)]
    duration_secs: Option<u64>,
}
