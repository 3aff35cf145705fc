use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dragonlink_lib::capture::parse_capture;
use dragonlink_lib::constants::{
    DEFAULT_OUTPUT_FILE, DEFAULT_PLACEHOLDER, DEFAULT_REPLAY_TIMEOUT_SECS, DEFAULT_TEMPLATE_FILE,
    DRAGONLINK_MANUFACTURER, DRAGONLINK_PRODUCT,
};
use dragonlink_lib::error::{DlError, describe_exit};
use dragonlink_lib::{
    DeviceAddress, DeviceEnumerator, DeviceSignature, IdInjector, InjectorConfig, NusbEnumerator, TokioProcessRunner,
    encode,
};

/// Assign an ID to a DragonLink receiver by replaying a patched USB packet.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Patch the template with an ID and replay it to the device.
    Inject(InjectArgs),
    /// Print the wire code for an ID without touching any device.
    Encode {
        /// ID to encode (0-999)
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// List attached USB devices and mark the ones matching the signature.
    ListDevices {
        #[command(flatten)]
        signature: SignatureArgs,
    },
    /// Show the transfers in a capture file and where the placeholder sits.
    Inspect {
        /// Capture file written by usbsniff
        #[arg(default_value = DEFAULT_TEMPLATE_FILE)]
        file: PathBuf,
        /// Token marking the ID field
        #[arg(short, long, default_value = DEFAULT_PLACEHOLDER)]
        placeholder: String,
    },
}

#[derive(clap::Args, Debug)]
struct SignatureArgs {
    /// USB manufacturer string to match
    #[arg(long, default_value = DRAGONLINK_MANUFACTURER)]
    manufacturer: String,
    /// USB product string to match
    #[arg(long, default_value = DRAGONLINK_PRODUCT)]
    product: String,
}

impl SignatureArgs {
    fn signature(&self) -> DeviceSignature {
        DeviceSignature::new(&self.manufacturer, &self.product)
    }
}

#[derive(clap::Args, Debug)]
struct InjectArgs {
    /// ID to assign (0-999)
    #[arg(allow_negative_numbers = true)]
    id: i64,
    /// Captured packet containing the placeholder
    #[arg(short, long, default_value = DEFAULT_TEMPLATE_FILE)]
    template: PathBuf,
    /// Where to write the patched packet
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,
    /// Token marking the ID field
    #[arg(short, long, default_value = DEFAULT_PLACEHOLDER)]
    placeholder: String,
    /// Directory holding the usb_replay_<arch> tools
    #[arg(long, default_value = ".")]
    tool_dir: PathBuf,
    /// Replay tool to use instead of the one for this architecture
    #[arg(long)]
    binary: Option<PathBuf>,
    /// Run the replay tool through `sudo -n` (credentials must already be cached)
    #[arg(long)]
    sudo: bool,
    /// Give up on the replay tool after this many seconds
    #[arg(long, default_value_t = DEFAULT_REPLAY_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Device address (vvvv:pppp), skips USB discovery
    #[arg(short, long)]
    address: Option<DeviceAddress>,
    #[command(flatten)]
    signature: SignatureArgs,
    /// Write the patched packet but do not replay it
    #[arg(long)]
    dry_run: bool,
}

impl InjectArgs {
    fn config(&self) -> InjectorConfig {
        InjectorConfig {
            template_path: self.template.clone(),
            output_path: self.output.clone(),
            placeholder: self.placeholder.clone(),
            signature: self.signature.signature(),
            address: self.address,
            tool_dir: self.tool_dir.clone(),
            binary: self.binary.clone(),
            elevate: self
                .sudo
                .then(|| vec!["sudo".to_string(), "-n".to_string()]),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn setup_logging(
    log_file_path: Option<PathBuf>,
    verbosity: &Verbosity<InfoLevel>,
) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path)
            .with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, -v for DEBUG, RUST_LOG still wins
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> ExitCode {
    run(Cli::parse()).await
}

/// Runs one command. The log guard is dropped before returning so the file
/// writer is flushed before the process exits.
async fn run(cli: Cli) -> ExitCode {
    let _guard = match setup_logging(cli.log_file, &cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Command::Inject(args) => run_inject(args).await,
        Command::Encode { id } => run_encode(id),
        Command::ListDevices { signature } => run_list_devices(&signature.signature()),
        Command::Inspect { file, placeholder } => run_inspect(file, &placeholder),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_inject(args: InjectArgs) -> Result<()> {
    let injector = IdInjector::new(NusbEnumerator, TokioProcessRunner, args.config());

    if args.dry_run {
        let prepared = injector.prepare(args.id)?;
        println!(
            "Dry run: ID {} encoded as {} ({}), packet written to {:?}",
            prepared.id, prepared.code, prepared.padded_code, prepared.output_path
        );
        println!(
            "Would run: {}",
            injector
                .invoker()
                .command(&prepared.address, &prepared.output_path, &prepared.binary)
        );
        return Ok(());
    }

    match injector.run(args.id).await {
        Ok(report) => {
            println!("STDOUT: {}", report.result.stdout);
            println!("STDERR: {}", report.result.stderr);
            println!("Return Code: {}", describe_exit(&report.result.exit_code));
            println!(
                "Worked! Injected ID = [{}] to {} dragonlink",
                report.prepared.id, report.prepared.address
            );
            Ok(())
        }
        Err(DlError::ReplayFailed {
            id,
            address,
            exit_code,
            stdout,
            stderr,
        }) => {
            println!("STDOUT: {}", stdout);
            println!("STDERR: {}", stderr);
            println!("Return Code: {}", describe_exit(&exit_code));
            anyhow::bail!(
                "Failed to inject ID {} to {}, err code == {}\nUSB driver replay requires root, did you pass --sudo or run as root?",
                id,
                address,
                describe_exit(&exit_code)
            )
        }
        Err(e) => Err(e).context("ID injection aborted"),
    }
}

fn run_encode(id: i64) -> Result<()> {
    let code = encode(id)?;
    println!("{} -> {} (packet field {})", id, code, code.padded());
    Ok(())
}

fn run_list_devices(signature: &DeviceSignature) -> Result<()> {
    let descriptors = NusbEnumerator
        .descriptors()
        .context("Failed to list USB devices")?;

    if descriptors.is_empty() {
        info!("No USB devices found.");
        return Ok(());
    }

    for descriptor in &descriptors {
        let marker = if signature.matches(descriptor) { "*" } else { " " };
        println!("{} {}", marker, descriptor);
    }
    let matching = descriptors.iter().filter(|d| signature.matches(d)).count();
    info!("{} device(s), {} matching {}", descriptors.len(), matching, signature);
    Ok(())
}

fn run_inspect(file: PathBuf, placeholder: &str) -> Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("Failed to read capture {:?}", file))?;
    let text = String::from_utf8_lossy(&bytes);
    let records = parse_capture(&text).with_context(|| format!("Failed to parse capture {:?}", file))?;

    let mut tagged = 0;
    for record in &records {
        let marker = if record.contains(placeholder) {
            tagged += 1;
            "*"
        } else {
            " "
        };
        println!(
            "{} line {:>4}: {} ({} bytes)",
            marker,
            record.line,
            record,
            record.payload_bytes().len()
        );
    }
    println!(
        "{} transfer(s), {} containing placeholder {:?}",
        records.len(),
        tagged,
        placeholder
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_is_flushed_to_log_file() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let log_path = dir.path().join("dragonlink.log");
        let args: Vec<std::ffi::OsString> = vec![
            "dragonlink".into(),
            "--log-file".into(),
            log_path.clone().into_os_string(),
            "encode".into(),
            "1000".into(),
        ];
        let cli = Cli::try_parse_from(args).expect("arguments should parse");

        let code = run(cli).await;
        assert_eq!(format!("{:?}", code), format!("{:?}", ExitCode::FAILURE));

        let log = std::fs::read_to_string(&log_path).expect("log file missing");
        assert!(log.contains("ID 1000 is out of range"), "log was: {:?}", log);
    }

    #[test]
    fn test_sudo_flag_runs_non_interactive() {
        let cli = Cli::try_parse_from(["dragonlink", "inject", "321", "--sudo"]).expect("arguments should parse");
        let Command::Inject(args) = cli.command else {
            panic!("expected inject command");
        };
        assert_eq!(
            args.config().elevate,
            Some(vec!["sudo".to_string(), "-n".to_string()])
        );
    }
}
