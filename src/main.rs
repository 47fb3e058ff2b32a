//! CLI entry point for `as4shell`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};

use as4shell::attachment::outgoing::create_outgoing_file;
use as4shell::attachment::Attachment;
use as4shell::compression::CompressionMode;
use as4shell::config::Config;
use as4shell::messaging::user::{DEFAULT_ROLE, DEFAULT_SERVICE, TEST_ACTION};
use as4shell::messaging::{
    As4Message, CollaborationInfo, MessageInfo, Party, PartyInfo, UserMessage,
};
use as4shell::pipeline::{self, InboundMessage};
use as4shell::pmode::{PModeLeg, PModeLegProtocol, PModeLegSecurity};
use as4shell::resource::ResourceManager;
use as4shell::soap::SoapVersion;

#[derive(Parser)]
#[command(
    name = "as4shell",
    version,
    about = "Build, package and inspect AS4/ebMS3 messages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an unsigned User Message and write it as a MIME file
    Pack {
        /// Files to attach
        #[arg(short, long = "attachment", value_name = "FILE")]
        attachments: Vec<PathBuf>,
        /// XML fragment to place in the SOAP Body
        #[arg(long, value_name = "FILE")]
        payload: Option<PathBuf>,
        /// Sending party id
        #[arg(long, default_value = "sender")]
        from: String,
        /// Receiving party id
        #[arg(long, default_value = "receiver")]
        to: String,
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,
        #[arg(long, default_value = TEST_ACTION)]
        action: String,
        /// Compress attachments (gzip unless the config names another codec)
        #[arg(short, long)]
        compress: bool,
        /// SOAP version: 1.1 or 1.2 (default from config)
        #[arg(long, value_name = "VERSION")]
        soap_version: Option<SoapVersion>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Split a MIME file into envelope and (decompressed) attachments
    Unpack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show what a stored message contains
    Inspect {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = as4shell::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Pack {
            attachments,
            payload,
            from,
            to,
            service,
            action,
            compress,
            soap_version,
            output,
        } => {
            let compression = compress.then(|| {
                config
                    .attachments
                    .default_compression
                    .unwrap_or(CompressionMode::Gzip)
            });
            let options = PackOptions {
                attachments: &attachments,
                payload: payload.as_deref(),
                from: &from,
                to: &to,
                service: &service,
                action: &action,
                compression,
                soap_version: soap_version.unwrap_or(config.mime.soap_version),
            };
            cmd_pack(&options, &output, &config)
        }
        Commands::Unpack { input, output } => cmd_unpack(&input, &output, &config),
        Commands::Inspect { input, json } => cmd_inspect(&input, json, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_file = as4shell::config::log_file_path(config);
    let log_dir = as4shell::config::cache_dir(config);
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "as4shell.log".into());
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "as4shell", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

struct PackOptions<'a> {
    attachments: &'a [PathBuf],
    payload: Option<&'a Path>,
    from: &'a str,
    to: &'a str,
    service: &'a str,
    action: &'a str,
    compression: Option<CompressionMode>,
    soap_version: SoapVersion,
}

/// Build a User Message and write it with its MIME headers.
fn cmd_pack(options: &PackOptions<'_>, output: &Path, config: &Config) -> anyhow::Result<()> {
    let res_mgr = config.resource_manager();

    let mut attachments = Vec::with_capacity(options.attachments.len());
    for path in options.attachments {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        attachments.push(create_outgoing_file(
            path,
            guess_mime_type(path),
            options.compression,
            &res_mgr,
        )?);
    }
    let payload = match options.payload {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => None,
    };

    let message: As4Message = UserMessage::create(
        MessageInfo::new(),
        PartyInfo {
            from: Party::new(options.from, DEFAULT_ROLE),
            to: Party::new(options.to, DEFAULT_ROLE),
        },
        CollaborationInfo::new(options.service, options.action),
        Vec::new(),
        payload,
        &attachments,
    )
    .into();

    // Signing needs a toolkit, which the CLI does not carry
    let leg = PModeLeg::new(
        PModeLegProtocol::new(None, options.soap_version),
        PModeLegSecurity::default(),
    );
    let outbound = pipeline::prepare_outbound(&message, attachments, &leg, None, &res_mgr)?;

    let mut out = BufWriter::new(File::create(output)?);
    match outbound.package() {
        Some(package) => package.write_message_to(&mut out, &res_mgr)?,
        None => outbound.write_to(&mut out, &res_mgr)?,
    }
    out.flush()?;

    let size = std::fs::metadata(output)?.len();
    println!(
        "  Wrote {} ({}, {} attachment(s))",
        output.display(),
        humansize::format_size(size, humansize::BINARY),
        outbound.attachments().len()
    );
    println!("  Message-Id: {}", message.message_info().message_id);

    let summary = res_mgr.close();
    if !summary.failed_deletions.is_empty() {
        tracing::warn!(
            failed = summary.failed_deletions.len(),
            "Temp file cleanup incomplete"
        );
    }
    Ok(())
}

/// Write the envelope and every attachment of a stored message to `output`.
fn cmd_unpack(input: &Path, output: &Path, config: &Config) -> anyhow::Result<()> {
    let res_mgr = config.resource_manager();
    let inbound = read_message(input, &res_mgr, config)?;

    std::fs::create_dir_all(output)?;
    std::fs::write(output.join("envelope.xml"), inbound.envelope.as_bytes())?;

    for att in &inbound.attachments {
        let name = attachment_file_name(att);
        let target = output.join(&name);
        let mut reader = att.uncompressed_stream(&res_mgr)?;
        let mut out = BufWriter::new(File::create(&target)?);
        let written = std::io::copy(&mut reader, &mut out)?;
        out.flush()?;
        println!(
            "  {:<40} {:>10}",
            name,
            humansize::format_size(written, humansize::BINARY)
        );
    }
    println!(
        "  Unpacked {} attachment(s) to {}",
        inbound.attachments.len(),
        output.display()
    );
    Ok(())
}

/// Print a summary of a stored message.
fn cmd_inspect(input: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let res_mgr = config.resource_manager();
    let inbound = read_message(input, &res_mgr, config)?;

    let mut sizes = Vec::with_capacity(inbound.attachments.len());
    for att in &inbound.attachments {
        let mut stream = att.content_stream(&res_mgr)?;
        sizes.push(std::io::copy(&mut stream, &mut std::io::sink())?);
    }

    if json {
        print_inspect_json(&inbound, &sizes)
    } else {
        print_inspect_table(input, &inbound, &sizes);
        Ok(())
    }
}

fn read_message(
    input: &Path,
    res_mgr: &ResourceManager,
    config: &Config,
) -> anyhow::Result<InboundMessage> {
    if !input.exists() {
        anyhow::bail!("File not found: {}", input.display());
    }
    let raw = std::fs::read(input)?;
    let threshold = config.attachments.in_memory_threshold;
    // A bare envelope has no MIME headers in front of it
    let starts_with_xml = raw
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<');
    let inbound = if starts_with_xml {
        pipeline::receive_inbound(
            SoapVersion::AS4_DEFAULT.mime_type(),
            &raw,
            res_mgr,
            threshold,
        )?
    } else {
        pipeline::receive_message(&raw, res_mgr, threshold)?
    };
    Ok(inbound)
}

/// File name for an unpacked attachment: the disposition filename, else the content ID.
fn attachment_file_name(att: &Attachment) -> String {
    let from_disposition = att
        .header("Content-Disposition")
        .and_then(|d| d.split("filename=").nth(1))
        .map(|f| f.trim().trim_matches('"'))
        .map(|f| {
            let name = Path::new(f).file_name().map(|n| n.to_string_lossy().into_owned());
            name.unwrap_or_default()
        })
        .filter(|f| !f.is_empty());
    let name = from_disposition.unwrap_or_else(|| {
        att.id()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect()
    });
    // Outgoing files were named before compression, the content is written decompressed
    match att.compression_mode() {
        Some(mode) => name
            .strip_suffix(mode.file_extension())
            .map(String::from)
            .unwrap_or(name),
        None => name,
    }
}

fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xml" => "application/xml",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "edi" => "application/edifact",
        "gz" => "application/gzip",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Print a message summary as a human-readable table.
fn print_inspect_table(path: &Path, inbound: &InboundMessage, sizes: &[u64]) {
    use humansize::{format_size, BINARY};

    let summary = &inbound.summary;
    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "SOAP version", summary.soap_version);
    if let Some(kind) = summary.kind {
        println!("  {:<20} {:?}", "Message kind", kind);
    }
    println!(
        "  {:<20} {}",
        "Message-Id",
        summary.message_id.as_deref().unwrap_or("-")
    );
    if let Some(ref ref_to) = summary.ref_to_message_id {
        println!("  {:<20} {}", "RefToMessageId", ref_to);
    }
    if let Some(ref ts) = summary.timestamp {
        println!("  {:<20} {}", "Timestamp", ts);
    }
    println!(
        "  {:<20} {}",
        "WS-Security",
        if summary.has_security_header { "yes" } else { "no" }
    );
    for code in &summary.error_codes {
        println!("  {:<20} {}", "Error", code);
    }

    if !inbound.attachments.is_empty() {
        println!();
        println!(
            "  {:<40} {:<24} {:<12} {:>10}",
            "Content-ID", "MIME type", "Compression", "Size"
        );
        println!("  {}", "-".repeat(89));
        for (att, size) in inbound.attachments.iter().zip(sizes) {
            let id: String = att.id().chars().take(39).collect();
            println!(
                "  {:<40} {:<24} {:<12} {:>10}",
                id,
                att.uncompressed_mime_type().unwrap_or("-"),
                att.compression_mode().map(|m| m.id()).unwrap_or("-"),
                format_size(*size, BINARY)
            );
        }
    }
    println!();
}

/// Print a message summary as JSON.
fn print_inspect_json(inbound: &InboundMessage, sizes: &[u64]) -> anyhow::Result<()> {
    let attachments: Vec<serde_json::Value> = inbound
        .attachments
        .iter()
        .zip(sizes)
        .map(|(att, size)| {
            serde_json::json!({
                "content_id": att.id(),
                "mime_type": att.uncompressed_mime_type(),
                "compression": att.compression_mode().map(|m| m.id()),
                "size": size,
            })
        })
        .collect();

    let output = serde_json::json!({
        "summary": inbound.summary,
        "attachments": attachments,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
