use chrono::{DateTime, SecondsFormat, Utc};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use simtemp::protocol::{CommandType, Request, Response};
use simtemp::{Attribute, Sample};
use std::time::{Duration, Instant, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8090";
const DEFAULT_DEVICE: &str = "0";
const DEFAULT_TEST_THRESHOLD_MC: &str = "20000";
const DEFAULT_MAX_PERIODS: &str = "2";
const MIN_TEST_WAIT: Duration = Duration::from_millis(500);

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn sampling_args<'a, 'b>() -> [Arg<'a, 'b>; 2] {
    [
        Arg::with_name("sampling-ms")
            .long("sampling-ms")
            .value_name("MS")
            .help("Sampling interval in milliseconds (clamped to 5..=5000)")
            .takes_value(true)
            .conflicts_with("sampling-us"),
        Arg::with_name("sampling-us")
            .long("sampling-us")
            .value_name("US")
            .help("Sampling interval in microseconds, rounded down to whole milliseconds")
            .takes_value(true),
    ]
}

fn threshold_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("threshold-mc")
        .long("threshold-mc")
        .value_name("MILLI_C")
        .help("Alert threshold in milli-degrees Celsius")
        .takes_value(true)
        .allow_hyphen_values(true)
}

fn mode_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("mode")
        .long("mode")
        .value_name("MODE")
        .help("Simulation mode")
        .takes_value(true)
        .possible_values(&["normal", "noisy", "ramp"])
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = App::new("simtemp")
        .version("0.1.0")
        .about("🌡️  Simulated temperature sensor client")
        .setting(AppSettings::VersionlessSubcommands)
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Daemon host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Daemon port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("device")
                .short("d")
                .long("device")
                .value_name("ID")
                .help("Device id")
                .takes_value(true)
                .default_value(DEFAULT_DEVICE)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("stream")
                .about("📈 Print samples as they arrive (default)")
                .arg(
                    Arg::with_name("count")
                        .long("count")
                        .value_name("N")
                        .help("Stop after N samples")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("duration")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds")
                        .takes_value(true),
                )
                .args(&sampling_args())
                .arg(threshold_arg())
                .arg(mode_arg()),
        )
        .subcommand(
            SubCommand::with_name("test")
                .about("🧪 Check that a threshold alert is raised")
                .long_about(
                    "Lowers the threshold, waits for an alert sample and restores the previous configuration",
                )
                .args(&sampling_args())
                .arg(threshold_arg().default_value(DEFAULT_TEST_THRESHOLD_MC))
                .arg(mode_arg())
                .arg(
                    Arg::with_name("max-periods")
                        .long("max-periods")
                        .value_name("P")
                        .help("Sampling periods to wait for an alert")
                        .takes_value(true)
                        .default_value(DEFAULT_MAX_PERIODS),
                ),
        )
        .subcommand(SubCommand::with_name("stats").about("📊 Show device counters and buffer state"))
        .subcommand(
            SubCommand::with_name("get")
                .about("🔎 Read one attribute")
                .arg(
                    Arg::with_name("attr")
                        .help("Attribute name")
                        .required(true)
                        .possible_values(&["sampling_ms", "threshold_mC", "mode", "stats"]),
                ),
        )
        .subcommand(
            SubCommand::with_name("set")
                .about("✏️  Write one attribute")
                .arg(
                    Arg::with_name("attr")
                        .help("Attribute name")
                        .required(true)
                        .possible_values(&["sampling_ms", "threshold_mC", "mode"]),
                )
                .arg(
                    Arg::with_name("value")
                        .help("New value")
                        .required(true)
                        .allow_hyphen_values(true),
                ),
        )
        .subcommand(SubCommand::with_name("poll").about("🔔 Show readiness without reading"))
        .subcommand(SubCommand::with_name("list").about("📟 List attached devices"))
        .get_matches();

    let sub_matches = match matches.subcommand() {
        (_, Some(sub)) => Some(sub),
        _ => None,
    };
    let host = global_value(&matches, sub_matches, "host").unwrap_or(DEFAULT_HOST);
    let port = global_value(&matches, sub_matches, "port")
        .unwrap_or(DEFAULT_PORT)
        .parse::<u16>()?;
    let device = global_value(&matches, sub_matches, "device")
        .unwrap_or(DEFAULT_DEVICE)
        .parse::<u32>()?;

    let mut client = Client::connect(host, port, device).await?;

    match matches.subcommand() {
        ("test", Some(sub)) => {
            let passed = handle_test(&mut client, sub).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        ("stats", _) => handle_stats(&mut client).await?,
        ("get", Some(sub)) => {
            let attr = sub.value_of("attr").ok_or("missing attribute")?;
            println!("{}", client.get(attr).await?);
        }
        ("set", Some(sub)) => {
            let attr = sub.value_of("attr").ok_or("missing attribute")?;
            let value = sub.value_of("value").ok_or("missing value")?;
            client.set(attr, value).await?;
            println!("{} {} set to {}", "✅".green(), attr.bright_white(), value.bright_cyan());
        }
        ("poll", _) => handle_poll(&mut client).await?,
        ("list", _) => handle_list(&mut client).await?,
        ("stream", Some(sub)) => handle_stream(client, Some(sub)).await?,
        _ => handle_stream(client, None).await?,
    }

    Ok(())
}

/// Global args may be given before or after the subcommand; an explicit
/// value on the subcommand wins over the top-level one.
fn global_value<'a>(
    matches: &'a ArgMatches<'a>,
    sub: Option<&'a ArgMatches<'a>>,
    name: &str,
) -> Option<&'a str> {
    match sub {
        Some(sub) if sub.occurrences_of(name) > 0 => sub.value_of(name),
        _ => matches.value_of(name),
    }
}

/// JSON-line connection to `simtempd`, bound to one device.
struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    device: u32,
}

impl Client {
    async fn connect(host: &str, port: u16, device: u32) -> CliResult<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("{} Failed to connect to simtempd at {}", "❌".red(), addr.bright_white());
                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    eprintln!("{} Daemon is not running. Start it with:", "💡".yellow());
                    eprintln!("   {}", "simtempd".bright_cyan());
                }
                return Err(e.into());
            }
        };

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            device,
        })
    }

    async fn request(&mut self, command: CommandType) -> CliResult<Response> {
        let request = Request {
            device: self.device,
            command,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply).await? == 0 {
            return Err("simtempd closed the connection".into());
        }
        Ok(serde_json::from_str(reply.trim())?)
    }

    async fn get(&mut self, attr: &str) -> CliResult<String> {
        match self
            .request(CommandType::Get {
                attr: attr.to_owned(),
            })
            .await?
        {
            Response::Value { value, .. } => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    async fn set(&mut self, attr: &str, value: &str) -> CliResult<()> {
        match self
            .request(CommandType::Set {
                attr: attr.to_owned(),
                value: value.to_owned(),
            })
            .await?
        {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Blocking read bounded by `timeout`; `None` once it expires.
    async fn read(&mut self, timeout: Option<Duration>) -> CliResult<Option<Sample>> {
        let command = CommandType::Read {
            blocking: true,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        };
        match self.request(command).await? {
            Response::Sample { sample, .. } => Ok(Some(sample)),
            Response::Error { ref kind, .. } if kind == "timed_out" => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Drops samples already buffered.
    async fn drain(&mut self) -> CliResult<usize> {
        let mut drained = 0;
        loop {
            let command = CommandType::Read {
                blocking: false,
                timeout_ms: None,
            };
            match self.request(command).await? {
                Response::Sample { .. } => drained += 1,
                Response::Error { ref kind, .. } if kind == "would_block" => return Ok(drained),
                other => return Err(unexpected(other)),
            }
        }
    }
}

fn unexpected(response: Response) -> Box<dyn std::error::Error> {
    match response {
        Response::Error { kind, message } => format!("{}: {}", kind, message).into(),
        other => format!("unexpected response: {:?}", other).into(),
    }
}

fn sampling_us_to_ms(us: u64) -> u32 {
    u32::try_from((us / 1000).max(1)).unwrap_or(u32::MAX)
}

fn sampling_override(matches: &ArgMatches<'_>) -> CliResult<Option<u32>> {
    if let Some(ms) = matches.value_of("sampling-ms") {
        return Ok(Some(ms.parse()?));
    }
    if let Some(us) = matches.value_of("sampling-us") {
        return Ok(Some(sampling_us_to_ms(us.parse()?)));
    }
    Ok(None)
}

fn format_timestamp(timestamp_ns: u64) -> String {
    let time: DateTime<Utc> = (UNIX_EPOCH + Duration::from_nanos(timestamp_ns)).into();
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_sample(sample: &Sample) -> String {
    format!(
        "{} temp={:.1}C alert={} flags=0x{:02x}",
        format_timestamp(sample.timestamp_ns),
        sample.temp_celsius(),
        u8::from(sample.is_alert()),
        sample.flags.bits()
    )
}

async fn handle_stream(mut client: Client, matches: Option<&ArgMatches<'_>>) -> CliResult<()> {
    let mut count_limit = None;
    let mut deadline = None;

    if let Some(matches) = matches {
        if let Some(ms) = sampling_override(matches)? {
            client.set(Attribute::SamplingMs.name(), &ms.to_string()).await?;
        }
        if let Some(threshold) = matches.value_of("threshold-mc") {
            client.set(Attribute::ThresholdMc.name(), threshold).await?;
        }
        if let Some(mode) = matches.value_of("mode") {
            client.set(Attribute::Mode.name(), mode).await?;
        }
        if let Some(count) = matches.value_of("count") {
            count_limit = Some(count.parse::<u64>()?);
        }
        if let Some(seconds) = matches.value_of("duration") {
            deadline = Some(Instant::now() + Duration::try_from_secs_f64(seconds.parse()?)?);
        }
    }

    let mut printed = 0u64;
    loop {
        if count_limit.map_or(false, |limit| printed >= limit) {
            break;
        }
        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                Some(remaining)
            }
            None => None,
        };

        // An interrupt can drop the read mid-request, leaving its reply
        // unread; the client is owned here and dropped with it.
        let sample = tokio::select! {
            sample = client.read(timeout) => sample?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };
        match sample {
            Some(sample) => {
                let line = format_sample(&sample);
                if sample.is_alert() {
                    println!("{}", line.yellow());
                } else {
                    println!("{}", line);
                }
                printed += 1;
            }
            None => break,
        }
    }

    Ok(())
}

struct Snapshot {
    sampling_ms: String,
    threshold_mc: String,
    mode: String,
}

async fn handle_test(client: &mut Client, matches: &ArgMatches<'_>) -> CliResult<bool> {
    let original = Snapshot {
        sampling_ms: client.get(Attribute::SamplingMs.name()).await?,
        threshold_mc: client.get(Attribute::ThresholdMc.name()).await?,
        mode: client.get(Attribute::Mode.name()).await?,
    };
    let sampling = sampling_override(matches)?;
    let mode = matches.value_of("mode");
    let threshold = matches
        .value_of("threshold-mc")
        .unwrap_or(DEFAULT_TEST_THRESHOLD_MC);
    let max_periods: u32 = matches
        .value_of("max-periods")
        .unwrap_or(DEFAULT_MAX_PERIODS)
        .parse()?;

    let outcome = run_test(client, sampling, mode, threshold, max_periods).await;

    client.set(Attribute::ThresholdMc.name(), &original.threshold_mc).await?;
    if sampling.is_some() {
        client.set(Attribute::SamplingMs.name(), &original.sampling_ms).await?;
    }
    if mode.is_some() {
        client.set(Attribute::Mode.name(), &original.mode).await?;
    }

    outcome
}

async fn run_test(
    client: &mut Client,
    sampling: Option<u32>,
    mode: Option<&str>,
    threshold: &str,
    max_periods: u32,
) -> CliResult<bool> {
    if let Some(ms) = sampling {
        client.set(Attribute::SamplingMs.name(), &ms.to_string()).await?;
    }
    if let Some(mode) = mode {
        client.set(Attribute::Mode.name(), mode).await?;
    }
    client.set(Attribute::ThresholdMc.name(), threshold).await?;

    // Buffered samples were flagged against the previous threshold.
    client.drain().await?;

    let period_ms: u64 = client.get(Attribute::SamplingMs.name()).await?.parse()?;
    let wait = (Duration::from_millis(period_ms) * max_periods).max(MIN_TEST_WAIT);
    let deadline = Instant::now() + wait;

    let mut seen = 0u32;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let sample = match client.read(Some(remaining)).await? {
            Some(sample) => sample,
            None => break,
        };
        seen += 1;
        if sample.is_alert() {
            println!(
                "{} alert observed after {} sample(s) at {} temp={:.1}C flags=0x{:02x}",
                "PASS:".bright_green().bold(),
                seen,
                format_timestamp(sample.timestamp_ns),
                sample.temp_celsius(),
                sample.flags.bits()
            );
            return Ok(true);
        }
    }

    println!(
        "{} no threshold alert within {} period(s) (sampling_ms={})",
        "FAIL:".bright_red().bold(),
        max_periods,
        period_ms
    );
    Ok(false)
}

async fn handle_stats(client: &mut Client) -> CliResult<()> {
    match client.request(CommandType::Stats).await? {
        Response::Stats { report } => {
            println!("{}", "📊 Device Statistics".bright_blue().bold());
            println!("  {:<14} {}", "updates:", report.stats.updates.to_string().bright_white());
            println!("  {:<14} {}", "alerts:", report.stats.alerts.to_string().yellow());
            println!("  {:<14} {}", "errors:", report.stats.errors.to_string().red());
            println!("{}", "⚙️  Configuration".bright_blue().bold());
            println!("  {:<14} {}", "sampling_ms:", report.config.sampling_ms);
            println!("  {:<14} {}", "threshold_mC:", report.config.threshold_mc);
            println!("  {:<14} {}", "mode:", report.config.mode.to_string().bright_cyan());
            println!("{}", "🗃️  Buffer".bright_blue().bold());
            println!(
                "  {:<14} {}/{} ({} alert)",
                "buffered:",
                report.buffer.buffered,
                report.buffer.capacity,
                report.buffer.alerts_buffered
            );
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn handle_poll(client: &mut Client) -> CliResult<()> {
    match client.request(CommandType::Poll).await? {
        Response::Readiness { readiness, mask } => {
            let flag = |set: bool| if set { "yes".green() } else { "no".dimmed() };
            println!(
                "readable={} alert={} closed={} mask=0x{:x}",
                flag(readiness.readable),
                flag(readiness.alert_pending),
                flag(readiness.closed),
                mask
            );
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

async fn handle_list(client: &mut Client) -> CliResult<()> {
    match client.request(CommandType::List).await? {
        Response::Devices { ids } => {
            for id in ids {
                println!("simtemp{}", id);
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}
