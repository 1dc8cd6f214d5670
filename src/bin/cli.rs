//! Switchboard CLI Client
//!
//! Sends one command to a Switchboard server and prints the events that
//! follow.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use switchboard::protocol::{read_frame, write_frame, Frame};
use switchboard::{params, Message, Params, SwitchboardError, Value, API_VERSION};

/// Switchboard CLI
#[derive(Parser, Debug)]
#[command(name = "switchboard-cli")]
#[command(about = "CLI for the Switchboard communications engine")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1720")]
    server: String,

    /// API version to request
    #[arg(long, default_value_t = API_VERSION)]
    api_version: u32,

    /// Engine options for the session
    #[arg(short, long, default_value = "")]
    options: String,

    /// How long to print events after the response (milliseconds)
    #[arg(short, long, default_value = "2000")]
    wait_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Place a call
    Call {
        /// Called party URI, e.g. sip:alice@example.com
        party_b: String,
    },

    /// Register an address of record
    Register {
        /// Protocol prefix (sip, h323, iax2, ...)
        protocol: String,

        /// Address of record
        identifier: String,

        /// Subscribe to an event package as well
        #[arg(long)]
        event_package: Option<String>,
    },

    /// Send an arbitrary command: TAG [key=value ...]
    Raw {
        tag: String,
        params: Vec<String>,
    },
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), SwitchboardError> {
    let stream = TcpStream::connect(&args.server)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream.try_clone()?);

    write_frame(
        &mut writer,
        &Frame::Hello {
            version: args.api_version,
            options: args.options.clone(),
        },
    )?;
    match read_frame(&mut reader)? {
        Frame::Welcome { version } => println!("session opened, api version {}", version),
        Frame::Failure(reason) => return Err(SwitchboardError::Network(reason)),
        other => {
            return Err(SwitchboardError::Protocol(format!(
                "unexpected {:?} frame",
                other.kind()
            )))
        }
    }

    write_frame(&mut writer, &Frame::Command(build_command(args.command)?))?;

    // Print frames until the wait window closes
    let deadline = Instant::now() + Duration::from_millis(args.wait_ms);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        stream.set_read_timeout(Some(remaining))?;

        match read_frame(&mut reader) {
            Ok(Frame::Response(message)) => print_message("response", &message),
            Ok(Frame::Event(message)) => print_message("event", &message),
            Ok(Frame::Failure(reason)) => return Err(SwitchboardError::Network(reason)),
            Ok(other) => println!("ignoring {:?} frame", other.kind()),
            Err(SwitchboardError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                break
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

fn build_command(command: Commands) -> Result<Message, SwitchboardError> {
    let message = match command {
        Commands::Call { party_b } => Message::command("call-setup", params! { "party-b" => party_b }),
        Commands::Register {
            protocol,
            identifier,
            event_package,
        } => {
            let mut params = params! { "protocol" => protocol, "identifier" => identifier };
            if let Some(package) = event_package {
                params.insert("event-package".to_string(), Value::from(package));
            }
            Message::command("registration", params)
        }
        Commands::Raw { tag, params: pairs } => {
            let mut params = Params::new();
            for pair in pairs {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    SwitchboardError::Protocol(format!("expected key=value, got '{}'", pair))
                })?;
                params.insert(key.to_string(), Value::from(value));
            }
            Message::command(tag.as_str(), params)
        }
    };
    Ok(message)
}

fn print_message(label: &str, message: &Message) {
    let params: Vec<String> = message
        .params()
        .iter()
        .map(|(k, v)| format!("{}={}", k, render(v)))
        .collect();
    println!("{} {} {}", label, message.tag(), params.join(" "));
}

fn render(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        Value::Integer(n) => n.to_string(),
        Value::Flag(b) => b.to_string(),
        Value::Fields(fields) => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, render(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}
