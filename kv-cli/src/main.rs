//! A line-oriented REPL client for the key/value store server.

use std::io::{self, BufRead, Read, Write};
use std::net::{SocketAddr, TcpStream};

use anyhow::{bail, Context};
use clap::Parser;
use kvstore::wire::{self, Request, Response};

/// Connects to a kvstore server and issues commands from stdin.
#[derive(Parser, Debug)]
#[command(name = "kv-cli", version, about)]
struct Args {
    /// Server address, e.g. 127.0.0.1:7878.
    addr: SocketAddr,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut stream = TcpStream::connect(args.addr)
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    stream.set_nodelay(true).ok();
    log::info!("connected to {}", args.addr);

    let stdin = io::stdin();
    let mut out = io::stdout();

    print!("> ");
    out.flush()?;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read from stdin")?;
        let line = line.trim();
        if line.is_empty() {
            print!("> ");
            out.flush()?;
            continue;
        }

        match parse_command(line) {
            Ok(Command::Exit) => break,
            Ok(Command::Request(req)) => match round_trip(&mut stream, &req) {
                Ok(resp) => println!("{}", format_response(&resp)),
                Err(e) => println!("error: {e}"),
            },
            Err(e) => println!("error: {e}"),
        }

        print!("> ");
        out.flush()?;
    }

    Ok(())
}

enum Command {
    Request(Request),
    Exit,
}

fn parse_command(line: &str) -> anyhow::Result<Command> {
    let mut parts = line.splitn(3, ' ');
    let cmd = parts.next().unwrap_or("");

    match cmd {
        "get" => {
            let key = parts.next().context("usage: get <key>")?;
            Ok(Command::Request(Request::Get { key: key.as_bytes().to_vec() }))
        }
        "set" => {
            let key = parts.next().context("usage: set <key> <value>")?;
            let value = parts.next().context("usage: set <key> <value>")?;
            Ok(Command::Request(Request::Set {
                key: key.as_bytes().to_vec(),
                value: value.as_bytes().to_vec(),
            }))
        }
        "del" => {
            let key = parts.next().context("usage: del <key>")?;
            Ok(Command::Request(Request::Delete { key: key.as_bytes().to_vec() }))
        }
        "lst" => Ok(Command::Request(Request::List)),
        "exit" | "quit" => Ok(Command::Exit),
        other => bail!("unrecognized command {other:?} (expected get/set/del/lst/exit)"),
    }
}

fn round_trip(stream: &mut TcpStream, req: &Request) -> anyhow::Result<Response> {
    let mut payload = [0u8; wire::MAX_MESSAGE_LEN];
    let payload_len = wire::encode_request(&mut payload, req).context("failed to encode request")?;

    let mut header = [0u8; wire::HEADER_LEN];
    wire::write_frame_header(&mut header, payload_len as u32)?;

    stream.write_all(&header)?;
    stream.write_all(&payload[..payload_len])?;

    let mut resp_header = [0u8; wire::HEADER_LEN];
    stream.read_exact(&mut resp_header)?;
    let resp_len = wire::read_frame_header(&resp_header)
        .context("server sent an invalid frame header")?
        .context("server closed the connection before sending a header")? as usize;

    let mut resp_payload = vec![0u8; resp_len];
    stream.read_exact(&mut resp_payload)?;

    wire::decode_response(&resp_payload).context("failed to decode server response")
}

fn format_response(resp: &Response) -> String {
    match resp {
        Response::Get { key, value: Some(v) } => {
            format!("{} = {}", String::from_utf8_lossy(key), String::from_utf8_lossy(v))
        }
        Response::Get { key, value: None } => {
            format!("{} is not set", String::from_utf8_lossy(key))
        }
        Response::Set { key, value } => {
            format!("set {} = {}", String::from_utf8_lossy(key), String::from_utf8_lossy(value))
        }
        Response::Delete { key } => format!("deleted {}", String::from_utf8_lossy(key)),
        Response::List { entries } => {
            if entries.is_empty() {
                "(empty)".to_string()
            } else {
                entries
                    .iter()
                    .map(|(k, v)| format!("{} = {}", String::from_utf8_lossy(k), String::from_utf8_lossy(v)))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Response::Unknown { raw } => format!("unknown response: {raw:?}"),
    }
}
