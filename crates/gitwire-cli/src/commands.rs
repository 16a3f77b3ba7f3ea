//! CLI command implementations.

use crate::config::Config;
use gitwire_pktline::{PeekReader, PktLine, PktLineError, PktLineReader};
use gitwire_protocol::{AdvRefs, ProtocolError, ServerResponse, UploadPackRequest};
use gitwire_transport::{
    Endpoint, EndpointError, PipeTransport, Protocol, Service, SmartHttpTransport, Stream,
    TransportError, TransportRegistry,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    PktLine(#[from] PktLineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Serialize)]
struct EndpointView<'a> {
    url: String,
    protocol: &'static str,
    user: &'a str,
    host: &'a str,
    port: u16,
    effective_port: Option<u16>,
    path: &'a str,
}

/// Parse an address and print its canonical form.
pub fn url<W: Write>(address: &str, json: bool, out: &mut W) -> Result<()> {
    let endpoint = Endpoint::parse(address)?;
    tracing::debug!(address = %address, endpoint = %endpoint, "parsed address");

    let view = EndpointView {
        url: endpoint.to_string(),
        protocol: endpoint.protocol.as_str(),
        user: &endpoint.user,
        host: &endpoint.host,
        port: endpoint.port,
        effective_port: endpoint.effective_port(),
        path: &endpoint.path,
    };

    if json {
        serde_json::to_writer_pretty(&mut *out, &view)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", view.url)?;
        writeln!(out, "  protocol: {}", view.protocol)?;
        if !view.user.is_empty() {
            writeln!(out, "  user:     {}", view.user)?;
        }
        if !view.host.is_empty() {
            writeln!(out, "  host:     {}", view.host)?;
        }
        if let Some(port) = view.effective_port {
            writeln!(out, "  port:     {port}")?;
        }
        writeln!(out, "  path:     {}", view.path)?;
    }
    Ok(())
}

/// Print every pkt-line of a stream.
pub fn pkt_dump<R: Read, W: Write>(input: R, out: &mut W) -> Result<()> {
    let mut reader = PktLineReader::new(input);
    let mut count = 0usize;
    while let Some(pkt) = reader.read()? {
        match pkt {
            PktLine::Flush => writeln!(out, "0000")?,
            PktLine::Data(data) => {
                writeln!(out, "{:04x} {}", data.len() + 4, data.escape_ascii())?;
            }
        }
        count += 1;
    }
    tracing::debug!(count, "dumped pkt-lines");
    Ok(())
}

/// Decode the ACK/NAK section of an upload-pack response.
pub fn acks<R: Read, W: Write>(input: R, multi_ack: bool, out: &mut W) -> Result<()> {
    let mut reader = PeekReader::new(input);
    let response = ServerResponse::decode(&mut reader, multi_ack)?;
    for ack in &response.acks {
        writeln!(out, "ACK {ack}")?;
    }

    let mut rest = Vec::new();
    reader.read_to_end(&mut rest)?;
    if !rest.is_empty() {
        writeln!(out, "({} bytes follow)", rest.len())?;
    }
    Ok(())
}

/// List the references of a remote repository.
pub fn ls_remote<W: Write>(address: &str, config: &Config, out: &mut W) -> Result<()> {
    let endpoint = prepare(address, config)?;
    let registry = TransportRegistry::with_defaults();
    let stream = connect(&endpoint, Service::UploadPack, config)?;
    let mut session = registry.open_upload_pack(&endpoint, stream)?;

    let adv = match session.advertised_references() {
        Ok(adv) => adv.clone(),
        Err(TransportError::EmptyRemoteRepository) => {
            tracing::info!(endpoint = %endpoint, "remote repository is empty");
            AdvRefs::new()
        }
        Err(e) => return Err(e.into()),
    };
    print_refs(&adv, out)?;
    session.close()?;
    Ok(())
}

/// Fetch a packfile for the given refs (all branches and tags when empty).
pub fn fetch<W: Write>(
    address: &str,
    refs: &[String],
    output: &Path,
    config: &Config,
    out: &mut W,
) -> Result<()> {
    let endpoint = prepare(address, config)?;
    let registry = TransportRegistry::with_defaults();
    let stream = connect(&endpoint, Service::UploadPack, config)?;
    let mut session = registry.open_upload_pack(&endpoint, stream)?;

    let adv = session.advertised_references()?.clone();
    let mut req = UploadPackRequest::new();
    req.request.capabilities = config.request_capabilities(&adv.capabilities);
    for (name, id) in &adv.references {
        let selected = refs.is_empty() || refs.iter().any(|r| r == name);
        if selected && !req.request.wants.contains(id) {
            req.request.wants.push(*id);
        }
    }
    if req.is_empty() {
        return Err(TransportError::EmptyUploadPackRequest.into());
    }

    tracing::info!(
        endpoint = %endpoint,
        wants = req.request.wants.len(),
        capabilities = %req.request.capabilities,
        "fetching"
    );
    let mut response = session.upload_pack(&req)?;
    let mut file = File::create(output)?;
    let written = io::copy(&mut response, &mut file)?;
    file.flush()?;

    writeln!(out, "wrote {written} bytes to {}", output.display())?;
    Ok(())
}

fn prepare(address: &str, config: &Config) -> Result<Endpoint> {
    let mut endpoint = Endpoint::parse(address)?;
    config.apply(&mut endpoint);
    Ok(endpoint)
}

fn print_refs<W: Write>(adv: &AdvRefs, out: &mut W) -> Result<()> {
    if let Some(head) = adv.head {
        writeln!(out, "{head}\tHEAD")?;
    }
    for (name, id) in &adv.references {
        writeln!(out, "{id}\t{name}")?;
        if let Some(peeled) = adv.peeled.get(name) {
            writeln!(out, "{peeled}\t{name}^{{}}")?;
        }
    }
    Ok(())
}

/// Opens the byte stream for an endpoint.
fn connect(endpoint: &Endpoint, service: Service, config: &Config) -> Result<Box<dyn Stream>> {
    match endpoint.protocol {
        Protocol::Git => {
            let host = endpoint.host.trim_start_matches('[').trim_end_matches(']');
            let port = endpoint.effective_port().unwrap_or(9418);
            let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {host}"))
            })?;
            let timeout = Duration::from_secs(config.connect_timeout_secs);
            tracing::debug!(%addr, ?timeout, "connecting");
            Ok(Box::new(TcpStream::connect_timeout(&addr, timeout)?))
        }
        Protocol::File => {
            let pipe = PipeTransport::default();
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(pipe.command_line(endpoint, service));
            Ok(Box::new(ChildStream::spawn(cmd)?))
        }
        Protocol::Ssh => {
            let pipe = PipeTransport::default();
            let mut cmd = Command::new("ssh");
            cmd.args(pipe.ssh_args(endpoint))
                .arg(pipe.command_line(endpoint, service));
            Ok(Box::new(ChildStream::spawn(cmd)?))
        }
        Protocol::Http | Protocol::Https => Err(CliError::NotSupported(format!(
            "no HTTP client built in; fetch {} yourself",
            SmartHttpTransport::info_refs_url(endpoint, service)
        ))),
    }
}

/// The stdio of a spawned service process.
struct ChildStream {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl ChildStream {
    fn spawn(mut cmd: Command) -> io::Result<Self> {
        tracing::debug!(command = ?cmd, "spawning");
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok(Self {
                child,
                stdin,
                stdout,
            }),
            _ => Err(io::Error::new(io::ErrorKind::BrokenPipe, "child stdio unavailable")),
        }
    }
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Write for ChildStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdin.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin.flush()
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
