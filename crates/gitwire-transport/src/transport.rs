//! The transport trait and the built-in carriers.
//!
//! A transport never opens connections itself. The caller establishes the
//! byte stream (a TCP socket, a child process' stdio, an HTTP body pair) and
//! hands it over; the transport writes whatever preamble its carrier needs
//! and wraps the stream in a session.

use crate::endpoint::{Endpoint, Protocol};
use crate::session::{ReceivePackSession, UploadPackSession};
use crate::Result;
use gitwire_pktline::PktLineWriter;
use gitwire_protocol::ProtocolError;
use std::fmt;
use std::io::{Read, Write};

/// A bidirectional byte stream to the remote service.
pub trait Stream: Read + Write + Send {}

impl<T: Read + Write + Send> Stream for T {}

/// The two git services a session can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// `git-upload-pack`: fetch.
    UploadPack,
    /// `git-receive-pack`: push.
    ReceivePack,
}

impl Service {
    /// Returns the service program name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A carrier for the git smart protocol.
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Writes anything the carrier needs before the service starts talking.
    fn handshake(
        &self,
        _endpoint: &Endpoint,
        _service: Service,
        _stream: &mut dyn Stream,
    ) -> Result<()> {
        Ok(())
    }

    /// Opens a fetch session over `stream`.
    fn new_upload_pack_session(
        &self,
        endpoint: &Endpoint,
        mut stream: Box<dyn Stream>,
    ) -> Result<UploadPackSession> {
        self.handshake(endpoint, Service::UploadPack, stream.as_mut())?;
        tracing::debug!(transport = self.name(), endpoint = %endpoint, "opened upload-pack session");
        Ok(UploadPackSession::new(endpoint.clone(), stream))
    }

    /// Opens a push session over `stream`.
    fn new_receive_pack_session(
        &self,
        endpoint: &Endpoint,
        mut stream: Box<dyn Stream>,
    ) -> Result<ReceivePackSession> {
        self.handshake(endpoint, Service::ReceivePack, stream.as_mut())?;
        tracing::debug!(transport = self.name(), endpoint = %endpoint, "opened receive-pack session");
        Ok(ReceivePackSession::new(endpoint.clone(), stream))
    }
}

/// The `git://` daemon protocol.
///
/// The client opens with one pkt-line naming the service, the path and the
/// virtual host: `git-upload-pack /repo.git\0host=example.com\0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitDaemonTransport;

impl GitDaemonTransport {
    /// Builds the request line sent on connect.
    pub fn request_line(endpoint: &Endpoint, service: Service) -> Vec<u8> {
        let mut line = format!("{} {}", service, endpoint.path).into_bytes();
        line.push(0);
        if !endpoint.host.is_empty() {
            line.extend_from_slice(format!("host={}", endpoint.host_with_port()).as_bytes());
            line.push(0);
        }
        line
    }
}

impl Transport for GitDaemonTransport {
    fn name(&self) -> &'static str {
        "git"
    }

    fn handshake(&self, endpoint: &Endpoint, service: Service, stream: &mut dyn Stream) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(stream);
        pkt_writer
            .write_data(&Self::request_line(endpoint, service))
            .map_err(ProtocolError::from)?;
        pkt_writer.flush().map_err(ProtocolError::from)?;
        Ok(())
    }
}

/// Runs the service as a process, locally (`file`) or through ssh.
///
/// The stream is the process' stdin/stdout; spawning it is up to the caller,
/// using [`PipeTransport::command_line`] and [`PipeTransport::ssh_args`].
#[derive(Debug, Clone, Default)]
pub struct PipeTransport {
    /// Program to run instead of the default service name.
    pub upload_pack_program: Option<String>,
    /// Program to run instead of the default service name.
    pub receive_pack_program: Option<String>,
}

impl PipeTransport {
    /// Returns the command to run for `service`, with the path single-quoted.
    pub fn command_line(&self, endpoint: &Endpoint, service: Service) -> String {
        let program = match service {
            Service::UploadPack => self.upload_pack_program.as_deref(),
            Service::ReceivePack => self.receive_pack_program.as_deref(),
        }
        .unwrap_or(service.as_str());
        format!("{program} {}", shell_quote(&endpoint.path))
    }

    /// Returns the arguments for the `ssh` client, destination last.
    pub fn ssh_args(&self, endpoint: &Endpoint) -> Vec<String> {
        let mut args = Vec::new();
        if endpoint.port != 0 && endpoint.port != 22 {
            args.push("-p".to_string());
            args.push(endpoint.port.to_string());
        }
        if endpoint.user.is_empty() {
            args.push(endpoint.host.clone());
        } else {
            args.push(format!("{}@{}", endpoint.user, endpoint.host));
        }
        args
    }
}

impl Transport for PipeTransport {
    fn name(&self) -> &'static str {
        "pipe"
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The smart HTTP protocol.
///
/// The advertisement is the body of `GET <repo>/info/refs?service=<svc>`,
/// which starts with a `# service=` section; requests are the body of
/// `POST <repo>/<svc>`. The HTTP client itself lives outside this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartHttpTransport;

impl SmartHttpTransport {
    /// URL of the reference advertisement.
    pub fn info_refs_url(endpoint: &Endpoint, service: Service) -> String {
        format!(
            "{}/info/refs?service={}",
            endpoint.to_string().trim_end_matches('/'),
            service
        )
    }

    /// URL the request body is posted to.
    pub fn service_url(endpoint: &Endpoint, service: Service) -> String {
        format!("{}/{}", endpoint.to_string().trim_end_matches('/'), service)
    }

    /// Content type of the request body.
    pub fn request_content_type(service: Service) -> String {
        format!("application/x-{service}-request")
    }

    /// Content type of the response body.
    pub fn result_content_type(service: Service) -> String {
        format!("application/x-{service}-result")
    }
}

impl Transport for SmartHttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn handshake(&self, endpoint: &Endpoint, _service: Service, _stream: &mut dyn Stream) -> Result<()> {
        if !matches!(endpoint.protocol, Protocol::Http | Protocol::Https) {
            return Err(crate::TransportError::UnsupportedProtocol(endpoint.protocol));
        }
        endpoint.proxy.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn test_git_daemon_request_line() {
        let endpoint = Endpoint::parse("git://example.com:9419/repo.git").unwrap();
        let mut stream = Cursor::new(Vec::new());
        GitDaemonTransport
            .handshake(&endpoint, Service::UploadPack, &mut stream)
            .unwrap();
        assert_eq!(
            stream.into_inner(),
            b"0034git-upload-pack /repo.git\0host=example.com:9419\0".to_vec()
        );
    }

    #[test]
    fn test_git_daemon_default_port_omitted() {
        let endpoint = Endpoint::parse("git://example.com/repo.git").unwrap();
        let line = GitDaemonTransport::request_line(&endpoint, Service::ReceivePack);
        assert_eq!(line, b"git-receive-pack /repo.git\0host=example.com\0".to_vec());
    }

    #[test]
    fn test_pipe_command_line() {
        let endpoint = Endpoint::parse("git@example.com:it's/repo.git").unwrap();
        let pipe = PipeTransport::default();
        assert_eq!(
            pipe.command_line(&endpoint, Service::UploadPack),
            r"git-upload-pack 'it'\''s/repo.git'"
        );
        assert_eq!(pipe.ssh_args(&endpoint), vec!["git@example.com".to_string()]);

        let custom = PipeTransport {
            receive_pack_program: Some("/opt/git/bin/git-receive-pack".to_string()),
            ..Default::default()
        };
        let endpoint = Endpoint::parse("ssh://example.com:2222/srv/repo.git").unwrap();
        assert_eq!(
            custom.command_line(&endpoint, Service::ReceivePack),
            "/opt/git/bin/git-receive-pack '/srv/repo.git'"
        );
        assert_eq!(custom.ssh_args(&endpoint), vec!["-p", "2222", "example.com"]);
    }

    #[test]
    fn test_smart_http_urls() {
        let endpoint = Endpoint::parse("https://example.com/user/repo.git").unwrap();
        assert_eq!(
            SmartHttpTransport::info_refs_url(&endpoint, Service::UploadPack),
            "https://example.com/user/repo.git/info/refs?service=git-upload-pack"
        );
        assert_eq!(
            SmartHttpTransport::service_url(&endpoint, Service::ReceivePack),
            "https://example.com/user/repo.git/git-receive-pack"
        );
        assert_eq!(
            SmartHttpTransport::request_content_type(Service::UploadPack),
            "application/x-git-upload-pack-request"
        );
    }

    #[test]
    fn test_smart_http_rejects_bad_proxy() {
        let mut endpoint = Endpoint::parse("https://example.com/repo.git").unwrap();
        endpoint.proxy.url = "::".to_string();
        let mut stream = Cursor::new(Vec::new());
        assert!(SmartHttpTransport
            .handshake(&endpoint, Service::UploadPack, &mut stream)
            .is_err());
    }
}
