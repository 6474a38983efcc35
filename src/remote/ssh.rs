// src/remote/ssh.rs

//! SSH channels built on `ssh2`.
//!
//! `ssh2` is blocking, so every operation runs on Tokio's blocking pool. The
//! session and SFTP handles are shared between the two channels of one
//! connection and never between connections.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ssh2::{ErrorCode, Session, Sftp};
use tracing::{debug, warn};

use crate::config::HostDescriptor;
use crate::types::ConnectionMode;

use super::{Channels, CommandOutput, Connector, FileTransfer, RemoteError, RemoteStat, Shell};

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`.
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Opens SSH connections.
///
/// `connect_timeout` bounds the TCP connect, handshake and authentication.
/// Once connected, libssh2 calls are limited by `exec_timeout` only, so a
/// long silent command is cut off by the task's own per-host timeout and not
/// by the connect limit.
#[derive(Debug, Clone)]
pub struct SshConnector {
    pub connect_timeout: Duration,
    /// `None` leaves blocking calls unbounded.
    pub exec_timeout: Option<Duration>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            exec_timeout: None,
        }
    }
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            exec_timeout: None,
        }
    }

    /// Bound blocking calls after connect, normally to the task timeout.
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = Some(timeout);
        self
    }

    /// Value handed to `Session::set_timeout` during connect.
    pub fn connect_timeout_ms(&self) -> u32 {
        millis(self.connect_timeout)
    }

    /// Value handed to `Session::set_timeout` once the session is
    /// authenticated. Zero means no limit in libssh2.
    pub fn session_timeout_ms(&self) -> u32 {
        self.exec_timeout.map(millis).unwrap_or(0)
    }
}

fn millis(d: Duration) -> u32 {
    d.as_millis().min(u32::MAX as u128) as u32
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, host: &HostDescriptor) -> Result<Channels, RemoteError> {
        let host = host.clone();
        let connector = self.clone();
        let host_id = host.id.clone();

        let (session, sftp) =
            tokio::task::spawn_blocking(move || connect_blocking(&host, &connector)).await??;

        debug!(host = %host_id, "ssh session established");

        let session = Arc::new(Mutex::new(session));
        let sftp = Arc::new(Mutex::new(sftp));

        Ok(Channels::new(
            host_id,
            Box::new(SshShell {
                session: Arc::clone(&session),
            }),
            Box::new(SshTransfer { sftp }),
        ))
    }
}

fn connect_blocking(
    host: &HostDescriptor,
    connector: &SshConnector,
) -> Result<(Session, Sftp), RemoteError> {
    let connect_err = |reason: String| RemoteError::Connect {
        host: host.id.clone(),
        reason,
    };

    let addr = (host.ip.as_str(), host.port)
        .to_socket_addrs()
        .map_err(|e| connect_err(e.to_string()))?
        .next()
        .ok_or_else(|| connect_err(format!("no address for {}", host.ip)))?;

    let tcp = TcpStream::connect_timeout(&addr, connector.connect_timeout)
        .map_err(|e| connect_err(e.to_string()))?;

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(connector.connect_timeout_ms());
    session.handshake().map_err(|e| connect_err(e.to_string()))?;

    let auth_err = |reason: String| RemoteError::Auth {
        host: host.id.clone(),
        reason,
    };

    match host.mode {
        ConnectionMode::Password => {
            let password = host
                .password
                .as_deref()
                .ok_or_else(|| auth_err("no password configured".to_string()))?;
            session
                .userauth_password(&host.user, password)
                .map_err(|e| auth_err(e.to_string()))?;
        }
        ConnectionMode::Key => {
            let key_path = host
                .key_path
                .as_deref()
                .map(expand_local_home)
                .ok_or_else(|| auth_err("no key_path configured".to_string()))?;
            session
                .userauth_pubkey_file(&host.user, None, &key_path, host.passphrase.as_deref())
                .map_err(|e| auth_err(e.to_string()))?;
        }
        ConnectionMode::Local => {
            return Err(connect_err("local hosts are not reached over ssh".to_string()));
        }
    }

    if !session.authenticated() {
        return Err(auth_err("server rejected credentials".to_string()));
    }

    let sftp = session.sftp()?;
    session.set_timeout(connector.session_timeout_ms());
    Ok((session, sftp))
}

fn expand_local_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

pub struct SshShell {
    session: Arc<Mutex<Session>>,
}

#[async_trait]
impl Shell for SshShell {
    async fn exec(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let session = Arc::clone(&self.session);
        let command = command.to_string();

        tokio::task::spawn_blocking(move || {
            let session = session.lock();
            let mut channel = session.channel_session()?;
            channel.exec(&command)?;

            let mut stdout = String::new();
            channel.read_to_string(&mut stdout)?;
            let mut stderr = String::new();
            channel.stderr().read_to_string(&mut stderr)?;

            channel.wait_close()?;
            let exit_status = channel.exit_status()?;

            Ok::<_, RemoteError>(CommandOutput {
                exit_status,
                stdout,
                stderr,
            })
        })
        .await?
    }

    fn close(&self) {
        // A timed-out command may still hold the session on the blocking
        // pool; the socket is released when that last handle drops.
        match self.session.try_lock() {
            Some(session) => {
                if let Err(e) = session.disconnect(None, "closing", None) {
                    warn!(error = %e, "ssh disconnect failed");
                }
            }
            None => debug!("ssh session busy; deferring release to in-flight operation"),
        }
    }
}

pub struct SshTransfer {
    sftp: Arc<Mutex<Sftp>>,
}

impl SshTransfer {
    async fn blocking<T, F>(&self, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T, RemoteError> + Send + 'static,
    {
        let sftp = Arc::clone(&self.sftp);
        tokio::task::spawn_blocking(move || {
            let sftp = sftp.lock();
            f(&sftp)
        })
        .await?
    }
}

fn is_missing(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
}

#[async_trait]
impl FileTransfer for SshTransfer {
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let local = local.to_path_buf();
        let remote = PathBuf::from(remote);
        self.blocking(move |sftp| {
            let mut src = File::open(&local)?;
            let mut dst = sftp.create(&remote)?;
            io::copy(&mut src, &mut dst)
                .map_err(|e| RemoteError::Transfer(format!("upload to {:?}: {e}", remote)))?;
            Ok(())
        })
        .await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let local = local.to_path_buf();
        let remote = PathBuf::from(remote);
        self.blocking(move |sftp| {
            let mut src = sftp.open(&remote)?;
            let mut dst = File::create(&local)?;
            io::copy(&mut src, &mut dst)
                .map_err(|e| RemoteError::Transfer(format!("download of {:?}: {e}", remote)))?;
            Ok(())
        })
        .await
    }

    async fn write(&self, remote: &str, data: &[u8]) -> Result<(), RemoteError> {
        let data = data.to_vec();
        let remote = PathBuf::from(remote);
        self.blocking(move |sftp| {
            let mut dst = sftp.create(&remote)?;
            dst.write_all(&data)
                .map_err(|e| RemoteError::Transfer(format!("write to {:?}: {e}", remote)))?;
            Ok(())
        })
        .await
    }

    async fn stat(&self, remote: &str) -> Result<Option<RemoteStat>, RemoteError> {
        let remote = PathBuf::from(remote);
        self.blocking(move |sftp| match sftp.stat(&remote) {
            Ok(stat) => Ok(Some(RemoteStat {
                is_dir: stat.is_dir(),
                size: stat.size.unwrap_or(0),
            })),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn mkdir_all(&self, remote: &str) -> Result<(), RemoteError> {
        let remote = remote.to_string();
        self.blocking(move |sftp| {
            let mut current = String::new();
            for part in remote.split('/') {
                if part.is_empty() {
                    if current.is_empty() {
                        current.push('/');
                    }
                    continue;
                }
                if !current.is_empty() && !current.ends_with('/') {
                    current.push('/');
                }
                current.push_str(part);

                let path = Path::new(&current);
                match sftp.stat(path) {
                    Ok(stat) if stat.is_dir() => continue,
                    Ok(_) => {
                        return Err(RemoteError::Transfer(format!(
                            "{current} exists and is not a directory"
                        )));
                    }
                    Err(e) if is_missing(&e) => sftp.mkdir(path, 0o755)?,
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
        .await
    }

    async fn remove(&self, remote: &str) -> Result<(), RemoteError> {
        let remote = PathBuf::from(remote);
        self.blocking(move |sftp| {
            sftp.unlink(&remote)?;
            Ok(())
        })
        .await
    }
}
