// SPDX-License-Identifier: MIT

//! A thin client for the daemon's admin Unix socket. Unlike the teacher's
//! `DaemonClient`, this does not auto-start or retry against a missing
//! daemon — `wfe-cli` is a lifecycle-operations tool, not a supervisor, and
//! a missing socket is reported as a plain connection error.

use anyhow::{Context, Result};
use tokio::net::UnixStream;
use wfe_daemon::protocol::{self, Request, Response};

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    pub async fn connect() -> Result<Self> {
        let socket_path = wfe_daemon::state_dir().join("wfed.sock");
        let stream = UnixStream::connect(&socket_path).await.with_context(|| {
            format!("connecting to {} (is wfed running?)", socket_path.display())
        })?;
        Ok(Self { stream })
    }

    pub async fn call(&mut self, request: Request) -> Result<Response> {
        let encoded = protocol::encode(&request)?;
        protocol::write_message(&mut self.stream, &encoded).await?;
        let bytes = protocol::read_message(&mut self.stream).await?;
        Ok(protocol::decode(&bytes)?)
    }
}
