// SPDX-License-Identifier: MIT

//! The admin Unix-socket listener: serves [`crate::protocol::Request`]s from
//! `wfe-cli` against the daemon's [`wfe_engine::InstanceManager`] (§2 "CLI").
//! One connection at a time's worth of concurrency is fine here — lifecycle
//! commands are rare compared to the dispatch queues' event volume.

use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use wfe_core::{Clock, ProcessInstanceError};
use wfe_engine::InstanceManager;

use crate::protocol::{self, InstanceView, ProtocolError, Request, Response};

pub async fn serve<C: Clock>(
    socket_path: &std::path::Path,
    instances: Arc<InstanceManager<C>>,
) -> Result<(), std::io::Error> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;

    loop {
        let (stream, _) = listener.accept().await?;
        let instances = instances.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, instances).await {
                tracing::warn!(error = %e, "admin connection closed with an error");
            }
        });
    }
}

async fn handle_connection<C: Clock>(
    mut stream: UnixStream,
    instances: Arc<InstanceManager<C>>,
) -> Result<(), ProtocolError> {
    loop {
        let bytes = match protocol::read_message(&mut stream).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };
        let request: Request = protocol::decode(&bytes)?;
        let response = dispatch(&instances, request).await;
        let encoded = protocol::encode(&response)?;
        protocol::write_message(&mut stream, &encoded).await?;
    }
}

async fn dispatch<C: Clock>(instances: &Arc<InstanceManager<C>>, request: Request) -> Response {
    let result = match request {
        Request::Ping => return Response::Pong,
        Request::CreateInstance { instance_id, definition_id, variables } => instances
            .create_instance(instance_id, definition_id, variables)
            .await
            .map(|(record, _)| record)
            .map_err(instance_manager_error),
        Request::GetInstance { instance_id } => {
            instances.get_instance(instance_id).await.map_err(instance_manager_error)
        }
        Request::SuspendInstance { instance_id } => {
            instances.suspend(instance_id).await.map_err(instance_manager_error)
        }
        Request::ResumeInstance { instance_id } => {
            instances.resume(instance_id).await.map_err(instance_manager_error)
        }
        Request::TerminateInstance { instance_id } => {
            instances.terminate(instance_id).await.map_err(instance_manager_error)
        }
    };

    match result {
        Ok(record) => Response::Instance(InstanceView {
            id: record.id,
            definition_id: record.definition_id,
            status: record.status,
            start_time: record.start_time,
            end_time: record.end_time,
            error: record.error,
        }),
        Err(e) => Response::Error { message: e.to_string() },
    }
}

fn instance_manager_error(err: wfe_engine::InstanceManagerError) -> ProcessInstanceError {
    match err {
        wfe_engine::InstanceManagerError::InvalidDefinition(e) => e.into(),
        wfe_engine::InstanceManagerError::InvalidVariable(e) => e.into(),
        wfe_engine::InstanceManagerError::InvalidTransition(e) => e.into(),
        wfe_engine::InstanceManagerError::InstanceNotFound(id) => {
            ProcessInstanceError::InstanceGone(wfe_core::InstanceGoneError(id))
        }
    }
}
