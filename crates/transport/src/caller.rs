use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use slowscope_protocol::RemoteCallResult;
use std::sync::Arc;
use std::time::Duration;

/// Anything that can execute one named remote tool call with a deadline.
#[async_trait]
pub trait RemoteCaller: Send + Sync {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<RemoteCallResult>;
}

#[async_trait]
impl<T: RemoteCaller + ?Sized> RemoteCaller for Arc<T> {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<RemoteCallResult> {
        (**self).call(tool_name, arguments, timeout).await
    }
}
