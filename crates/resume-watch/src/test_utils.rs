//! Shared fixtures for unit tests.

use crate::error::HandlerError;
use crate::notification::ChangeNotification;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn config_map(name: &str, resource_version: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            resource_version: Some(resource_version.to_string()),
            ..ObjectMeta::default()
        },
        ..ConfigMap::default()
    }
}

pub fn lease(name: &str, holder: Option<&str>, resource_version: &str) -> Lease {
    Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("kube-system".to_string()),
            resource_version: Some(resource_version.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: holder.map(str::to_string),
            ..LeaseSpec::default()
        }),
    }
}

pub fn added(name: &str, rv: &str) -> Result<ChangeNotification<ConfigMap>, crate::StoreError> {
    Ok(ChangeNotification::Added(config_map(name, rv)))
}

pub fn modified(name: &str, rv: &str) -> Result<ChangeNotification<ConfigMap>, crate::StoreError> {
    Ok(ChangeNotification::Modified(config_map(name, rv)))
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// Handler that forwards "KIND name@rv" for every change it receives.
pub fn recording_handler() -> (
    impl Fn(ChangeNotification<ConfigMap>) -> HandlerFuture + Send + Sync + 'static,
    mpsc::UnboundedReceiver<String>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |notification: ChangeNotification<ConfigMap>| -> HandlerFuture {
        let line = describe(&notification);
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(line);
            Ok(())
        })
    };
    (handler, rx)
}

pub fn describe(notification: &ChangeNotification<ConfigMap>) -> String {
    match notification.object() {
        Some(object) => format!(
            "{} {}@{}",
            notification.kind(),
            object.name_any(),
            object.resource_version().unwrap_or_default()
        ),
        None => notification.kind().to_string(),
    }
}

/// Receive exactly `count` lines, failing the test if they take too long.
pub async fn collect(rx: &mut mpsc::UnboundedReceiver<String>, count: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(count);
    while lines.len() < count {
        let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for handler")
            .expect("handler channel closed");
        lines.push(line);
    }
    lines
}
