//! Shared test doubles for the array and connector ports

use crate::array::ArrayDescriptor;
use crate::config::credentials::ArrayEntry;
use crate::context::RequestContext;
use crate::domain::ports::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A valid credentials entry
pub fn entry(id: &str, is_default: bool) -> ArrayEntry {
    ArrayEntry {
        array_id: id.to_string(),
        username: "admin".to_string(),
        password: "password".to_string(),
        rest_gateway: format!("https://{}.example.com", id),
        insecure: true,
        is_default_array: is_default,
    }
}

pub fn descriptor(id: &str, is_default: bool) -> ArrayDescriptor {
    ArrayDescriptor::new(entry(id, is_default), MockClient::healthy())
}

/// Credentials document listing `arrays` as (id, is_default)
pub fn credentials_json(arrays: &[(&str, bool)]) -> String {
    let list: Vec<ArrayEntry> = arrays.iter().map(|(id, d)| entry(id, *d)).collect();
    serde_json::json!({ "storageArrayList": list }).to_string()
}

// =============================================================================
// Array Client
// =============================================================================

/// How a mock client answers authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAuth {
    Ok,
    InvalidCredentials,
    Unreachable,
}

pub struct MockClient {
    behavior: Mutex<MockAuth>,
    token: RwLock<String>,
    fail_register: AtomicBool,
    pub auth_calls: AtomicUsize,
    pub host_calls: AtomicUsize,
    pub hosts: Mutex<Vec<HostRegistration>>,
}

impl MockClient {
    pub fn with_behavior(behavior: MockAuth) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            token: RwLock::new(String::new()),
            fail_register: AtomicBool::new(false),
            auth_calls: AtomicUsize::new(0),
            host_calls: AtomicUsize::new(0),
            hosts: Mutex::new(Vec::new()),
        })
    }

    pub fn healthy() -> Arc<Self> {
        Self::with_behavior(MockAuth::Ok)
    }

    pub fn rejecting() -> Arc<Self> {
        Self::with_behavior(MockAuth::InvalidCredentials)
    }

    pub fn unreachable() -> Arc<Self> {
        Self::with_behavior(MockAuth::Unreachable)
    }

    /// A client that already holds a session token
    pub fn authenticated() -> Arc<Self> {
        let client = Self::healthy();
        *client.token.write() = "existing-token".to_string();
        client
    }

    pub fn set_behavior(&self, behavior: MockAuth) {
        *self.behavior.lock() = behavior;
    }

    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn host_calls(&self) -> usize {
        self.host_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArrayClient for MockClient {
    async fn authenticate(&self, config: &ConnectConfig) -> std::result::Result<(), AuthFailure> {
        let attempt = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = *self.behavior.lock();
        match behavior {
            MockAuth::Ok => {
                *self.token.write() = format!("token-{}", attempt);
                Ok(())
            }
            MockAuth::InvalidCredentials => Err(AuthFailure::InvalidCredentials(format!(
                "401 Unauthorized from {}",
                config.endpoint
            ))),
            MockAuth::Unreachable => Err(AuthFailure::Unreachable(format!(
                "connection refused: {}",
                config.endpoint
            ))),
        }
    }

    fn token(&self) -> String {
        self.token.read().clone()
    }

    async fn register_host(&self, _ctx: &RequestContext, host: &HostRegistration) -> Result<()> {
        self.host_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Error::ArrayOperationFailed {
                array_id: host.name.clone(),
                operation: "register_host".to_string(),
                reason: "host rejected".to_string(),
            });
        }
        self.hosts.lock().push(host.clone());
        Ok(())
    }
}

// =============================================================================
// Array Client Factory
// =============================================================================

/// Factory that hands out mock clients and records what it built
#[derive(Default)]
pub struct MockFactory {
    failing: Mutex<Vec<String>>,
    behaviors: Mutex<Vec<(String, MockAuth)>>,
    clients: Mutex<Vec<(String, Arc<MockClient>)>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail client construction for endpoints containing `pattern`
    pub fn fail_endpoint(&self, pattern: &str) {
        self.failing.lock().push(pattern.to_string());
    }

    /// Authentication behavior for clients whose endpoint contains `pattern`
    pub fn set_behavior(&self, pattern: &str, behavior: MockAuth) {
        self.behaviors.lock().push((pattern.to_string(), behavior));
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn created(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn max_concurrent_creates(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Most recently built client whose endpoint contains `pattern`
    pub fn client_for(&self, pattern: &str) -> Option<Arc<MockClient>> {
        self.clients
            .lock()
            .iter()
            .rev()
            .find(|(endpoint, _)| endpoint.contains(pattern))
            .map(|(_, client)| client.clone())
    }
}

impl ArrayClientFactory for MockFactory {
    fn create(&self, endpoint: &str, _insecure: bool) -> Result<Arc<dyn ArrayClient>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().iter().any(|p| endpoint.contains(p.as_str())) {
            return Err(Error::Internal(format!("cannot build client for {}", endpoint)));
        }

        let behavior = self
            .behaviors
            .lock()
            .iter()
            .find(|(p, _)| endpoint.contains(p.as_str()))
            .map(|(_, b)| *b)
            .unwrap_or(MockAuth::Ok);
        let client = MockClient::with_behavior(behavior);
        self.clients.lock().push((endpoint.to_string(), client.clone()));
        Ok(client)
    }
}

// =============================================================================
// Connectors
// =============================================================================

pub struct MockIscsi {
    pub initiators: Vec<String>,
}

#[async_trait]
impl IscsiConnector for MockIscsi {
    async fn connect_volume(&self, _ctx: &RequestContext, info: &IscsiVolumeInfo) -> Result<Device> {
        Ok(Device {
            name: format!("sd{}", info.lun),
            path: PathBuf::from(format!("/dev/sd{}", info.lun)),
            wwn: None,
        })
    }

    async fn disconnect_volume_by_device_name(&self, _ctx: &RequestContext, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn initiator_names(&self, _ctx: &RequestContext) -> Result<Vec<String>> {
        Ok(self.initiators.clone())
    }
}

pub struct MockFc {
    pub ports: Vec<String>,
}

#[async_trait]
impl FcConnector for MockFc {
    async fn connect_volume(&self, _ctx: &RequestContext, info: &FcVolumeInfo) -> Result<Device> {
        Ok(Device {
            name: format!("sd{}", info.lun),
            path: PathBuf::from(format!("/dev/sd{}", info.lun)),
            wwn: None,
        })
    }

    async fn disconnect_volume_by_device_name(&self, _ctx: &RequestContext, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn initiator_ports(&self, _ctx: &RequestContext) -> Result<Vec<String>> {
        Ok(self.ports.clone())
    }
}

/// Connector factory counting how often each connector is built
#[derive(Default)]
pub struct MockConnectorFactory {
    pub iscsi_builds: AtomicUsize,
    pub fc_builds: AtomicUsize,
    pub chroots: Mutex<Vec<String>>,
}

impl MockConnectorFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ConnectorFactory for MockConnectorFactory {
    fn iscsi(&self, chroot: &str, _adapters: TransportAdapters) -> Arc<dyn IscsiConnector> {
        self.iscsi_builds.fetch_add(1, Ordering::SeqCst);
        self.chroots.lock().push(chroot.to_string());
        Arc::new(MockIscsi {
            initiators: vec!["iqn.1993-08.org.debian:01:node1".to_string()],
        })
    }

    fn fc(&self, chroot: &str, _adapters: TransportAdapters) -> Arc<dyn FcConnector> {
        self.fc_builds.fetch_add(1, Ordering::SeqCst);
        self.chroots.lock().push(chroot.to_string());
        Arc::new(MockFc {
            ports: vec!["10000090fa1b2c3d".to_string()],
        })
    }
}
