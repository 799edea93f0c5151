use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent};
use shared::types::ServiceEvent;
use crate::discovery::source::{subscription, BrowseSource, Subscription, SubscriptionSink};
use crate::error::{DiscoveryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrowseTarget {
    /// Meta-query answers name registration types
    ServiceTypes,
    /// Answers name instances of one registration type
    Instances,
}

struct BrowseRequest {
    registration_type: String,
    domain: String,
    ty_domain: String,
    target: BrowseTarget,
    browse_id: u64,
}

/// Latest browse issued per type name.
///
/// The daemon keeps one querier per type name, so a stop must only be sent
/// by the browse that still owns the name. Claims and releases happen under
/// the same lock as the daemon command, which keeps Browse and StopBrowse
/// for one name in issue order.
#[derive(Default)]
struct BrowseOwners {
    next_id: u64,
    current: HashMap<String, u64>,
}

impl BrowseOwners {
    fn claim(&mut self, ty_domain: &str) -> u64 {
        self.next_id += 1;
        self.current.insert(ty_domain.to_string(), self.next_id);
        self.next_id
    }

    /// True when `browse_id` still owned the name and gave it up
    fn release(&mut self, ty_domain: &str, browse_id: u64) -> bool {
        if self.current.get(ty_domain) == Some(&browse_id) {
            self.current.remove(ty_domain);
            true
        } else {
            false
        }
    }
}

/// [`BrowseSource`] backed by the mdns-sd daemon.
///
/// Only PTR level announcements are forwarded; instances are never resolved.
#[derive(Clone)]
pub struct MdnsBrowseSource {
    daemon: ServiceDaemon,
    services_type: String,
    owners: Arc<Mutex<BrowseOwners>>,
}

impl MdnsBrowseSource {
    pub fn new(daemon: ServiceDaemon, services_type: &str) -> Self {
        Self {
            daemon,
            services_type: services_type.trim_end_matches('.').to_string(),
            owners: Arc::new(Mutex::new(BrowseOwners::default())),
        }
    }
}

impl BrowseSource for MdnsBrowseSource {
    fn browse(&self, domain: &str, registration_type: &str) -> Result<Subscription> {
        let ty_domain = type_domain(registration_type, domain);
        let (receiver, browse_id) = {
            let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
            let receiver = self
                .daemon
                .browse(&ty_domain)
                .map_err(|e| DiscoveryError::BrowseFailed {
                    registration_type: registration_type.to_string(),
                    domain: domain.to_string(),
                    reason: e.to_string(),
                })?;
            (receiver, owners.claim(&ty_domain))
        };

        let target = if registration_type.trim_end_matches('.') == self.services_type {
            BrowseTarget::ServiceTypes
        } else {
            BrowseTarget::Instances
        };

        tracing::debug!("Browsing {} (browse {})", ty_domain, browse_id);
        let request = BrowseRequest {
            registration_type: registration_type.to_string(),
            domain: domain.to_string(),
            ty_domain,
            target,
            browse_id,
        };
        let (sink, sub) = subscription();
        tokio::spawn(pump(
            self.daemon.clone(),
            self.owners.clone(),
            receiver,
            sink,
            request,
        ));
        Ok(sub)
    }
}

/// Give up the type name; a cancelled owner also stops the daemon querier.
/// A newer browse of the same name is left running.
fn release_browse(
    daemon: &ServiceDaemon,
    owners: &Mutex<BrowseOwners>,
    request: &BrowseRequest,
    stop: bool,
) {
    let mut owners = owners.lock().unwrap_or_else(PoisonError::into_inner);
    if !owners.release(&request.ty_domain, request.browse_id) {
        tracing::debug!("{} was browsed again, leaving it running", request.ty_domain);
        return;
    }
    if stop {
        if let Err(e) = daemon.stop_browse(&request.ty_domain) {
            tracing::warn!("Failed to stop browsing {}: {}", request.ty_domain, e);
        }
    }
}

async fn pump(
    daemon: ServiceDaemon,
    owners: Arc<Mutex<BrowseOwners>>,
    receiver: flume::Receiver<MdnsEvent>,
    sink: SubscriptionSink,
    request: BrowseRequest,
) {
    let ty_domain = &request.ty_domain;
    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                let (fullname, is_lost) = match event {
                    Ok(MdnsEvent::ServiceFound(_, fullname)) => (fullname, false),
                    Ok(MdnsEvent::ServiceRemoved(_, fullname)) => (fullname, true),
                    Ok(MdnsEvent::SearchStopped(_)) => {
                        if !sink.is_cancelled() {
                            sink.fail(stream_failed(&request, "search stopped by daemon"));
                        }
                        tracing::debug!("Browse of {} stopped", ty_domain);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        if !sink.is_cancelled() {
                            sink.fail(stream_failed(&request, &e.to_string()));
                        }
                        break;
                    }
                };

                let converted = match request.target {
                    BrowseTarget::ServiceTypes => service_type_event(&fullname, is_lost),
                    BrowseTarget::Instances => instance_event(
                        &fullname,
                        &request.registration_type,
                        &request.domain,
                        is_lost,
                    ),
                };

                match converted {
                    Some(event) => {
                        if !sink.emit(event) {
                            break;
                        }
                    }
                    None => tracing::debug!("Skipping unexpected name {} in {}", fullname, ty_domain),
                }
            }

            _ = sink.cancelled() => break,
        }
    }

    release_browse(&daemon, &owners, &request, sink.is_cancelled());
}

fn stream_failed(request: &BrowseRequest, reason: &str) -> DiscoveryError {
    DiscoveryError::StreamFailed {
        registration_type: request.registration_type.clone(),
        domain: request.domain.clone(),
        reason: reason.to_string(),
    }
}

/// Fully qualified browse name, e.g. ("_http._tcp", "local.") -> "_http._tcp.local."
pub fn type_domain(registration_type: &str, domain: &str) -> String {
    format!(
        "{}.{}.",
        registration_type.trim_end_matches('.'),
        domain.trim_matches('.')
    )
}

/// "_http._tcp.local." from the meta-query -> `_http` / `_tcp.local.` in `local.`
pub fn service_type_event(fullname: &str, is_lost: bool) -> Option<ServiceEvent> {
    let (service, rest) = fullname.split_once('.')?;
    let (protocol, domain) = rest.split_once('.')?;
    if service.is_empty() || protocol.is_empty() || domain.is_empty() {
        return None;
    }

    Some(ServiceEvent {
        domain: domain.to_string(),
        registration_type: rest.to_string(),
        service_name: service.to_string(),
        is_lost,
    })
}

/// "MyPrinter._http._tcp.local." -> `MyPrinter` / `_http._tcp.` in `local.`
pub fn instance_event(
    fullname: &str,
    registration_type: &str,
    domain: &str,
    is_lost: bool,
) -> Option<ServiceEvent> {
    let suffix = format!(".{}", type_domain(registration_type, domain));
    let instance = fullname.strip_suffix(&suffix)?;
    if instance.is_empty() {
        return None;
    }

    Some(ServiceEvent {
        domain: domain.to_string(),
        registration_type: format!("{}.", registration_type.trim_end_matches('.')),
        service_name: instance.to_string(),
        is_lost,
    })
}
