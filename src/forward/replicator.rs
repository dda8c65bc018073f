//! Request replicator.
//!
//! Turns one captured request into the copies sent to every destination.

use std::collections::HashSet;
use std::sync::Arc;

use http::Method;

use crate::forward::dispatch::Dispatcher;
use crate::forward::session::FlowIdentity;
use crate::forward::template::RequestTemplate;
use crate::forward::transport::Transport;
use crate::forward::ForwardConfig;
use crate::http::ParsedRequest;
use crate::observability::metrics;

/// Allowed methods; an empty set allows every method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodFilter {
    allowed: HashSet<Method>,
}

impl MethodFilter {
    pub fn new(allowed: HashSet<Method>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.allowed.is_empty() || self.allowed.contains(method)
    }
}

pub struct Forwarder<T> {
    config: Arc<ForwardConfig>,
    dispatcher: Arc<Dispatcher<T>>,
}

impl<T: Transport> Forwarder<T> {
    pub fn new(config: Arc<ForwardConfig>, dispatcher: Arc<Dispatcher<T>>) -> Self {
        Self { config, dispatcher }
    }

    /// Schedules every copy of `request` and returns without waiting for any
    /// of them to be sent.
    pub fn forward(&self, flow: &Arc<FlowIdentity>, request: ParsedRequest) {
        if !self.config.methods.allows(&request.method) {
            metrics::record_request_filtered();
            return;
        }
        if let Some(e) = &request.body_error {
            tracing::error!(src = %flow.src.ip(), "Error: {e}");
        }

        let template = RequestTemplate::new(request, &self.config.headers);
        for destination in &self.config.destinations {
            let target = destination.resolve(flow.dst.ip());
            let replicas = self.config.count.draw();
            for replica in 0..replicas {
                match template.build_clone(target) {
                    Ok(clone) => {
                        self.dispatcher.schedule(
                            Arc::clone(flow),
                            clone,
                            Arc::clone(template.original_url()),
                            replica,
                        );
                    }
                    Err(e) => {
                        tracing::error!(src = %flow.src.ip(), target = %target, "Error: {e}");
                        break;
                    }
                }
            }
        }
    }
}
