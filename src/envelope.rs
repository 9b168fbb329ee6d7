//! The unit of work passed through the middleware chain.

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::Message;
use crate::service::{MethodDescriptor, ServiceDescriptor};

/// One outgoing call, as seen by middleware.
///
/// Every field is public and owned, so a middleware may rewrite the request,
/// retarget the method, or attach metadata before handing the envelope to
/// [`Next::run`](crate::middleware::Next::run). The transport reads
/// `service`, `method` and `request` from whatever envelope reaches it.
#[derive(Clone, Debug)]
pub struct CallEnvelope {
    pub service: Arc<ServiceDescriptor>,
    pub method: MethodDescriptor,
    pub request: Arc<dyn Message>,
    /// Free-form annotations shared between middleware. Starts empty.
    pub metadata: HashMap<String, String>,
}

impl CallEnvelope {
    pub fn new(
        service: Arc<ServiceDescriptor>,
        method: MethodDescriptor,
        request: Arc<dyn Message>,
    ) -> Self {
        Self { service, method, request, metadata: HashMap::new() }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
