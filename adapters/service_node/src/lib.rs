#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Service node that hosts request/response endpoints.
//!
//! Services are advertised under a name and invoked with JSON payloads. When
//! a service reports [`ServiceError::Fatal`] the node shuts down: the failing
//! call reports the failure and every later call is refused. Translating the
//! shutdown into a process exit is left to the binary embedding the node.

mod wire;

use std::collections::BTreeMap;

use fiducial_sim_core::{Service, ServiceError};
use serde_json::Value;
use tracing::{error, info};

pub use wire::{Envelope, Reply, ServeOutcome};

/// Errors reported by [`ServiceNode`] calls.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Another service is already advertised under the endpoint.
    #[error("endpoint {0} is already advertised")]
    DuplicateEndpoint(String),
    /// No service is advertised under the endpoint.
    #[error("no service advertised at {0}")]
    UnknownEndpoint(String),
    /// The payload could not be decoded into the service's request type.
    #[error("malformed request for {endpoint}: {source}")]
    MalformedRequest {
        /// Endpoint that received the payload.
        endpoint: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The service response could not be encoded.
    #[error("failed to encode response from {endpoint}: {source}")]
    Encode {
        /// Endpoint that produced the response.
        endpoint: String,
        /// Encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The service failed fatally and the node has shut down.
    #[error("service at {endpoint} failed fatally: {reason}")]
    Fatal {
        /// Endpoint whose service failed.
        endpoint: String,
        /// Failure reported by the service.
        reason: String,
    },
    /// The node already shut down and refuses further calls.
    #[error("node {0} has shut down")]
    ShutDown(String),
    /// Reading requests or writing replies failed.
    #[error("service transport failed")]
    Io(#[from] std::io::Error),
}

trait Endpoint {
    fn call_value(&mut self, endpoint: &str, request: Value) -> Result<Value, CallError>;
}

enum CallError {
    Node(NodeError),
    Service(ServiceError),
}

struct TypedEndpoint<S>(S);

impl<S> Endpoint for TypedEndpoint<S>
where
    S: Service,
{
    fn call_value(&mut self, endpoint: &str, request: Value) -> Result<Value, CallError> {
        let request = serde_json::from_value(request).map_err(|source| {
            CallError::Node(NodeError::MalformedRequest {
                endpoint: endpoint.to_owned(),
                source,
            })
        })?;
        let response = self.0.call(request).map_err(CallError::Service)?;
        serde_json::to_value(response).map_err(|source| {
            CallError::Node(NodeError::Encode {
                endpoint: endpoint.to_owned(),
                source,
            })
        })
    }
}

/// Named host for request/response services.
pub struct ServiceNode {
    name: String,
    endpoints: BTreeMap<String, Box<dyn Endpoint>>,
    shut_down: bool,
}

impl ServiceNode {
    /// Creates a running node without endpoints.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: BTreeMap::new(),
            shut_down: false,
        }
    }

    /// Name of the node.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advertises a service under the provided endpoint.
    pub fn advertise<S>(&mut self, endpoint: &str, service: S) -> Result<(), NodeError>
    where
        S: Service + 'static,
    {
        if self.endpoints.contains_key(endpoint) {
            return Err(NodeError::DuplicateEndpoint(endpoint.to_owned()));
        }
        let _ = self
            .endpoints
            .insert(endpoint.to_owned(), Box::new(TypedEndpoint(service)));
        info!(node = %self.name, endpoint, "service advertised");
        Ok(())
    }

    /// Endpoints currently advertised, in ascending order.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Reports whether a fatal failure shut the node down.
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Stops the node; later calls are refused.
    pub fn shutdown(&mut self) {
        if !self.shut_down {
            info!(node = %self.name, "node shutting down");
        }
        self.shut_down = true;
    }

    /// Invokes the endpoint with an already decoded JSON request.
    pub fn call_value(&mut self, endpoint: &str, request: Value) -> Result<Value, NodeError> {
        if self.shut_down {
            return Err(NodeError::ShutDown(self.name.clone()));
        }
        let handler = self
            .endpoints
            .get_mut(endpoint)
            .ok_or_else(|| NodeError::UnknownEndpoint(endpoint.to_owned()))?;

        match handler.call_value(endpoint, request) {
            Ok(response) => Ok(response),
            Err(CallError::Node(error)) => Err(error),
            Err(CallError::Service(ServiceError::Fatal { reason })) => {
                error!(node = %self.name, endpoint, %reason, "fatal service failure");
                self.shutdown();
                Err(NodeError::Fatal {
                    endpoint: endpoint.to_owned(),
                    reason,
                })
            }
        }
    }

    /// Invokes the endpoint with a JSON-encoded request and returns the JSON response.
    pub fn call(&mut self, endpoint: &str, payload: &str) -> Result<String, NodeError> {
        let request = serde_json::from_str(payload).map_err(|source| {
            NodeError::MalformedRequest {
                endpoint: endpoint.to_owned(),
                source,
            }
        })?;
        let response = self.call_value(endpoint, request)?;
        serde_json::to_string(&response).map_err(|source| NodeError::Encode {
            endpoint: endpoint.to_owned(),
            source,
        })
    }
}

impl std::fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceNode")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize)]
    struct Ping {
        fail: bool,
    }

    #[derive(Serialize)]
    struct Pong {
        count: u32,
    }

    #[derive(Default)]
    struct Counter {
        count: u32,
    }

    impl Service for Counter {
        type Request = Ping;
        type Response = Pong;

        fn call(&mut self, request: Ping) -> Result<Pong, ServiceError> {
            if request.fail {
                return Err(ServiceError::Fatal {
                    reason: "asked to fail".to_owned(),
                });
            }
            self.count += 1;
            Ok(Pong { count: self.count })
        }
    }

    #[test]
    fn dispatches_to_advertised_service() {
        let mut node = ServiceNode::new("test");
        node.advertise("/ping", Counter::default())
            .expect("first advertisement");

        assert_eq!(
            node.call("/ping", r#"{"fail":false}"#).expect("call succeeds"),
            r#"{"count":1}"#
        );
        assert_eq!(
            node.call("/ping", r#"{"fail":false}"#).expect("call succeeds"),
            r#"{"count":2}"#
        );
    }

    #[test]
    fn rejects_duplicate_endpoints() {
        let mut node = ServiceNode::new("test");
        node.advertise("/ping", Counter::default())
            .expect("first advertisement");

        let error = node
            .advertise("/ping", Counter::default())
            .expect_err("duplicate endpoint");
        assert!(matches!(error, NodeError::DuplicateEndpoint(name) if name == "/ping"));
        assert_eq!(node.endpoints().collect::<Vec<_>>(), vec!["/ping"]);
    }

    #[test]
    fn unknown_endpoint_is_reported() {
        let mut node = ServiceNode::new("test");

        let error = node.call("/missing", "{}").expect_err("no such endpoint");
        assert!(matches!(error, NodeError::UnknownEndpoint(name) if name == "/missing"));
        assert!(!node.is_shut_down());
    }

    #[test]
    fn malformed_request_does_not_shut_down() {
        let mut node = ServiceNode::new("test");
        node.advertise("/ping", Counter::default())
            .expect("first advertisement");

        let error = node
            .call("/ping", r#"{"fail":"yes"}"#)
            .expect_err("wrong field type");
        assert!(matches!(error, NodeError::MalformedRequest { .. }));
        assert!(!node.is_shut_down());
    }

    #[test]
    fn fatal_failure_shuts_node_down() {
        let mut node = ServiceNode::new("test");
        node.advertise("/ping", Counter::default())
            .expect("first advertisement");

        let error = node
            .call("/ping", r#"{"fail":true}"#)
            .expect_err("service fails fatally");
        assert!(matches!(error, NodeError::Fatal { .. }));
        assert!(node.is_shut_down());

        let refused = node
            .call("/ping", r#"{"fail":false}"#)
            .expect_err("node is shut down");
        assert!(matches!(refused, NodeError::ShutDown(name) if name == "test"));
    }
}
