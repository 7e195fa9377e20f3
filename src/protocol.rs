//! Line-delimited JSON protocol spoken by `simtempd`.
//!
//! Each request line addresses one device by id and carries one command;
//! the daemon answers with exactly one response line.

use crate::config::ConfigSnapshot;
use crate::error::DeviceError;
use crate::notifier::{BufferStatus, Readiness};
use crate::registry::DeviceRegistry;
use crate::sample::Sample;
use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_REQUEST_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub device: u32,
    pub command: CommandType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandType {
    Read {
        #[serde(default)]
        blocking: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Poll,
    Get {
        attr: String,
    },
    Set {
        attr: String,
        value: String,
    },
    Stats,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub stats: StatsSnapshot,
    pub config: ConfigSnapshot,
    pub buffer: BufferStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Sample {
        sample: Sample,
        #[serde(with = "serde_bytes")]
        record: Vec<u8>,
    },
    Value {
        attr: String,
        value: String,
    },
    Stats {
        report: StatsReport,
    },
    Readiness {
        readiness: Readiness,
        mask: u32,
    },
    Devices {
        ids: Vec<u32>,
    },
    Ok,
    Error {
        kind: String,
        message: String,
    },
}

impl Response {
    pub fn from_error(error: &DeviceError) -> Self {
        Response::Error {
            kind: error.kind().to_owned(),
            message: error.to_string(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Response::Error {
            kind: "parse".to_owned(),
            message: message.into(),
        }
    }

    fn sample(sample: Sample) -> Self {
        Response::Sample {
            sample,
            record: sample.to_bytes().to_vec(),
        }
    }
}

/// Executes requests against a registry.
///
/// `handle` may block for the duration of a blocking read; async callers
/// run it on a blocking thread.
#[derive(Debug, Clone)]
pub struct ProtocolHandler {
    registry: Arc<DeviceRegistry>,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn parse_request(line: &str) -> Result<Request, Response> {
        if line.len() > MAX_REQUEST_SIZE {
            return Err(Response::parse_error(format!(
                "request of {} bytes exceeds {MAX_REQUEST_SIZE}",
                line.len()
            )));
        }
        serde_json::from_str(line)
            .map_err(|e| Response::parse_error(format!("invalid request: {e}")))
    }

    pub fn handle_line(&self, line: &str) -> Response {
        match Self::parse_request(line) {
            Ok(request) => self.handle(request),
            Err(response) => response,
        }
    }

    pub fn handle(&self, request: Request) -> Response {
        self.execute(request).unwrap_or_else(|e| Response::from_error(&e))
    }

    fn execute(&self, request: Request) -> Result<Response, DeviceError> {
        let device = || self.registry.get(request.device);

        let response = match request.command {
            CommandType::List => Response::Devices {
                ids: self.registry.ids().iter().copied().collect(),
            },
            CommandType::Read {
                blocking,
                timeout_ms,
            } => {
                let device = device()?;
                let sample = match (blocking, timeout_ms) {
                    (false, _) => device.read(false)?,
                    (true, Some(ms)) => device.read_timeout(Duration::from_millis(ms))?,
                    (true, None) => device.read(true)?,
                };
                Response::sample(sample)
            }
            CommandType::Poll => {
                let readiness = device()?.poll();
                Response::Readiness {
                    readiness,
                    mask: readiness.bits(),
                }
            }
            CommandType::Get { attr } => {
                let value = device()?.show_attribute(&attr)?;
                Response::Value {
                    value: value.trim_end().to_owned(),
                    attr,
                }
            }
            CommandType::Set { attr, value } => {
                device()?.store_attribute(&attr, value.as_bytes())?;
                Response::Ok
            }
            CommandType::Stats => {
                let device = device()?;
                Response::Stats {
                    report: StatsReport {
                        stats: device.stats(),
                        config: device.config(),
                        buffer: device.buffer_status(),
                    },
                }
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InitialConfig;
    use crate::device::Trigger;

    fn handler() -> ProtocolHandler {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .attach_with(&InitialConfig::default(), Trigger::Manual)
            .unwrap();
        ProtocolHandler::new(registry)
    }

    #[test]
    fn test_request_shape() {
        let request = ProtocolHandler::parse_request(
            r#"{"device": 2, "command": {"type": "read", "blocking": true, "timeout_ms": 250}}"#,
        )
        .unwrap();
        assert_eq!(request.device, 2);
        assert_eq!(
            request.command,
            CommandType::Read {
                blocking: true,
                timeout_ms: Some(250)
            }
        );

        let request = ProtocolHandler::parse_request(r#"{"command": {"type": "stats"}}"#).unwrap();
        assert_eq!(request.device, 0);
        assert_eq!(request.command, CommandType::Stats);
    }

    #[test]
    fn test_parse_error_response() {
        let response = handler().handle_line("not json");
        assert!(matches!(response, Response::Error { ref kind, .. } if kind == "parse"));
    }

    #[test]
    fn test_set_get_roundtrip() {
        let handler = handler();
        let set = handler.handle_line(
            r#"{"command": {"type": "set", "attr": "threshold_mC", "value": "30000"}}"#,
        );
        assert_eq!(set, Response::Ok);

        let get = handler.handle_line(r#"{"command": {"type": "get", "attr": "threshold_mC"}}"#);
        assert_eq!(
            get,
            Response::Value {
                attr: "threshold_mC".into(),
                value: "30000".into()
            }
        );
    }

    #[test]
    fn test_read_would_block_and_not_found() {
        let handler = handler();
        let response = handler.handle_line(r#"{"command": {"type": "read"}}"#);
        assert!(matches!(response, Response::Error { ref kind, .. } if kind == "would_block"));

        let response = handler.handle_line(r#"{"device": 5, "command": {"type": "poll"}}"#);
        assert!(matches!(response, Response::Error { ref kind, .. } if kind == "not_found"));
    }

    #[test]
    fn test_sample_response_carries_record() {
        let handler = handler();
        let device = handler.registry().get(0).unwrap();
        let produced = device.trigger().unwrap();

        let response = handler.handle_line(r#"{"command": {"type": "read"}}"#);
        let json = serde_json::to_string(&response).unwrap();
        let decoded: Response = serde_json::from_str(&json).unwrap();
        match decoded {
            Response::Sample { sample, record } => {
                assert_eq!(sample, produced);
                assert_eq!(Sample::from_bytes(&record), Some(produced));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_list_devices() {
        let handler = handler();
        let response = handler.handle_line(r#"{"device": 7, "command": {"type": "list"}}"#);
        assert_eq!(response, Response::Devices { ids: vec![0] });
    }
}
