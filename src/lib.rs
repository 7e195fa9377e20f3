//! # Simulated Temperature Sensor
//!
//! A software temperature sensor that produces timestamped samples on a
//! periodic timer, buffers them in a bounded ring and hands them to
//! consumers through blocking, non-blocking and readiness-polling reads.
//!
//! ## Features
//!
//! - **Sample generation**: normal, noisy and ramp models in a fixed range
//! - **Bounded buffering**: 64-deep ring, oldest sample evicted on overflow
//! - **Threshold alerts**: each sample flagged against a live threshold
//! - **Runtime configuration**: interval, threshold and mode via attributes
//! - **Device registry**: up to eight devices addressed by id
//! - **Daemon protocol**: line-delimited JSON served by `simtempd`
//!
//! ## Quick Start
//!
//! ```rust
//! use simtemp::{InitialConfig, SimTempDevice};
//!
//! let device = SimTempDevice::attach_manual(0, &InitialConfig::default())?;
//! let produced = device.trigger()?;
//!
//! let sample = device.read(false)?;
//! assert_eq!(sample, produced);
//! assert!(sample.flags.contains(simtemp::SampleFlags::NEW_SAMPLE));
//! # Ok::<(), simtemp::DeviceError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`device`] - Device façade and the sample production path
//! - [`generator`] - Temperature models and the generator state word
//! - [`ring`] / [`notifier`] - Sample buffer and reader wake-up
//! - [`config`] / [`stats`] - Live configuration and counters
//! - [`scheduler`] - Periodic sample timer
//! - [`attributes`] - Text attribute surface
//! - [`registry`] - Device ids and lifecycle
//! - [`protocol`] - JSON request handling for the daemon

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

pub mod attributes;
pub mod config;
pub mod device;
pub mod error;
pub mod generator;
pub mod notifier;
pub mod protocol;
pub mod registry;
pub mod ring;
pub mod sample;
pub mod scheduler;
pub mod stats;

// Re-export main public types for convenience
pub use attributes::Attribute;
pub use config::{ConfigSnapshot, InitialConfig};
pub use device::{Setting, SimTempDevice, Trigger};
pub use error::{ConfigFileError, DeviceError};
pub use generator::SimMode;
pub use notifier::{Readiness, Wait};
pub use protocol::{CommandType, ProtocolHandler, Request, Response};
pub use registry::DeviceRegistry;
pub use sample::{Sample, SampleFlags};
pub use stats::StatsSnapshot;
