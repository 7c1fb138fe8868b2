pub mod config;
pub mod decode;
pub mod dispatch;
pub mod doctor;
pub mod error;
pub mod extract;
pub mod framer;
pub mod health;
pub mod link;
pub mod observer;

pub use config::LinkConfig;
pub use dispatch::{DispatchHandle, DispatchOutcome, DispatchRequest};
pub use error::LinkError;
pub use link::{Channel, Link};
pub use observer::{LinkObserver, NullObserver};
