use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial channel is not open")]
    NotOpen,
    #[error("open serial {dev}: {source}")]
    Open {
        dev: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("serial io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session already running")]
    AlreadyRunning,
    #[error("no waypoints to send")]
    NoWaypoints,
    #[error("no waypoint with index {0}")]
    NoSuchWaypoint(usize),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}
