pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;
pub mod testing;
pub mod transfer;
pub mod transport;

pub use api::{
    AccessToken, ApiError, Authenticator, HttpOctopodClient, OctopodApi, Order, OrderStatus,
    RemoteFile, ValidationState,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use error::ErrorKind;
pub use lifecycle::{
    LifecycleError, LifecycleState, OrderLifecycleController, PollOutcome, PollingConfig,
    ResultArtifact,
};
pub use orchestrator::{
    Orchestrator, OrchestratorError, OrderOutcome, ProcessOutcome, ProcessRequest,
    ResultSelection, WaitRequest,
};
pub use session::{Credentials, Session, SessionManager};
pub use transfer::{BulkTransfer, SftpTransfer, TransferError};
pub use transport::{
    FileOrigin, FileReference, TransportConfig, TransportError, TransportKind, TransportSelector,
};
