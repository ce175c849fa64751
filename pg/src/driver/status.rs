/// Where a connection stands in its lifecycle.
///
/// `Ok` is the only status from which statements may be executed. `Bad` is
/// terminal until the connection is opened again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected.
    #[default]
    Needed,
    /// Transport connect in progress.
    Started,
    /// Transport connected; startup not yet sent.
    Made,
    /// Startup sent, waiting on the server.
    AwaitingResponse,
    /// Authentication accepted.
    AuthOk,
    /// SSL negotiation in progress.
    SslStartup,
    /// Receiving server parameters.
    SettingEnvironment,
    Ok,
    Bad,
    /// The server reported a state this driver does not recognise.
    Unknown,
}

/// Result of one step of the startup state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// Waiting for the socket to become readable.
    Reading,
    /// Waiting for the socket to become writable.
    Writing,
    /// Progress was made without I/O; poll again.
    Active,
    Ok,
    Failed,
}
