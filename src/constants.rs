//! Protocol constants and configuration values

/// Default Asterisk Manager Interface port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Default manager host
pub const DEFAULT_SERVER: &str = "localhost";

/// Default manager username
pub const DEFAULT_USERNAME: &str = "phpagi";

/// Default manager secret
pub const DEFAULT_SECRET: &str = "phpagi";

/// Line terminator for every line written to the manager
pub const LINE_TERMINATOR: &str = "\r\n";

/// Field carrying the action name on requests
pub const FIELD_ACTION: &str = "Action";
/// Field discriminating a response packet
pub const FIELD_RESPONSE: &str = "Response";
/// Field discriminating an event packet
pub const FIELD_EVENT: &str = "Event";
/// Synthesized field holding a `Follows` sub-block
pub const FIELD_DATA: &str = "data";

/// First-field value announcing a multi-line sub-block
pub const FOLLOWS: &str = "Follows";

/// Prefix of the line terminating a `Follows` sub-block
pub const END_SENTINEL: &str = "--END ";

/// `Response` value required for a successful login
pub const RESPONSE_SUCCESS: &str = "Success";

/// Registry key of the fallback event handler
pub const WILDCARD_EVENT: &str = "*";

/// TCP connect and greeting timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
