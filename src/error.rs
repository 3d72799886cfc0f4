use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed payload: {0}")]
    Schema(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Please select a device ID.")]
    MissingId,
    #[error("Please enter a device position.")]
    MissingPosition,
    #[error("Invalid device position. Use alphanumeric characters, spaces, or hyphens.")]
    InvalidPosition,
    #[error("This device ID has already been added.")]
    Duplicate,
    #[error("Failed to save devices: {0}")]
    Store(String),
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        RegistryError::Store(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Invalid phone number. Use 10-15 digits, optionally starting with +.")]
    InvalidPhone,
    #[error("This Device ID is already assigned to another user.")]
    DeviceAssigned,
    #[error("Username, email and password are required.")]
    MissingField,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("no signed-in user")]
    SignedOut,
    #[error("Invalid device ID.")]
    UnknownDevice,
    #[error("Device not registered. Please add it in the Devices section.")]
    NotRegistered,
    #[error("Failed to validate device: {0}")]
    Api(#[from] ApiError),
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command '{0}', type help for the list")]
    Unknown(String),
    #[error("only administrators can {0}")]
    AdminOnly(&'static str),
    #[error("device page is not running")]
    DevicesClosed,
    #[error(transparent)]
    User(#[from] UserError),
    #[error("failed to sign out: {0}")]
    Store(#[from] StoreError),
}
