mod access_request;
mod file;
mod patient;
mod provider;

pub use access_request::{AccessRequestRow, Decision};
pub use file::{FileRow, WrappedKeyRow};
pub use patient::PatientRow;
pub use provider::ProviderRow;

pub(crate) fn decode_error(e: impl Into<sqlx::error::BoxDynError>) -> sqlx::Error {
    sqlx::Error::Decode(e.into())
}
