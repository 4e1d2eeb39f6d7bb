mod daddress;
mod dwrapped_key;

pub use daddress::DAddress;
pub use dwrapped_key::DWrappedKey;
