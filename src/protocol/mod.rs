pub mod address;
pub mod parcel;
pub mod request;
pub mod wire;
